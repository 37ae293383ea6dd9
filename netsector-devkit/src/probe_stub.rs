/*!
Prober scripté pour tester le moteur sans réseau

Chaque adresse a un comportement (joignable, injoignable, bloqué) ; les
adresses non scriptées utilisent le comportement par défaut. Tous les appels
sont enregistrés pour les assertions.
*/

use async_trait::async_trait;
use netsector_kernel::probe::{ProbeResult, Prober};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behavior {
    Up(f64),
    Down,
    /// Ne répond jamais : le moteur doit couper par timeout
    Hang,
}

#[derive(Default)]
struct Script {
    by_address: HashMap<String, Behavior>,
    fallback: Option<Behavior>,
    delay: Option<Duration>,
    calls: Vec<String>,
}

/// Prober en mémoire, clonable (les clones partagent le même script)
#[derive(Clone, Default)]
pub struct ScriptedProber {
    script: Arc<Mutex<Script>>,
}

impl ScriptedProber {
    /// Tout est joignable tant que rien n'est scripté
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&self, address: &str) -> &Self {
        self.set(address, Behavior::Up(1.0))
    }

    pub fn set_offline(&self, address: &str) -> &Self {
        self.set(address, Behavior::Down)
    }

    pub fn hang(&self, address: &str) -> &Self {
        self.set(address, Behavior::Hang)
    }

    pub fn set(&self, address: &str, behavior: Behavior) -> &Self {
        self.script.lock().by_address.insert(address.to_string(), behavior);
        self
    }

    pub fn set_default(&self, behavior: Behavior) {
        self.script.lock().fallback = Some(behavior);
    }

    /// Latence artificielle avant chaque réponse (ticks qui se chevauchent)
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.script.lock().delay = delay;
    }

    pub fn calls(&self) -> Vec<String> {
        self.script.lock().calls.clone()
    }

    pub fn call_count(&self, address: &str) -> usize {
        self.script.lock().calls.iter().filter(|a| *a == address).count()
    }

    pub fn reset_calls(&self) {
        self.script.lock().calls.clear();
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, address: &str, _timeout: Duration) -> ProbeResult {
        let (behavior, delay) = {
            let mut script = self.script.lock();
            script.calls.push(address.to_string());
            let behavior = script
                .by_address
                .get(address)
                .copied()
                .or(script.fallback)
                .unwrap_or(Behavior::Up(1.0));
            (behavior, script.delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        log::debug!("[probe-stub] {address} -> {behavior:?}");
        match behavior {
            Behavior::Up(latency) => ProbeResult::online(Some(latency)),
            Behavior::Down => ProbeResult::offline(),
            Behavior::Hang => std::future::pending().await,
        }
    }
}
