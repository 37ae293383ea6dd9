/**
 * REACHABILITY PROBER - Test d'accessibilité d'une adresse réseau
 *
 * RÔLE :
 * Capacité injectée dans le moteur : `probe(adresse, timeout)` -> joignable + latence.
 * Ne remonte jamais d'erreur : tout échec (timeout, commande absente, adresse
 * invalide) devient `alive: false`.
 *
 * IMPLÉMENTATIONS :
 * - `PingProber` : un écho ICMP via la commande système `ping`
 * - `TcpProber`  : connexion TCP sur un port (réseaux où l'ICMP est filtré)
 */

use crate::config::{ProbeConf, ProbeMethod};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Marge laissée au processus `ping` au-delà de son propre délai
const PROCESS_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub alive: bool,
    pub latency_ms: Option<f64>,
}

impl ProbeResult {
    pub fn online(latency_ms: Option<f64>) -> Self {
        Self { alive: true, latency_ms }
    }

    pub fn offline() -> Self {
        Self { alive: false, latency_ms: None }
    }
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, address: &str, timeout: Duration) -> ProbeResult;
}

pub fn build_prober(conf: &ProbeConf) -> Arc<dyn Prober> {
    match conf.method {
        ProbeMethod::Ping => Arc::new(PingProber),
        ProbeMethod::Tcp => Arc::new(TcpProber::new(conf.tcp_port)),
    }
}

pub struct PingProber;

impl PingProber {
    fn command(address: &str, wait: Duration) -> Command {
        let mut cmd = Command::new("ping");
        let secs = wait.as_secs().max(1);
        #[cfg(windows)]
        cmd.args(["-n", "1", "-w", &(secs * 1000).to_string(), address]);
        // macOS : -W est en millisecondes
        #[cfg(target_os = "macos")]
        cmd.args(["-c", "1", "-W", &(secs * 1000).to_string(), address]);
        #[cfg(all(unix, not(target_os = "macos")))]
        cmd.args(["-c", "1", "-W", &secs.to_string(), address]);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, address: &str, wait: Duration) -> ProbeResult {
        if !is_probeable(address) {
            warn!(address, "refusing to ping malformed address");
            return ProbeResult::offline();
        }

        let started = Instant::now();
        match timeout(wait + PROCESS_GRACE, Self::command(address, wait).output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                // sous Windows le code retour vaut 0 même pour "Destination host unreachable"
                let replied = output.status.success()
                    && (!cfg!(windows) || stdout.to_ascii_uppercase().contains("TTL="));
                if replied {
                    let latency = parse_ping_latency(&stdout)
                        .or_else(|| Some(started.elapsed().as_secs_f64() * 1000.0));
                    ProbeResult::online(latency)
                } else {
                    debug!(address, "no echo reply");
                    ProbeResult::offline()
                }
            }
            Ok(Err(e)) => {
                warn!(address, error = %e, "failed to run ping");
                ProbeResult::offline()
            }
            Err(_) => {
                debug!(address, "ping timed out");
                ProbeResult::offline()
            }
        }
    }
}

pub struct TcpProber {
    default_port: u16,
}

impl TcpProber {
    pub fn new(default_port: u16) -> Self {
        Self { default_port }
    }

    fn target(&self, address: &str) -> String {
        if let Ok(sock) = address.parse::<SocketAddr>() {
            return sock.to_string();
        }
        if let Ok(ip) = address.parse::<IpAddr>() {
            return SocketAddr::new(ip, self.default_port).to_string();
        }
        match address.rsplit_once(':') {
            Some((_, port)) if port.parse::<u16>().is_ok() => address.to_string(),
            _ => format!("{}:{}", address, self.default_port),
        }
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, address: &str, wait: Duration) -> ProbeResult {
        if !is_probeable(address) {
            return ProbeResult::offline();
        }
        let target = self.target(address);
        let started = Instant::now();
        match timeout(wait, TcpStream::connect(&target)).await {
            Ok(Ok(_)) => ProbeResult::online(Some(started.elapsed().as_secs_f64() * 1000.0)),
            // un RST prouve que l'hôte répond, même si le port est fermé
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                ProbeResult::online(Some(started.elapsed().as_secs_f64() * 1000.0))
            }
            Ok(Err(e)) => {
                debug!(target = %target, error = %e, "tcp probe failed");
                ProbeResult::offline()
            }
            Err(_) => ProbeResult::offline(),
        }
    }
}

fn is_probeable(address: &str) -> bool {
    !address.is_empty()
        && !address.starts_with('-')
        && address
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '-' | '_' | '[' | ']' | '%'))
}

/// Extrait la latence d'une sortie `ping` ("time=0.42 ms", "time<1ms", "tempo=3ms")
pub fn parse_ping_latency(output: &str) -> Option<f64> {
    let lower = output.to_lowercase();
    for marker in ["time=", "time<", "tempo=", "tempo<", "zeit=", "zeit<", "temps="] {
        if let Some(idx) = lower.find(marker) {
            let rest = &lower[idx + marker.len()..];
            let number: String = rest
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
                .map(|c| if c == ',' { '.' } else { c })
                .collect();
            if let Ok(value) = number.parse::<f64>() {
                return Some(value);
            }
        }
    }
    None
}
