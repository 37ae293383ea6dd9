use crate::engine::{StatusEngine, TickOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollCommand {
    RefreshNow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshError {
    /// la boucle de polling est arrêtée
    Closed,
}

#[derive(Clone)]
pub struct PollerHandle {
    sender: mpsc::Sender<PollCommand>,
}

impl PollerHandle {
    /// Handle et récepteur associé ; `spawn_status_poller` consomme le récepteur
    pub fn channel() -> (Self, mpsc::Receiver<PollCommand>) {
        let (sender, receiver) = mpsc::channel(4);
        (Self { sender }, receiver)
    }

    /// Demande un tick immédiat. Si une demande attend déjà, celle-ci la rejoint.
    pub fn refresh_now(&self) -> Result<(), RefreshError> {
        match self.sender.try_send(PollCommand::RefreshNow) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("refresh already pending");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(RefreshError::Closed),
        }
    }
}

/// Boucle de polling : un tick immédiat au démarrage, puis à chaque intervalle,
/// plus les rafraîchissements demandés via le handle.
pub fn spawn_status_poller(engine: Arc<StatusEngine>, every: Duration) -> (PollerHandle, JoinHandle<()>) {
    let (handle, mut receiver) = PollerHandle::channel();
    let task = tokio::spawn(async move {
        info!(interval_secs = every.as_secs(), "status poller started");
        let mut ticker = tokio::time::interval(every);
        // un tick trop long décale le suivant au lieu d'enchaîner les rattrapages
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => run_tick(&engine, "interval").await,
                command = receiver.recv() => match command {
                    Some(PollCommand::RefreshNow) => {
                        info!("manual refresh requested");
                        run_tick(&engine, "manual").await;
                    }
                    None => {
                        warn!("poller command channel closed, stopping");
                        break;
                    }
                },
            }
        }
    });
    (handle, task)
}

async fn run_tick(engine: &StatusEngine, trigger: &'static str) {
    if let TickOutcome::Skipped = engine.tick().await {
        debug!(trigger, "tick skipped, previous one still running");
    }
}
