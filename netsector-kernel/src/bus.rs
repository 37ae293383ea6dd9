/**
 * BUS MQTT - Diffusion des statuts vers les autres services
 *
 * Chaque jeu publié part sur `netsector/status@v1` (retain, pour qu'un nouvel
 * abonné reçoive immédiatement l'état courant) et chaque dégradation sur
 * `netsector/history@v1`. Optionnel : actif seulement si `mqtt:` est configuré.
 *
 * L'eventloop rumqttc tourne dans sa propre tâche et la publication passe par
 * `try_publish` : broker absent ou file pleine, le message est perdu (loggé)
 * et les reconnexions continuent.
 */

use crate::config::MqttConf;
use crate::engine::{EngineEvent, StatusEngine};
use crate::models::{HistoryEntry, StatusSnapshot};
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

pub const STATUS_TOPIC: &str = "netsector/status@v1";
pub const HISTORY_TOPIC: &str = "netsector/history@v1";

/// Requêtes en attente côté client avant que `try_publish` refuse
const CLIENT_QUEUE: usize = 10;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub topic: &'static str,
    pub retain: bool,
    pub payload: Vec<u8>,
}

pub fn status_message(snapshot: &StatusSnapshot) -> serde_json::Result<Outgoing> {
    Ok(Outgoing {
        topic: STATUS_TOPIC,
        retain: true,
        payload: serde_json::to_vec(snapshot)?,
    })
}

pub fn history_message(entry: &HistoryEntry) -> serde_json::Result<Outgoing> {
    Ok(Outgoing {
        topic: HISTORY_TOPIC,
        retain: false,
        payload: serde_json::to_vec(entry)?,
    })
}

fn to_message(event: &EngineEvent) -> serde_json::Result<Outgoing> {
    match event {
        EngineEvent::Published(snapshot) => status_message(snapshot),
        EngineEvent::Degraded(entry) => history_message(entry),
    }
}

pub fn spawn_status_publisher(engine: &StatusEngine, conf: MqttConf) -> JoinHandle<()> {
    spawn_publisher(engine.subscribe(), conf)
}

pub fn spawn_publisher(mut events: broadcast::Receiver<EngineEvent>, conf: MqttConf) -> JoinHandle<()> {
    task::spawn(async move {
        let mut opts = MqttOptions::new("netsector-kernel", &conf.host, conf.port);
        opts.set_keep_alive(Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, CLIENT_QUEUE);
        info!(host = %conf.host, port = conf.port, "mqtt status publisher started");

        let connection = task::spawn(async move {
            loop {
                if let Err(e) = eventloop.poll().await {
                    warn!(error = ?e, "mqtt connection error, retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        });

        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "mqtt publisher lagging, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            match to_message(&event) {
                Ok(msg) => match client.try_publish(msg.topic, QoS::AtLeastOnce, msg.retain, msg.payload) {
                    Ok(()) => debug!(topic = msg.topic, "published"),
                    Err(e) => warn!(topic = msg.topic, error = ?e, "mqtt publish dropped"),
                },
                Err(e) => warn!(error = %e, "failed to encode event"),
            }
        }
        connection.abort();
        info!("engine gone, mqtt status publisher stopped");
    })
}
