use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::topology::TopologySnapshot;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 180;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
const MIN_POLL_INTERVAL_SECS: u64 = 5;
const MAX_PROBE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub listen: String,
    pub data_dir: String,
    pub api_key: Option<String>,
    pub poll: PollConf,
    pub history: HistoryConf,
    pub probe: ProbeConf,
    pub mqtt: Option<MqttConf>,
    /// Topologie écrite au premier démarrage (store vide)
    pub seed: TopologySnapshot,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PollConf {
    pub interval_secs: u64,
    pub probe_timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConf {
    pub capacity: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    Ping,
    Tcp,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ProbeConf {
    pub method: ProbeMethod,
    pub tcp_port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
            data_dir: "./data".into(),
            api_key: None,
            poll: PollConf::default(),
            history: HistoryConf::default(),
            probe: ProbeConf::default(),
            mqtt: None,
            seed: TopologySnapshot::default(),
        }
    }
}

impl Default for PollConf {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
        }
    }
}

impl Default for HistoryConf {
    fn default() -> Self {
        Self { capacity: DEFAULT_HISTORY_CAPACITY }
    }
}

impl Default for ProbeConf {
    fn default() -> Self {
        Self {
            method: ProbeMethod::Ping,
            tcp_port: 80,
        }
    }
}

impl PollConf {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.clamp(1, MAX_PROBE_TIMEOUT_SECS))
    }
}

impl KernelConfig {
    pub fn from_yaml(txt: &str) -> Result<Self, serde_yaml::Error> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(txt)
    }

    /// Surcharges par variables d'environnement (après lecture du fichier)
    pub fn apply_env(&mut self) {
        if let Some(secs) = env_u64("NETSECTOR_POLL_INTERVAL_SECS") {
            self.poll.interval_secs = secs;
        }
        if let Some(secs) = env_u64("NETSECTOR_PROBE_TIMEOUT_SECS") {
            self.poll.probe_timeout_secs = secs;
        }
        if let Ok(key) = std::env::var("NETSECTOR_API_KEY") {
            if !key.trim().is_empty() {
                self.api_key = Some(key);
            }
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|raw| raw.trim().parse::<u64>().ok())
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("NETSECTOR_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        KernelConfig::from_yaml(&txt).unwrap_or_else(|e| {
            warn!(path = %path, error = %e, "invalid config, using defaults");
            KernelConfig::default()
        })
    } else {
        info!(path = %path, "no config file, using defaults");
        KernelConfig::default()
    };
    cfg.apply_env();
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let cfg = KernelConfig::from_yaml("").unwrap();
        assert_eq!(cfg.poll.interval(), Duration::from_secs(180));
        assert_eq!(cfg.history.capacity, 50);
        assert_eq!(cfg.probe.method, ProbeMethod::Ping);
        assert!(cfg.mqtt.is_none());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let cfg = KernelConfig::from_yaml(
            r#"
poll:
  probe_timeout_secs: 30
probe:
  method: tcp
seed:
  sectors:
    - { id: CPD, name: CPD, address: 192.168.36.53 }
  edges:
    - { from: CPD, to: OLD }
"#,
        )
        .unwrap();
        assert_eq!(cfg.poll.interval_secs, DEFAULT_POLL_INTERVAL_SECS);
        // borné à 10s
        assert_eq!(cfg.poll.probe_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.probe.method, ProbeMethod::Tcp);
        assert_eq!(cfg.probe.tcp_port, 80);
        assert_eq!(cfg.seed.sectors.len(), 1);
        assert_eq!(cfg.seed.edges.len(), 1);
    }

    #[test]
    fn shipped_example_parses() {
        let cfg = KernelConfig::from_yaml(include_str!("../kernel.example.yaml")).unwrap();
        assert_eq!(cfg.seed.sectors.len(), 9);
        assert_eq!(cfg.seed.edges.len(), 3);
        assert_eq!(cfg.api_key, None);
        let cpd = cfg.seed.sectors.iter().find(|s| s.id == "CPD").unwrap();
        assert_eq!(cpd.address.as_deref(), Some("192.168.36.53"));
    }

    #[test]
    fn interval_has_a_floor() {
        let poll = PollConf { interval_secs: 1, probe_timeout_secs: 0 };
        assert_eq!(poll.interval(), Duration::from_secs(5));
        assert_eq!(poll.probe_timeout(), Duration::from_secs(1));
    }
}
