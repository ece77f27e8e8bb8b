use crate::player::DEFAULT_SAVE_INTERVAL;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for [`crate::network::Server`]
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address the UDP socket binds to
    pub bind_addr: String,
    /// Simulation ticks per second
    pub tick_rate: u32,
    pub max_clients: usize,
    /// Ticks between periodic player saves
    pub save_interval: u32,
    /// Silence after which a client is dropped
    pub client_timeout: Duration,
    pub world_name: String,
    /// Where player files live; `None` keeps players in memory only
    pub data_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:25565".to_string(),
            tick_rate: 20,
            max_clients: 32,
            save_interval: DEFAULT_SAVE_INTERVAL,
            client_timeout: Duration::from_secs(5),
            world_name: "world".to_string(),
            data_dir: None,
        }
    }
}

impl ServerConfig {
    /// Wall-clock length of one tick
    pub fn tick_duration(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.tick_rate.max(1)))
    }
}
