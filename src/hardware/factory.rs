use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::discovery::WemoDiscovery;
use super::switch::{SimulatedSwitch, Switch, SwitchError};
use super::wemo::{WemoSwitch, DEFAULT_PORT};
use crate::domain::SwitchState;

/// Per-room switch hardware.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SwitchConfig {
    /// In-memory relay for development and testing
    Simulated {
        #[serde(default = "default_initial")]
        initial: SwitchState,
    },
    /// Belkin WeMo plug. Found on the LAN by friendly name (the room name
    /// unless `friendly_name` is set); a fixed `host` skips discovery.
    Wemo {
        #[serde(default)]
        host: Option<String>,
        #[serde(default)]
        friendly_name: Option<String>,
        #[serde(default = "default_port")]
        port: u16,
        #[serde(default = "default_timeout")]
        timeout_seconds: u64,
    },
}

fn default_initial() -> SwitchState {
    SwitchState::Off
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout() -> u64 {
    10
}

/// Builds switch instances from configuration.
///
/// Simulated switches are remembered by room so callers can reach the relay
/// afterwards (manual toggles, failure injection). The network is searched at
/// most once; every discovered plug is kept for later rooms.
#[derive(Debug, Default)]
pub struct SwitchFactory {
    simulated: BTreeMap<String, SimulatedSwitch>,
    discovery: Option<WemoDiscovery>,
    locations: Option<Vec<String>>,
}

impl SwitchFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_discovery(discovery: WemoDiscovery) -> Self {
        Self {
            discovery: Some(discovery),
            ..Self::default()
        }
    }

    pub async fn create(
        &mut self,
        room: &str,
        config: &SwitchConfig,
    ) -> Result<Arc<dyn Switch>, SwitchError> {
        match config {
            SwitchConfig::Simulated { initial } => {
                info!(room, initial = %initial, "using simulated switch");
                let switch = SimulatedSwitch::new(*initial);
                self.simulated.insert(room.to_string(), switch.clone());
                Ok(Arc::new(switch))
            }
            SwitchConfig::Wemo {
                host,
                friendly_name,
                port,
                timeout_seconds,
            } => {
                let timeout = Duration::from_secs((*timeout_seconds).max(1));
                let (host, port) = match host {
                    Some(host) => (host.clone(), *port),
                    None => {
                        let name = friendly_name.as_deref().unwrap_or(room);
                        self.discover(name).await?
                    }
                };
                info!(room, host = %host, port, "using wemo switch");
                Ok(Arc::new(WemoSwitch::new(&host, port, timeout)?))
            }
        }
    }

    async fn discover(&mut self, name: &str) -> Result<(String, u16), SwitchError> {
        let discovery = match &self.discovery {
            Some(discovery) => discovery.clone(),
            None => {
                return Err(SwitchError::Communication(format!(
                    "no discovery configured to find '{name}'"
                )))
            }
        };
        let locations = match &self.locations {
            Some(locations) => locations.clone(),
            None => {
                let found = discovery.search().await?;
                self.locations = Some(found.clone());
                found
            }
        };
        discovery
            .resolve(&locations, name)
            .await
            .map(|plug| (plug.host, plug.port))
            .ok_or_else(|| SwitchError::NotFound(name.to_string()))
    }

    pub fn simulated(&self, room: &str) -> Option<SimulatedSwitch> {
        self.simulated.get(room).cloned()
    }
}
