use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::SwitchState;

/// Switch-specific errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SwitchError {
    #[error("Communication error: {0}")]
    Communication(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Switch offline or unavailable")]
    Offline,
    #[error("No switch named '{0}' found on the network")]
    NotFound(String),
}

/// A relay driving one heater.
///
/// `get_state(true)` must bypass any cached value and ask the device.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Switch: Send + Sync {
    async fn get_state(&self, force_update: bool) -> Result<SwitchState, SwitchError>;
    async fn on(&self) -> Result<(), SwitchError>;
    async fn off(&self) -> Result<(), SwitchError>;
}

/// Drives `switch` to `target`.
pub async fn set_state(switch: &dyn Switch, target: SwitchState) -> Result<(), SwitchError> {
    match target {
        SwitchState::On => switch.on().await,
        SwitchState::Off => switch.off().await,
    }
}

#[derive(Debug)]
struct SimulatedRelay {
    state: SwitchState,
    fail_commands: bool,
    offline: bool,
    commands: u64,
}

/// In-memory relay. Clones share the same relay, so a test can keep a handle
/// and flip the switch "by hand" while a controller owns another clone.
#[derive(Debug, Clone)]
pub struct SimulatedSwitch {
    relay: Arc<RwLock<SimulatedRelay>>,
}

impl SimulatedSwitch {
    pub fn new(initial: SwitchState) -> Self {
        Self {
            relay: Arc::new(RwLock::new(SimulatedRelay {
                state: initial,
                fail_commands: false,
                offline: false,
                commands: 0,
            })),
        }
    }

    /// Flip the relay without going through `on`/`off`, like a person at the wall socket.
    pub async fn toggle_manually(&self) {
        let mut relay = self.relay.write().await;
        relay.state = relay.state.toggled();
    }

    /// Make `on`/`off` fail without touching the relay.
    pub async fn fail_commands(&self, fail: bool) {
        self.relay.write().await.fail_commands = fail;
    }

    /// Make every call fail with [`SwitchError::Offline`].
    pub async fn set_offline(&self, offline: bool) {
        self.relay.write().await.offline = offline;
    }

    pub async fn physical_state(&self) -> SwitchState {
        self.relay.read().await.state
    }

    /// Number of successful `on`/`off` commands.
    pub async fn command_count(&self) -> u64 {
        self.relay.read().await.commands
    }

    async fn command(&self, target: SwitchState) -> Result<(), SwitchError> {
        let mut relay = self.relay.write().await;
        if relay.offline {
            return Err(SwitchError::Offline);
        }
        if relay.fail_commands {
            return Err(SwitchError::Communication(format!(
                "simulated failure switching {target}"
            )));
        }
        relay.state = target;
        relay.commands += 1;
        Ok(())
    }
}

#[async_trait]
impl Switch for SimulatedSwitch {
    async fn get_state(&self, _force_update: bool) -> Result<SwitchState, SwitchError> {
        let relay = self.relay.read().await;
        if relay.offline {
            return Err(SwitchError::Offline);
        }
        Ok(relay.state)
    }

    async fn on(&self) -> Result<(), SwitchError> {
        self.command(SwitchState::On).await
    }

    async fn off(&self) -> Result<(), SwitchError> {
        self.command(SwitchState::Off).await
    }
}
