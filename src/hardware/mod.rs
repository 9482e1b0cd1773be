pub mod discovery;
pub mod factory;
pub mod switch;
pub mod wemo;

pub use discovery::{DiscoveredPlug, WemoDiscovery, SSDP_MULTICAST};
pub use factory::{SwitchConfig, SwitchFactory};
pub use switch::{set_state, SimulatedSwitch, Switch, SwitchError};
pub use wemo::WemoSwitch;

#[cfg(test)]
pub use switch::MockSwitch;
