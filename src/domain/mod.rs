pub mod demand;
pub mod rate;
pub mod room;
pub mod solar;
pub mod time;

pub use demand::*;
pub use rate::*;
pub use room::*;
pub use solar::*;
pub use time::*;
