pub mod event;
pub mod stream;
pub mod supervisor;

pub use event::{parse_line, EventError, StreamEvent, GRID_DEMAND_ID};
pub use stream::{EventStream, StreamError};
pub use supervisor::{process_line, run_session, LineOutcome, SessionStats, Supervisor};
