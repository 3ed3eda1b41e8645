mod engine;
mod session;

pub use engine::TimerEngine;
pub use session::{SessionRecord, SessionState, TimerSession};
