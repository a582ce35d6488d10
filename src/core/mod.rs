//! 核心层：调度错误与单次调度状态机

pub mod error;
pub mod state;

pub use error::{DispatchError, SessionError};
pub use state::{DispatchPhase, PhaseTracker};
