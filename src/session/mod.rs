//! Claim sessions: lifecycle record, scheduling loop and supervisor

pub mod error;
pub mod scheduler;
pub mod state;
pub mod supervisor;

pub use error::{SchedulerError, SupervisorError};
pub use scheduler::{Clock, SchedulerConfig, SchedulingLoop, SystemClock};
pub use state::{ClaimSession, SessionSnapshot, SessionStatus};
pub use supervisor::{AggregateStats, SessionSupervisor, SupervisorConfig};
