//! Error types for session orchestration

/// Failures that end a scheduling loop in the `error` state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The session was finalized by someone other than its own loop
    SessionDetached { session_id: String },
    /// A state transition the state machine does not allow
    InvalidTransition { from: String, to: String },
    /// An internal invariant no longer holds
    InvariantViolation(String),
    /// The loop panicked while running
    Panicked(String),
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::SessionDetached { session_id } => {
                write!(f, "Session {} was finalized while its loop was running", session_id)
            }
            SchedulerError::InvalidTransition { from, to } => {
                write!(f, "Invalid session transition: {} -> {}", from, to)
            }
            SchedulerError::InvariantViolation(msg) => write!(f, "Invariant violation: {}", msg),
            SchedulerError::Panicked(msg) => write!(f, "Scheduling loop panicked: {}", msg),
        }
    }
}

impl std::error::Error for SchedulerError {}

/// Errors surfaced by the session supervisor to its callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    /// No session with this identifier is tracked
    NotFound(String),
    /// The faucet registry is empty, so there is nothing to claim from
    NoFaucets,
    /// The concurrent session limit is already reached
    CapacityReached { limit: usize },
}

impl std::fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorError::NotFound(id) => write!(f, "Session not found: {}", id),
            SupervisorError::NoFaucets => write!(f, "No faucets are registered"),
            SupervisorError::CapacityReached { limit } => {
                write!(f, "Maximum of {} concurrent sessions reached", limit)
            }
        }
    }
}

impl std::error::Error for SupervisorError {}
