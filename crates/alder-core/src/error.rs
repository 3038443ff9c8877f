//! Error types for Alder.

use thiserror::Error;

/// The main error type for Alder operations.
#[derive(Debug, Error)]
pub enum AlderError {
    /// Scheduler-related error.
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    /// Signal-related error.
    #[error("signal error: {0}")]
    Signal(#[from] SignalError),
}

/// Scheduler-specific errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The task ID is invalid or the task has already completed.
    #[error("invalid or expired task ID")]
    InvalidTaskId,
}

/// Signal-specific errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignalError {
    /// The connection ID is invalid or has already been disconnected.
    #[error("invalid or disconnected connection ID")]
    InvalidConnection,
}

/// A specialized Result type for Alder operations.
pub type Result<T> = std::result::Result<T, AlderError>;
