//! Error types for the reconfiguration engine.
//!
//! Move precondition failures are reported through [`InvalidMoveError`];
//! everything else that can go wrong before or around a search is a
//! [`ReconfigError`]. A dependence conflict between moves is not an error and
//! never shows up here.

use crate::network::LineId;
use thiserror::Error;

/// A move was built or replayed against a configuration that does not satisfy
/// its preconditions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidMoveError {
    /// A switch scheduled for opening is already open.
    #[error("switch {0} is already open")]
    AlreadyOpen(LineId),

    /// A switch scheduled for closing is already closed.
    #[error("switch {0} is already closed")]
    AlreadyClosed(LineId),

    /// The line exists but is not switchable.
    #[error("line {0} is not switchable")]
    NotSwitchable(LineId),

    /// The line id is out of range for the network.
    #[error("unknown line {0}")]
    UnknownLine(LineId),

    /// The same switch appears more than once in a move.
    #[error("switch {0} appears more than once in the move")]
    DuplicateSwitch(LineId),

    /// The move targets a period the solution does not have.
    #[error("period {0} does not exist")]
    UnknownPeriod(usize),
}

/// Errors raised by the engine.
#[derive(Error, Debug)]
pub enum ReconfigError {
    /// Move construction or application failed its preconditions.
    #[error("invalid move: {0}")]
    InvalidMove(#[from] InvalidMoveError),

    /// The network description is inconsistent.
    #[error("invalid network: {0}")]
    InvalidNetwork(String),

    /// The optimizer was configured in a way no search can run with.
    #[error("misconfiguration: {0}")]
    Misconfiguration(String),

    /// A switch operation targeted a line that is not switchable.
    #[error("line {0} is not switchable")]
    NotSwitchable(LineId),

    /// A line id is out of range for the network.
    #[error("unknown line {0}")]
    UnknownLine(LineId),

    /// A background optimization thread panicked.
    #[error("optimization worker panicked: {0}")]
    WorkerPanicked(String),

    /// I/O errors (configuration files, reports).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReconfigError>;
