//! Error types for the Workhorse protocol controller.
//!
//! A single consolidated enum, [`WorkhorseError`], covers every failure the
//! controller can surface, from transport I/O through protocol-level
//! rejections to state-machine misuse.
//!
//! ## Recoverability
//!
//! - `Timeout` and `DeviceRejected` are recoverable: the caller may retry or
//!   escalate to the orchestration agent.
//! - `Busy` and `InvalidModeForOperation` are ordering errors in the calling
//!   code and are surfaced immediately, before any I/O.
//! - `Stale` asks the caller to refresh the parameter cache and try again.
//! - `IndeterminateState` and `StopFailed` are fatal until an operator
//!   intervenes; the controller never silently defaults past them.

use thiserror::Error;

use crate::param::ParameterKey;
use crate::state::ProtocolState;

/// Convenience alias for results using the controller error type.
pub type Result<T> = std::result::Result<T, WorkhorseError>;

/// Primary error type for the Workhorse protocol controller.
#[derive(Error, Debug)]
pub enum WorkhorseError {
    /// No matching response frame arrived before the transaction deadline.
    ///
    /// Recoverable. Retries are the caller's responsibility; the executor
    /// itself never retries.
    #[error("Timed out after {0:?} waiting for '{1}' response")]
    Timeout(std::time::Duration, &'static str),

    /// The instrument answered with its error prompt.
    ///
    /// Usually indicates a malformed argument. The raw response is attached
    /// for diagnostics.
    #[error("Instrument rejected command: {0}")]
    DeviceRejected(String),

    /// A transaction is already in flight.
    ///
    /// The command channel is half duplex; at most one command may await a
    /// response. This is a programming/ordering error and is reported before
    /// any bytes are written.
    #[error("Transaction already in flight")]
    Busy,

    /// Cached parameter value is older than the requested freshness.
    #[error("Parameter {key} is stale (age {age:?} exceeds {max_age:?})")]
    Stale {
        key: ParameterKey,
        age: std::time::Duration,
        max_age: std::time::Duration,
    },

    /// The parameter has no cached value yet (never refreshed).
    #[error("Parameter {0} has not been read from the instrument yet")]
    NeverRefreshed(ParameterKey),

    /// Attempted to set a read-only parameter. Rejected before any I/O.
    #[error("Parameter {0} is read-only")]
    ReadOnly(ParameterKey),

    /// Attempted to set a parameter that is locked while deployed.
    /// Rejected before any I/O.
    #[error("Parameter {0} is immutable at runtime")]
    Immutable(ParameterKey),

    /// A value's type does not match the parameter's declared wire type.
    #[error("Parameter {key} expects {expected}, got '{value}'")]
    TypeMismatch {
        key: ParameterKey,
        expected: &'static str,
        value: String,
    },

    /// Discovery could not classify the instrument mode within its attempt
    /// budget. Fatal until operator intervention; never silently defaulted.
    #[error("Unable to determine instrument state after {attempts} probe attempts")]
    IndeterminateState { attempts: u32 },

    /// The operation is not valid in the current mode.
    #[error("Operation '{op}' not permitted in {mode:?} state")]
    InvalidModeForOperation {
        op: &'static str,
        mode: ProtocolState,
    },

    /// The instrument still reports logging after a stop sequence.
    ///
    /// Fatal: the controller keeps reporting `Autosample` rather than
    /// proceeding on a wrong assumption.
    #[error("Instrument still logging after stop sequence")]
    StopFailed,

    /// Restarting logging after an interrupted-mode operation failed.
    ///
    /// Carries the original operation failure (if any) alongside the restore
    /// failure so neither is lost.
    #[error("Failed to restore logging after '{op}': {restore}")]
    RestoreFailed {
        op: &'static str,
        #[source]
        restore: Box<WorkhorseError>,
        /// Failure of the interrupted operation itself, when there was one.
        original: Option<Box<WorkhorseError>>,
    },

    /// A response arrived but could not be parsed into the expected shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Transport write failure from the send function.
    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkhorseError {
    /// True for failures a caller may reasonably retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WorkhorseError::Timeout(..)
                | WorkhorseError::DeviceRejected(_)
                | WorkhorseError::Stale { .. }
                | WorkhorseError::NeverRefreshed(_)
        )
    }
}
