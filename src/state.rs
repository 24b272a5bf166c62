//! Protocol mode machine.
//!
//! Every mode and every transition the controller supports is spelled out in
//! one exhaustive match. There is no dynamic handler registry: an illegal
//! (state, event) pair is a compile-visible arm returning
//! [`WorkhorseError::InvalidModeForOperation`], not a lookup miss.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkhorseError};

/// Operating mode of the protocol controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolState {
    /// Initial mode: the instrument has not been probed yet. Only discovery
    /// is permitted.
    Unknown,
    /// Interactive command mode: the instrument answers commands at its
    /// prompt.
    Command,
    /// Deployed and streaming sample records.
    Autosample,
    /// Raw passthrough for an operator session; the controller stands aside.
    DirectAccess,
}

/// Mode-changing occurrences the machine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// Discovery classified the instrument as awake at its prompt.
    DiscoveredCommand,
    /// Discovery classified the instrument as streaming samples.
    DiscoveredAutosample,
    /// Start-deployment command issued successfully.
    StartAutosample,
    /// Logging interrupted and confirmed stopped.
    StopAutosample,
    /// Operator requested a raw passthrough session.
    StartDirectAccess,
    /// Operator session ended.
    StopDirectAccess,
}

impl ProtocolEvent {
    /// Operation name used in error reports.
    pub fn op_name(&self) -> &'static str {
        match self {
            ProtocolEvent::DiscoveredCommand | ProtocolEvent::DiscoveredAutosample => "discover",
            ProtocolEvent::StartAutosample => "start_autosample",
            ProtocolEvent::StopAutosample => "stop_autosample",
            ProtocolEvent::StartDirectAccess => "start_direct_access",
            ProtocolEvent::StopDirectAccess => "stop_direct_access",
        }
    }
}

/// Compute the successor mode, or reject the event as invalid in `state`.
///
/// Entry actions (parameter refresh on entering `Command`, event
/// notifications) belong to the controller; this function is pure.
pub fn transition(state: ProtocolState, event: ProtocolEvent) -> Result<ProtocolState> {
    use ProtocolEvent as E;
    use ProtocolState as S;
    let next = match (state, event) {
        (S::Unknown, E::DiscoveredCommand) => S::Command,
        (S::Unknown, E::DiscoveredAutosample) => S::Autosample,

        (S::Command, E::StartAutosample) => S::Autosample,
        (S::Command, E::StartDirectAccess) => S::DirectAccess,
        // Re-discovery from command mode is allowed and may reveal that a
        // deployment was started out of band.
        (S::Command, E::DiscoveredCommand) => S::Command,
        (S::Command, E::DiscoveredAutosample) => S::Autosample,

        (S::Autosample, E::StopAutosample) => S::Command,
        (S::Autosample, E::DiscoveredCommand) => S::Command,
        (S::Autosample, E::DiscoveredAutosample) => S::Autosample,

        (S::DirectAccess, E::StopDirectAccess) => S::Command,

        (state, event) => {
            return Err(WorkhorseError::InvalidModeForOperation {
                op: event.op_name(),
                mode: state,
            })
        }
    };
    Ok(next)
}
