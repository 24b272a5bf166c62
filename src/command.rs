//! Instrument command vocabulary.
//!
//! The command set is fixed and finite. Each command knows its wire form,
//! the shape of response to wait for, and which timeout class applies. New
//! commands are added here, not assembled ad hoc at call sites.

use crate::param::ParameterKey;

/// Bytes sent to nudge a sleeping instrument toward its prompt.
pub const WAKEUP: &[u8] = b"\r\n";

/// Line terminator appended to every command.
pub const NEWLINE: &str = "\r\n";

/// What kind of response a transaction waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSpec {
    /// No response expected; the command is fire-and-forget.
    None,
    /// Accumulate ASCII until the command prompt, return the envelope
    /// stripped of echo and prompt.
    Raw,
    /// A single parameter echo line followed by the prompt; the payload is
    /// the parameter's value.
    Echo(ParameterKey),
    /// The multi-line compass calibration dump.
    CalibrationBlock,
    /// The multi-line system configuration dump.
    ConfigBlock,
}

/// Which configured deadline a command runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    /// `transaction_timeout`: ordinary command/response exchanges.
    Standard,
    /// `dump_timeout`: commands that stream long reports.
    Dump,
}

/// One of the Workhorse's commands, ready to serialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrumentCommand {
    /// Serial break, interrupts logging. Argument is the break duration in
    /// milliseconds.
    Break(u32),
    /// `CE`: resend the last recorded ensemble.
    SendLastSample,
    /// `CK`: save the current setup to NVRAM.
    SaveSetupToRam,
    /// `CS`: start the deployment (begin pinging).
    StartDeployment,
    /// `AC`: output the compass calibration matrices.
    OutputCalibrationData,
    /// `CY0`: clear the error status word.
    ClearErrorStatusWord,
    /// `CY1`: display the error status word.
    DisplayErrorStatusWord,
    /// `FC`: clear the fault log.
    ClearFaultLog,
    /// `FD`: display the fault log.
    GetFaultLog,
    /// `PS0`: display the system configuration report.
    GetSystemConfiguration,
    /// `PS3`: display the beam transformation matrix.
    GetInstrumentTransformMatrix,
    /// `PT200`: run the built-in test suite.
    RunTest200,
    /// `<mnemonic>?`: query one parameter.
    Get(ParameterKey),
    /// `<mnemonic><value>`: set one parameter. The value is already
    /// wire-formatted and type-checked by the parameter table.
    Set(ParameterKey, String),
}

impl InstrumentCommand {
    /// The bare command text, without terminator.
    pub fn text(&self) -> String {
        match self {
            InstrumentCommand::Break(ms) => format!("break {}", ms),
            InstrumentCommand::SendLastSample => "CE".to_string(),
            InstrumentCommand::SaveSetupToRam => "CK".to_string(),
            InstrumentCommand::StartDeployment => "CS".to_string(),
            InstrumentCommand::OutputCalibrationData => "AC".to_string(),
            InstrumentCommand::ClearErrorStatusWord => "CY0".to_string(),
            InstrumentCommand::DisplayErrorStatusWord => "CY1".to_string(),
            InstrumentCommand::ClearFaultLog => "FC".to_string(),
            InstrumentCommand::GetFaultLog => "FD".to_string(),
            InstrumentCommand::GetSystemConfiguration => "PS0".to_string(),
            InstrumentCommand::GetInstrumentTransformMatrix => "PS3".to_string(),
            InstrumentCommand::RunTest200 => "PT200".to_string(),
            InstrumentCommand::Get(key) => format!("{}?", key.mnemonic()),
            InstrumentCommand::Set(key, value) => format!("{}{}", key.mnemonic(), value),
        }
    }

    /// Wire bytes: command text plus terminator.
    pub fn wire(&self) -> Vec<u8> {
        let mut bytes = self.text().into_bytes();
        bytes.extend_from_slice(NEWLINE.as_bytes());
        bytes
    }

    /// Short name used in timeout reports and spans.
    pub fn name(&self) -> &'static str {
        match self {
            InstrumentCommand::Break(_) => "break",
            InstrumentCommand::SendLastSample => "CE",
            InstrumentCommand::SaveSetupToRam => "CK",
            InstrumentCommand::StartDeployment => "CS",
            InstrumentCommand::OutputCalibrationData => "AC",
            InstrumentCommand::ClearErrorStatusWord => "CY0",
            InstrumentCommand::DisplayErrorStatusWord => "CY1",
            InstrumentCommand::ClearFaultLog => "FC",
            InstrumentCommand::GetFaultLog => "FD",
            InstrumentCommand::GetSystemConfiguration => "PS0",
            InstrumentCommand::GetInstrumentTransformMatrix => "PS3",
            InstrumentCommand::RunTest200 => "PT200",
            InstrumentCommand::Get(_) => "GET",
            InstrumentCommand::Set(..) => "SET",
        }
    }

    /// The response the executor should wait for after sending this.
    pub fn response_spec(&self) -> ResponseSpec {
        match self {
            // The break is answered by the wake-up banner, which discovery
            // consumes separately; CS transitions straight into streaming.
            InstrumentCommand::Break(_) | InstrumentCommand::StartDeployment => ResponseSpec::None,
            InstrumentCommand::OutputCalibrationData => ResponseSpec::CalibrationBlock,
            InstrumentCommand::GetSystemConfiguration => ResponseSpec::ConfigBlock,
            InstrumentCommand::Get(key) => ResponseSpec::Echo(*key),
            InstrumentCommand::Set(key, _) => ResponseSpec::Echo(*key),
            _ => ResponseSpec::Raw,
        }
    }

    /// Which configured deadline applies.
    pub fn timeout_class(&self) -> TimeoutClass {
        match self {
            InstrumentCommand::OutputCalibrationData
            | InstrumentCommand::GetSystemConfiguration
            | InstrumentCommand::GetFaultLog
            | InstrumentCommand::RunTest200 => TimeoutClass::Dump,
            _ => TimeoutClass::Standard,
        }
    }
}

/// Strip the command echo and trailing prompt from an accumulated response
/// envelope, returning the payload.
pub fn strip_envelope(command_text: &str, raw: &str) -> String {
    let mut s = raw;
    // The instrument echoes the command followed by CRLF.
    if let Some(rest) = s.strip_prefix(command_text) {
        s = rest;
    }
    s = s.trim_start_matches("\r\n");
    // Trailing prompt, with or without its leading CRLF.
    let s = s
        .strip_suffix("\r\n>")
        .or_else(|| s.strip_suffix('>'))
        .unwrap_or(s);
    s.trim_end_matches("\r\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_set_wire_forms() {
        let get = InstrumentCommand::Get(ParameterKey::InstrumentId);
        assert_eq!(get.wire(), b"CI?\r\n");

        let set = InstrumentCommand::Set(ParameterKey::Salinity, "20".to_string());
        assert_eq!(set.wire(), b"ES20\r\n");
    }

    #[test]
    fn break_embeds_duration() {
        assert_eq!(InstrumentCommand::Break(500).text(), "break 500");
    }

    #[test]
    fn dumps_use_the_long_deadline() {
        assert_eq!(
            InstrumentCommand::OutputCalibrationData.timeout_class(),
            TimeoutClass::Dump
        );
        assert_eq!(
            InstrumentCommand::SaveSetupToRam.timeout_class(),
            TimeoutClass::Standard
        );
    }

    #[test]
    fn fire_and_forget_commands_expect_no_response() {
        assert_eq!(
            InstrumentCommand::StartDeployment.response_spec(),
            ResponseSpec::None
        );
        assert_eq!(
            InstrumentCommand::Break(500).response_spec(),
            ResponseSpec::None
        );
    }

    #[test]
    fn strip_envelope_removes_echo_and_prompt() {
        let raw = "FD\r\nTotal Unique Faults   =     2\r\nOverflow Count        =     0\r\n\r\n>";
        let payload = strip_envelope("FD", raw);
        assert!(payload.starts_with("Total Unique Faults"));
        assert!(!payload.contains('>'));
    }

    #[test]
    fn strip_envelope_handles_missing_echo() {
        assert_eq!(strip_envelope("CK", "[Parameters saved as USER defaults]\r\n>"),
            "[Parameters saved as USER defaults]");
    }
}
