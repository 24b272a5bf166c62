//! Device parameter table.
//!
//! A registry of every Workhorse parameter the controller understands. Each
//! entry carries the wire-echo pattern, a typed parse/format pair, mutability
//! and visibility flags, the startup-apply flag, a default, and the cached
//! value with its freshness stamp.
//!
//! Parse and format are not free-form closures: the wire type is a closed
//! enum ([`WireType`]) and [`ParamValue`] is its value counterpart, so a
//! declaration cannot pair an integer pattern with a boolean formatter.
//!
//! Entries are created once at controller construction and live as long as
//! the controller; values change only through a successful GET/SET round
//! trip or bulk refresh.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkhorseError};

// =============================================================================
// Keys and values
// =============================================================================

/// Stable identifier of a device parameter (its two-letter wire mnemonic).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ParameterKey {
    SerialDataOut,
    SerialFlowControl,
    Banner,
    InstrumentId,
    SleepEnable,
    SaveNvramToRecorder,
    PolledMode,
    XmitPower,
    SpeedOfSound,
    Pitch,
    Roll,
    Salinity,
    CoordinateTransformation,
    SensorSource,
    TimePerEnsemble,
    TimeOfFirstPing,
    TimePerPing,
    Time,
    FalseTargetThreshold,
    BandwidthControl,
    CorrelationThreshold,
    SerialOutFwSwitches,
    ErrorVelocityThreshold,
    BlankAfterTransmit,
    ClipDataPastBottom,
    ReceiverGainSelect,
    WaterReferenceLayer,
    WaterProfilingMode,
    NumberOfDepthCells,
    PingsPerEnsemble,
    DepthCellSize,
    TransmitLength,
    PingWeight,
    AmbiguityVelocity,
}

impl ParameterKey {
    /// Every declared parameter, in wire-mnemonic order. This is also the
    /// order a bulk refresh walks the instrument.
    pub const ALL: &'static [ParameterKey] = &[
        ParameterKey::SerialDataOut,
        ParameterKey::SerialFlowControl,
        ParameterKey::Banner,
        ParameterKey::InstrumentId,
        ParameterKey::SleepEnable,
        ParameterKey::SaveNvramToRecorder,
        ParameterKey::PolledMode,
        ParameterKey::XmitPower,
        ParameterKey::SpeedOfSound,
        ParameterKey::Pitch,
        ParameterKey::Roll,
        ParameterKey::Salinity,
        ParameterKey::CoordinateTransformation,
        ParameterKey::SensorSource,
        ParameterKey::TimePerEnsemble,
        ParameterKey::TimeOfFirstPing,
        ParameterKey::TimePerPing,
        ParameterKey::Time,
        ParameterKey::FalseTargetThreshold,
        ParameterKey::BandwidthControl,
        ParameterKey::CorrelationThreshold,
        ParameterKey::SerialOutFwSwitches,
        ParameterKey::ErrorVelocityThreshold,
        ParameterKey::BlankAfterTransmit,
        ParameterKey::ClipDataPastBottom,
        ParameterKey::ReceiverGainSelect,
        ParameterKey::WaterReferenceLayer,
        ParameterKey::WaterProfilingMode,
        ParameterKey::NumberOfDepthCells,
        ParameterKey::PingsPerEnsemble,
        ParameterKey::DepthCellSize,
        ParameterKey::TransmitLength,
        ParameterKey::PingWeight,
        ParameterKey::AmbiguityVelocity,
    ];

    /// The two-letter mnemonic sent on the wire.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            ParameterKey::SerialDataOut => "CD",
            ParameterKey::SerialFlowControl => "CF",
            ParameterKey::Banner => "CH",
            ParameterKey::InstrumentId => "CI",
            ParameterKey::SleepEnable => "CL",
            ParameterKey::SaveNvramToRecorder => "CN",
            ParameterKey::PolledMode => "CP",
            ParameterKey::XmitPower => "CQ",
            ParameterKey::SpeedOfSound => "EC",
            ParameterKey::Pitch => "EP",
            ParameterKey::Roll => "ER",
            ParameterKey::Salinity => "ES",
            ParameterKey::CoordinateTransformation => "EX",
            ParameterKey::SensorSource => "EZ",
            ParameterKey::TimePerEnsemble => "TE",
            ParameterKey::TimeOfFirstPing => "TG",
            ParameterKey::TimePerPing => "TP",
            ParameterKey::Time => "TT",
            ParameterKey::FalseTargetThreshold => "WA",
            ParameterKey::BandwidthControl => "WB",
            ParameterKey::CorrelationThreshold => "WC",
            ParameterKey::SerialOutFwSwitches => "WD",
            ParameterKey::ErrorVelocityThreshold => "WE",
            ParameterKey::BlankAfterTransmit => "WF",
            ParameterKey::ClipDataPastBottom => "WI",
            ParameterKey::ReceiverGainSelect => "WJ",
            ParameterKey::WaterReferenceLayer => "WL",
            ParameterKey::WaterProfilingMode => "WM",
            ParameterKey::NumberOfDepthCells => "WN",
            ParameterKey::PingsPerEnsemble => "WP",
            ParameterKey::DepthCellSize => "WS",
            ParameterKey::TransmitLength => "WT",
            ParameterKey::PingWeight => "WU",
            ParameterKey::AmbiguityVelocity => "WV",
        }
    }
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A typed parameter value as cached by the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Flag(bool),
}

impl ParamValue {
    /// Wire fragment appended to the mnemonic in a SET command.
    pub fn format_wire(&self) -> String {
        match self {
            ParamValue::Text(s) => s.clone(),
            ParamValue::Integer(n) => n.to_string(),
            ParamValue::Flag(true) => "1".to_string(),
            ParamValue::Flag(false) => "0".to_string(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Text(_) => "text",
            ParamValue::Integer(_) => "integer",
            ParamValue::Flag(_) => "flag",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_wire())
    }
}

/// Closed set of wire types a parameter may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Text,
    Integer,
    Flag,
}

impl WireType {
    fn name(&self) -> &'static str {
        match self {
            WireType::Text => "text",
            WireType::Integer => "integer",
            WireType::Flag => "flag",
        }
    }

    /// Parse the capture-group text of an echo line into a value.
    fn parse(&self, key: ParameterKey, capture: &str) -> Result<ParamValue> {
        match self {
            WireType::Text => Ok(ParamValue::Text(capture.to_string())),
            WireType::Integer => capture
                .parse::<i64>()
                .map(ParamValue::Integer)
                .map_err(|_| WorkhorseError::TypeMismatch {
                    key,
                    expected: "integer",
                    value: capture.to_string(),
                }),
            WireType::Flag => match capture.parse::<i64>() {
                Ok(n) => Ok(ParamValue::Flag(n != 0)),
                Err(_) => Err(WorkhorseError::TypeMismatch {
                    key,
                    expected: "flag",
                    value: capture.to_string(),
                }),
            },
        }
    }

    fn matches(&self, value: &ParamValue) -> bool {
        matches!(
            (self, value),
            (WireType::Text, ParamValue::Text(_))
                | (WireType::Integer, ParamValue::Integer(_))
                | (WireType::Flag, ParamValue::Flag(_))
        )
    }
}

// =============================================================================
// Declarations
// =============================================================================

/// Static description of one parameter: everything but the live value.
#[derive(Debug)]
pub struct ParameterSpec {
    pub key: ParameterKey,
    /// Echo-line pattern with exactly one capture group for the value.
    pub pattern: Regex,
    pub wire_type: WireType,
    /// False for values the instrument reports but never accepts.
    pub settable: bool,
    /// True for values that must not change while deployed.
    pub runtime_locked: bool,
    /// Re-applied at startup whenever the cached value drifts from the
    /// startup target.
    pub startup: bool,
    pub default: Option<ParamValue>,
}

struct SpecBuilder {
    spec: ParameterSpec,
}

impl SpecBuilder {
    fn new(key: ParameterKey, pattern: &str, wire_type: WireType) -> Self {
        let pattern = Regex::new(pattern).unwrap_or_else(|e| {
            // Declarations are compile-time constants; a bad one is a bug.
            panic!("invalid pattern for {}: {}", key, e)
        });
        SpecBuilder {
            spec: ParameterSpec {
                key,
                pattern,
                wire_type,
                settable: true,
                runtime_locked: false,
                startup: false,
                default: None,
            },
        }
    }

    fn read_only(mut self) -> Self {
        self.spec.settable = false;
        self
    }

    fn immutable(mut self) -> Self {
        self.spec.runtime_locked = true;
        self
    }

    fn startup(mut self) -> Self {
        self.spec.startup = true;
        self
    }

    fn default_text(mut self, v: &str) -> Self {
        self.spec.default = Some(ParamValue::Text(v.to_string()));
        self
    }

    fn default_int(mut self, v: i64) -> Self {
        self.spec.default = Some(ParamValue::Integer(v));
        self
    }

    fn default_flag(mut self, v: bool) -> Self {
        self.spec.default = Some(ParamValue::Flag(v));
        self
    }

    fn build(self) -> ParameterSpec {
        self.spec
    }
}

/// The fixed Workhorse declaration list.
fn workhorse_specs() -> Vec<ParameterSpec> {
    use ParameterKey as K;
    use WireType as T;
    vec![
        SpecBuilder::new(
            K::SerialDataOut,
            r"CD = (\d\d\d \d\d\d \d\d\d) -+ Serial Data Out ",
            T::Text,
        )
        .read_only()
        .build(),
        SpecBuilder::new(K::SerialFlowControl, r"CF = (\d+) -+ Flow Ctrl ", T::Text)
            .startup()
            .immutable()
            .default_text("11110")
            .build(),
        SpecBuilder::new(K::Banner, r"CH = (\d) -+ Suppress Banner", T::Flag)
            .startup()
            .default_flag(true)
            .build(),
        SpecBuilder::new(K::InstrumentId, r"CI = (\d+) -+ Instrument ID ", T::Integer)
            .startup()
            .default_int(0)
            .build(),
        SpecBuilder::new(K::SleepEnable, r"CL = (\d) -+ Sleep Enable", T::Integer)
            .startup()
            .default_int(0)
            .build(),
        SpecBuilder::new(
            K::SaveNvramToRecorder,
            r"CN = (\d) -+ Save NVRAM to recorder",
            T::Flag,
        )
        .startup()
        .immutable()
        .default_flag(true)
        .build(),
        SpecBuilder::new(K::PolledMode, r"CP = (\d) -+ PolledMode ", T::Flag)
            .startup()
            .default_flag(false)
            .build(),
        SpecBuilder::new(K::XmitPower, r"CQ = (\d+) -+ Xmt Power ", T::Integer)
            .startup()
            .default_int(255)
            .build(),
        SpecBuilder::new(K::SpeedOfSound, r"EC = (\d+) -+ Speed Of Sound", T::Integer)
            .startup()
            .default_int(1485)
            .build(),
        SpecBuilder::new(K::Pitch, r"EP = ([+\-\d]+) -+ Tilt 1 Sensor ", T::Integer)
            .startup()
            .default_int(0)
            .build(),
        SpecBuilder::new(K::Roll, r"ER = ([+\-\d]+) -+ Tilt 2 Sensor ", T::Integer)
            .startup()
            .default_int(0)
            .build(),
        SpecBuilder::new(K::Salinity, r"ES = (\d+) -+ Salinity ", T::Integer)
            .startup()
            .default_int(35)
            .build(),
        SpecBuilder::new(
            K::CoordinateTransformation,
            r"EX = (\d+) -+ Coord Transform ",
            T::Text,
        )
        .startup()
        .default_text("00111")
        .build(),
        SpecBuilder::new(K::SensorSource, r"EZ = (\d+) -+ Sensor Source ", T::Text).build(),
        SpecBuilder::new(
            K::TimePerEnsemble,
            r"TE (\d\d:\d\d:\d\d.\d\d) -+ Time per Ensemble ",
            T::Text,
        )
        .startup()
        .default_text("00:00:00.00")
        .build(),
        SpecBuilder::new(
            K::TimeOfFirstPing,
            r"TG (..../../..,..:..:..) - Time of First Ping ",
            T::Text,
        )
        .build(),
        SpecBuilder::new(
            K::TimePerPing,
            r"TP (\d\d:\d\d.\d\d) -+ Time per Ping",
            T::Text,
        )
        .startup()
        .default_text("00:01.00")
        .build(),
        SpecBuilder::new(
            K::Time,
            r"TT (\d\d\d\d/\d\d/\d\d,\d\d:\d\d:\d\d) - Time Set ",
            T::Text,
        )
        .read_only()
        .build(),
        SpecBuilder::new(
            K::FalseTargetThreshold,
            r"WA (\d+,\d+) -+ False Target Threshold ",
            T::Text,
        )
        .startup()
        .default_text("050,001")
        .build(),
        SpecBuilder::new(
            K::BandwidthControl,
            r"WB (\d) -+ Bandwidth Control ",
            T::Integer,
        )
        .startup()
        .default_int(0)
        .build(),
        SpecBuilder::new(
            K::CorrelationThreshold,
            r"WC (\d+) -+ Correlation Threshold",
            T::Integer,
        )
        .startup()
        .default_int(64)
        .build(),
        SpecBuilder::new(K::SerialOutFwSwitches, r"WD ([\d ]+) -+ Data Out ", T::Text)
            .startup()
            .immutable()
            .default_text("111100000")
            .build(),
        SpecBuilder::new(
            K::ErrorVelocityThreshold,
            r"WE (\d+) -+ Error Velocity Threshold",
            T::Integer,
        )
        .startup()
        .default_int(2000)
        .build(),
        SpecBuilder::new(
            K::BlankAfterTransmit,
            r"WF (\d+) -+ Blank After Transmit",
            T::Integer,
        )
        .startup()
        .default_int(704)
        .build(),
        SpecBuilder::new(
            K::ClipDataPastBottom,
            r"WI (\d) -+ Clip Data Past Bottom",
            T::Flag,
        )
        .startup()
        .default_flag(false)
        .build(),
        SpecBuilder::new(
            K::ReceiverGainSelect,
            r"WJ (\d) -+ Rcvr Gain Select \(0=Low,1=High\)",
            T::Integer,
        )
        .startup()
        .default_int(1)
        .build(),
        SpecBuilder::new(
            K::WaterReferenceLayer,
            r"WL (\d+,\d+) -+ Water Reference Layer:  ",
            T::Text,
        )
        .startup()
        .default_text("001,005")
        .build(),
        SpecBuilder::new(
            K::WaterProfilingMode,
            r"WM (\d+) -+ Profiling Mode ",
            T::Integer,
        )
        .startup()
        .immutable()
        .default_int(1)
        .build(),
        SpecBuilder::new(
            K::NumberOfDepthCells,
            r"WN (\d+) -+ Number of depth cells",
            T::Integer,
        )
        .startup()
        .default_int(100)
        .build(),
        SpecBuilder::new(
            K::PingsPerEnsemble,
            r"WP (\d+) -+ Pings per Ensemble ",
            T::Integer,
        )
        .startup()
        .default_int(1)
        .build(),
        SpecBuilder::new(
            K::DepthCellSize,
            r"WS (\d+) -+ Depth Cell Size \(cm\)",
            T::Integer,
        )
        .startup()
        .default_int(800)
        .build(),
        SpecBuilder::new(
            K::TransmitLength,
            r"WT (\d+) -+ Transmit Length ",
            T::Integer,
        )
        .startup()
        .default_int(0)
        .build(),
        SpecBuilder::new(K::PingWeight, r"WU (\d) -+ Ping Weighting ", T::Integer)
            .startup()
            .default_int(0)
            .build(),
        SpecBuilder::new(
            K::AmbiguityVelocity,
            r"WV (\d+) -+ Mode 1 Ambiguity Vel ",
            T::Integer,
        )
        .startup()
        .default_int(175)
        .build(),
    ]
}

// =============================================================================
// Table
// =============================================================================

struct Entry {
    spec: ParameterSpec,
    value: Option<ParamValue>,
    refreshed: Option<Instant>,
    /// The value a startup application drives the instrument toward.
    /// Initially the declared default; updated by `set_startup_target`.
    startup_target: Option<ParamValue>,
}

/// Live registry of parameter declarations and cached values.
pub struct ParameterTable {
    entries: Vec<Entry>,
}

impl ParameterTable {
    /// Build the table from the fixed Workhorse declaration list.
    pub fn workhorse() -> Self {
        let entries = workhorse_specs()
            .into_iter()
            .map(|spec| {
                let startup_target = spec.default.clone();
                Entry {
                    spec,
                    value: None,
                    refreshed: None,
                    startup_target,
                }
            })
            .collect();
        ParameterTable { entries }
    }

    fn entry(&self, key: ParameterKey) -> &Entry {
        self.entries
            .iter()
            .find(|e| e.spec.key == key)
            .unwrap_or_else(|| panic!("parameter {} not declared", key))
    }

    fn entry_mut(&mut self, key: ParameterKey) -> &mut Entry {
        self.entries
            .iter_mut()
            .find(|e| e.spec.key == key)
            .unwrap_or_else(|| panic!("parameter {} not declared", key))
    }

    /// The static declaration for `key`.
    pub fn spec(&self, key: ParameterKey) -> &ParameterSpec {
        &self.entry(key).spec
    }

    /// Cached value if it is no older than `max_age`.
    pub fn get(&self, key: ParameterKey, max_age: Duration) -> Result<ParamValue> {
        let entry = self.entry(key);
        match (&entry.value, entry.refreshed) {
            (Some(value), Some(at)) => {
                let age = at.elapsed();
                if age <= max_age {
                    Ok(value.clone())
                } else {
                    Err(WorkhorseError::Stale { key, age, max_age })
                }
            }
            _ => Err(WorkhorseError::NeverRefreshed(key)),
        }
    }

    /// Cached value regardless of age, if any.
    pub fn peek(&self, key: ParameterKey) -> Option<ParamValue> {
        self.entry(key).value.clone()
    }

    /// Match `line` against every declared pattern and absorb whatever it
    /// echoes, regardless of which command produced the line.
    ///
    /// Returns the keys that were updated. Lines that echo nothing are
    /// common (command echoes, prompts) and simply return empty.
    pub fn update(&mut self, line: &str) -> Vec<ParameterKey> {
        let mut updated = Vec::new();
        for entry in &mut self.entries {
            let Some(caps) = entry.spec.pattern.captures(line) else {
                continue;
            };
            let Some(capture) = caps.get(1) else {
                continue;
            };
            match entry.spec.wire_type.parse(entry.spec.key, capture.as_str()) {
                Ok(value) => {
                    entry.value = Some(value);
                    entry.refreshed = Some(Instant::now());
                    updated.push(entry.spec.key);
                }
                Err(e) => {
                    log::debug!("echo line matched {} but failed to parse: {}", entry.spec.key, e);
                }
            }
        }
        updated
    }

    /// Reject a SET before any I/O if the declaration forbids it.
    pub fn check_settable(&self, key: ParameterKey) -> Result<()> {
        let spec = &self.entry(key).spec;
        if !spec.settable {
            return Err(WorkhorseError::ReadOnly(key));
        }
        if spec.runtime_locked {
            return Err(WorkhorseError::Immutable(key));
        }
        Ok(())
    }

    /// Type-check `value` against the declaration and render the wire
    /// fragment for a SET command.
    pub fn format_for_set(&self, key: ParameterKey, value: &ParamValue) -> Result<String> {
        let spec = &self.entry(key).spec;
        if !spec.wire_type.matches(value) {
            return Err(WorkhorseError::TypeMismatch {
                key,
                expected: spec.wire_type.name(),
                value: format!("{} ({})", value, value.type_name()),
            });
        }
        Ok(value.format_wire())
    }

    /// Keys flagged for startup application.
    pub fn startup_keys(&self) -> Vec<ParameterKey> {
        self.entries
            .iter()
            .filter(|e| e.spec.startup)
            .map(|e| e.spec.key)
            .collect()
    }

    /// Adopt `value` as the startup target for `key` (SET with
    /// apply-at-startup requested).
    pub fn set_startup_target(&mut self, key: ParameterKey, value: ParamValue) {
        self.entry_mut(key).startup_target = Some(value);
    }

    /// The value startup application should drive `key` toward.
    pub fn startup_target(&self, key: ParameterKey) -> Option<ParamValue> {
        self.entry(key).startup_target.clone()
    }

    /// Startup-flagged keys whose cached value differs from their target.
    ///
    /// A key with no cached value counts as dirty: we cannot prove the
    /// instrument agrees with the target.
    pub fn dirty_startup_keys(&self) -> Vec<ParameterKey> {
        self.entries
            .iter()
            .filter(|e| e.spec.startup)
            .filter(|e| match (&e.value, &e.startup_target) {
                (Some(v), Some(t)) => v != t,
                (None, Some(_)) => true,
                (_, None) => false,
            })
            .map(|e| e.spec.key)
            .collect()
    }

    /// True when any startup parameter would need to be (re)applied.
    pub fn config_dirty(&self) -> bool {
        !self.dirty_startup_keys().is_empty()
    }

    /// Snapshot of every cached value, for config-change detection.
    pub fn snapshot(&self) -> BTreeMap<ParameterKey, Option<ParamValue>> {
        self.entries
            .iter()
            .map(|e| (e.spec.key, e.value.clone()))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, key: ParameterKey, age: Duration) {
        let entry = self.entry_mut(key);
        entry.refreshed = entry.refreshed.and_then(|at| at.checked_sub(age));
    }
}
