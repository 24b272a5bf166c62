//! Controller configuration.
//!
//! Every timeout and attempt budget the controller uses is declared here,
//! per operation, rather than inferred from a shared global constant. All
//! fields have defaults so an empty TOML table is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunable timing and bounds for a [`WorkhorseController`](crate::controller::WorkhorseController).
///
/// Durations deserialize from human-readable strings ("10s", "300ms").
///
/// # Example
///
/// ```
/// use workhorse_driver::config::ControllerConfig;
///
/// let cfg: ControllerConfig = toml::from_str(
///     r#"
///     transaction_timeout = "5s"
///     wakeup_attempts = 3
///     "#,
/// )
/// .unwrap();
/// assert_eq!(cfg.wakeup_attempts, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Default deadline for a single command/response transaction.
    #[serde(with = "humantime_serde")]
    pub transaction_timeout: Duration,

    /// Deadline for the long dump commands (calibration, system
    /// configuration). The instrument streams these slowly.
    #[serde(with = "humantime_serde")]
    pub dump_timeout: Duration,

    /// Number of wake-up newlines sent before a probe gives up.
    pub wakeup_attempts: u32,

    /// Pause between consecutive wake-up attempts.
    #[serde(with = "humantime_serde")]
    pub wakeup_delay: Duration,

    /// How long a single probe attempt waits for a prompt or sample frame.
    #[serde(with = "humantime_serde")]
    pub probe_window: Duration,

    /// Duration argument of the serial break used to interrupt logging,
    /// in milliseconds ("break 500").
    pub break_duration_ms: u32,

    /// Settle time after sending the start-deployment command.
    #[serde(with = "humantime_serde")]
    pub deploy_settle: Duration,

    /// Receive buffer cap. Unrecognized data beyond this is dropped oldest
    /// first and reported as a protocol error event.
    pub max_buffer: usize,

    /// Periodic background jobs. All disabled by default.
    pub schedule: ScheduleConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: Duration::from_secs(10),
            dump_timeout: Duration::from_secs(120),
            wakeup_attempts: 5,
            wakeup_delay: Duration::from_millis(300),
            probe_window: Duration::from_millis(1500),
            break_duration_ms: 500,
            deploy_settle: Duration::from_millis(1000),
            max_buffer: 64 * 1024,
            schedule: ScheduleConfig::default(),
        }
    }
}

/// Intervals for the internally scheduled maintenance jobs.
///
/// Mirrors the deployment practice of periodically re-syncing the instrument
/// clock and re-acquiring configuration/calibration while logging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleConfig {
    /// Interval between scheduled clock syncs. `None` disables the job.
    #[serde(with = "humantime_serde")]
    pub clock_sync: Option<Duration>,

    /// Interval between scheduled system-configuration acquisitions.
    #[serde(with = "humantime_serde")]
    pub get_configuration: Option<Duration>,

    /// Interval between scheduled calibration acquisitions.
    #[serde(with = "humantime_serde")]
    pub get_calibration: Option<Duration>,
}

impl ControllerConfig {
    /// Parse a configuration from a TOML document.
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }
}
