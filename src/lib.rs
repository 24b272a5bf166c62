//! `workhorse-driver`
//!
//! Async protocol controller for a serial/TCP-attached Teledyne Workhorse
//! 75 kHz ADCP. The crate segments the instrument's mixed binary+ASCII byte
//! stream into frames, runs single-flight command/response transactions
//! under explicit timeouts, drives the operating-mode state machine
//! (Unknown / Command / Autosample / DirectAccess) with interrupt-and-restore
//! recovery, and keeps a typed parameter cache coherent with the device.
//!
//! Transport I/O stays outside: the embedding agent supplies a send function
//! at construction and pushes received bytes into
//! [`WorkhorseController::accept`]; samples, mode changes and protocol
//! errors come back on a broadcast event channel.
//!
//! ## Key types
//!
//! - [`WorkhorseController`]: the composition root and public operation set
//! - [`ControllerConfig`]: per-operation timeouts and attempt budgets
//! - [`ParameterKey`] / [`ParamValue`]: the typed parameter vocabulary
//! - [`SampleRecord`]: data records published as [`DriverEvent::Sample`]
//! - [`WorkhorseError`]: the consolidated error taxonomy
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use workhorse_driver::{ControllerConfig, SendFn, WorkhorseController};
//!
//! # async fn example() -> workhorse_driver::Result<()> {
//! let send: SendFn = Arc::new(|bytes: &[u8]| {
//!     // hand bytes to the transport
//!     let _ = bytes;
//!     Ok(())
//! });
//! let controller = WorkhorseController::new(ControllerConfig::default(), send);
//! let mut events = controller.subscribe();
//!
//! // Feed received bytes from the transport reader:
//! // controller.accept(&chunk);
//!
//! let mode = controller.discover_mode().await?;
//! tracing::info!(?mode, "instrument discovered");
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod controller;
pub mod data;
pub mod error;
pub mod frame;
pub mod param;
pub mod state;
pub mod transaction;

pub use config::{ControllerConfig, ScheduleConfig};
pub use controller::{DriverEvent, WorkhorseController};
pub use data::SampleRecord;
pub use error::{Result, WorkhorseError};
pub use frame::{Frame, FrameKind};
pub use param::{ParamValue, ParameterKey};
pub use state::{ProtocolEvent, ProtocolState};
pub use transaction::SendFn;
