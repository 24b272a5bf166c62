//! Sample records published to the embedding agent.
//!
//! Unsolicited frames that carry data (rather than protocol plumbing) are
//! lifted into [`SampleRecord`]s and fanned out on the controller's event
//! channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::frame::{Frame, FrameKind};

/// A data-bearing record extracted from the receive stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleRecord {
    /// Raw PD0 binary ensemble, exactly as framed.
    Pd0Ensemble {
        bytes: Vec<u8>,
        received: DateTime<Utc>,
    },
    /// Compass calibration report (AC output).
    CompassCalibration {
        text: String,
        received: DateTime<Utc>,
    },
    /// System configuration report (PS0 output).
    SystemConfiguration {
        text: String,
        received: DateTime<Utc>,
    },
}

impl SampleRecord {
    /// Lift a frame into a record, if the frame kind carries data.
    ///
    /// Prompts and parameter echoes return `None`; they are protocol
    /// plumbing, not samples.
    pub fn from_frame(frame: &Frame, buf: &[u8]) -> Option<SampleRecord> {
        let received = Utc::now();
        match frame.kind {
            FrameKind::Pd0Ensemble => Some(SampleRecord::Pd0Ensemble {
                bytes: frame.bytes(buf).to_vec(),
                received,
            }),
            FrameKind::CompassCalibration => Some(SampleRecord::CompassCalibration {
                text: frame.text(buf),
                received,
            }),
            FrameKind::SystemConfiguration => Some(SampleRecord::SystemConfiguration {
                text: frame.text(buf),
                received,
            }),
            FrameKind::ParameterEcho | FrameKind::CommandPrompt | FrameKind::ErrorPrompt => None,
        }
    }

    /// Short label for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            SampleRecord::Pd0Ensemble { .. } => "pd0_ensemble",
            SampleRecord::CompassCalibration { .. } => "compass_calibration",
            SampleRecord::SystemConfiguration { .. } => "system_configuration",
        }
    }
}
