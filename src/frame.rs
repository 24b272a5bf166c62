//! Frame sieve for the mixed binary/ASCII receive stream.
//!
//! The Workhorse interleaves three kinds of traffic on one channel: PD0
//! binary ensembles while deployed, multi-line ASCII dumps (compass
//! calibration, system configuration) in command mode, and single-line
//! parameter echoes terminated by the `>` prompt. The sieve scans the whole
//! accumulated buffer and reports the byte ranges of every complete frame,
//! leaving partial frames untouched for a later pass.
//!
//! Matching is idempotent: the buffer is append-only and ranges are stable
//! until the owner consumes them, so re-running the sieve over the same
//! bytes yields the same frames.
//!
//! ## PD0 framing
//!
//! A binary ensemble starts with the sync marker `0x7F 0x7F`, followed by a
//! little-endian u16 length at offset 2. The length counts bytes from the
//! frame start to the point where the next sync marker must appear; a
//! candidate is accepted only when that trailing marker checks out. Sync
//! bytes occurring inside a payload fail the check and are skipped as
//! in-band data, never treated as an error.

use once_cell::sync::Lazy;
use regex::bytes::Regex;

/// PD0 ensemble synchronization marker (header ID + data source ID).
pub const PD0_SYNC: [u8; 2] = [0x7F, 0x7F];

/// Minimum credible PD0 length field: sync marker plus length field.
const PD0_MIN_LEN: usize = 4;

/// Classification of a complete frame found in the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Binary PD0 ensemble record.
    Pd0Ensemble,
    /// Multi-line compass calibration dump (AC command output).
    CompassCalibration,
    /// Multi-line system configuration dump (PS0 command output).
    SystemConfiguration,
    /// Single parameter echo line, e.g. `CI = 5 --- Instrument ID`.
    ParameterEcho,
    /// Command prompt (`\r\n>`), the instrument's ready marker.
    CommandPrompt,
    /// Error prompt (`ERR ...`), the instrument's rejection marker.
    ErrorPrompt,
}

/// A complete frame: a classified, contiguous byte span of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub start: usize,
    pub end: usize,
}

impl Frame {
    /// The frame's bytes within `buf`.
    pub fn bytes<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.start..self.end]
    }

    /// The frame's bytes as lossy UTF-8 (ASCII frames only contain ASCII).
    pub fn text(&self, buf: &[u8]) -> String {
        String::from_utf8_lossy(self.bytes(buf)).into_owned()
    }
}

static CALIBRATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s-u)ACTIVE FLUXGATE CALIBRATION MATRICES in NVRAM.*?\r\n>").unwrap()
});

static SYSTEM_CONFIG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s-u)Instrument S/N.*?\r\n>").unwrap());

// One complete echo line: two-letter mnemonic, value, dashed separator,
// description, CRLF. The per-parameter patterns in the table are stricter;
// this only has to bound the line.
static PARAMETER_ECHO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m-u)^[A-Z]{2} (?:= )?[^\r\n]*? -+ [^\r\n]*\r\n").unwrap());

static COMMAND_PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?-u)\r\n>").unwrap());

static ERROR_PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?-u)ERR[ :][^\r\n]*").unwrap());

/// Scan `buf` and return every complete frame, non-overlapping, in ascending
/// start order.
///
/// Individual matchers may produce overlapping candidates (a calibration
/// dump ends with the same `\r\n>` the prompt matcher finds); ownership is
/// resolved greedily by start position, longest candidate first.
pub fn sieve(buf: &[u8]) -> Vec<Frame> {
    let mut candidates = Vec::new();

    scan_pd0(buf, &mut candidates);

    for (re, kind) in [
        (&*CALIBRATION, FrameKind::CompassCalibration),
        (&*SYSTEM_CONFIG, FrameKind::SystemConfiguration),
        (&*PARAMETER_ECHO, FrameKind::ParameterEcho),
        (&*COMMAND_PROMPT, FrameKind::CommandPrompt),
        (&*ERROR_PROMPT, FrameKind::ErrorPrompt),
    ] {
        for m in re.find_iter(buf) {
            candidates.push(Frame {
                kind,
                start: m.start(),
                end: m.end(),
            });
        }
    }

    // Ascending by start; at equal starts the longer frame wins so a dump
    // is not shadowed by the prompt that terminates it.
    candidates.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut frames: Vec<Frame> = Vec::with_capacity(candidates.len());
    let mut claimed_end = 0usize;
    for frame in candidates {
        if frame.start >= claimed_end {
            claimed_end = frame.end;
            frames.push(frame);
        }
    }
    frames
}

/// Locate complete PD0 ensembles.
///
/// A sync marker that is not confirmed by the trailing marker at the
/// declared length is in-band data and the scan moves on. A candidate whose
/// trailing region has not arrived yet is left for a future pass.
fn scan_pd0(buf: &[u8], out: &mut Vec<Frame>) {
    let mut pos = 0usize;
    while pos + PD0_MIN_LEN <= buf.len() {
        let Some(offset) = find_sync(&buf[pos..]) else {
            break;
        };
        let start = pos + offset;
        if start + PD0_MIN_LEN > buf.len() {
            break;
        }
        let length = u16::from_le_bytes([buf[start + 2], buf[start + 3]]) as usize;
        if length < PD0_MIN_LEN {
            pos = start + 1;
            continue;
        }
        let marker_at = start + length;
        if marker_at + 2 > buf.len() {
            // Cannot verify yet; the record may still be arriving. Keep
            // scanning so a spurious marker with a bogus length cannot
            // shadow a complete record further along.
            pos = start + 1;
            continue;
        }
        if buf[marker_at..marker_at + 2] == PD0_SYNC {
            out.push(Frame {
                kind: FrameKind::Pd0Ensemble,
                start,
                end: marker_at,
            });
            pos = marker_at;
        } else {
            pos = start + 1;
        }
    }
}

fn find_sync(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == PD0_SYNC)
}
