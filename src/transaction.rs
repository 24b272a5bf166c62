//! Single-flight transaction executor.
//!
//! The command channel is half duplex: at most one command may be awaiting a
//! response at any time. The executor holds that single pending slot, matches
//! accumulated response text against the command's [`ResponseSpec`], and
//! resolves the caller through a oneshot. A second concurrent transaction is
//! rejected with [`WorkhorseError::Busy`] before any bytes are written.
//!
//! The executor also hosts the bounded probe wait used by wake-up and
//! discovery: an observer that resolves on the next prompt or sample frame.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::oneshot;

use crate::command::{strip_envelope, InstrumentCommand, ResponseSpec};
use crate::error::{Result, WorkhorseError};
use crate::frame::FrameKind;

/// Transport write callback supplied by the embedding agent.
pub type SendFn = Arc<dyn Fn(&[u8]) -> std::io::Result<()> + Send + Sync>;

/// What a probe observed within its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// A command prompt appeared: the instrument is awake in command mode.
    Prompt,
    /// A PD0 ensemble appeared: the instrument is streaming.
    Streaming,
}

static ERROR_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^ERR[ :]").unwrap());

struct Pending {
    command_text: String,
    command_name: &'static str,
    spec: ResponseSpec,
    collected: String,
    tx: oneshot::Sender<Result<String>>,
}

impl Pending {
    /// Check the accumulation for a terminal condition and, if found,
    /// produce the resolution.
    fn resolution(&self) -> Option<Result<String>> {
        if ERROR_LINE.is_match(&self.collected) {
            return Some(Err(WorkhorseError::DeviceRejected(
                self.collected.trim().to_string(),
            )));
        }
        match self.spec {
            ResponseSpec::None => Some(Ok(String::new())),
            ResponseSpec::Raw
            | ResponseSpec::Echo(_)
            | ResponseSpec::CalibrationBlock
            | ResponseSpec::ConfigBlock => {
                // Every ASCII response ends at the command prompt. The
                // prompt cannot occur inside a report body.
                if self.collected.contains("\r\n>") {
                    Some(Ok(strip_envelope(&self.command_text, &self.collected)))
                } else {
                    None
                }
            }
        }
    }
}

/// Owner of the pending slot and the probe waiter.
pub struct Executor {
    send: SendFn,
    pending: Mutex<Option<Pending>>,
    probe: Mutex<Option<oneshot::Sender<ProbeOutcome>>>,
}

impl Executor {
    pub fn new(send: SendFn) -> Self {
        Executor {
            send,
            pending: Mutex::new(None),
            probe: Mutex::new(None),
        }
    }

    /// Write raw bytes to the transport (wake-ups, direct access).
    pub fn send_raw(&self, bytes: &[u8]) -> Result<()> {
        (self.send)(bytes)?;
        Ok(())
    }

    /// True while a transaction is awaiting its response.
    pub fn in_flight(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Run one command/response transaction under `deadline`.
    ///
    /// Fire-and-forget commands still require the slot to be free, so a
    /// deployment start cannot race a pending response.
    pub async fn execute(&self, cmd: &InstrumentCommand, deadline: Duration) -> Result<String> {
        let spec = cmd.response_spec();
        let wire = cmd.wire();

        let mut rx = {
            let mut slot = self.pending.lock();
            if slot.is_some() {
                return Err(WorkhorseError::Busy);
            }
            if spec == ResponseSpec::None {
                drop(slot);
                self.send_raw(&wire)?;
                return Ok(String::new());
            }
            let (tx, rx) = oneshot::channel();
            *slot = Some(Pending {
                command_text: cmd.text(),
                command_name: cmd.name(),
                spec,
                collected: String::new(),
                tx,
            });
            rx
        };

        if let Err(e) = self.send_raw(&wire) {
            self.pending.lock().take();
            return Err(e);
        }

        match tokio::time::timeout(deadline, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_closed)) => Err(WorkhorseError::Protocol(
                "response channel closed before resolution".to_string(),
            )),
            Err(_elapsed) => {
                let taken = self.pending.lock().take();
                if taken.is_none() {
                    // A resolution raced the deadline; prefer it.
                    if let Ok(result) = rx.try_recv() {
                        return result;
                    }
                }
                Err(WorkhorseError::Timeout(deadline, cmd.name()))
            }
        }
    }

    /// Feed newly received ASCII to the pending transaction, if any.
    ///
    /// Safe to call with arbitrary text when nothing is in flight; the bytes
    /// are simply not the executor's concern then.
    pub fn feed_text(&self, chunk: &str) {
        let mut slot = self.pending.lock();
        let Some(pending) = slot.as_mut() else {
            return;
        };
        pending.collected.push_str(chunk);
        if let Some(result) = pending.resolution() {
            if let Some(pending) = slot.take() {
                log::debug!("transaction '{}' resolved", pending.command_name);
                // Receiver may have timed out and gone away.
                let _ = pending.tx.send(result);
            }
        }
    }

    /// Notify the executor of a classified frame (for probe waiters).
    pub fn note_frame(&self, kind: FrameKind) {
        let outcome = match kind {
            FrameKind::CommandPrompt => ProbeOutcome::Prompt,
            FrameKind::Pd0Ensemble => ProbeOutcome::Streaming,
            _ => return,
        };
        if let Some(tx) = self.probe.lock().take() {
            let _ = tx.send(outcome);
        }
    }

    /// Register a probe waiter. Arm before sending the stimulus so a fast
    /// reply cannot slip past the registration.
    pub fn arm_probe(&self) -> oneshot::Receiver<ProbeOutcome> {
        let (tx, rx) = oneshot::channel();
        *self.probe.lock() = Some(tx);
        rx
    }

    /// Wait up to `window` on an armed probe.
    ///
    /// Returns `None` when the window elapses without a prompt or sample
    /// frame appearing.
    pub async fn wait_probe(
        &self,
        rx: oneshot::Receiver<ProbeOutcome>,
        window: Duration,
    ) -> Option<ProbeOutcome> {
        match tokio::time::timeout(window, rx).await {
            Ok(Ok(outcome)) => Some(outcome),
            _ => {
                self.probe.lock().take();
                None
            }
        }
    }

    /// Arm and wait in one step, for callers whose stimulus is already out.
    pub async fn probe(&self, window: Duration) -> Option<ProbeOutcome> {
        let rx = self.arm_probe();
        self.wait_probe(rx, window).await
    }
}
