//! Protocol controller: the composition root.
//!
//! Owns the receive buffer, the parameter table, the transaction executor
//! and the mode machine, and exposes the public operation set. The embedding
//! agent pushes received bytes in through [`WorkhorseController::accept`]
//! and takes events out of the broadcast channel; outbound bytes go through
//! the send function supplied at construction.
//!
//! `accept()` may be called from a background reader task while an operation
//! awaits its response; all shared state lives behind mutexes and the whole
//! API takes `&self`.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::instrument;

use crate::command::{InstrumentCommand, TimeoutClass, WAKEUP};
use crate::config::ControllerConfig;
use crate::data::SampleRecord;
use crate::error::{Result, WorkhorseError};
use crate::frame::{self, FrameKind};
use crate::param::{ParamValue, ParameterKey, ParameterTable};
use crate::state::{transition, ProtocolEvent, ProtocolState};
use crate::transaction::{Executor, ProbeOutcome, SendFn};

/// Notifications published to the embedding agent.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// The operating mode changed.
    StateChange(ProtocolState),
    /// One or more parameters were written to the instrument.
    ConfigChange,
    /// A data-bearing record arrived.
    Sample(SampleRecord),
    /// Something on the wire could not be handled cleanly.
    ProtocolError { detail: String },
    /// Raw instrument output during a direct-access session, echo filtered.
    DirectAccessOutput(Vec<u8>),
}

/// Operations that interrupt logging when invoked while deployed.
#[derive(Debug, Clone, Copy)]
enum InterruptedOp {
    Calibration,
    Configuration,
    ClockSync,
    ApplyStartup,
}

impl InterruptedOp {
    fn name(&self) -> &'static str {
        match self {
            InterruptedOp::Calibration => "get_calibration",
            InterruptedOp::Configuration => "get_configuration",
            InterruptedOp::ClockSync => "sync_clock",
            InterruptedOp::ApplyStartup => "apply_startup_params",
        }
    }
}

/// Async protocol controller for the Workhorse ADCP.
pub struct WorkhorseController {
    config: ControllerConfig,
    executor: Executor,
    buffer: Mutex<BytesMut>,
    table: Mutex<ParameterTable>,
    mode: Mutex<ProtocolState>,
    /// Commands sent during a direct-access session, awaiting echo removal.
    sent_cmds: Mutex<Vec<Vec<u8>>>,
    events: broadcast::Sender<DriverEvent>,
}

impl WorkhorseController {
    pub fn new(config: ControllerConfig, send: SendFn) -> Self {
        let (events, _) = broadcast::channel(64);
        WorkhorseController {
            config,
            executor: Executor::new(send),
            buffer: Mutex::new(BytesMut::new()),
            table: Mutex::new(ParameterTable::workhorse()),
            mode: Mutex::new(ProtocolState::Unknown),
            sent_cmds: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Current operating mode.
    pub fn mode(&self) -> ProtocolState {
        *self.mode.lock()
    }

    /// Subscribe to driver events.
    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // Byte intake
    // =========================================================================

    /// Accept newly received transport bytes.
    ///
    /// In direct-access mode the bytes pass straight through to the event
    /// channel (minus echoes of operator commands). Otherwise they are
    /// appended to the receive buffer, sieved into frames, and routed: every
    /// frame kind notifies waiting probes, parameter echoes update the table
    /// whatever command produced them, data frames are published as samples,
    /// and the ASCII is offered to the pending transaction.
    pub fn accept(&self, bytes: &[u8]) {
        if self.mode() == ProtocolState::DirectAccess {
            self.passthrough(bytes);
            return;
        }

        // The pending transaction accumulates its own copy of the text; a
        // transaction is only ever in flight while the instrument is in
        // command mode, so binary records do not pollute it in practice.
        self.executor.feed_text(&String::from_utf8_lossy(bytes));

        let mut buf = self.buffer.lock();
        buf.extend_from_slice(bytes);

        let frames = frame::sieve(&buf);
        let mut consumed = 0usize;
        for f in &frames {
            self.executor.note_frame(f.kind);
            if f.kind == FrameKind::ParameterEcho {
                let line = f.text(&buf);
                self.table.lock().update(line.trim_end());
            }
            if let Some(record) = SampleRecord::from_frame(f, &buf) {
                log::debug!("unsolicited {} ({} bytes)", record.kind_name(), f.end - f.start);
                let _ = self.events.send(DriverEvent::Sample(record));
            }
            consumed = f.end;
        }
        // Junk between claimed frames leaves with them.
        if consumed > 0 {
            buf.advance(consumed);
        }

        if buf.len() > self.config.max_buffer {
            let dropped = buf.len() / 2;
            buf.advance(dropped);
            let _ = self.events.send(DriverEvent::ProtocolError {
                detail: format!("receive buffer overflow, dropped {} oldest bytes", dropped),
            });
        }
    }

    fn passthrough(&self, bytes: &[u8]) {
        let mut out = bytes.to_vec();
        let mut sent = self.sent_cmds.lock();
        sent.retain(|cmd| {
            if cmd.is_empty() {
                return false;
            }
            match find_subslice(&out, cmd) {
                Some(pos) => {
                    out.drain(pos..pos + cmd.len());
                    false
                }
                None => true,
            }
        });
        drop(sent);
        if !out.is_empty() {
            let _ = self.events.send(DriverEvent::DirectAccessOutput(out));
        }
    }

    // =========================================================================
    // Mode machine plumbing
    // =========================================================================

    fn apply_event(&self, event: ProtocolEvent) -> Result<ProtocolState> {
        let mut mode = self.mode.lock();
        let next = transition(*mode, event)?;
        let changed = next != *mode;
        *mode = next;
        drop(mode);
        if changed {
            let _ = self.events.send(DriverEvent::StateChange(next));
        }
        Ok(next)
    }

    fn require_mode(&self, wanted: ProtocolState, op: &'static str) -> Result<()> {
        let mode = self.mode();
        if mode == wanted {
            Ok(())
        } else {
            Err(WorkhorseError::InvalidModeForOperation { op, mode })
        }
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Probe the instrument and resolve the operating mode.
    ///
    /// Sends a wake-up and waits one probe window per attempt. A command
    /// prompt classifies the instrument as `Command` (and triggers the
    /// command-mode entry refresh); a sample record classifies it as
    /// `Autosample`. Exhausting the attempt budget is
    /// [`WorkhorseError::IndeterminateState`] and the mode is left untouched:
    /// the controller never guesses.
    #[instrument(skip(self), err)]
    pub async fn discover_mode(&self) -> Result<ProtocolState> {
        let attempts = self.config.wakeup_attempts;
        for attempt in 1..=attempts {
            let probe = self.executor.arm_probe();
            self.executor.send_raw(WAKEUP)?;
            match self.executor.wait_probe(probe, self.config.probe_window).await {
                Some(ProbeOutcome::Prompt) => {
                    let next = self.apply_event(ProtocolEvent::DiscoveredCommand)?;
                    self.refresh_parameters(ParameterKey::ALL).await?;
                    return Ok(next);
                }
                Some(ProbeOutcome::Streaming) => {
                    return self.apply_event(ProtocolEvent::DiscoveredAutosample);
                }
                None => {
                    log::debug!("probe attempt {}/{} saw nothing", attempt, attempts);
                    tokio::time::sleep(self.config.wakeup_delay).await;
                }
            }
        }
        Err(WorkhorseError::IndeterminateState { attempts })
    }

    // =========================================================================
    // Parameters
    // =========================================================================

    /// Refresh `keys` from the instrument, one GET per key.
    ///
    /// One bad parameter must not block the rest of the walk: a failed GET
    /// is recorded (warning + `ProtocolError` event) and the refresh
    /// continues with the remaining keys. Only a walk in which every key
    /// failed returns an error; that signals a dead channel, not a bad
    /// parameter.
    async fn refresh_parameters(&self, keys: &[ParameterKey]) -> Result<()> {
        let mut failed = 0usize;
        let mut last_err = None;
        for key in keys {
            let result = self
                .executor
                .execute(
                    &InstrumentCommand::Get(*key),
                    self.config.transaction_timeout,
                )
                .await;
            match result {
                Ok(payload) => {
                    // accept() normally absorbs the echo before we get here,
                    // but the resolution can race the routing pass; absorbing
                    // the payload again is idempotent.
                    let mut table = self.table.lock();
                    for line in payload.lines() {
                        table.update(line);
                    }
                }
                Err(e) => {
                    tracing::warn!(parameter = %key, error = %e, "parameter refresh failed");
                    let _ = self.events.send(DriverEvent::ProtocolError {
                        detail: format!("refresh of {} failed: {}", key, e),
                    });
                    failed += 1;
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) if failed == keys.len() => Err(e),
            _ => Ok(()),
        }
    }

    /// Read parameter values no older than `max_age`.
    ///
    /// In command mode a stale or missing value is refreshed from the
    /// instrument. While deployed the cache is served as-is (the command
    /// channel is busy streaming); a parameter that was never read is still
    /// an error rather than a guess.
    #[instrument(skip(self, keys), err)]
    pub async fn get_parameters(
        &self,
        keys: &[ParameterKey],
        max_age: Duration,
    ) -> Result<Vec<(ParameterKey, ParamValue)>> {
        match self.mode() {
            ProtocolState::Command => {
                let mut out = Vec::with_capacity(keys.len());
                for key in keys {
                    let cached = self.table.lock().get(*key, max_age);
                    let value = match cached {
                        Ok(v) => v,
                        Err(WorkhorseError::Stale { .. })
                        | Err(WorkhorseError::NeverRefreshed(_)) => {
                            self.refresh_parameters(std::slice::from_ref(key)).await?;
                            self.table.lock().get(*key, max_age)?
                        }
                        Err(e) => return Err(e),
                    };
                    out.push((*key, value));
                }
                Ok(out)
            }
            ProtocolState::Autosample => keys
                .iter()
                .map(|key| {
                    self.table
                        .lock()
                        .peek(*key)
                        .map(|v| (*key, v))
                        .ok_or(WorkhorseError::NeverRefreshed(*key))
                })
                .collect(),
            mode => Err(WorkhorseError::InvalidModeForOperation {
                op: "get_parameters",
                mode,
            }),
        }
    }

    /// Write parameters to the instrument.
    ///
    /// Every key is checked against its declaration before any bytes are
    /// written: one read-only or runtime-locked key rejects the whole batch.
    /// With `apply_at_startup` the new values also become the startup
    /// targets.
    #[instrument(skip(self, values), err)]
    pub async fn set_parameters(
        &self,
        values: &[(ParameterKey, ParamValue)],
        apply_at_startup: bool,
    ) -> Result<()> {
        self.require_mode(ProtocolState::Command, "set_parameters")?;
        let mut formatted = Vec::with_capacity(values.len());
        let before = {
            let table = self.table.lock();
            for (key, value) in values {
                table.check_settable(*key)?;
                formatted.push((*key, table.format_for_set(*key, value)?));
            }
            table.snapshot()
        };

        for (key, wire) in &formatted {
            self.executor
                .execute(
                    &InstrumentCommand::Set(*key, wire.clone()),
                    self.config.transaction_timeout,
                )
                .await?;
        }

        let keys: Vec<ParameterKey> = values.iter().map(|(k, _)| *k).collect();
        self.refresh_parameters(&keys).await?;

        if apply_at_startup {
            let mut table = self.table.lock();
            for (key, value) in values {
                table.set_startup_target(*key, value.clone());
            }
        }
        // Announce only when the reported configuration actually moved; a
        // SET that re-states the current value is not a change.
        if self.table.lock().snapshot() != before {
            let _ = self.events.send(DriverEvent::ConfigChange);
        }
        Ok(())
    }

    /// Bring the instrument in line with the startup targets.
    ///
    /// Valid from `Command` or `Autosample` (logging is transiently
    /// interrupted). Only parameters whose cached value differs from their
    /// target are written; runtime-locked parameters are never rewritten
    /// here, only reported.
    #[instrument(skip(self), err)]
    pub async fn apply_startup_params(&self) -> Result<()> {
        self.with_logging_interrupted(InterruptedOp::ApplyStartup)
            .await?;
        Ok(())
    }

    async fn do_apply_startup(&self) -> Result<()> {
        let startup = self.table.lock().startup_keys();
        self.refresh_parameters(&startup).await?;

        let dirty = self.table.lock().dirty_startup_keys();
        if dirty.is_empty() {
            log::debug!("startup configuration already in agreement");
            return Ok(());
        }

        let before = self.table.lock().snapshot();
        let mut applied = Vec::new();
        for key in &dirty {
            let (locked, target) = {
                let table = self.table.lock();
                (table.spec(*key).runtime_locked, table.startup_target(*key))
            };
            let Some(target) = target else { continue };
            if locked {
                tracing::warn!(parameter = %key, "startup target differs but parameter is locked");
                continue;
            }
            let wire = self.table.lock().format_for_set(*key, &target)?;
            self.executor
                .execute(
                    &InstrumentCommand::Set(*key, wire),
                    self.config.transaction_timeout,
                )
                .await?;
            applied.push(*key);
        }

        if !applied.is_empty() {
            self.refresh_parameters(&applied).await?;
            if self.table.lock().snapshot() != before {
                let _ = self.events.send(DriverEvent::ConfigChange);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Logging control
    // =========================================================================

    /// Start a deployment: sync the clock, save the setup, issue CS.
    #[instrument(skip(self), err)]
    pub async fn start_logging(&self) -> Result<()> {
        self.require_mode(ProtocolState::Command, "start_logging")?;
        self.do_sync_clock().await?;
        self.executor
            .execute(
                &InstrumentCommand::SaveSetupToRam,
                self.config.transaction_timeout,
            )
            .await?;
        self.executor
            .execute(
                &InstrumentCommand::StartDeployment,
                self.config.transaction_timeout,
            )
            .await?;
        tokio::time::sleep(self.config.deploy_settle).await;
        self.apply_event(ProtocolEvent::StartAutosample)?;
        Ok(())
    }

    /// Interrupt logging with a serial break and verify the instrument came
    /// back to its prompt.
    ///
    /// If every attempt still observes streaming, the mode remains
    /// `Autosample` and [`WorkhorseError::StopFailed`] is returned; the
    /// controller does not pretend the instrument stopped.
    #[instrument(skip(self), err)]
    pub async fn stop_logging(&self) -> Result<()> {
        self.require_mode(ProtocolState::Autosample, "stop_logging")?;
        for attempt in 1..=self.config.wakeup_attempts {
            let probe = self.executor.arm_probe();
            self.executor
                .execute(
                    &InstrumentCommand::Break(self.config.break_duration_ms),
                    self.config.transaction_timeout,
                )
                .await?;
            match self.executor.wait_probe(probe, self.config.probe_window).await {
                Some(ProbeOutcome::Prompt) => {
                    // Verification probe: a prompt followed by more
                    // streaming means the break did not take.
                    let verify = self.executor.arm_probe();
                    self.executor.send_raw(WAKEUP)?;
                    if let Some(ProbeOutcome::Streaming) =
                        self.executor.wait_probe(verify, self.config.probe_window).await
                    {
                        log::debug!("still streaming after break, attempt {}", attempt);
                        continue;
                    }
                    self.apply_event(ProtocolEvent::StopAutosample)?;
                    self.refresh_parameters(ParameterKey::ALL).await?;
                    return Ok(());
                }
                Some(ProbeOutcome::Streaming) | None => {
                    log::debug!("no prompt after break, attempt {}", attempt);
                }
            }
        }
        Err(WorkhorseError::StopFailed)
    }

    /// Run `op` from command mode, transiently stopping logging if deployed.
    ///
    /// Logging is restarted on every exit path. The operation's own failure
    /// is surfaced; a restore failure is reported in addition to it, never
    /// instead of it.
    async fn with_logging_interrupted(&self, op: InterruptedOp) -> Result<String> {
        match self.mode() {
            ProtocolState::Command => self.run_interrupted_op(op).await,
            ProtocolState::Autosample => {
                self.stop_logging().await?;
                let result = self.run_interrupted_op(op).await;
                let restore = self.start_logging().await;
                match (result, restore) {
                    (Ok(v), Ok(())) => Ok(v),
                    (Err(e), Ok(())) => Err(e),
                    (Ok(_), Err(r)) => Err(WorkhorseError::RestoreFailed {
                        op: op.name(),
                        restore: Box::new(r),
                        original: None,
                    }),
                    (Err(e), Err(r)) => Err(WorkhorseError::RestoreFailed {
                        op: op.name(),
                        restore: Box::new(r),
                        original: Some(Box::new(e)),
                    }),
                }
            }
            mode => Err(WorkhorseError::InvalidModeForOperation {
                op: op.name(),
                mode,
            }),
        }
    }

    async fn run_interrupted_op(&self, op: InterruptedOp) -> Result<String> {
        match op {
            InterruptedOp::Calibration => {
                self.executor
                    .execute(
                        &InstrumentCommand::OutputCalibrationData,
                        self.config.dump_timeout,
                    )
                    .await
            }
            InterruptedOp::Configuration => {
                self.executor
                    .execute(
                        &InstrumentCommand::GetSystemConfiguration,
                        self.config.dump_timeout,
                    )
                    .await
            }
            InterruptedOp::ClockSync => {
                self.do_sync_clock().await?;
                Ok(String::new())
            }
            InterruptedOp::ApplyStartup => {
                self.do_apply_startup().await?;
                Ok(String::new())
            }
        }
    }

    // =========================================================================
    // Reports and maintenance commands
    // =========================================================================

    /// Fetch the compass calibration report, interrupting logging if needed.
    #[instrument(skip(self), err)]
    pub async fn get_calibration(&self) -> Result<String> {
        self.with_logging_interrupted(InterruptedOp::Calibration)
            .await
    }

    /// Fetch the system configuration report, interrupting logging if needed.
    #[instrument(skip(self), err)]
    pub async fn get_configuration(&self) -> Result<String> {
        self.with_logging_interrupted(InterruptedOp::Configuration)
            .await
    }

    /// Set the instrument clock to the current UTC time.
    ///
    /// `TT` is read-only on the public set path; the clock is the one value
    /// the controller writes directly.
    #[instrument(skip(self), err)]
    pub async fn sync_clock(&self) -> Result<()> {
        self.with_logging_interrupted(InterruptedOp::ClockSync)
            .await?;
        Ok(())
    }

    async fn do_sync_clock(&self) -> Result<()> {
        let now = chrono::Utc::now()
            .format("%Y/%m/%d, %H:%M:%S")
            .to_string();
        self.executor
            .execute(
                &InstrumentCommand::Set(ParameterKey::Time, now),
                self.config.transaction_timeout,
            )
            .await?;
        Ok(())
    }

    async fn command_transaction(
        &self,
        cmd: InstrumentCommand,
        op: &'static str,
    ) -> Result<String> {
        self.require_mode(ProtocolState::Command, op)?;
        let deadline = match cmd.timeout_class() {
            TimeoutClass::Standard => self.config.transaction_timeout,
            TimeoutClass::Dump => self.config.dump_timeout,
        };
        self.executor.execute(&cmd, deadline).await
    }

    /// Save the current setup to NVRAM (`CK`).
    #[instrument(skip(self), err)]
    pub async fn save_setup_to_ram(&self) -> Result<String> {
        self.command_transaction(InstrumentCommand::SaveSetupToRam, "save_setup_to_ram")
            .await
    }

    /// Ask the instrument to resend its last recorded ensemble (`CE`). The
    /// ensemble itself arrives as a sample event.
    #[instrument(skip(self), err)]
    pub async fn send_last_sample(&self) -> Result<()> {
        self.command_transaction(InstrumentCommand::SendLastSample, "send_last_sample")
            .await?;
        Ok(())
    }

    /// Read the error status word (`CY1`).
    #[instrument(skip(self), err)]
    pub async fn get_error_status_word(&self) -> Result<String> {
        self.command_transaction(
            InstrumentCommand::DisplayErrorStatusWord,
            "get_error_status_word",
        )
        .await
    }

    /// Clear the error status word (`CY0`).
    #[instrument(skip(self), err)]
    pub async fn clear_error_status_word(&self) -> Result<()> {
        self.command_transaction(
            InstrumentCommand::ClearErrorStatusWord,
            "clear_error_status_word",
        )
        .await?;
        Ok(())
    }

    /// Read the fault log (`FD`).
    #[instrument(skip(self), err)]
    pub async fn get_fault_log(&self) -> Result<String> {
        self.command_transaction(InstrumentCommand::GetFaultLog, "get_fault_log")
            .await
    }

    /// Clear the fault log (`FC`).
    #[instrument(skip(self), err)]
    pub async fn clear_fault_log(&self) -> Result<()> {
        self.command_transaction(InstrumentCommand::ClearFaultLog, "clear_fault_log")
            .await?;
        Ok(())
    }

    /// Read the beam transformation matrix (`PS3`).
    #[instrument(skip(self), err)]
    pub async fn get_transform_matrix(&self) -> Result<String> {
        self.command_transaction(
            InstrumentCommand::GetInstrumentTransformMatrix,
            "get_transform_matrix",
        )
        .await
    }

    /// Run the built-in test suite (`PT200`) and return its report.
    #[instrument(skip(self), err)]
    pub async fn run_test_200(&self) -> Result<String> {
        self.command_transaction(InstrumentCommand::RunTest200, "run_test_200")
            .await
    }

    // =========================================================================
    // Direct access
    // =========================================================================

    /// Hand the channel to an operator session.
    #[instrument(skip(self), err)]
    pub fn enter_direct_access(&self) -> Result<()> {
        self.apply_event(ProtocolEvent::StartDirectAccess)?;
        self.sent_cmds.lock().clear();
        Ok(())
    }

    /// Send operator bytes during a direct-access session. The bytes are
    /// remembered so their echo can be filtered from the output stream.
    pub fn send_raw(&self, bytes: &[u8]) -> Result<()> {
        self.require_mode(ProtocolState::DirectAccess, "send_raw")?;
        self.sent_cmds.lock().push(bytes.to_vec());
        self.executor.send_raw(bytes)
    }

    /// End the operator session and re-enter command mode, refreshing the
    /// parameter cache since the operator may have changed anything.
    #[instrument(skip(self), err)]
    pub async fn exit_direct_access(&self) -> Result<()> {
        self.apply_event(ProtocolEvent::StopDirectAccess)?;
        self.sent_cmds.lock().clear();
        self.refresh_parameters(ParameterKey::ALL).await?;
        Ok(())
    }

    // =========================================================================
    // Scheduler
    // =========================================================================

    /// Spawn the configured periodic maintenance jobs.
    ///
    /// Each enabled job runs on its own interval; failures are logged and
    /// the job keeps its schedule. Returns the task handles so the embedder
    /// can abort them on shutdown.
    pub fn spawn_scheduler(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();
        if let Some(every) = self.config.schedule.clock_sync {
            handles.push(self.spawn_job("clock_sync", every, InterruptedOp::ClockSync));
        }
        if let Some(every) = self.config.schedule.get_configuration {
            handles.push(self.spawn_job("get_configuration", every, InterruptedOp::Configuration));
        }
        if let Some(every) = self.config.schedule.get_calibration {
            handles.push(self.spawn_job("get_calibration", every, InterruptedOp::Calibration));
        }
        handles
    }

    fn spawn_job(
        self: &Arc<Self>,
        name: &'static str,
        every: Duration,
        op: InterruptedOp,
    ) -> tokio::task::JoinHandle<()> {
        let ctrl = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; jobs run after one
            // full interval.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = ctrl.with_logging_interrupted(op).await {
                    tracing::warn!(job = name, error = %e, "scheduled job failed");
                }
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn force_mode(&self, mode: ProtocolState) {
        *self.mode.lock() = mode;
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
