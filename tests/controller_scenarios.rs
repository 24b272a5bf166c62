//! End-to-end controller scenarios against a scripted instrument.
//!
//! The simulator stands in for the transport and the physical ADCP: the
//! controller's send function forwards outbound bytes to a responder task,
//! which interprets each command against a small behavior table and feeds
//! the reply back through `accept()`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use workhorse_driver::{
    ControllerConfig, DriverEvent, ParamValue, ParameterKey, ProtocolState, SampleRecord, SendFn,
    WorkhorseController, WorkhorseError,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn test_config() -> ControllerConfig {
    ControllerConfig {
        transaction_timeout: Duration::from_secs(2),
        dump_timeout: Duration::from_secs(2),
        wakeup_attempts: 3,
        wakeup_delay: Duration::from_millis(10),
        probe_window: Duration::from_millis(200),
        deploy_settle: Duration::from_millis(10),
        ..Default::default()
    }
}

struct Behavior {
    /// Instrument starts out deployed and streaming.
    logging: bool,
    /// Never say anything (dead or detached instrument).
    silent: bool,
    /// Ignore serial breaks and keep streaming.
    refuse_break: bool,
    /// Answer AC with the error prompt.
    fail_calibration: bool,
    /// Answer CK with the error prompt once calibration has been served
    /// (sabotages the restart-after-interrupt path only).
    fail_save_after_calibration: bool,
    calibration_served: bool,
    /// Answer this mnemonic's GET with the error prompt.
    reject_get: Option<&'static str>,
    /// Current ES setting; SETs move it, GETs echo it.
    salinity: i64,
}

impl Default for Behavior {
    fn default() -> Self {
        Behavior {
            logging: false,
            silent: false,
            refuse_break: false,
            fail_calibration: false,
            fail_save_after_calibration: false,
            calibration_served: false,
            reject_get: None,
            salinity: 35,
        }
    }
}

struct Simulator {
    behavior: Mutex<Behavior>,
    writes: Mutex<Vec<Vec<u8>>>,
}

fn pd0_record() -> Vec<u8> {
    let payload = [0x55u8; 28];
    let mut rec = vec![0x7F, 0x7F];
    rec.extend_from_slice(&((4 + payload.len()) as u16).to_le_bytes());
    rec.extend_from_slice(&payload);
    rec.extend_from_slice(&[0x7F, 0x7F]); // next record's header
    rec
}

const CALIBRATION_DUMP: &str = "ACTIVE FLUXGATE CALIBRATION MATRICES in NVRAM\r\n\
     Calibration date and time: 9/14/2012  09:25:32\r\n\
     \x20             S inverse\r\n\
     \r\n>";

const CONFIG_DUMP: &str = "Instrument S/N:  18444\r\n\
     \x20      Frequency:  76800 HZ\r\n\
     \x20  Configuration:  4 BEAM, JANUS\r\n\
     \r\n>";

/// Canned echo lines for the parameters the tests assert on; every other
/// GET is answered with a bare prompt.
fn echo_line(mnemonic: &str) -> Option<&'static str> {
    match mnemonic {
        "CI" => Some("CI = 5 --- Instrument ID (0-255)"),
        "CQ" => Some("CQ = 255 --- Xmt Power (0=Low, 255=High)"),
        "WP" => Some("WP = 1 --- Pings per Ensemble (0-16384)"),
        _ => None,
    }
}

impl Simulator {
    fn reply(&self, written: &[u8]) -> Option<Vec<u8>> {
        let mut b = self.behavior.lock();
        if b.silent {
            return None;
        }
        let cmd = String::from_utf8_lossy(written).trim_end().to_string();

        if cmd.is_empty() {
            // Wake-up newline.
            return Some(if b.logging {
                pd0_record()
            } else {
                b"\r\n>".to_vec()
            });
        }
        if cmd.starts_with("break") {
            if b.refuse_break {
                return Some(pd0_record());
            }
            b.logging = false;
            return Some(b"\r\n>".to_vec());
        }
        if b.logging {
            // Streaming instruments ignore ordinary commands.
            return None;
        }
        match cmd.as_str() {
            "CS" => {
                b.logging = true;
                None
            }
            "CK" => {
                if b.fail_save_after_calibration && b.calibration_served {
                    Some(format!("{}\r\nERR 040:  NVRAM WRITE FAILED\r\n>", cmd).into_bytes())
                } else {
                    Some(format!("{}\r\n[Parameters saved as USER defaults]\r\n>", cmd).into_bytes())
                }
            }
            "AC" => {
                if b.fail_calibration {
                    Some(format!("{}\r\nERR 099:  CALIBRATION UNAVAILABLE\r\n>", cmd).into_bytes())
                } else {
                    b.calibration_served = true;
                    Some(format!("{}\r\n{}", cmd, CALIBRATION_DUMP).into_bytes())
                }
            }
            "PS0" => Some(format!("{}\r\n{}", cmd, CONFIG_DUMP).into_bytes()),
            // Left unanswered; the direct-access test injects the output
            // itself.
            "PS3" => None,
            _ if cmd.ends_with('?') => {
                let mnemonic = &cmd[..cmd.len() - 1];
                if b.reject_get == Some(mnemonic) {
                    Some(format!("{}\r\nERR 010:  BAD COMMAND\r\n>", cmd).into_bytes())
                } else if mnemonic == "ES" {
                    Some(
                        format!(
                            "{}\r\nES = {} --- Salinity (0-40 pp thousand)\r\n\r\n>",
                            cmd, b.salinity
                        )
                        .into_bytes(),
                    )
                } else {
                    match echo_line(mnemonic) {
                        Some(line) => Some(format!("{}\r\n{}\r\n\r\n>", cmd, line).into_bytes()),
                        None => Some(format!("{}\r\n>", cmd).into_bytes()),
                    }
                }
            }
            _ if cmd.starts_with("ES") && cmd[2..].parse::<i64>().is_ok() => {
                b.salinity = cmd[2..].parse().unwrap();
                Some(format!("{}\r\n>", cmd).into_bytes())
            }
            // Everything else is a SET: echo plus prompt.
            _ => Some(format!("{}\r\n>", cmd).into_bytes()),
        }
    }

    fn writes_matching(&self, prefix: &str) -> usize {
        self.writes
            .lock()
            .iter()
            .filter(|w| w.starts_with(prefix.as_bytes()))
            .count()
    }
}

fn harness(
    config: ControllerConfig,
    behavior: Behavior,
) -> (Arc<WorkhorseController>, Arc<Simulator>) {
    let sim = Arc::new(Simulator {
        behavior: Mutex::new(behavior),
        writes: Mutex::new(Vec::new()),
    });
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let send_sim = sim.clone();
    let send: SendFn = Arc::new(move |bytes: &[u8]| {
        send_sim.writes.lock().push(bytes.to_vec());
        tx.send(bytes.to_vec())
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "responder gone"))?;
        Ok(())
    });
    let ctrl = Arc::new(WorkhorseController::new(config, send));

    let responder_ctrl = ctrl.clone();
    let responder_sim = sim.clone();
    tokio::spawn(async move {
        while let Some(written) = rx.recv().await {
            if let Some(reply) = responder_sim.reply(&written) {
                responder_ctrl.accept(&reply);
            }
        }
    });

    (ctrl, sim)
}

#[tokio::test]
async fn discovery_finds_command_mode_and_caches_parameters() {
    init_tracing();
    let (ctrl, sim) = harness(test_config(), Behavior::default());
    let mut events = ctrl.subscribe();

    let mode = ctrl.discover_mode().await.unwrap();
    assert_eq!(mode, ProtocolState::Command);
    assert!(matches!(
        events.recv().await.unwrap(),
        DriverEvent::StateChange(ProtocolState::Command)
    ));

    // The entry refresh walked the whole declaration list.
    assert_eq!(sim.writes_matching("CI?"), 1);

    // CI was cached fresh by the refresh: this read is served from the
    // cache, no new GET goes out.
    let values = ctrl
        .get_parameters(&[ParameterKey::InstrumentId], Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(
        values,
        vec![(ParameterKey::InstrumentId, ParamValue::Integer(5))]
    );
    assert_eq!(sim.writes_matching("CI?"), 1);
}

#[tokio::test]
async fn discovery_finds_a_streaming_instrument() {
    init_tracing();
    let (ctrl, _sim) = harness(
        test_config(),
        Behavior {
            logging: true,
            ..Default::default()
        },
    );
    let mode = ctrl.discover_mode().await.unwrap();
    assert_eq!(mode, ProtocolState::Autosample);
}

#[tokio::test]
async fn silent_instrument_is_indeterminate() {
    init_tracing();
    let (ctrl, _sim) = harness(
        test_config(),
        Behavior {
            silent: true,
            ..Default::default()
        },
    );
    let err = ctrl.discover_mode().await.unwrap_err();
    assert!(matches!(
        err,
        WorkhorseError::IndeterminateState { attempts: 3 }
    ));
    // Never guessed: still unknown.
    assert_eq!(ctrl.mode(), ProtocolState::Unknown);
}

#[tokio::test]
async fn deployment_round_trip() {
    init_tracing();
    let (ctrl, sim) = harness(test_config(), Behavior::default());
    ctrl.discover_mode().await.unwrap();

    ctrl.start_logging().await.unwrap();
    assert_eq!(ctrl.mode(), ProtocolState::Autosample);
    // The start sequence synced the clock and saved the setup. The clock
    // set is "TT<year>/..."; "TT?" is the discovery refresh.
    assert_eq!(sim.writes_matching("TT2"), 1);
    assert_eq!(sim.writes_matching("CK"), 1);
    assert_eq!(sim.writes_matching("CS"), 1);

    // A streaming ensemble is published as a sample.
    let mut events = ctrl.subscribe();
    ctrl.accept(&pd0_record());
    match events.recv().await.unwrap() {
        DriverEvent::Sample(SampleRecord::Pd0Ensemble { bytes, .. }) => {
            assert_eq!(bytes.len(), 32);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    ctrl.stop_logging().await.unwrap();
    assert_eq!(ctrl.mode(), ProtocolState::Command);
}

#[tokio::test]
async fn stop_failure_keeps_reporting_autosample() {
    init_tracing();
    let (ctrl, _sim) = harness(
        test_config(),
        Behavior {
            logging: true,
            refuse_break: true,
            ..Default::default()
        },
    );
    ctrl.discover_mode().await.unwrap();
    assert_eq!(ctrl.mode(), ProtocolState::Autosample);

    let err = ctrl.stop_logging().await.unwrap_err();
    assert!(matches!(err, WorkhorseError::StopFailed));
    assert_eq!(ctrl.mode(), ProtocolState::Autosample);
}

#[tokio::test]
async fn calibration_interrupts_and_restores_logging() {
    init_tracing();
    let (ctrl, sim) = harness(
        test_config(),
        Behavior {
            logging: true,
            ..Default::default()
        },
    );
    ctrl.discover_mode().await.unwrap();

    let report = ctrl.get_calibration().await.unwrap();
    assert!(report.contains("ACTIVE FLUXGATE CALIBRATION MATRICES"));

    // Logging was stopped for the dump and restarted afterwards.
    assert!(sim.writes_matching("break") >= 1);
    assert_eq!(sim.writes_matching("CS"), 1);
    assert_eq!(ctrl.mode(), ProtocolState::Autosample);
}

#[tokio::test]
async fn failed_operation_still_restores_logging() {
    init_tracing();
    let (ctrl, sim) = harness(
        test_config(),
        Behavior {
            logging: true,
            fail_calibration: true,
            ..Default::default()
        },
    );
    ctrl.discover_mode().await.unwrap();

    let err = ctrl.get_calibration().await.unwrap_err();
    // The operation's own failure is what surfaces.
    assert!(matches!(err, WorkhorseError::DeviceRejected(_)));
    // Logging restarted on the failure path too.
    assert_eq!(sim.writes_matching("CS"), 1);
    assert_eq!(ctrl.mode(), ProtocolState::Autosample);
}

#[tokio::test]
async fn restore_failure_is_reported_alongside() {
    init_tracing();
    let (ctrl, _sim) = harness(
        test_config(),
        Behavior {
            logging: true,
            fail_save_after_calibration: true,
            ..Default::default()
        },
    );
    ctrl.discover_mode().await.unwrap();

    let err = ctrl.get_calibration().await.unwrap_err();
    match err {
        WorkhorseError::RestoreFailed { op, original, .. } => {
            assert_eq!(op, "get_calibration");
            // The calibration itself succeeded; only the restart failed.
            assert!(original.is_none());
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn configuration_report_round_trip() {
    init_tracing();
    let (ctrl, _sim) = harness(test_config(), Behavior::default());
    ctrl.discover_mode().await.unwrap();

    let report = ctrl.get_configuration().await.unwrap();
    assert!(report.contains("Instrument S/N"));
    assert!(report.contains("76800 HZ"));
}

#[tokio::test]
async fn set_parameters_refreshes_and_announces() {
    init_tracing();
    let (ctrl, sim) = harness(test_config(), Behavior::default());
    ctrl.discover_mode().await.unwrap();
    let mut events = ctrl.subscribe();

    ctrl.set_parameters(
        &[(ParameterKey::Salinity, ParamValue::Integer(20))],
        false,
    )
    .await
    .unwrap();

    assert_eq!(sim.writes_matching("ES20"), 1);
    loop {
        match events.recv().await.unwrap() {
            DriverEvent::ConfigChange => break,
            DriverEvent::Sample(_) | DriverEvent::StateChange(_) => continue,
            other => panic!("unexpected event: {:?}", other),
        }
    }
}

#[tokio::test]
async fn restating_a_value_is_not_a_config_change() {
    init_tracing();
    let (ctrl, sim) = harness(test_config(), Behavior::default());
    ctrl.discover_mode().await.unwrap();
    let mut events = ctrl.subscribe();

    // The entry refresh already cached ES = 35; writing 35 again moves
    // nothing, so nothing is announced.
    ctrl.set_parameters(
        &[(ParameterKey::Salinity, ParamValue::Integer(35))],
        false,
    )
    .await
    .unwrap();
    assert_eq!(sim.writes_matching("ES35"), 1);
    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));

    // Writing a different value does move the reported configuration.
    ctrl.set_parameters(
        &[(ParameterKey::Salinity, ParamValue::Integer(20))],
        false,
    )
    .await
    .unwrap();
    assert!(matches!(
        events.recv().await.unwrap(),
        DriverEvent::ConfigChange
    ));
}

#[tokio::test]
async fn refresh_continues_past_a_rejected_parameter() {
    init_tracing();
    let (ctrl, sim) = harness(
        test_config(),
        Behavior {
            reject_get: Some("CH"),
            ..Default::default()
        },
    );
    let mut events = ctrl.subscribe();

    // Discovery still lands in command mode even though one GET of the
    // entry refresh is rejected.
    let mode = ctrl.discover_mode().await.unwrap();
    assert_eq!(mode, ProtocolState::Command);

    // The walk went on past CH: CI, later in the declaration list, was
    // still fetched and cached.
    assert_eq!(sim.writes_matching("CI?"), 1);
    let values = ctrl
        .get_parameters(&[ParameterKey::InstrumentId], Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(
        values,
        vec![(ParameterKey::InstrumentId, ParamValue::Integer(5))]
    );

    // The rejection was reported rather than swallowed.
    loop {
        match events.recv().await.unwrap() {
            DriverEvent::ProtocolError { detail } => {
                assert!(detail.contains("CH"));
                break;
            }
            _ => continue,
        }
    }
}

#[tokio::test]
async fn direct_access_session() {
    init_tracing();
    let (ctrl, _sim) = harness(test_config(), Behavior::default());
    ctrl.discover_mode().await.unwrap();

    ctrl.enter_direct_access().unwrap();
    assert_eq!(ctrl.mode(), ProtocolState::DirectAccess);
    let mut events = ctrl.subscribe();

    ctrl.send_raw(b"PS3\r\n").unwrap();
    ctrl.accept(b"PS3\r\nBeam Width:   3.7 degrees\r\n");
    match events.recv().await.unwrap() {
        DriverEvent::DirectAccessOutput(out) => {
            assert_eq!(out, b"Beam Width:   3.7 degrees\r\n");
        }
        other => panic!("unexpected event: {:?}", other),
    }

    ctrl.exit_direct_access().await.unwrap();
    assert_eq!(ctrl.mode(), ProtocolState::Command);
}
