// End-to-end checks of the calibration phases through a recording bus
use bte_codec::catalog::names;
use bte_codec::sequencer::{Bounds, Limits, Slopes};
use bte_codec::{
    send_macro, CalibrationRun, CodecError, ControlMode, Frame, InitParams, MacroSequencer,
    MessageCatalog, OperatingState, RegisterCommand, SequencerState, Transport, TransportError,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Records every frame it is given
#[derive(Default)]
struct RecordingBus {
    frames: Vec<Frame>,
}

impl Transport for RecordingBus {
    fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        self.frames.push(frame.clone());
        Ok(())
    }
}

/// Rejects every frame with a given id
struct RejectingBus {
    reject_id: u32,
    frames: Vec<Frame>,
}

impl Transport for RejectingBus {
    fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        if frame.id() == self.reject_id {
            let error = std::io::Error::new(std::io::ErrorKind::TimedOut, "no ack");
            return Err(error.into());
        }
        self.frames.push(frame.clone());
        Ok(())
    }
}

#[test]
fn test_full_session_on_the_bus() {
    init_logging();
    let catalog = MessageCatalog::builtin();
    let mut sequencer = MacroSequencer::new(catalog);
    let mut bus = RecordingBus::default();

    let init = sequencer.initialize(&InitParams::default()).unwrap();
    assert_eq!(send_macro(&mut bus, &init).unwrap(), 10);

    let run = sequencer.run_calibration(&CalibrationRun::voltage_800v()).unwrap();
    assert_eq!(send_macro(&mut bus, &run).unwrap(), 12);

    let stop = sequencer.stop().unwrap();
    send_macro(&mut bus, &stop).unwrap();

    assert_eq!(sequencer.state(), SequencerState::Idle);
    assert_eq!(bus.frames.len(), 23);

    let ids: Vec<u32> = bus.frames.iter().take(10).map(|f| f.id()).collect();
    let expected: Vec<u32> = [
        names::SET_SLOPE_U_I,
        names::SET_SLOPE_PWR_FILTER,
        names::SET_OP_LIM_U,
        names::SET_OP_LIM_I,
        names::SET_OP_LIM_PWR,
        names::SET_PR_LIM_U,
        names::SET_PR_LIM_I,
        names::SET_PR_LIM_PWR,
        names::CLEARANCE,
        names::SET_RST_STOP,
    ]
    .iter()
    .map(|name| catalog.by_name(name).unwrap().id)
    .collect();
    assert_eq!(ids, expected);

    // The run ends with the switch to ON at 800 V
    let switch_on = &bus.frames[21];
    assert_eq!(switch_on.id(), 0xC1);
    assert_eq!(&switch_on.data()[0..4], &[0x00, 0x00, 0x48, 0x44]);

    // Stop switches OFF with no controller
    let off = &bus.frames[22];
    assert_eq!(off.id(), 0xC1);
    assert_eq!(off.data(), &[0u8; 8]);
}

#[test]
fn test_initialization_defaults_on_the_wire() {
    init_logging();
    let init = bte_codec::sequencer::initialization_macro(
        MessageCatalog::builtin(),
        &InitParams::default(),
    )
    .unwrap();
    let frames: Vec<&Frame> = init.frames().collect();

    // Slopes 200/200 V/s, A/s
    assert_eq!(frames[0].data(), &[0x00, 0x00, 0x48, 0x43, 0x00, 0x00, 0x48, 0x43]);
    // Power slope 200, filter 0
    assert_eq!(frames[1].data(), &[0x00, 0x00, 0x48, 0x43, 0x00]);
    // Current limits -900 / 900 A (900.0f32 = 0x44610000)
    assert_eq!(frames[3].data(), &[0x00, 0x00, 0x61, 0xC4, 0x00, 0x00, 0x61, 0x44]);
    // Clearance and reset/stop
    assert_eq!(frames[8].data(), &[0x01]);
    assert_eq!(frames[9].data(), &[0x01]);
}

#[test]
fn test_same_parameters_same_bytes() {
    init_logging();
    let params = InitParams {
        slopes: Slopes {
            voltage: 50.0,
            current: 75.5,
            power: 10.0,
            filter: 4,
        },
        operational: Limits {
            voltage: Bounds::new(100.0, 900.0),
            ..Limits::default()
        },
        protective: Limits::default(),
    };

    let mut first = MacroSequencer::new(MessageCatalog::builtin());
    let mut second = MacroSequencer::new(MessageCatalog::builtin());
    let a = first.initialize(&params).unwrap();
    let b = second.initialize(&params).unwrap();

    let bytes_a: Vec<Vec<u8>> = a.frames().map(|f| f.data().to_vec()).collect();
    let bytes_b: Vec<Vec<u8>> = b.frames().map(|f| f.data().to_vec()).collect();
    assert_eq!(bytes_a, bytes_b);
    assert_eq!(a.steps()[1].frame.data()[4], 4);
}

#[test]
fn test_transport_failure_stops_the_macro() {
    init_logging();
    let catalog = MessageCatalog::builtin();
    let mut sequencer = MacroSequencer::new(catalog);
    let init = sequencer.initialize(&InitParams::default()).unwrap();

    let clearance_id = catalog.by_name(names::CLEARANCE).unwrap().id;
    let mut bus = RejectingBus {
        reject_id: clearance_id,
        frames: Vec::new(),
    };

    let err = send_macro(&mut bus, &init).unwrap_err();
    match &err {
        CodecError::TransportFailure { index, message, .. } => {
            assert_eq!(*index, 8);
            assert_eq!(message, names::CLEARANCE);
        }
        other => panic!("expected TransportFailure, got {:?}", other),
    }
    assert!(err.to_string().contains("no ack"));
    // SET_RST_STOP was never sent
    assert_eq!(bus.frames.len(), 8);
}

#[test]
fn test_recovery_after_failed_initialization() {
    init_logging();
    let mut sequencer = MacroSequencer::new(MessageCatalog::builtin());

    let mut bad = InitParams::default();
    bad.operational.voltage = Bounds::new(0.0, 2000.0);
    assert!(sequencer.initialize(&bad).is_err());
    assert_eq!(sequencer.state(), SequencerState::Failed);

    // A failed session can be stopped or re-initialized
    let init = sequencer.initialize(&InitParams::default()).unwrap();
    assert_eq!(init.len(), 10);
    assert_eq!(sequencer.state(), SequencerState::Running);

    let request = RegisterCommand::new(OperatingState::Standby, ControlMode::Current)
        .with_resets(false, true);
    let state = sequencer.request_state(&request).unwrap();
    assert_eq!(state.steps()[0].frame.data()[4], 0x91);
    assert_eq!(sequencer.state(), SequencerState::Running);
}
