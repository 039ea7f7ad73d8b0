//! Calibration macro sequencer
//!
//! Produces the ordered frame sequences that walk the EStorage through a
//! calibration: initialization of the operating envelope, a calibration-curve
//! run, state-transition requests and stop.
//!
//! The order of frames inside a phase is mandated by the device firmware: the
//! limit and clearance messages establish a safe envelope before any set value
//! is accepted. Every producer here is a pure function of the catalog and its
//! parameters, so calling it again with the same inputs yields byte-identical
//! frames. A phase is built completely before it is returned; if any frame
//! fails to build, nothing of that phase is handed out.

use crate::builder::FrameBuilder;
use crate::catalog::{names, MessageCatalog};
use crate::register::{ControlMode, OperatingState, RegisterCommand};
use crate::types::{CodecError, FieldValue, Frame, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive min/max pair of a limit message
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Slope settings (SET_SLOPE_U_I, SET_SLOPE_PWR_FILTER)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Slopes {
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    pub filter: u8,
}

impl Default for Slopes {
    fn default() -> Self {
        Self {
            voltage: 200.0,
            current: 200.0,
            power: 200.0,
            filter: 0,
        }
    }
}

/// Voltage, current and power limits of one limit set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub voltage: Bounds,
    pub current: Bounds,
    pub power: Bounds,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            voltage: Bounds::new(0.0, 1400.0),
            current: Bounds::new(-900.0, 900.0),
            power: Bounds::new(-500.0, 500.0),
        }
    }
}

/// Parameters of the initialization phase
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InitParams {
    pub slopes: Slopes,
    /// Operational limits (SET_OP_LIM_*)
    pub operational: Limits,
    /// Protective limits (SET_PR_LIM_*)
    pub protective: Limits,
}

/// Parameters of one calibration-curve run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationRun {
    pub name: String,
    pub control_mode: ControlMode,
    /// Set value sent with the switch-to-ON request
    pub setpoint: f64,
    pub inner_resistance: f64,
    /// Envelope re-sent before switching on
    pub envelope: InitParams,
}

impl CalibrationRun {
    /// 800 V calibration curve in voltage control mode
    pub fn voltage_800v() -> Self {
        Self {
            name: "800V calibration run".to_string(),
            control_mode: ControlMode::Voltage,
            setpoint: 800.0,
            inner_resistance: 0.0,
            envelope: InitParams::default(),
        }
    }
}

impl Default for CalibrationRun {
    fn default() -> Self {
        Self::voltage_800v()
    }
}

/// Status/info requests the device answers on its own ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemRequest {
    Status,
    Info,
}

/// Calibration phases a macro can represent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initialization,
    CalibrationRun,
    StateRequest,
    Stop,
    SystemRequest,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Initialization => write!(f, "initialization"),
            Phase::CalibrationRun => write!(f, "calibration run"),
            Phase::StateRequest => write!(f, "state request"),
            Phase::Stop => write!(f, "stop"),
            Phase::SystemRequest => write!(f, "system request"),
        }
    }
}

/// One frame of a macro, labelled with the message it was built from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroStep {
    pub message: String,
    pub frame: Frame,
}

/// A finite, restartable sequence of frames for one calibration phase
///
/// The macro owns its frames; iterating it does not consume it, so the same
/// sequence can be validated, logged and sent as often as needed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationMacro {
    name: String,
    phase: Phase,
    steps: Vec<MacroStep>,
}

impl CalibrationMacro {
    fn new(name: impl Into<String>, phase: Phase, steps: Vec<MacroStep>) -> Self {
        Self {
            name: name.into(),
            phase,
            steps,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn steps(&self) -> &[MacroStep] {
        &self.steps
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MacroStep> {
        self.steps.iter()
    }

    /// Frames in send order
    pub fn frames(&self) -> impl Iterator<Item = &Frame> + '_ {
        self.steps.iter().map(|s| &s.frame)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<'m> IntoIterator for &'m CalibrationMacro {
    type Item = &'m MacroStep;
    type IntoIter = std::slice::Iter<'m, MacroStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

/// Message names of one limit set, in send order
struct LimitMessages {
    voltage: &'static str,
    current: &'static str,
    power: &'static str,
}

const OPERATIONAL: LimitMessages = LimitMessages {
    voltage: names::SET_OP_LIM_U,
    current: names::SET_OP_LIM_I,
    power: names::SET_OP_LIM_PWR,
};

const PROTECTIVE: LimitMessages = LimitMessages {
    voltage: names::SET_PR_LIM_U,
    current: names::SET_PR_LIM_I,
    power: names::SET_PR_LIM_PWR,
};

/// Collects built frames; the first error aborts the phase
struct StepRecorder<'a> {
    builder: FrameBuilder<'a>,
    steps: Vec<MacroStep>,
}

impl<'a> StepRecorder<'a> {
    fn new(catalog: &'a MessageCatalog) -> Self {
        Self {
            builder: FrameBuilder::new(catalog),
            steps: Vec::new(),
        }
    }

    fn push(&mut self, message: &str, values: &[(&str, FieldValue)]) -> Result<()> {
        let frame = self.builder.build_named(message, values)?;
        self.steps.push(MacroStep {
            message: message.to_string(),
            frame,
        });
        Ok(())
    }

    fn push_register(&mut self, command: &RegisterCommand) -> Result<()> {
        self.push(names::SET_REF_SWITCH_CTRL_RI, &command.field_values())
    }

    fn push_slopes(&mut self, slopes: &Slopes) -> Result<()> {
        self.push(
            names::SET_SLOPE_U_I,
            &[
                ("slope_voltage", slopes.voltage.into()),
                ("slope_current", slopes.current.into()),
            ],
        )?;
        self.push(
            names::SET_SLOPE_PWR_FILTER,
            &[
                ("slope_power", slopes.power.into()),
                ("filter", slopes.filter.into()),
            ],
        )
    }

    fn push_limits(&mut self, messages: &LimitMessages, limits: &Limits) -> Result<()> {
        self.push(
            messages.voltage,
            &[("u_min", limits.voltage.min.into()), ("u_max", limits.voltage.max.into())],
        )?;
        self.push(
            messages.current,
            &[("i_min", limits.current.min.into()), ("i_max", limits.current.max.into())],
        )?;
        self.push(
            messages.power,
            &[("pwr_min", limits.power.min.into()), ("pwr_max", limits.power.max.into())],
        )
    }

    fn push_clearance_and_reset(&mut self) -> Result<()> {
        self.push(names::CLEARANCE, &[("clearance", 1u8.into())])?;
        self.push(names::SET_RST_STOP, &[("rst_stop", 1u8.into())])
    }

    fn finish(self, name: impl Into<String>, phase: Phase) -> CalibrationMacro {
        CalibrationMacro::new(name, phase, self.steps)
    }
}

/// Initialization: slopes, operational limits, protective limits, clearance
/// and reset/stop - 10 frames in that order
pub fn initialization_macro(catalog: &MessageCatalog, params: &InitParams) -> Result<CalibrationMacro> {
    let mut recorder = StepRecorder::new(catalog);
    recorder.push_slopes(&params.slopes)?;
    recorder.push_limits(&OPERATIONAL, &params.operational)?;
    recorder.push_limits(&PROTECTIVE, &params.protective)?;
    recorder.push_clearance_and_reset()?;
    Ok(recorder.finish("BTE initialization", Phase::Initialization))
}

/// Calibration-curve run: control mode, operational limits, slopes,
/// protective limits, clearance, reset/stop, switch to ON
pub fn calibration_run_macro(catalog: &MessageCatalog, run: &CalibrationRun) -> Result<CalibrationMacro> {
    let standby = RegisterCommand::new(OperatingState::Standby, run.control_mode)
        .with_inner_resistance(run.inner_resistance);
    let switch_on = RegisterCommand::new(OperatingState::On, run.control_mode)
        .with_reference(run.setpoint)
        .with_inner_resistance(run.inner_resistance);

    let mut recorder = StepRecorder::new(catalog);
    recorder.push_register(&standby)?;
    recorder.push_limits(&OPERATIONAL, &run.envelope.operational)?;
    recorder.push_slopes(&run.envelope.slopes)?;
    recorder.push_limits(&PROTECTIVE, &run.envelope.protective)?;
    recorder.push_clearance_and_reset()?;
    recorder.push_register(&switch_on)?;
    Ok(recorder.finish(run.name.clone(), Phase::CalibrationRun))
}

/// Single control-register write requesting a state/mode change
pub fn state_request_macro(catalog: &MessageCatalog, command: &RegisterCommand) -> Result<CalibrationMacro> {
    let mut recorder = StepRecorder::new(catalog);
    recorder.push_register(command)?;
    Ok(recorder.finish(
        format!("switch to {} ({})", command.operating_state, command.control_mode),
        Phase::StateRequest,
    ))
}

/// Switch the device OFF with no active controller
pub fn stop_macro(catalog: &MessageCatalog) -> Result<CalibrationMacro> {
    let mut recorder = StepRecorder::new(catalog);
    recorder.push_register(&RegisterCommand::new(OperatingState::Off, ControlMode::None))?;
    Ok(recorder.finish("stop", Phase::Stop))
}

/// Zero-length status or information request
pub fn system_request_macro(catalog: &MessageCatalog, request: SystemRequest) -> Result<CalibrationMacro> {
    let (message, label) = match request {
        SystemRequest::Status => (names::REQ_SYSTEM_STATUS, "system status request"),
        SystemRequest::Info => (names::REQ_SYSTEM_INFO, "system info request"),
    };
    let mut recorder = StepRecorder::new(catalog);
    recorder.push(message, &[])?;
    Ok(recorder.finish(label, Phase::SystemRequest))
}

/// Sequencer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequencerState {
    Idle,
    Initializing,
    Running,
    Failed,
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequencerState::Idle => write!(f, "idle"),
            SequencerState::Initializing => write!(f, "initializing"),
            SequencerState::Running => write!(f, "running"),
            SequencerState::Failed => write!(f, "failed"),
        }
    }
}

/// State machine over the calibration phases of one session
///
/// ```text
/// Idle/Failed --initialize--> Initializing --ok--> Running
///                                          --err-> Failed
/// Running --run_calibration / request_state--> Running (Failed on error)
/// Running/Failed --stop--> Idle
/// Running --complete--> Idle
/// ```
///
/// One sequencer drives one session; it is not meant to be shared between
/// callers. Different sequencers are fully independent.
#[derive(Debug)]
pub struct MacroSequencer<'a> {
    catalog: &'a MessageCatalog,
    state: SequencerState,
}

impl<'a> MacroSequencer<'a> {
    pub fn new(catalog: &'a MessageCatalog) -> Self {
        Self {
            catalog,
            state: SequencerState::Idle,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Produce the initialization macro and move to Running
    pub fn initialize(&mut self, params: &InitParams) -> Result<CalibrationMacro> {
        self.require(Phase::Initialization, &[SequencerState::Idle, SequencerState::Failed])?;
        self.state = SequencerState::Initializing;
        log::info!("Initializing BTE for calibration");

        let result = initialization_macro(self.catalog, params);
        self.finish_phase(Phase::Initialization, result, SequencerState::Running)
    }

    /// Produce a calibration-curve run; requires an initialized device
    pub fn run_calibration(&mut self, run: &CalibrationRun) -> Result<CalibrationMacro> {
        self.require(Phase::CalibrationRun, &[SequencerState::Running])?;
        log::info!("Starting {}", run.name);

        let result = calibration_run_macro(self.catalog, run);
        self.finish_phase(Phase::CalibrationRun, result, SequencerState::Running)
    }

    /// Produce a single state-transition request
    pub fn request_state(&mut self, command: &RegisterCommand) -> Result<CalibrationMacro> {
        self.require(Phase::StateRequest, &[SequencerState::Running])?;

        let result = state_request_macro(self.catalog, command);
        self.finish_phase(Phase::StateRequest, result, SequencerState::Running)
    }

    /// Switch the device off and return to Idle
    pub fn stop(&mut self) -> Result<CalibrationMacro> {
        self.require(Phase::Stop, &[SequencerState::Running, SequencerState::Failed])?;
        log::info!("Stopping calibration session");

        let result = stop_macro(self.catalog);
        self.finish_phase(Phase::Stop, result, SequencerState::Idle)
    }

    /// Record loopback-verified completion of a calibration curve
    pub fn complete(&mut self) -> Result<()> {
        self.require(Phase::CalibrationRun, &[SequencerState::Running])?;
        log::info!("Calibration curve completed");
        self.state = SequencerState::Idle;
        Ok(())
    }

    /// Forget any previous outcome
    pub fn reset(&mut self) {
        self.state = SequencerState::Idle;
    }

    fn require(&self, phase: Phase, allowed: &[SequencerState]) -> Result<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        log::warn!("Rejected {} while {}", phase, self.state);
        Err(CodecError::InvalidTransition {
            state: self.state,
            phase,
        })
    }

    fn finish_phase(
        &mut self,
        phase: Phase,
        result: Result<CalibrationMacro>,
        next: SequencerState,
    ) -> Result<CalibrationMacro> {
        match result {
            Ok(calibration_macro) => {
                log::debug!(
                    "{} ready: {} frames, sequencer {} -> {}",
                    phase,
                    calibration_macro.len(),
                    self.state,
                    next
                );
                self.state = next;
                Ok(calibration_macro)
            }
            Err(e) => {
                log::error!("{} aborted: {}", phase, e);
                self.state = SequencerState::Failed;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> &'static MessageCatalog {
        MessageCatalog::builtin()
    }

    #[test]
    fn test_initialization_order() {
        let init = initialization_macro(catalog(), &InitParams::default()).unwrap();
        let messages: Vec<_> = init.iter().map(|s| s.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
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
        );
        for step in &init {
            assert_eq!(step.frame.id(), catalog().by_name(&step.message).unwrap().id);
        }
    }

    #[test]
    fn test_calibration_run_order() {
        let run = calibration_run_macro(catalog(), &CalibrationRun::voltage_800v()).unwrap();
        assert_eq!(run.len(), 12);
        assert_eq!(run.phase(), Phase::CalibrationRun);

        let first = &run.steps()[0];
        let last = &run.steps()[11];
        assert_eq!(first.message, names::SET_REF_SWITCH_CTRL_RI);
        assert_eq!(last.message, names::SET_REF_SWITCH_CTRL_RI);
        // Standby + voltage mode, then ON + voltage mode with 800 V
        assert_eq!(first.frame.data()[4], 0b00_001_001);
        assert_eq!(last.frame.data()[4], 0b00_001_010);
        assert_eq!(&last.frame.data()[0..4], &800.0f32.to_le_bytes());

        assert_eq!(run.steps()[1].message, names::SET_OP_LIM_U);
        assert_eq!(run.steps()[4].message, names::SET_SLOPE_U_I);
        assert_eq!(run.steps()[6].message, names::SET_PR_LIM_U);
        assert_eq!(run.steps()[9].message, names::CLEARANCE);
        assert_eq!(run.steps()[10].message, names::SET_RST_STOP);
    }

    #[test]
    fn test_macro_is_reproducible() {
        let params = InitParams::default();
        let first = initialization_macro(catalog(), &params).unwrap();
        let second = initialization_macro(catalog(), &params).unwrap();
        assert_eq!(first, second);

        // Iterating does not consume the macro
        assert_eq!(first.frames().count(), 10);
        assert_eq!(first.frames().count(), 10);
    }

    #[test]
    fn test_failed_build_aborts_phase() {
        let mut params = InitParams::default();
        params.protective.power = Bounds::new(-5000.0, 500.0);

        let mut sequencer = MacroSequencer::new(catalog());
        let result = sequencer.initialize(&params);
        assert!(matches!(result, Err(CodecError::FieldOutOfRange { .. })));
        assert_eq!(sequencer.state(), SequencerState::Failed);
    }

    #[test]
    fn test_state_machine_happy_path() {
        let mut sequencer = MacroSequencer::new(catalog());
        assert_eq!(sequencer.state(), SequencerState::Idle);

        sequencer.initialize(&InitParams::default()).unwrap();
        assert_eq!(sequencer.state(), SequencerState::Running);

        sequencer.run_calibration(&CalibrationRun::voltage_800v()).unwrap();
        assert_eq!(sequencer.state(), SequencerState::Running);

        let stop = sequencer.stop().unwrap();
        assert_eq!(stop.len(), 1);
        assert_eq!(stop.steps()[0].frame.data()[4], 0);
        assert_eq!(sequencer.state(), SequencerState::Idle);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut sequencer = MacroSequencer::new(catalog());
        let result = sequencer.run_calibration(&CalibrationRun::voltage_800v());
        assert!(matches!(
            result,
            Err(CodecError::InvalidTransition {
                state: SequencerState::Idle,
                phase: Phase::CalibrationRun
            })
        ));
        assert!(sequencer.stop().is_err());
        assert!(sequencer.complete().is_err());

        sequencer.initialize(&InitParams::default()).unwrap();
        assert!(sequencer.initialize(&InitParams::default()).is_err());
        sequencer.complete().unwrap();
        assert_eq!(sequencer.state(), SequencerState::Idle);
    }

    #[test]
    fn test_system_requests() {
        let status = system_request_macro(catalog(), SystemRequest::Status).unwrap();
        let info = system_request_macro(catalog(), SystemRequest::Info).unwrap();
        assert_eq!(status.steps()[0].frame.id(), 0x288);
        assert_eq!(info.steps()[0].frame.id(), 0xFE);
        assert_eq!(info.steps()[0].frame.dlc(), 0);
    }

    #[test]
    fn test_params_from_toml() {
        let params: InitParams = toml::from_str(
            r#"
            [slopes]
            voltage = 150.0

            [protective.voltage]
            min = 10.0
            max = 1200.0
            "#,
        )
        .unwrap();
        assert_eq!(params.slopes.voltage, 150.0);
        assert_eq!(params.slopes.current, 200.0);
        assert_eq!(params.protective.voltage, Bounds::new(10.0, 1200.0));
        assert_eq!(params.operational, Limits::default());
    }
}
