//! Typed view of the SET_REF_SWITCH_CTRL_RI control register
//!
//! [`RegisterCommand`] is what callers and the sequencer use to request a
//! state or control-mode change; it maps onto the register's catalog fields
//! and is packed by [`crate::bitfield`].

use crate::types::FieldValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// EStorage operating state (3-bit field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingState {
    #[default]
    Off,
    Standby,
    On,
}

impl OperatingState {
    pub fn code(self) -> u8 {
        match self {
            OperatingState::Off => 0,
            OperatingState::Standby => 1,
            OperatingState::On => 2,
        }
    }
}

impl fmt::Display for OperatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingState::Off => write!(f, "OFF"),
            OperatingState::Standby => write!(f, "STANDBY"),
            OperatingState::On => write!(f, "ON"),
        }
    }
}

impl FromStr for OperatingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "0" => Ok(OperatingState::Off),
            "standby" | "sby" | "1" => Ok(OperatingState::Standby),
            "on" | "2" => Ok(OperatingState::On),
            other => Err(format!("unknown operating state '{}' (off, standby, on)", other)),
        }
    }
}

/// Controller mode (3-bit field)
///
/// Codes without a name in the device manual are carried as `Raw`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ControlMode {
    #[default]
    None,
    Voltage,
    Current,
    Power,
    Resistance,
    Raw(u8),
}

impl ControlMode {
    pub fn code(self) -> u8 {
        match self {
            ControlMode::None => 0,
            ControlMode::Voltage => 1,
            ControlMode::Current => 2,
            ControlMode::Power => 3,
            ControlMode::Resistance => 4,
            ControlMode::Raw(code) => code,
        }
    }
}

impl From<u8> for ControlMode {
    fn from(code: u8) -> Self {
        match code {
            0 => ControlMode::None,
            1 => ControlMode::Voltage,
            2 => ControlMode::Current,
            3 => ControlMode::Power,
            4 => ControlMode::Resistance,
            other => ControlMode::Raw(other),
        }
    }
}

impl From<ControlMode> for u8 {
    fn from(mode: ControlMode) -> Self {
        mode.code()
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMode::None => write!(f, "none"),
            ControlMode::Voltage => write!(f, "voltage"),
            ControlMode::Current => write!(f, "current"),
            ControlMode::Power => write!(f, "power"),
            ControlMode::Resistance => write!(f, "resistance"),
            ControlMode::Raw(code) => write!(f, "mode {}", code),
        }
    }
}

impl FromStr for ControlMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ControlMode::None),
            "voltage" | "u" => Ok(ControlMode::Voltage),
            "current" | "i" => Ok(ControlMode::Current),
            "power" | "pwr" => Ok(ControlMode::Power),
            "resistance" | "r" => Ok(ControlMode::Resistance),
            other => other
                .parse::<u8>()
                .map(ControlMode::from)
                .map_err(|_| format!("unknown control mode '{}'", other)),
        }
    }
}

/// One write of the control register
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegisterCommand {
    /// Set value of the active controller
    pub reference: f64,
    pub operating_state: OperatingState,
    pub control_mode: ControlMode,
    /// Reset the charge counter (rst_q)
    #[serde(default)]
    pub reset_charge: bool,
    /// Reset the energy counter (rst_e)
    #[serde(default)]
    pub reset_energy: bool,
    /// Inner resistance, transmitted as a truncated float
    #[serde(default)]
    pub inner_resistance: f64,
}

impl RegisterCommand {
    /// Command with zero reference, no resets and zero inner resistance
    pub fn new(operating_state: OperatingState, control_mode: ControlMode) -> Self {
        Self {
            reference: 0.0,
            operating_state,
            control_mode,
            reset_charge: false,
            reset_energy: false,
            inner_resistance: 0.0,
        }
    }

    pub fn with_reference(mut self, reference: f64) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_resets(mut self, reset_charge: bool, reset_energy: bool) -> Self {
        self.reset_charge = reset_charge;
        self.reset_energy = reset_energy;
        self
    }

    pub fn with_inner_resistance(mut self, inner_resistance: f64) -> Self {
        self.inner_resistance = inner_resistance;
        self
    }

    /// Named field values in the register's catalog vocabulary
    pub fn field_values(&self) -> [(&'static str, FieldValue); 6] {
        [
            ("set_ref", FieldValue::Float(self.reference)),
            ("operating_state", FieldValue::Integer(self.operating_state.code() as i64)),
            ("control_mode", FieldValue::Integer(self.control_mode.code() as i64)),
            ("rst_q", FieldValue::Boolean(self.reset_charge)),
            ("rst_e", FieldValue::Boolean(self.reset_energy)),
            ("set_ri", FieldValue::Float(self.inner_resistance)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parsing() {
        assert_eq!("standby".parse::<OperatingState>().unwrap(), OperatingState::Standby);
        assert_eq!("SBY".parse::<OperatingState>().unwrap(), OperatingState::Standby);
        assert_eq!("2".parse::<OperatingState>().unwrap(), OperatingState::On);
        assert!("idle".parse::<OperatingState>().is_err());
    }

    #[test]
    fn test_control_mode_codes() {
        assert_eq!(ControlMode::from(2), ControlMode::Current);
        assert_eq!(ControlMode::from(6), ControlMode::Raw(6));
        assert_eq!("voltage".parse::<ControlMode>().unwrap().code(), 1);
        assert_eq!("7".parse::<ControlMode>().unwrap(), ControlMode::Raw(7));
        assert!("fast".parse::<ControlMode>().is_err());
    }

    #[test]
    fn test_field_values_order() {
        let command = RegisterCommand::new(OperatingState::Standby, ControlMode::Current)
            .with_resets(false, true);
        let names: Vec<_> = command.field_values().iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec!["set_ref", "operating_state", "control_mode", "rst_q", "rst_e", "set_ri"]
        );
        assert_eq!(command.field_values()[4].1, FieldValue::Boolean(true));
    }
}
