//! Built-in message table for the BTE (TAS → EStorage) calibration protocol
//!
//! Ids 0x0C1, 0x144, 0x21F, 0x288 and 0x0FE are taken from the device
//! manual. The slope/filter, limit and clearance ids are provisional and must
//! be reconciled with the firmware documentation; deployments can override
//! the whole table with a TOML catalog file.

use super::definition::{FieldKind, FieldSpec, MessageDefinition};
use super::names;

/// Voltage range accepted by the limit messages (V)
const VOLTAGE_RANGE: (f64, f64) = (0.0, 1500.0);
/// Current range accepted by the limit messages (A)
const CURRENT_RANGE: (f64, f64) = (-1000.0, 1000.0);
/// Power range accepted by the limit messages (kW)
const POWER_RANGE: (f64, f64) = (-1000.0, 1000.0);
/// Slope range (%)
const SLOPE_RANGE: (f64, f64) = (0.0, 1000.0);
/// Reference value range of the control register
const REFERENCE_RANGE: (f64, f64) = (-2000.0, 2000.0);
/// Inner resistance range of the control register (mOhm)
const RESISTANCE_RANGE: (f64, f64) = (-2000.0, 2000.0);

pub(super) fn messages() -> Vec<MessageDefinition> {
    vec![
        MessageDefinition {
            id: 0x0C1,
            name: names::SET_REF_SWITCH_CTRL_RI.to_string(),
            length: 8,
            extended: false,
            periodicity: Some(10.0),
            description: Some(
                "Set value, operating state, control mode, reset flags and inner resistance"
                    .to_string(),
            ),
            fields: vec![
                float("set_ref", 0, REFERENCE_RANGE, None),
                unsigned("operating_state", 32, 3, 7.0),
                unsigned("control_mode", 35, 3, 7.0),
                unsigned("rst_q", 38, 1, 1.0),
                unsigned("rst_e", 39, 1, 1.0),
                FieldSpec {
                    kind: FieldKind::TruncatedFloat { bytes: 3 },
                    ..float("set_ri", 40, RESISTANCE_RANGE, Some("mOhm"))
                },
            ],
        },
        MessageDefinition {
            id: 0x144,
            name: names::SET_SLOPE_U_I.to_string(),
            length: 8,
            extended: false,
            periodicity: None,
            description: Some("Voltage and current slopes".to_string()),
            fields: vec![
                float("slope_voltage", 0, SLOPE_RANGE, Some("%")),
                float("slope_current", 32, SLOPE_RANGE, Some("%")),
            ],
        },
        MessageDefinition {
            id: 0x145,
            name: names::SET_SLOPE_PWR_FILTER.to_string(),
            length: 5,
            extended: false,
            periodicity: None,
            description: Some("Power slope and measurement filter".to_string()),
            fields: vec![
                float("slope_power", 0, SLOPE_RANGE, Some("%")),
                unsigned("filter", 32, 8, 255.0),
            ],
        },
        limit_message(0x150, names::SET_OP_LIM_U, "u", VOLTAGE_RANGE, "V", "Operational voltage limits"),
        limit_message(0x151, names::SET_OP_LIM_I, "i", CURRENT_RANGE, "A", "Operational current limits"),
        limit_message(0x152, names::SET_OP_LIM_PWR, "pwr", POWER_RANGE, "kW", "Operational power limits"),
        limit_message(0x160, names::SET_PR_LIM_U, "u", VOLTAGE_RANGE, "V", "Protective voltage limits"),
        limit_message(0x161, names::SET_PR_LIM_I, "i", CURRENT_RANGE, "A", "Protective current limits"),
        limit_message(0x162, names::SET_PR_LIM_PWR, "pwr", POWER_RANGE, "kW", "Protective power limits"),
        MessageDefinition {
            id: 0x170,
            name: names::CLEARANCE.to_string(),
            length: 1,
            extended: false,
            periodicity: None,
            description: Some("Release the configured operating envelope".to_string()),
            fields: vec![unsigned("clearance", 0, 8, 1.0)],
        },
        MessageDefinition {
            id: 0x21F,
            name: names::SET_RST_STOP.to_string(),
            length: 1,
            extended: false,
            periodicity: None,
            description: Some(
                "Reset standby/critical errors (critical errors require state OFF)".to_string(),
            ),
            fields: vec![unsigned("rst_stop", 0, 8, 255.0)],
        },
        request_message(0x288, names::REQ_SYSTEM_STATUS, "Request system status (answered on 0x518/0x528)"),
        request_message(0x0FE, names::REQ_SYSTEM_INFO, "Request system information"),
    ]
}

fn float(name: &str, offset: u32, range: (f64, f64), unit: Option<&str>) -> FieldSpec {
    FieldSpec {
        name: name.to_string(),
        offset,
        scale: 1.0,
        min: range.0,
        max: range.1,
        unit: unit.map(str::to_string),
        kind: FieldKind::Float32,
    }
}

fn unsigned(name: &str, offset: u32, bits: u32, max: f64) -> FieldSpec {
    FieldSpec {
        name: name.to_string(),
        offset,
        scale: 1.0,
        min: 0.0,
        max,
        unit: None,
        kind: FieldKind::Unsigned { bits },
    }
}

/// Min/max pair of 32-bit floats. Minimum first: the declared order is what
/// the codec serializes.
fn limit_message(
    id: u32,
    name: &str,
    quantity: &str,
    range: (f64, f64),
    unit: &str,
    description: &str,
) -> MessageDefinition {
    MessageDefinition {
        id,
        name: name.to_string(),
        length: 8,
        extended: false,
        periodicity: None,
        description: Some(description.to_string()),
        fields: vec![
            float(&format!("{}_min", quantity), 0, range, Some(unit)),
            float(&format!("{}_max", quantity), 32, range, Some(unit)),
        ],
    }
}

fn request_message(id: u32, name: &str, description: &str) -> MessageDefinition {
    MessageDefinition {
        id,
        name: name.to_string(),
        length: 0,
        extended: false,
        periodicity: None,
        description: Some(description.to_string()),
        fields: Vec::new(),
    }
}
