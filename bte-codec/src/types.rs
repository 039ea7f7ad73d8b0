//! Core types for the BTE calibration codec
//!
//! This module defines the values that flow through the codec: the engineering
//! [`FieldValue`] a caller supplies, the immutable [`Frame`] handed to a
//! transport, and the library-wide error type. Nothing in here holds state.

use crate::catalog::MessageKey;
use crate::sequencer::{Phase, SequencerState};
use crate::transport::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Highest 11-bit (standard) arbitration id
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Highest 29-bit (extended) arbitration id
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Maximum payload length of a classic CAN frame
pub const MAX_DLC: usize = 8;

/// A transport-ready CAN frame
///
/// Frames are self-contained and byte-exact: they carry no reference to the
/// message definition they were built from. Once constructed they cannot be
/// modified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Frame {
    id: u32,
    data: Vec<u8>,
    is_extended: bool,
}

impl Frame {
    /// Create a frame, rejecting ids outside the 11/29-bit range and
    /// payloads longer than 8 bytes
    pub fn new(id: u32, data: &[u8], is_extended: bool) -> Result<Self> {
        let max_id = if is_extended { MAX_EXTENDED_ID } else { MAX_STANDARD_ID };
        if id > max_id {
            return Err(CodecError::InvalidFrame(format!(
                "arbitration id 0x{:X} exceeds 0x{:X}",
                id, max_id
            )));
        }
        if data.len() > MAX_DLC {
            return Err(CodecError::InvalidFrame(format!(
                "payload of {} bytes exceeds DLC {}",
                data.len(),
                MAX_DLC
            )));
        }

        Ok(Self {
            id,
            data: data.to_vec(),
            is_extended,
        })
    }

    /// CAN arbitration id
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Raw payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// True if this frame uses a 29-bit id
    pub fn is_extended(&self) -> bool {
        self.is_extended
    }

    /// Data length code - number of payload bytes
    pub fn dlc(&self) -> usize {
        self.data.len()
    }

    /// Payload as space separated upper-case hex, e.g. `00 00 48 44`
    pub fn hex_payload(&self) -> String {
        bytes_to_hex(&self.data)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_extended {
            write!(f, "0x{:08X}", self.id)?;
        } else {
            write!(f, "0x{:03X}", self.id)?;
        }
        write!(f, " [{}]", self.dlc())?;
        if !self.data.is_empty() {
            write!(f, " {}", self.hex_payload())?;
        }
        Ok(())
    }
}

/// Format bytes as space separated upper-case hex
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Errors that can occur while encoding, decoding or sequencing
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Unknown message: {0}")]
    UnknownMessage(MessageKey),

    #[error("Field '{field}' value {value} is out of range [{min}, {max}]")]
    FieldOutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Message '{message}' is missing field '{field}'")]
    MissingField { message: String, field: String },

    #[error("Message '{message}' does not declare field '{field}' (or it was given twice)")]
    UnexpectedField { message: String, field: String },

    #[error("Message '{message}' declares {expected} fields, got {actual} values")]
    FieldCountMismatch {
        message: String,
        expected: usize,
        actual: usize,
    },

    #[error("Message '{message}' expects {expected} payload bytes, got {actual}")]
    PayloadLengthMismatch {
        message: String,
        expected: usize,
        actual: usize,
    },

    #[error("Bit field '{field}' value {value} does not fit in {width} bits")]
    BitFieldOverflow { field: String, value: i64, width: u32 },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("Cannot start {phase} while the sequencer is {state}")]
    InvalidTransition {
        state: SequencerState,
        phase: Phase,
    },

    #[error("Transport failure on frame {index} ({message}): {source}")]
    TransportFailure {
        index: usize,
        message: String,
        #[source]
        source: TransportError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Engineering value of a single field
///
/// Callers supply whichever variant is natural; the codec only looks at the
/// numeric value. Decoding returns the variant matching the field's kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean value (single-bit flags)
    Boolean(bool),
    /// Signed integer value
    Integer(i64),
    /// Floating-point value (after scaling)
    Float(f64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{:.3}", v),
            FieldValue::Boolean(v) => write!(f, "{}", if *v { "true" } else { "false" }),
        }
    }
}

impl FieldValue {
    /// Convert to f64, the representation used for range checks and scaling
    pub fn as_f64(&self) -> f64 {
        match self {
            FieldValue::Integer(v) => *v as f64,
            FieldValue::Float(v) => *v,
            FieldValue::Boolean(v) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Convert to i64 if possible (floats are truncated)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            FieldValue::Float(v) if v.is_finite() => Some(*v as i64),
            FieldValue::Float(_) => None,
            FieldValue::Boolean(v) => Some(if *v { 1 } else { 0 }),
        }
    }

    /// Non-zero values are true
    pub fn as_bool(&self) -> bool {
        match self {
            FieldValue::Boolean(v) => *v,
            FieldValue::Integer(v) => *v != 0,
            FieldValue::Float(v) => *v != 0.0,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        FieldValue::Float(value as f64)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(value as i64)
    }
}

impl From<u8> for FieldValue {
    fn from(value: u8) -> Self {
        FieldValue::Integer(value as i64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}
