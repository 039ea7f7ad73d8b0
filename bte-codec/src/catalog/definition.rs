//! Message and field definitions
//!
//! A [`MessageDefinition`] is the single source of truth for a payload's
//! layout. The scalar codec and the register packer read offsets, widths and
//! scaling from here and never hard-code them.
//!
//! Bit offsets use LSB-first numbering: bit `n` is bit `n % 8` of payload
//! byte `n / 8`.

use crate::types::{CodecError, FieldValue, Result, MAX_DLC, MAX_EXTENDED_ID, MAX_STANDARD_ID};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A CAN message definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDefinition {
    /// CAN arbitration id
    pub id: u32,
    /// Message name, unique within a catalog
    pub name: String,
    /// Payload size in bytes (DLC)
    pub length: usize,
    /// True if `id` is a 29-bit id
    #[serde(default)]
    pub extended: bool,
    /// Advisory send frequency in Hz (not enforced)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periodicity: Option<f64>,
    /// Free text for catalog audits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Fields in declared (encoding) order
    #[serde(default, rename = "field")]
    pub fields: Vec<FieldSpec>,
}

/// A single field within a message payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name, unique within its message
    pub name: String,
    /// Bit offset of the least significant bit
    pub offset: u32,
    /// Multiplier applied before encoding, divided out after decoding
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Minimum engineering value (inclusive)
    pub min: f64,
    /// Maximum engineering value (inclusive)
    pub max: f64,
    /// Engineering unit (e.g. "V", "A", "kW")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// On-wire numeric representation
    pub kind: FieldKind,
}

fn default_scale() -> f64 {
    1.0
}

/// On-wire numeric representation of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// 32-bit IEEE-754 float
    Float32,
    /// Unsigned integer of `bits` width
    Unsigned { bits: u32 },
    /// Two's complement signed integer of `bits` width
    Signed { bits: u32 },
    /// IEEE-754 single of which only the `bytes` most significant bytes
    /// are transmitted
    TruncatedFloat { bytes: u32 },
}

impl FieldKind {
    /// Width of the field on the wire, in bits
    pub fn width_bits(&self) -> u32 {
        match self {
            FieldKind::Float32 => 32,
            FieldKind::Unsigned { bits } | FieldKind::Signed { bits } => *bits,
            FieldKind::TruncatedFloat { bytes } => bytes * 8,
        }
    }

    /// True for integer representations
    pub fn is_integer(&self) -> bool {
        matches!(self, FieldKind::Unsigned { .. } | FieldKind::Signed { .. })
    }

    /// Check whether a raw integer fits this representation
    pub fn fits(&self, raw: i64) -> bool {
        match *self {
            FieldKind::Unsigned { bits } => raw >= 0 && (bits >= 63 || raw < (1i64 << bits)),
            FieldKind::Signed { bits } => {
                bits >= 64 || (raw >= -(1i64 << (bits - 1)) && raw < (1i64 << (bits - 1)))
            }
            FieldKind::Float32 | FieldKind::TruncatedFloat { .. } => true,
        }
    }
}

impl FieldSpec {
    /// Width of the field in bits
    pub fn width(&self) -> u32 {
        self.kind.width_bits()
    }

    /// First payload byte touched by this field
    pub fn byte_offset(&self) -> usize {
        (self.offset / 8) as usize
    }

    /// True if the field starts and ends on byte boundaries
    pub fn is_byte_aligned(&self) -> bool {
        self.offset % 8 == 0 && self.width() % 8 == 0
    }

    /// True for integer fields that must go through the bit-field packer
    pub fn is_sub_byte(&self) -> bool {
        self.kind.is_integer() && !self.is_byte_aligned()
    }

    /// Closed-interval range check on the engineering value (NaN never passes)
    pub fn check_range(&self, value: f64) -> Result<()> {
        if value.is_nan() || value < self.min || value > self.max {
            log::warn!(
                "Field '{}' rejected value {} (range [{}, {}])",
                self.name,
                value,
                self.min,
                self.max
            );
            return Err(CodecError::FieldOutOfRange {
                field: self.name.clone(),
                value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    /// Scale an engineering value into the float written on the wire
    pub fn scaled_float(&self, value: f64) -> f32 {
        (value * self.scale) as f32
    }

    /// Scale and round an engineering value into its raw integer
    pub fn raw_integer(&self, value: f64) -> Result<i64> {
        let raw = (value * self.scale).round();
        let in_i64 = raw >= i64::MIN as f64 && raw < i64::MAX as f64;
        if !in_i64 || !self.kind.fits(raw as i64) {
            return Err(CodecError::BitFieldOverflow {
                field: self.name.clone(),
                value: raw as i64,
                width: self.width(),
            });
        }
        Ok(raw as i64)
    }

    /// Convert a raw integer read from the wire into its engineering value
    ///
    /// Unscaled fields stay integers (single-bit unsigned fields become
    /// booleans); scaled fields become floats.
    pub fn integer_value(&self, raw: i64) -> FieldValue {
        if self.scale != 1.0 {
            return FieldValue::Float(raw as f64 / self.scale);
        }
        match self.kind {
            FieldKind::Unsigned { bits: 1 } => FieldValue::Boolean(raw != 0),
            _ => FieldValue::Integer(raw),
        }
    }

    /// Convert a float read from the wire into its engineering value
    pub fn float_value(&self, raw: f32) -> FieldValue {
        FieldValue::Float(raw as f64 / self.scale)
    }

    /// Check the field on its own, returning the reason on failure
    fn validate(&self) -> std::result::Result<(), String> {
        match self.kind {
            FieldKind::Unsigned { bits } | FieldKind::Signed { bits } if bits == 0 || bits > 64 => {
                return Err(format!("integer width {} is not in 1..=64", bits));
            }
            FieldKind::TruncatedFloat { bytes } if bytes == 0 || bytes > 3 => {
                return Err(format!("truncated float keeps {} bytes, expected 1..=3", bytes));
            }
            FieldKind::Float32 | FieldKind::TruncatedFloat { .. } if self.offset % 8 != 0 => {
                return Err(format!("float at bit {} is not byte aligned", self.offset));
            }
            _ => {}
        }

        if !self.scale.is_finite() || self.scale == 0.0 {
            return Err(format!("scale {} must be finite and non-zero", self.scale));
        }
        if !(self.min <= self.max) {
            return Err(format!("min {} is greater than max {}", self.min, self.max));
        }

        if self.kind.is_integer() {
            for bound in [self.min, self.max] {
                let raw = (bound * self.scale).round();
                if !raw.is_finite() || !self.kind.fits(raw as i64) {
                    return Err(format!(
                        "bound {} scales to {} which does not fit in {} bits",
                        bound,
                        raw,
                        self.width()
                    ));
                }
            }
        }

        Ok(())
    }
}

impl MessageDefinition {
    /// Find a field by name
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of all fields in declared order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// True if any field is sub-byte or truncated, i.e. the payload needs the
    /// register packer rather than the plain scalar codec
    pub fn is_bit_packed(&self) -> bool {
        self.fields
            .iter()
            .any(|f| f.is_sub_byte() || matches!(f.kind, FieldKind::TruncatedFloat { .. }))
    }

    /// Validate id, length and field layout
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| {
            CodecError::InvalidCatalog(format!("message '{}' (0x{:X}): {}", self.name, self.id, reason))
        };

        let max_id = if self.extended { MAX_EXTENDED_ID } else { MAX_STANDARD_ID };
        if self.id > max_id {
            return Err(invalid(format!("id exceeds 0x{:X}", max_id)));
        }
        if self.name.is_empty() {
            return Err(invalid("empty name".to_string()));
        }
        if self.length > MAX_DLC {
            return Err(invalid(format!("length {} exceeds {}", self.length, MAX_DLC)));
        }

        let payload_bits = self.length as u32 * 8;
        let mut names = HashSet::new();
        let mut spans = Vec::with_capacity(self.fields.len());

        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field '{}'", field.name)));
            }
            field
                .validate()
                .map_err(|reason| invalid(format!("field '{}': {}", field.name, reason)))?;

            let end = field.offset.checked_add(field.width()).ok_or_else(|| {
                invalid(format!("field '{}' offset {} is out of range", field.name, field.offset))
            })?;
            if end > payload_bits {
                return Err(invalid(format!(
                    "field '{}' ends at bit {} beyond the {}-bit payload",
                    field.name, end, payload_bits
                )));
            }
            spans.push((field.offset, end, field.name.as_str()));
        }

        spans.sort_unstable();
        for pair in spans.windows(2) {
            if pair[1].0 < pair[0].1 {
                return Err(invalid(format!(
                    "fields '{}' and '{}' overlap",
                    pair[0].2, pair[1].2
                )));
            }
        }

        Ok(())
    }
}
