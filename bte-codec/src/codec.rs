//! Scalar codec
//!
//! Serializes byte-aligned fields (32-bit floats, signed/unsigned integers of
//! whole bytes) into little-endian payloads at the offsets declared in the
//! catalog. The least significant byte always lands at the lowest payload
//! index; there is no per-message byte order override.
//!
//! Messages with sub-byte or truncated fields go through
//! [`crate::bitfield`]; [`encode_payload`] and [`decode_payload`] pick the
//! right path for any definition.

use crate::bitfield;
use crate::catalog::{FieldKind, FieldSpec, MessageDefinition};
use crate::types::{CodecError, FieldValue, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Encode ordered values (one per declared field) into a payload
///
/// Every value is range-checked before anything is written.
pub fn encode(definition: &MessageDefinition, values: &[FieldValue]) -> Result<Vec<u8>> {
    check_values(definition, values)?;
    reject_bit_packed(definition)?;

    let mut payload = vec![0u8; definition.length];
    for (field, value) in definition.fields.iter().zip(values) {
        write_field(&mut payload, field, value.as_f64())?;
    }
    Ok(payload)
}

/// Decode a payload into ordered values (one per declared field)
pub fn decode(definition: &MessageDefinition, payload: &[u8]) -> Result<Vec<FieldValue>> {
    check_length(definition, payload)?;
    reject_bit_packed(definition)?;

    definition
        .fields
        .iter()
        .map(|field| read_field(payload, field))
        .collect()
}

/// Encode any definition, routing bit-packed ones to the register packer
pub fn encode_payload(definition: &MessageDefinition, values: &[FieldValue]) -> Result<Vec<u8>> {
    if definition.is_bit_packed() {
        bitfield::encode_register(definition, values)
    } else {
        encode(definition, values)
    }
}

/// Decode any definition, routing bit-packed ones to the register packer
pub fn decode_payload(definition: &MessageDefinition, payload: &[u8]) -> Result<Vec<FieldValue>> {
    if definition.is_bit_packed() {
        bitfield::decode_register(definition, payload)
    } else {
        decode(definition, payload)
    }
}

/// Check the value count and every field range
pub(crate) fn check_values(definition: &MessageDefinition, values: &[FieldValue]) -> Result<()> {
    if values.len() != definition.fields.len() {
        return Err(CodecError::FieldCountMismatch {
            message: definition.name.clone(),
            expected: definition.fields.len(),
            actual: values.len(),
        });
    }
    for (field, value) in definition.fields.iter().zip(values) {
        field.check_range(value.as_f64())?;
    }
    Ok(())
}

pub(crate) fn check_length(definition: &MessageDefinition, payload: &[u8]) -> Result<()> {
    if payload.len() != definition.length {
        return Err(CodecError::PayloadLengthMismatch {
            message: definition.name.clone(),
            expected: definition.length,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn reject_bit_packed(definition: &MessageDefinition) -> Result<()> {
    if definition.is_bit_packed() {
        return Err(CodecError::InvalidCatalog(format!(
            "message '{}' has bit-packed fields and needs the register packer",
            definition.name
        )));
    }
    Ok(())
}

/// Write one byte-aligned field. The value must already be range-checked.
pub(crate) fn write_field(payload: &mut [u8], field: &FieldSpec, value: f64) -> Result<()> {
    let start = field.byte_offset();
    let len = (field.width() / 8) as usize;
    let bytes = &mut payload[start..start + len];

    match field.kind {
        FieldKind::Float32 => LittleEndian::write_f32(bytes, field.scaled_float(value)),
        FieldKind::Unsigned { .. } => {
            let raw = field.raw_integer(value)?;
            LittleEndian::write_uint(bytes, raw as u64, len);
        }
        FieldKind::Signed { .. } => {
            let raw = field.raw_integer(value)?;
            LittleEndian::write_int(bytes, raw, len);
        }
        FieldKind::TruncatedFloat { .. } => {
            bytes.copy_from_slice(&bitfield::truncate_float_bytes(field.scaled_float(value), len));
        }
    }
    Ok(())
}

/// Read one byte-aligned field
pub(crate) fn read_field(payload: &[u8], field: &FieldSpec) -> Result<FieldValue> {
    let start = field.byte_offset();
    let len = (field.width() / 8) as usize;
    let bytes = &payload[start..start + len];

    let value = match field.kind {
        FieldKind::Float32 => field.float_value(LittleEndian::read_f32(bytes)),
        FieldKind::Unsigned { .. } => field.integer_value(LittleEndian::read_uint(bytes, len) as i64),
        FieldKind::Signed { .. } => field.integer_value(LittleEndian::read_int(bytes, len)),
        FieldKind::TruncatedFloat { .. } => {
            field.float_value(bitfield::expand_truncated_float(bytes))
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{names, MessageCatalog};

    fn definition(name: &str) -> &'static MessageDefinition {
        MessageCatalog::builtin().by_name(name).unwrap()
    }

    fn scaled_message() -> MessageDefinition {
        MessageDefinition {
            id: 0x300,
            name: "SET_GAIN".to_string(),
            length: 4,
            extended: false,
            periodicity: None,
            description: None,
            fields: vec![
                FieldSpec {
                    name: "gain".to_string(),
                    offset: 0,
                    scale: 100.0,
                    min: -10.0,
                    max: 10.0,
                    unit: None,
                    kind: FieldKind::Signed { bits: 16 },
                },
                FieldSpec {
                    name: "count".to_string(),
                    offset: 16,
                    scale: 1.0,
                    min: 0.0,
                    max: 65535.0,
                    unit: None,
                    kind: FieldKind::Unsigned { bits: 16 },
                },
            ],
        }
    }

    #[test]
    fn test_encode_float_pair_little_endian() {
        let payload = encode(
            definition(names::SET_SLOPE_U_I),
            &[FieldValue::Float(200.0), FieldValue::Float(1.0)],
        )
        .unwrap();
        // 200.0f32 = 0x43480000, 1.0f32 = 0x3F800000
        assert_eq!(payload, vec![0x00, 0x00, 0x48, 0x43, 0x00, 0x00, 0x80, 0x3F]);
    }

    #[test]
    fn test_encode_mixed_float_and_integer() {
        let payload = encode(
            definition(names::SET_SLOPE_PWR_FILTER),
            &[FieldValue::Float(200.0), FieldValue::Integer(3)],
        )
        .unwrap();
        assert_eq!(payload, vec![0x00, 0x00, 0x48, 0x43, 0x03]);
    }

    #[test]
    fn test_scaled_signed_integer() {
        let msg = scaled_message();
        let payload = encode(&msg, &[FieldValue::Float(-1.5), FieldValue::Integer(0x1234)]).unwrap();
        // -150 = 0xFF6A
        assert_eq!(payload, vec![0x6A, 0xFF, 0x34, 0x12]);

        let decoded = decode(&msg, &payload).unwrap();
        assert_eq!(decoded, vec![FieldValue::Float(-1.5), FieldValue::Integer(0x1234)]);
    }

    #[test]
    fn test_round_trip_limits() {
        let msg = definition(names::SET_OP_LIM_I);
        let values = vec![FieldValue::Float(-900.0), FieldValue::Float(900.0)];
        let payload = encode(msg, &values).unwrap();
        assert_eq!(decode(msg, &payload).unwrap(), values);
    }

    #[test]
    fn test_range_boundaries() {
        let msg = definition(names::SET_OP_LIM_U);
        assert!(encode(msg, &[FieldValue::Float(0.0), FieldValue::Float(1500.0)]).is_ok());

        let below = encode(msg, &[FieldValue::Float(-0.1), FieldValue::Float(1400.0)]);
        match below {
            Err(CodecError::FieldOutOfRange { field, value, min, max }) => {
                assert_eq!(field, "u_min");
                assert_eq!(value, -0.1);
                assert_eq!((min, max), (0.0, 1500.0));
            }
            other => panic!("expected FieldOutOfRange, got {:?}", other),
        }

        let above = encode(msg, &[FieldValue::Float(0.0), FieldValue::Float(1500.5)]);
        assert!(matches!(above, Err(CodecError::FieldOutOfRange { .. })));

        let nan = encode(msg, &[FieldValue::Float(f64::NAN), FieldValue::Float(1.0)]);
        assert!(matches!(nan, Err(CodecError::FieldOutOfRange { .. })));
    }

    #[test]
    fn test_value_count_mismatch() {
        let msg = definition(names::SET_OP_LIM_U);
        let result = encode(msg, &[FieldValue::Float(0.0)]);
        assert!(matches!(
            result,
            Err(CodecError::FieldCountMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_decode_length_mismatch() {
        let msg = definition(names::SET_RST_STOP);
        let result = decode(msg, &[0x01, 0x00]);
        assert!(matches!(
            result,
            Err(CodecError::PayloadLengthMismatch { expected: 1, actual: 2, .. })
        ));
    }

    #[test]
    fn test_plain_codec_refuses_register() {
        let msg = definition(names::SET_REF_SWITCH_CTRL_RI);
        assert!(decode(msg, &[0u8; 8]).is_err());
        assert!(decode_payload(msg, &[0u8; 8]).is_ok());
    }

    #[test]
    fn test_empty_request_message() {
        let msg = definition(names::REQ_SYSTEM_STATUS);
        assert_eq!(encode_payload(msg, &[]).unwrap(), Vec::<u8>::new());
        assert!(decode_payload(msg, &[]).unwrap().is_empty());
    }
}
