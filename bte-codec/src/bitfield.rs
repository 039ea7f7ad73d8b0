//! Bit-field register packer
//!
//! Some BTE messages pack several narrow fields into a single byte and carry
//! values truncated to fewer than four bytes. The control register (0x0C1) is
//! the prime example:
//!
//! ```text
//! byte  0..4   set_ref            f32, little-endian
//! byte  4      bit 0..3  operating_state
//!              bit 3..6  control_mode
//!              bit 6     rst_q
//!              bit 7     rst_e
//! byte  5..8   set_ri             f32 without its least significant byte
//! ```
//!
//! The packing rule lives here once; offsets and widths come from the
//! catalog.

use crate::catalog::{FieldKind, FieldSpec, MessageDefinition};
use crate::codec;
use crate::types::{CodecError, FieldValue, Result};

/// One entry of a tagged bit-field list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField<'a> {
    /// Name used in error reports
    pub name: &'a str,
    /// Raw unsigned value (two's complement for signed fields)
    pub value: u64,
    /// Width in bits
    pub width: u32,
}

impl<'a> BitField<'a> {
    pub fn new(name: &'a str, value: u64, width: u32) -> Self {
        Self { name, value, width }
    }
}

/// Compose fields into one integer, LSB first
///
/// Each value is shifted left by the total width of the fields packed before
/// it and OR-ed into the accumulator.
pub fn pack_bits(fields: &[BitField<'_>]) -> Result<u64> {
    let mut packed: u64 = 0;
    let mut shift: u32 = 0;

    for field in fields {
        let overflow = || CodecError::BitFieldOverflow {
            field: field.name.to_string(),
            value: field.value as i64,
            width: field.width,
        };

        if field.width == 0 || shift + field.width > 64 {
            return Err(overflow());
        }
        if field.width < 64 && field.value >> field.width != 0 {
            return Err(overflow());
        }

        packed |= field.value << shift;
        shift += field.width;
    }

    Ok(packed)
}

/// Split a packed integer back into fields of the given widths, LSB first
pub fn unpack_bits(packed: u64, widths: &[u32]) -> Vec<u64> {
    let mut shift: u32 = 0;
    widths
        .iter()
        .map(|&width| {
            let value = packed.checked_shr(shift).unwrap_or(0) & mask(width);
            shift += width;
            value
        })
        .collect()
}

/// Encode `value` as a little-endian IEEE-754 single and keep only its
/// `keep_bytes` most significant bytes (still in little-endian order)
///
/// This is lossy: the dropped bytes carry the lowest mantissa bits.
pub fn truncate_float_bytes(value: f32, keep_bytes: usize) -> Vec<u8> {
    let full = value.to_le_bytes();
    let keep = keep_bytes.min(full.len());
    full[full.len() - keep..].to_vec()
}

/// Rebuild an approximation of a truncated float by zero-filling the dropped
/// least significant bytes
pub fn expand_truncated_float(bytes: &[u8]) -> f32 {
    let mut full = [0u8; 4];
    let kept = &bytes[bytes.len().saturating_sub(4)..];
    full[4 - kept.len()..].copy_from_slice(kept);
    f32::from_le_bytes(full)
}

/// Encode a bit-packed definition from ordered values
///
/// All ranges are checked first. Each run of sub-byte fields that sit back to
/// back is packed with [`pack_bits`] and written at the run's bit offset; only
/// the run's own bits are touched, so fields declared in a gap keep their
/// value. Byte-aligned and truncated fields go through the scalar codec.
pub fn encode_register(definition: &MessageDefinition, values: &[FieldValue]) -> Result<Vec<u8>> {
    codec::check_values(definition, values)?;

    let mut payload = vec![0u8; definition.length];
    let mut run: Vec<(&FieldSpec, f64)> = Vec::new();

    for (field, value) in definition.fields.iter().zip(values) {
        if !field.is_sub_byte() {
            codec::write_field(&mut payload, field, value.as_f64())?;
            continue;
        }

        let adjacent = run
            .last()
            .map_or(true, |(last, _)| field.offset == last.offset + last.width());
        if !adjacent {
            write_run(&mut payload, &run)?;
            run.clear();
        }
        run.push((field, value.as_f64()));
    }
    write_run(&mut payload, &run)?;

    Ok(payload)
}

/// Decode a bit-packed definition into ordered values
///
/// Truncated floats decode to the approximation retained on the wire.
pub fn decode_register(definition: &MessageDefinition, payload: &[u8]) -> Result<Vec<FieldValue>> {
    codec::check_length(definition, payload)?;

    definition
        .fields
        .iter()
        .map(|field| {
            if !field.is_sub_byte() {
                return codec::read_field(payload, field);
            }
            let width = field.width();
            let raw = read_bits(payload, field.offset as usize, width);
            let value = match field.kind {
                FieldKind::Signed { .. } => to_signed(raw, width),
                _ => raw as i64,
            };
            Ok(field.integer_value(value))
        })
        .collect()
}

/// Pack one run of adjacent sub-byte fields and write it into the payload
fn write_run(payload: &mut [u8], run: &[(&FieldSpec, f64)]) -> Result<()> {
    let Some((first, _)) = run.first() else {
        return Ok(());
    };

    let bits = run
        .iter()
        .map(|(field, value)| {
            let width = field.width();
            let raw = field.raw_integer(*value)?;
            Ok(BitField::new(&field.name, raw as u64 & mask(width), width))
        })
        .collect::<Result<Vec<_>>>()?;
    let width: u32 = bits.iter().map(|b| b.width).sum();

    let packed = pack_bits(&bits)?;
    log::trace!(
        "Packed bits {}..{} = {:#b}",
        first.offset,
        first.offset + width,
        packed
    );
    write_bits(payload, first.offset as usize, width, packed);
    Ok(())
}

fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Byte index and in-byte mask of payload bit `bit` (LSB-first numbering)
fn locate(bit: usize) -> (usize, u8) {
    (bit / 8, 1 << (bit % 8))
}

/// Overwrite exactly `width` bits starting at `offset` with the low bits of
/// `value`; bits outside that span are left alone
fn write_bits(payload: &mut [u8], offset: usize, width: u32, value: u64) {
    for i in 0..width as usize {
        let (byte, bit) = locate(offset + i);
        let Some(slot) = payload.get_mut(byte) else {
            break;
        };
        if value >> i & 1 == 1 {
            *slot |= bit;
        } else {
            *slot &= !bit;
        }
    }
}

/// Read `width` bits starting at `offset`, LSB first
fn read_bits(payload: &[u8], offset: usize, width: u32) -> u64 {
    (0..width as usize)
        .filter(|i| {
            let (byte, bit) = locate(offset + i);
            payload.get(byte).map_or(false, |b| b & bit != 0)
        })
        .fold(0u64, |acc, i| acc | 1 << i)
}

/// Interpret the low `width` bits of `raw` as two's complement
fn to_signed(raw: u64, width: u32) -> i64 {
    match width {
        0 => 0,
        w if w >= 64 => raw as i64,
        _ => {
            let unused = 64 - width;
            ((raw << unused) as i64) >> unused
        }
    }
}
