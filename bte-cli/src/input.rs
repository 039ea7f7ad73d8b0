//! Parsing of command-line field assignments and hex payloads

use anyhow::{bail, Context, Result};
use bte_codec::FieldValue;

/// Parse `name=value` into a field name and value
///
/// `true`/`false` become booleans, whole numbers integers, anything else
/// numeric a float.
pub fn parse_assignment(text: &str) -> Result<(String, FieldValue)> {
    let (name, value) = text
        .split_once('=')
        .with_context(|| format!("Expected field=value, got '{}'", text))?;

    let name = name.trim();
    if name.is_empty() {
        bail!("Missing field name in '{}'", text);
    }

    Ok((name.to_string(), parse_value(value.trim())?))
}

fn parse_value(text: &str) -> Result<FieldValue> {
    match text.to_ascii_lowercase().as_str() {
        "true" => return Ok(FieldValue::Boolean(true)),
        "false" => return Ok(FieldValue::Boolean(false)),
        _ => {}
    }
    if let Ok(integer) = text.parse::<i64>() {
        return Ok(FieldValue::Integer(integer));
    }
    text.parse::<f64>()
        .map(FieldValue::Float)
        .with_context(|| format!("'{}' is not a number or boolean", text))
}

/// Parse a hex payload such as `0000484409`, `00 00 48 44` or `0x0000`
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();

    if !digits.is_ascii() {
        bail!("Hex payload '{}' contains non-hex characters", text);
    }
    if digits.len() % 2 != 0 {
        bail!("Hex payload '{}' has an odd number of digits", text);
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("Invalid hex byte '{}'", &digits[i..i + 2]))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("set_ref=800").unwrap(),
            ("set_ref".to_string(), FieldValue::Integer(800))
        );
        assert_eq!(
            parse_assignment("u_min = -0.5").unwrap(),
            ("u_min".to_string(), FieldValue::Float(-0.5))
        );
        assert_eq!(
            parse_assignment("rst_e=TRUE").unwrap().1,
            FieldValue::Boolean(true)
        );
        assert!(parse_assignment("set_ref").is_err());
        assert!(parse_assignment("=1").is_err());
        assert!(parse_assignment("set_ref=fast").is_err());
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("00004844").unwrap(), vec![0x00, 0x00, 0x48, 0x44]);
        assert_eq!(parse_hex("00 00 48 44").unwrap(), vec![0x00, 0x00, 0x48, 0x44]);
        assert_eq!(parse_hex("0x91").unwrap(), vec![0x91]);
        assert_eq!(parse_hex("de:ad").unwrap(), vec![0xDE, 0xAD]);
        assert!(parse_hex("").unwrap().is_empty());
        assert!(parse_hex("123").is_err());
        assert!(parse_hex("zz").is_err());
    }
}
