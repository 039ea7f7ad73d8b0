//! Frame builder
//!
//! Turns named engineering values into an immutable [`Frame`] for a catalog
//! entry. The named set must match the declared fields exactly; the payload
//! itself is produced by the scalar codec or the register packer.

use crate::catalog::{names, MessageCatalog, MessageDefinition};
use crate::codec;
use crate::register::RegisterCommand;
use crate::types::{CodecError, FieldValue, Frame, Result};
use std::collections::HashSet;

/// Builds and decodes frames against one catalog
#[derive(Debug, Clone, Copy)]
pub struct FrameBuilder<'a> {
    catalog: &'a MessageCatalog,
}

impl<'a> FrameBuilder<'a> {
    pub fn new(catalog: &'a MessageCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &'a MessageCatalog {
        self.catalog
    }

    /// Build a frame for `definition` from named values
    ///
    /// # Errors
    /// * `UnexpectedField` - a name the definition does not declare, or a
    ///   name given twice
    /// * `MissingField` - a declared field without a value
    /// * `FieldOutOfRange` / `BitFieldOverflow` - from the codec
    pub fn build(&self, definition: &MessageDefinition, values: &[(&str, FieldValue)]) -> Result<Frame> {
        let ordered = order_values(definition, values)?;
        let payload = codec::encode_payload(definition, &ordered)?;
        let frame = Frame::new(definition.id, &payload, definition.extended)?;

        log::debug!(
            "Built {} (0x{:03X}): {}",
            definition.name,
            frame.id(),
            frame.hex_payload()
        );
        Ok(frame)
    }

    /// Look up a message by name and build it
    pub fn build_named(&self, name: &str, values: &[(&str, FieldValue)]) -> Result<Frame> {
        let definition = self.catalog.by_name(name)?;
        self.build(definition, values)
    }

    /// Build a control register frame
    pub fn build_register(&self, command: &RegisterCommand) -> Result<Frame> {
        self.build_named(names::SET_REF_SWITCH_CTRL_RI, &command.field_values())
    }

    /// Decode a frame into named values using the catalog entry for its id
    /// and id format
    pub fn decode(&self, frame: &Frame) -> Result<Vec<(String, FieldValue)>> {
        let definition = self.catalog.by_frame_id(frame.id(), frame.is_extended())?;
        let values = codec::decode_payload(definition, frame.data())?;

        Ok(definition
            .fields
            .iter()
            .map(|f| f.name.clone())
            .zip(values)
            .collect())
    }
}

/// Arrange named values in declared field order
fn order_values(definition: &MessageDefinition, values: &[(&str, FieldValue)]) -> Result<Vec<FieldValue>> {
    let mut seen = HashSet::with_capacity(values.len());
    for (name, _) in values {
        if definition.field(name).is_none() || !seen.insert(*name) {
            log::warn!("Field '{}' is not expected by {}", name, definition.name);
            return Err(CodecError::UnexpectedField {
                message: definition.name.clone(),
                field: name.to_string(),
            });
        }
    }

    definition
        .fields
        .iter()
        .map(|field| {
            values
                .iter()
                .find(|(name, _)| *name == field.name)
                .map(|(_, value)| *value)
                .ok_or_else(|| CodecError::MissingField {
                    message: definition.name.clone(),
                    field: field.name.clone(),
                })
        })
        .collect()
}
