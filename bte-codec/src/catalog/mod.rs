//! Message catalog
//!
//! Holds every message definition the tool can emit or decode, indexed by
//! arbitration id and by name. A catalog is validated once when it is
//! constructed and is read-only afterwards, so a shared reference can be used
//! from any number of threads.
//!
//! The catalog can be exported to and loaded from TOML so the message table
//! can be audited and versioned independently of the code:
//!
//! ```toml
//! [[message]]
//! id = 0x21F
//! name = "SET_RST_STOP"
//! length = 1
//!
//! [[message.field]]
//! name = "rst_stop"
//! offset = 0
//! min = 0.0
//! max = 255.0
//! kind = { type = "unsigned", bits = 8 }
//! ```

mod builtin;
pub mod definition;
pub mod names;

pub use definition::{FieldKind, FieldSpec, MessageDefinition};

use crate::types::{CodecError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use once_cell::sync::Lazy;

/// Key used to look up a message: numeric id or name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Id(u32),
    Name(String),
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKey::Id(id) => write!(f, "CAN ID 0x{:X}", id),
            MessageKey::Name(name) => write!(f, "'{}'", name),
        }
    }
}

impl From<u32> for MessageKey {
    fn from(id: u32) -> Self {
        MessageKey::Id(id)
    }
}

impl From<&str> for MessageKey {
    fn from(name: &str) -> Self {
        MessageKey::Name(name.to_string())
    }
}

impl From<String> for MessageKey {
    fn from(name: String) -> Self {
        MessageKey::Name(name)
    }
}

impl FromStr for MessageKey {
    type Err = std::convert::Infallible;

    /// `0x..` is a hex id, plain digits a decimal id, anything else a name
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            if let Ok(id) = u32::from_str_radix(hex, 16) {
                return Ok(MessageKey::Id(id));
            }
        } else if let Ok(id) = s.parse::<u32>() {
            return Ok(MessageKey::Id(id));
        }
        Ok(MessageKey::Name(s.to_string()))
    }
}

/// On-disk layout of a catalog file
#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "message")]
    messages: Vec<MessageDefinition>,
}

/// The validated, immutable message catalog
#[derive(Debug, Clone)]
pub struct MessageCatalog {
    /// Definitions in declaration order
    messages: Vec<MessageDefinition>,
    /// Key: (CAN ID, extended flag), Value: index into `messages`
    by_id: HashMap<(u32, bool), usize>,
    /// Key: message name, Value: index into `messages`
    by_name: HashMap<String, usize>,
}

impl MessageCatalog {
    /// Build a catalog, validating every definition and rejecting duplicate
    /// ids or names
    pub fn new(messages: Vec<MessageDefinition>) -> Result<Self> {
        for message in &messages {
            message.validate()?;
        }

        let catalog = Self::index(messages);
        if catalog.by_id.len() != catalog.messages.len() {
            return Err(CodecError::InvalidCatalog(
                "duplicate message id".to_string(),
            ));
        }
        if catalog.by_name.len() != catalog.messages.len() {
            return Err(CodecError::InvalidCatalog(
                "duplicate message name".to_string(),
            ));
        }

        Ok(catalog)
    }

    /// The built-in BTE catalog, initialized on first use
    pub fn builtin() -> &'static MessageCatalog {
        static BUILTIN: Lazy<MessageCatalog> =
            Lazy::new(|| MessageCatalog::index(builtin::messages()));
        &BUILTIN
    }

    /// Parse and validate a catalog from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content).map_err(|e| {
            CodecError::InvalidCatalog(format!("Failed to parse catalog: {}", e))
        })?;
        Self::new(file.messages)
    }

    /// Load a catalog from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        log::info!("Loading message catalog: {:?}", path);

        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_toml_str(&content)?;

        log::info!(
            "Catalog loaded: {} messages from {:?}",
            catalog.len(),
            path
        );
        Ok(catalog)
    }

    /// Serialize the catalog to TOML
    pub fn to_toml(&self) -> Result<String> {
        let file = CatalogFile {
            messages: self.messages.clone(),
        };
        toml::to_string_pretty(&file)
            .map_err(|e| CodecError::InvalidCatalog(format!("Failed to serialize catalog: {}", e)))
    }

    /// Serialize the catalog to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.messages)
            .map_err(|e| CodecError::InvalidCatalog(format!("Failed to serialize catalog: {}", e)))
    }

    /// Look up a definition by id or name
    pub fn lookup(&self, key: &MessageKey) -> Result<&MessageDefinition> {
        let index = match key {
            MessageKey::Id(id) => self
                .by_id
                .get(&(*id, false))
                .or_else(|| self.by_id.get(&(*id, true))),
            MessageKey::Name(name) => self.by_name.get(name),
        };
        index
            .map(|&i| &self.messages[i])
            .ok_or_else(|| CodecError::UnknownMessage(key.clone()))
    }

    /// Look up a definition by CAN id, preferring a standard-id definition
    /// when both a standard and an extended one share the number
    pub fn by_id(&self, id: u32) -> Result<&MessageDefinition> {
        self.lookup(&MessageKey::Id(id))
    }

    /// Look up the definition matching a received frame's id and id format
    pub fn by_frame_id(&self, id: u32, extended: bool) -> Result<&MessageDefinition> {
        self.by_id
            .get(&(id, extended))
            .map(|&i| &self.messages[i])
            .ok_or(CodecError::UnknownMessage(MessageKey::Id(id)))
    }

    /// Look up a definition by name
    pub fn by_name(&self, name: &str) -> Result<&MessageDefinition> {
        self.lookup(&MessageKey::Name(name.to_string()))
    }

    /// All definitions in declaration order
    pub fn messages(&self) -> &[MessageDefinition] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Get catalog statistics
    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            num_messages: self.messages.len(),
            num_fields: self.messages.iter().map(|m| m.fields.len()).sum(),
            num_bit_packed: self.messages.iter().filter(|m| m.is_bit_packed()).count(),
        }
    }

    fn index(messages: Vec<MessageDefinition>) -> Self {
        let by_id = messages
            .iter()
            .enumerate()
            .map(|(i, m)| ((m.id, m.extended), i))
            .collect();
        let by_name = messages
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), i))
            .collect();

        Self {
            messages,
            by_id,
            by_name,
        }
    }
}

/// Catalog statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogStats {
    /// Total number of message definitions
    pub num_messages: usize,
    /// Total number of field definitions
    pub num_fields: usize,
    /// Messages that need the register packer
    pub num_bit_packed: usize,
}
