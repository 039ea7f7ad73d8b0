//! BTE Calibration Codec Library
//!
//! Builds the CAN frames that drive a battery test emulator (BTE, also called
//! EStorage) through its calibration procedures.
//!
//! # Architecture
//!
//! The library is pure and synchronous:
//! - A message catalog describes every command frame the device understands
//! - A data-driven scalar codec packs little-endian floats and integers
//! - A bit-field packer handles the composite control register
//! - A frame builder validates named values and emits immutable frames
//! - A macro sequencer produces the ordered frame sequences of each
//!   calibration phase
//!
//! The library does NOT:
//! - Open a CAN adapter or talk to a bus
//! - Retry or schedule sends
//! - Read configuration files or install a logger
//!
//! Sending frames is done through the [`Transport`] trait, implemented by the
//! application layer (bte-calib).
//!
//! # Example Usage
//!
//! ```
//! use bte_codec::{FrameBuilder, MessageCatalog, MacroSequencer, InitParams};
//! use bte_codec::register::{ControlMode, OperatingState, RegisterCommand};
//!
//! let catalog = MessageCatalog::builtin();
//!
//! // Single frame
//! let builder = FrameBuilder::new(catalog);
//! let command = RegisterCommand::new(OperatingState::Standby, ControlMode::Current)
//!     .with_resets(false, true);
//! let frame = builder.build_register(&command).unwrap();
//! assert_eq!(frame.data()[4], 0x91);
//!
//! // Whole initialization phase
//! let mut sequencer = MacroSequencer::new(catalog);
//! let init = sequencer.initialize(&InitParams::default()).unwrap();
//! for step in &init {
//!     println!("{} {}", step.message, step.frame);
//! }
//! ```

// Public modules
pub mod bitfield;
pub mod builder;
pub mod catalog;
pub mod codec;
pub mod register;
pub mod sequencer;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use builder::FrameBuilder;
pub use catalog::{
    CatalogStats, FieldKind, FieldSpec, MessageCatalog, MessageDefinition, MessageKey,
};
pub use register::{ControlMode, OperatingState, RegisterCommand};
pub use sequencer::{
    CalibrationMacro, CalibrationRun, InitParams, MacroSequencer, MacroStep, Phase,
    SequencerState, SystemRequest,
};
pub use transport::{send_macro, Transport, TransportConfig, TransportError};
pub use types::{CodecError, FieldValue, Frame, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: the built-in catalog is available and complete
        let stats = MessageCatalog::builtin().stats();
        assert_eq!(stats.num_messages, 13);
        assert!(!VERSION.is_empty());
    }
}
