//! Transport interface
//!
//! The core never talks to a CAN adapter. Anything that can put a [`Frame`]
//! on a bus (or into a trace file) implements [`Transport`]; [`send_macro`]
//! feeds a calibration macro through it in order.

use crate::sequencer::CalibrationMacro;
use crate::types::{CodecError, Frame, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Something that can send frames
pub trait Transport {
    fn send(&mut self, frame: &Frame) -> std::result::Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, frame: &Frame) -> std::result::Result<(), TransportError> {
        (**self).send(frame)
    }
}

/// Opaque error reported by a transport
#[derive(Debug)]
pub struct TransportError(Box<dyn std::error::Error + Send + Sync>);

impl TransportError {
    pub fn new<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self(error.into())
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        Self::new(error)
    }
}

/// CAN adapter family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanInterface {
    #[default]
    Kvaser,
    Vector,
    Pcan,
    Ixxat,
}

impl fmt::Display for CanInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanInterface::Kvaser => write!(f, "kvaser"),
            CanInterface::Vector => write!(f, "vector"),
            CanInterface::Pcan => write!(f, "pcan"),
            CanInterface::Ixxat => write!(f, "ixxat"),
        }
    }
}

/// Nominal bus bitrate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Bitrate {
    #[serde(rename = "1M")]
    Rate1M,
    #[default]
    #[serde(rename = "500K")]
    Rate500K,
    #[serde(rename = "250K")]
    Rate250K,
    #[serde(rename = "125K")]
    Rate125K,
}

impl Bitrate {
    pub fn bits_per_second(self) -> u32 {
        match self {
            Bitrate::Rate1M => 1_000_000,
            Bitrate::Rate500K => 500_000,
            Bitrate::Rate250K => 250_000,
            Bitrate::Rate125K => 125_000,
        }
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bitrate::Rate1M => write!(f, "1M"),
            Bitrate::Rate500K => write!(f, "500K"),
            Bitrate::Rate250K => write!(f, "250K"),
            Bitrate::Rate125K => write!(f, "125K"),
        }
    }
}

/// Bus settings handed to a transport when it is constructed
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub interface: CanInterface,
    pub channel: u32,
    pub bitrate: Bitrate,
}

impl fmt::Display for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} channel {} @ {}", self.interface, self.channel, self.bitrate)
    }
}

/// Send every frame of a macro in order
///
/// Stops at the first failing frame; frames after it are not sent. Returns
/// the number of frames sent.
pub fn send_macro<T: Transport + ?Sized>(transport: &mut T, calibration_macro: &CalibrationMacro) -> Result<usize> {
    log::info!(
        "Sending '{}' ({} frames)",
        calibration_macro.name(),
        calibration_macro.len()
    );

    for (index, step) in calibration_macro.iter().enumerate() {
        log::debug!("[{}] {} {}", index, step.message, step.frame);
        if let Err(source) = transport.send(&step.frame) {
            log::error!("Sending {} failed: {}", step.message, source);
            return Err(CodecError::TransportFailure {
                index,
                message: step.message.clone(),
                source,
            });
        }
    }

    Ok(calibration_macro.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MessageCatalog;
    use crate::sequencer::{initialization_macro, InitParams};

    /// Accepts `limit` frames, then fails
    struct FlakyBus {
        sent: Vec<Frame>,
        limit: usize,
    }

    impl Transport for FlakyBus {
        fn send(&mut self, frame: &Frame) -> std::result::Result<(), TransportError> {
            if self.sent.len() == self.limit {
                return Err(TransportError::new("bus off"));
            }
            self.sent.push(frame.clone());
            Ok(())
        }
    }

    #[test]
    fn test_send_macro_all_frames() {
        let init = initialization_macro(MessageCatalog::builtin(), &InitParams::default()).unwrap();
        let mut bus = FlakyBus { sent: Vec::new(), limit: usize::MAX };

        assert_eq!(send_macro(&mut bus, &init).unwrap(), 10);
        assert_eq!(bus.sent, init.frames().cloned().collect::<Vec<_>>());
    }

    #[test]
    fn test_send_macro_stops_at_first_failure() {
        let init = initialization_macro(MessageCatalog::builtin(), &InitParams::default()).unwrap();
        let mut bus = FlakyBus { sent: Vec::new(), limit: 3 };

        match send_macro(&mut bus, &init) {
            Err(CodecError::TransportFailure { index, message, source }) => {
                assert_eq!(index, 3);
                assert_eq!(message, "SET_OP_LIM_I");
                assert_eq!(source.to_string(), "bus off");
            }
            other => panic!("expected TransportFailure, got {:?}", other),
        }
        assert_eq!(bus.sent.len(), 3);
    }

    #[test]
    fn test_transport_config_defaults() {
        let config: TransportConfig = toml::from_str("channel = 1").unwrap();
        assert_eq!(config.interface, CanInterface::Kvaser);
        assert_eq!(config.channel, 1);
        assert_eq!(config.bitrate, Bitrate::Rate500K);
        assert_eq!(config.to_string(), "kvaser channel 1 @ 500K");

        let config: TransportConfig = toml::from_str(
            r#"
            interface = "pcan"
            bitrate = "1M"
            "#,
        )
        .unwrap();
        assert_eq!(config.interface, CanInterface::Pcan);
        assert_eq!(config.bitrate.bits_per_second(), 1_000_000);
    }
}
