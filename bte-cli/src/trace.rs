//! Dry-run transport writing candump-style trace lines
//!
//! Each frame becomes one line:
//!
//! ```text
//! (1760788800.123456) kvaser0 0C1#0000484409000000
//! ```

use bte_codec::{Frame, Transport, TransportConfig, TransportError};
use chrono::{DateTime, Local};
use std::io::Write;

pub struct TraceTransport<W: Write> {
    writer: W,
    config: TransportConfig,
    sent: usize,
}

impl<W: Write> TraceTransport<W> {
    pub fn new(writer: W, config: TransportConfig) -> Self {
        log::debug!("Dry-run transport on {}", config);
        Self {
            writer,
            config,
            sent: 0,
        }
    }

    /// Number of frames written so far
    pub fn sent(&self) -> usize {
        self.sent
    }

    fn write_frame(&mut self, frame: &Frame, timestamp: DateTime<Local>) -> std::io::Result<()> {
        let id = if frame.is_extended() {
            format!("{:08X}", frame.id())
        } else {
            format!("{:03X}", frame.id())
        };
        let data: String = frame.data().iter().map(|b| format!("{:02X}", b)).collect();

        writeln!(
            self.writer,
            "({}.{:06}) {}{} {}#{}",
            timestamp.timestamp(),
            timestamp.timestamp_subsec_micros(),
            self.config.interface,
            self.config.channel,
            id,
            data
        )?;
        self.writer.flush()
    }
}

impl<W: Write> Transport for TraceTransport<W> {
    fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        self.write_frame(frame, Local::now())?;
        self.sent += 1;
        log::trace!("Trace frame #{}: {}", self.sent, frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bte_codec::transport::CanInterface;
    use chrono::TimeZone;

    #[test]
    fn test_trace_line_format() {
        let config = TransportConfig {
            interface: CanInterface::Pcan,
            channel: 1,
            ..TransportConfig::default()
        };
        let mut trace = TraceTransport::new(Vec::new(), config);
        let timestamp = Local.timestamp_opt(1_700_000_000, 250_000_000).unwrap();

        let frame = Frame::new(0xC1, &[0x00, 0x00, 0x48, 0x44, 0x0A], false).unwrap();
        trace.write_frame(&frame, timestamp).unwrap();
        let extended = Frame::new(0x18DA_F110, &[], true).unwrap();
        trace.write_frame(&extended, timestamp).unwrap();

        let text = String::from_utf8(trace.writer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "(1700000000.250000) pcan1 0C1#000048440A");
        assert_eq!(lines[1], "(1700000000.250000) pcan1 18DAF110#");
    }

    #[test]
    fn test_send_counts_frames() {
        let mut trace = TraceTransport::new(Vec::new(), TransportConfig::default());
        let frame = Frame::new(0x288, &[], false).unwrap();
        trace.send(&frame).unwrap();
        trace.send(&frame).unwrap();
        assert_eq!(trace.sent(), 2);

        let text = String::from_utf8(trace.writer).unwrap();
        assert!(text.lines().all(|l| l.ends_with("kvaser0 288#")));
    }
}
