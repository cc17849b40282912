//! Mode-aware serializer for the outbound half of the link.
//!
//! A single writer interleaves CAT commands and transmit audio onto the
//! serial stream. It owns the one-bit `transmitting` state, toggled by
//! `TX…`/`RX…` commands, and enforces the radio's framing around mode
//! transitions:
//!
//! - Before any command while transmitting: a 10 ms pause and a bare
//!   `;` guard byte, so the in-flight audio burst closes on a clean
//!   frame boundary before control traffic is injected.
//! - `RX…` drops the transmitting flag *before* the command is written;
//!   `TX…` raises it *after*, followed by a 10 ms settle so the first
//!   audio frame never races the radio's T/R switch.
//!
//! Audio frames arriving while not transmitting have no destination and
//! are silently dropped; frames that are written first have their
//! terminator-valued samples escaped.

use std::time::Duration;

use tracing::{debug, trace};

use usdx_core::error::Result;
use usdx_core::frame::TERMINATOR;
use usdx_core::link::LinkWriter;

use crate::protocol;

/// Settle time the radio needs around transmit/receive transitions.
const MODE_SETTLE: Duration = Duration::from_millis(10);

/// The single writer for the outbound serial stream.
pub struct Serializer {
    writer: Box<dyn LinkWriter>,
    transmitting: bool,
}

impl Serializer {
    /// Create a serializer in receive mode.
    pub fn new(writer: Box<dyn LinkWriter>) -> Self {
        Self {
            writer,
            transmitting: false,
        }
    }

    /// Current outbound mode state.
    pub fn is_transmitting(&self) -> bool {
        self.transmitting
    }

    /// Write one delimiter-free command to the link, handling mode
    /// transitions and burst termination.
    pub async fn write_command(&mut self, cmd: &[u8]) -> Result<()> {
        if self.transmitting {
            // Close the in-flight audio burst on a clean frame boundary
            // before injecting control traffic.
            tokio::time::sleep(MODE_SETTLE).await;
            self.writer.write_all(&[TERMINATOR]).await?;
            self.writer.flush().await?;
        }

        if cmd.starts_with(b"RX") {
            self.transmitting = false;
            debug!("[RX mode]");
        }

        let wire = protocol::encode_command(cmd);
        self.writer.write_all(&wire).await?;
        self.writer.flush().await?;

        if cmd.starts_with(b"TX") {
            self.transmitting = true;
            tokio::time::sleep(MODE_SETTLE).await;
            debug!("[TX mode]");
        }

        Ok(())
    }

    /// Write one audio frame to the link, or drop it if not transmitting.
    pub async fn write_audio(&mut self, mut samples: Vec<u8>) -> Result<()> {
        if !self.transmitting {
            trace!(len = samples.len(), "dropping audio frame outside transmit");
            return Ok(());
        }

        protocol::escape_audio(&mut samples);
        self.writer.write_all(&samples).await?;
        self.writer.flush().await
    }

    /// Flush and release the link. Called once when the engine stops.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.flush().await?;
        self.writer.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usdx_test_harness::mock_link;

    #[tokio::test]
    async fn command_gets_single_terminator() {
        let (_reader, writer, handle) = mock_link();
        let mut ser = Serializer::new(Box::new(writer));

        ser.write_command(b"FA00014074000").await.unwrap();

        assert_eq!(handle.writes(), vec![b"FA00014074000;".to_vec()]);
        assert_eq!(handle.flush_count(), 1);
    }

    #[tokio::test]
    async fn empty_command_is_bare_terminator() {
        let (_reader, writer, handle) = mock_link();
        let mut ser = Serializer::new(Box::new(writer));

        ser.write_command(b"").await.unwrap();

        assert_eq!(handle.writes(), vec![b";".to_vec()]);
    }

    #[tokio::test]
    async fn tx_command_raises_transmitting() {
        let (_reader, writer, _handle) = mock_link();
        let mut ser = Serializer::new(Box::new(writer));
        assert!(!ser.is_transmitting());

        ser.write_command(b"TX0").await.unwrap();
        assert!(ser.is_transmitting());

        ser.write_command(b"RX").await.unwrap();
        assert!(!ser.is_transmitting());
    }

    #[tokio::test]
    async fn audio_dropped_while_receiving() {
        let (_reader, writer, handle) = mock_link();
        let mut ser = Serializer::new(Box::new(writer));

        ser.write_audio(vec![0x80; 48]).await.unwrap();

        assert!(handle.writes().is_empty());
    }

    #[tokio::test]
    async fn audio_escaped_while_transmitting() {
        let (_reader, writer, handle) = mock_link();
        let mut ser = Serializer::new(Box::new(writer));

        ser.write_command(b"TX0").await.unwrap();
        ser.write_audio(vec![0x80, 0x3B, 0x90]).await.unwrap();

        let writes = handle.writes();
        assert_eq!(writes[1], vec![0x80, 0x3A, 0x90]);
        // No written audio frame ever contains the terminator byte.
        assert!(!writes[1].contains(&TERMINATOR));
    }

    #[tokio::test]
    async fn tx_cycle_wire_order() {
        // TX0; then audio then RX; -- the wire must show the command,
        // the escaped frame, the burst-closing guard, then RX;.
        let (_reader, writer, handle) = mock_link();
        let mut ser = Serializer::new(Box::new(writer));

        ser.write_command(b"TX0").await.unwrap();
        ser.write_audio(vec![0x80, 0x3B, 0x90]).await.unwrap();
        ser.write_command(b"RX").await.unwrap();

        assert_eq!(
            handle.writes(),
            vec![
                b"TX0;".to_vec(),
                vec![0x80, 0x3A, 0x90],
                b";".to_vec(),
                b"RX;".to_vec(),
            ]
        );
    }

    #[tokio::test]
    async fn tx_settle_gap_before_audio() {
        let (_reader, writer, handle) = mock_link();
        let mut ser = Serializer::new(Box::new(writer));

        ser.write_command(b"TX0").await.unwrap();
        ser.write_audio(vec![0x80; 8]).await.unwrap();

        let timed = handle.timed_writes();
        let gap = timed[1].0.duration_since(timed[0].0);
        assert!(gap >= MODE_SETTLE, "settle gap too short: {gap:?}");
    }

    #[tokio::test]
    async fn rx_guard_gap_after_audio() {
        let (_reader, writer, handle) = mock_link();
        let mut ser = Serializer::new(Box::new(writer));

        ser.write_command(b"TX0").await.unwrap();
        ser.write_audio(vec![0x80; 8]).await.unwrap();
        ser.write_command(b"RX").await.unwrap();

        let timed = handle.timed_writes();
        // writes: TX0; | audio | ; | RX;
        assert_eq!(timed[2].1, b";".to_vec());
        let gap = timed[2].0.duration_since(timed[1].0);
        assert!(gap >= MODE_SETTLE, "guard gap too short: {gap:?}");
    }

    #[tokio::test]
    async fn non_mode_commands_leave_state_alone() {
        let (_reader, writer, _handle) = mock_link();
        let mut ser = Serializer::new(Box::new(writer));

        ser.write_command(b"TX0").await.unwrap();
        ser.write_command(b"FA00014074000").await.unwrap();
        assert!(ser.is_transmitting());

        ser.write_command(b"RX").await.unwrap();
        ser.write_command(b"MD2").await.unwrap();
        assert!(!ser.is_transmitting());
    }

    #[tokio::test]
    async fn command_while_transmitting_gets_guard() {
        let (_reader, writer, handle) = mock_link();
        let mut ser = Serializer::new(Box::new(writer));

        ser.write_command(b"TX0").await.unwrap();
        ser.write_command(b"FA00014074000").await.unwrap();

        assert_eq!(
            handle.writes(),
            vec![
                b"TX0;".to_vec(),
                b";".to_vec(),
                b"FA00014074000;".to_vec(),
            ]
        );
    }

    #[tokio::test]
    async fn shutdown_flushes_and_closes() {
        let (_reader, writer, handle) = mock_link();
        let mut ser = Serializer::new(Box::new(writer));

        ser.shutdown().await.unwrap();

        assert!(handle.is_closed());
        assert_eq!(handle.flush_count(), 1);
    }
}
