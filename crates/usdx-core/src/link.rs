//! Link traits for the serial connection to the radio.
//!
//! The engine is full-duplex: one worker reads the radio's interleaved
//! CAT/audio stream while another writes commands and transmit audio,
//! with its own pacing delays. The link is therefore split into two
//! trait objects at construction time -- [`LinkReader`] owned by the
//! receive worker and [`LinkWriter`] owned by the send worker -- so
//! that neither direction can stall the other and no lock guards the
//! device handle.
//!
//! Implementations exist for serial ports (`usdx-transport`) and for a
//! scripted in-memory link (`usdx-test-harness`), enabling both real
//! hardware operation and deterministic engine tests.

use async_trait::async_trait;

use crate::error::Result;

/// The receive half of the byte-level link to the radio.
#[async_trait]
pub trait LinkReader: Send {
    /// Read bytes from the radio into `buf`.
    ///
    /// Waits until at least one byte is available and returns a short
    /// count. A returned error is fatal to the engine: the link is a
    /// local USB device, and a failed read means it is gone.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// The send half of the byte-level link to the radio.
#[async_trait]
pub trait LinkWriter: Send {
    /// Write all of `data` to the link.
    ///
    /// Bytes may be coalesced with subsequent writes until
    /// [`flush`](LinkWriter::flush) is called.
    async fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Push any buffered bytes out to the device.
    async fn flush(&mut self) -> Result<()>;

    /// Release the link. Called exactly once, after the engine stops.
    async fn close(&mut self) -> Result<()>;
}
