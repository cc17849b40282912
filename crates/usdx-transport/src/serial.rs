//! Serial port link to the radio.
//!
//! The radio presents a single USB virtual COM port carrying both CAT
//! traffic and digitized audio at a fixed 115200 baud, 8N1. This module
//! opens that port with [`tokio_serial`] and splits it into the
//! [`LinkReader`] / [`LinkWriter`] halves the engine's two workers own.
//!
//! The port is opened raw: no local echo, no echo-erase, no line
//! discipline processing, which mio-serial configures on open. DTR and
//! RTS are de-asserted immediately -- many transceivers route those
//! lines to CW key or PTT inputs, and an OS that asserts DTR on open
//! would otherwise key the radio.
//!
//! # Example
//!
//! ```no_run
//! use usdx_transport::SerialLink;
//!
//! # fn example() -> usdx_core::Result<()> {
//! let link = SerialLink::open("/dev/ttyUSB0")?;
//! let (reader, writer) = link.split();
//! # let _ = (reader, writer);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

use usdx_core::error::{Error, Result};
use usdx_core::link::{LinkReader, LinkWriter};

/// The radio's fixed line rate.
pub const RADIO_BAUD: u32 = 115_200;

/// The serial connection to the radio, before splitting.
#[derive(Debug)]
pub struct SerialLink {
    stream: SerialStream,
    port_name: String,
}

impl SerialLink {
    /// Open the radio's serial port at [`RADIO_BAUD`], 8N1, raw.
    pub fn open(port: &str) -> Result<Self> {
        tracing::debug!(port = %port, baud = RADIO_BAUD, "opening serial link");

        let mut stream = tokio_serial::new(port, RADIO_BAUD)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "failed to open serial link");
                Error::Link(format!("failed to open serial port {port}: {e}"))
            })?;

        // De-assert DTR and RTS: transceivers commonly route them to
        // CW key / PTT inputs, and the OS asserts DTR on open.
        if let Err(e) = stream.write_data_terminal_ready(false) {
            tracing::warn!(port = %port, error = %e, "failed to de-assert DTR");
        }
        if let Err(e) = stream.write_request_to_send(false) {
            tracing::warn!(port = %port, error = %e, "failed to de-assert RTS");
        }

        tracing::info!(port = %port, baud = RADIO_BAUD, "serial link opened");

        Ok(Self {
            stream,
            port_name: port.to_string(),
        })
    }

    /// Name of the underlying serial port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Split into the receive and send halves.
    ///
    /// The engine gives the reader to its receive worker and the writer
    /// to its send worker; nothing else may touch the port.
    pub fn split(self) -> (SerialLinkReader, SerialLinkWriter) {
        let (read_half, write_half) = tokio::io::split(self.stream);
        (
            SerialLinkReader {
                inner: read_half,
                port_name: self.port_name.clone(),
            },
            SerialLinkWriter {
                inner: write_half,
                port_name: self.port_name,
            },
        )
    }
}

/// Map an I/O failure on an open port to a link error.
///
/// A broken pipe or vanished device means the USB cable is gone; other
/// errors are passed through.
fn map_io_error(port_name: &str, context: &str, e: std::io::Error) -> Error {
    tracing::error!(port = %port_name, error = %e, "{context}");
    if e.kind() == std::io::ErrorKind::BrokenPipe || e.kind() == std::io::ErrorKind::NotConnected {
        Error::ConnectionLost
    } else {
        Error::Io(e)
    }
}

/// Receive half of the serial link.
pub struct SerialLinkReader {
    inner: ReadHalf<SerialStream>,
    port_name: String,
}

#[async_trait]
impl LinkReader for SerialLinkReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self
            .inner
            .read(buf)
            .await
            .map_err(|e| map_io_error(&self.port_name, "serial read failed", e))?;
        tracing::trace!(port = %self.port_name, bytes = n, "serial read");
        Ok(n)
    }
}

/// Send half of the serial link.
pub struct SerialLinkWriter {
    inner: WriteHalf<SerialStream>,
    port_name: String,
}

#[async_trait]
impl LinkWriter for SerialLinkWriter {
    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        tracing::trace!(port = %self.port_name, bytes = data.len(), "serial write");
        self.inner
            .write_all(data)
            .await
            .map_err(|e| map_io_error(&self.port_name, "serial write failed", e))
    }

    async fn flush(&mut self) -> Result<()> {
        self.inner
            .flush()
            .await
            .map_err(|e| map_io_error(&self.port_name, "serial flush failed", e))
    }

    async fn close(&mut self) -> Result<()> {
        tracing::debug!(port = %self.port_name, "closing serial link");
        self.inner
            .shutdown()
            .await
            .map_err(|e| map_io_error(&self.port_name, "serial close failed", e))
    }
}
