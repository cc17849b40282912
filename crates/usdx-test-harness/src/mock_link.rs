//! Mock serial link for deterministic testing of the protocol engine.
//!
//! The real link is full-duplex: the radio pushes interleaved CAT/audio
//! bytes whenever it likes, independent of what the host writes. The
//! mock therefore scripts the two directions separately: inbound bytes
//! are queued through [`MockLinkHandle::push_incoming`] and drained by
//! the reader at whatever granularity the engine asks for; every
//! `write_all` call is recorded with a timestamp so tests can assert
//! both wire content and inter-frame pacing.
//!
//! # Example
//!
//! ```
//! use usdx_test_harness::mock_link;
//!
//! let (_reader, _writer, handle) = mock_link();
//! // Script the radio sending a CAT reply.
//! handle.push_incoming(b"FA00014074000;");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::mpsc;

use usdx_core::error::{Error, Result};
use usdx_core::link::{LinkReader, LinkWriter};

/// Everything the engine has done to the write half.
#[derive(Debug, Default)]
struct WriteLog {
    /// One entry per `write_all` call, with the time it happened.
    writes: Vec<(Instant, Vec<u8>)>,
    /// Number of `flush` calls.
    flushes: usize,
    /// Whether `close` has been called.
    closed: bool,
}

/// Read half of the mock link.
///
/// Yields scripted chunks in order. When the [`MockLinkHandle`] is
/// dropped and no bytes remain, `read` returns
/// [`Error::ConnectionLost`] -- the same thing an unplugged USB serial
/// device produces.
pub struct MockLinkReader {
    incoming: mpsc::UnboundedReceiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

/// Write half of the mock link. Records all writes into the shared log.
pub struct MockLinkWriter {
    log: Arc<Mutex<WriteLog>>,
}

/// Test-side handle: scripts inbound bytes and inspects outbound writes.
#[derive(Clone)]
pub struct MockLinkHandle {
    incoming_tx: mpsc::UnboundedSender<Vec<u8>>,
    log: Arc<Mutex<WriteLog>>,
}

/// Create a mock link: the reader/writer pair goes to the engine under
/// test, the handle stays with the test.
pub fn mock_link() -> (MockLinkReader, MockLinkWriter, MockLinkHandle) {
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    let log = Arc::new(Mutex::new(WriteLog::default()));

    let reader = MockLinkReader {
        incoming: incoming_rx,
        pending: VecDeque::new(),
    };
    let writer = MockLinkWriter {
        log: Arc::clone(&log),
    };
    let handle = MockLinkHandle { incoming_tx, log };

    (reader, writer, handle)
}

impl MockLinkHandle {
    /// Queue bytes for the reader, as if the radio had sent them.
    ///
    /// Each call is one scripted chunk; the reader may still split it
    /// across multiple short reads, exactly like a real serial port.
    pub fn push_incoming(&self, bytes: &[u8]) {
        let _ = self.incoming_tx.send(bytes.to_vec());
    }

    /// All data written so far, one entry per `write_all` call.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.iter().map(|(_, w)| w.clone()).collect()
    }

    /// All writes with the instant each one happened, for pacing checks.
    pub fn timed_writes(&self) -> Vec<(Instant, Vec<u8>)> {
        self.lock().writes.clone()
    }

    /// Number of `flush` calls observed.
    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }

    /// Whether the writer has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Wait (polling) until at least `n` writes have been recorded.
    ///
    /// Wrap in [`tokio::time::timeout`] to bound the wait.
    pub async fn wait_for_writes(&self, n: usize) -> Vec<Vec<u8>> {
        loop {
            let writes = self.writes();
            if writes.len() >= n {
                return writes;
            }
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WriteLog> {
        self.log.lock().expect("mock link write log poisoned")
    }
}

#[async_trait]
impl LinkReader for MockLinkReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pending.is_empty() {
            match self.incoming.recv().await {
                Some(chunk) => self.pending.extend(chunk),
                None => return Err(Error::ConnectionLost),
            }
        }

        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

#[async_trait]
impl LinkWriter for MockLinkWriter {
    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut log = self.log.lock().expect("mock link write log poisoned");
        if log.closed {
            return Err(Error::NotConnected);
        }
        log.writes.push((Instant::now(), data.to_vec()));
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.log.lock().expect("mock link write log poisoned").flushes += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.log.lock().expect("mock link write log poisoned").closed = true;
        Ok(())
    }
}
