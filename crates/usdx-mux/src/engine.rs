//! The protocol engine facade: workers, queues, and lifecycle.
//!
//! [`Engine`] owns the split serial link and the four bounded queues:
//!
//! | Queue | Capacity | Producer | Consumer |
//! |---|---|---|---|
//! | replies    | 32  | receive worker / responder | host CAT adapter |
//! | commands   | 32  | responder                  | send worker |
//! | audio in   | 128 | receive worker             | playback adapter |
//! | audio out  | 128 | capture adapter            | send worker |
//!
//! [`start`](Engine::start) launches exactly two workers: the receive
//! worker owns the [`LinkReader`] and the demux state; the send worker
//! owns the [`LinkWriter`] and the transmitting state. No other code
//! touches the link. Shutdown is a [`CancellationToken`] checked at the
//! workers' loop boundaries; queues carry all data.
//!
//! A link I/O failure is unrecoverable -- the worker logs it, reports it
//! on the fatal channel, and stops. The host decides whether to exit.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use usdx_core::error::{Error, Result};
use usdx_core::frame::CHUNK_LEN;
use usdx_core::link::{LinkReader, LinkWriter};

use crate::demux::{Frame, FrameDemux};
use crate::responder::CommandSink;
use crate::serializer::Serializer;

/// Capacity of the audio queues, in frames. At 48 bytes per frame and
/// the radio's sample rates this is roughly half a second of elasticity.
const AUDIO_QUEUE_CAPACITY: usize = 128;

/// Capacity of the command and reply queues.
const CAT_QUEUE_CAPACITY: usize = 32;

/// Close-time grace period, applied twice: once so in-flight writes
/// observe the transmitting state, once so workers exit their blocking
/// calls at the next boundary.
const CLOSE_GRACE: std::time::Duration = std::time::Duration::from_millis(50);

/// The multiplexing protocol engine.
///
/// Created from a split link, started once, closed once. Consumer-side
/// queue endpoints are taken once by their adapters; producer-side
/// handles are cloned.
pub struct Engine {
    sink: CommandSink,
    audio_out_tx: mpsc::Sender<Vec<u8>>,
    replies_rx: Option<mpsc::Receiver<Vec<u8>>>,
    audio_in_rx: Option<mpsc::Receiver<Vec<u8>>>,
    fatal_rx: Option<mpsc::Receiver<Error>>,
    fatal_tx: mpsc::Sender<Error>,

    // Moved into the workers by `start()`.
    reader: Option<Box<dyn LinkReader>>,
    writer: Option<Box<dyn LinkWriter>>,
    replies_tx: mpsc::Sender<Vec<u8>>,
    audio_in_tx: mpsc::Sender<Vec<u8>>,
    cmd_rx: Option<mpsc::Receiver<Vec<u8>>>,
    audio_out_rx: Option<mpsc::Receiver<Vec<u8>>>,

    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Build an engine around a split link. Both parse-state bits start
    /// false; no I/O happens until [`start`](Self::start).
    pub fn new(reader: Box<dyn LinkReader>, writer: Box<dyn LinkWriter>) -> Self {
        let (replies_tx, replies_rx) = mpsc::channel(CAT_QUEUE_CAPACITY);
        let (cmd_tx, cmd_rx) = mpsc::channel(CAT_QUEUE_CAPACITY);
        let (audio_in_tx, audio_in_rx) = mpsc::channel(AUDIO_QUEUE_CAPACITY);
        let (audio_out_tx, audio_out_rx) = mpsc::channel(AUDIO_QUEUE_CAPACITY);
        let (fatal_tx, fatal_rx) = mpsc::channel(1);

        Self {
            sink: CommandSink::new(cmd_tx, replies_tx.clone()),
            audio_out_tx,
            replies_rx: Some(replies_rx),
            audio_in_rx: Some(audio_in_rx),
            fatal_rx: Some(fatal_rx),
            fatal_tx,
            reader: Some(reader),
            writer: Some(writer),
            replies_tx,
            audio_in_tx,
            cmd_rx: Some(cmd_rx),
            audio_out_rx: Some(audio_out_rx),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Launch the receive and send workers. Call once.
    pub fn start(&mut self) {
        if let (Some(reader), Some(writer), Some(cmd_rx), Some(audio_out_rx)) = (
            self.reader.take(),
            self.writer.take(),
            self.cmd_rx.take(),
            self.audio_out_rx.take(),
        ) {
            self.tasks.push(tokio::spawn(recv_loop(
                reader,
                self.replies_tx.clone(),
                self.audio_in_tx.clone(),
                self.cancel.clone(),
                self.fatal_tx.clone(),
            )));
            self.tasks.push(tokio::spawn(send_loop(
                writer,
                cmd_rx,
                audio_out_rx,
                self.cancel.clone(),
                self.fatal_tx.clone(),
            )));
        }
    }

    /// Route one semicolon-separated command string from the host CAT
    /// side (responder rules: `ID` answered locally, the rest forwarded).
    pub async fn push_command(&self, text: &str) -> Result<()> {
        self.sink.push(text).await
    }

    /// Cloneable handle for the host CAT adapter.
    pub fn command_sink(&self) -> CommandSink {
        self.sink.clone()
    }

    /// Consumer side of the inbound CAT reply queue. Yields `None` after
    /// the first call.
    pub fn take_replies(&mut self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.replies_rx.take()
    }

    /// Consumer side of the inbound audio queue (frames for host
    /// playback). Yields `None` after the first call.
    pub fn take_playback_frames(&mut self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.audio_in_rx.take()
    }

    /// Producer side of the outbound audio queue, for the capture
    /// adapter.
    pub fn capture_sink(&self) -> mpsc::Sender<Vec<u8>> {
        self.audio_out_tx.clone()
    }

    /// Receiver for the first fatal worker error. Yields `None` after
    /// the first call.
    pub fn take_fatal(&mut self) -> Option<mpsc::Receiver<Error>> {
        self.fatal_rx.take()
    }

    /// Stop the workers and release the link.
    ///
    /// Waits 50 ms so in-flight writes observe the transmitting state,
    /// cancels, waits another 50 ms so workers leave their blocking
    /// calls at the next boundary, then joins them. The send worker
    /// flushes and closes the link on its way out.
    pub async fn close(mut self) {
        tokio::time::sleep(CLOSE_GRACE).await;
        self.cancel.cancel();
        tokio::time::sleep(CLOSE_GRACE).await;
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        debug!("engine closed");
    }
}

/// The receive worker: reads the link, demultiplexes, routes frames.
async fn recv_loop(
    mut reader: Box<dyn LinkReader>,
    replies: mpsc::Sender<Vec<u8>>,
    audio_in: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
    fatal: mpsc::Sender<Error>,
) {
    let mut demux = FrameDemux::new();
    let mut buf = [0u8; CHUNK_LEN];

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("receive worker cancelled");
                break;
            }

            result = reader.read(&mut buf) => match result {
                // Zero-byte reads are benign; just go around.
                Ok(0) => continue,
                Ok(n) => {
                    demux.push_bytes(&buf[..n]);
                    while let Some(frame) = demux.next_frame() {
                        let delivered = match frame {
                            Frame::Reply(reply) => {
                                trace!(reply = %String::from_utf8_lossy(&reply), "demuxed CAT reply");
                                replies.send(reply).await
                            }
                            Frame::Audio(samples) => {
                                trace!(len = samples.len(), "demuxed audio frame");
                                audio_in.send(samples).await
                            }
                        };
                        if delivered.is_err() {
                            debug!("frame consumer dropped, receive worker exiting");
                            return;
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "link read failed");
                    let _ = fatal.try_send(e);
                    break;
                }
            }
        }
    }
}

/// The send worker: drains the command and outbound audio queues
/// through the mode-aware serializer.
///
/// When both queues are ready the select is unbiased, but a selected
/// frame is always written to completion (guard byte, settle delays
/// included) before the next one begins.
async fn send_loop(
    writer: Box<dyn LinkWriter>,
    mut cmd_rx: mpsc::Receiver<Vec<u8>>,
    mut audio_rx: mpsc::Receiver<Vec<u8>>,
    cancel: CancellationToken,
    fatal: mpsc::Sender<Error>,
) {
    let mut serializer = Serializer::new(writer);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("send worker cancelled");
                break;
            }

            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => {
                    debug!(cmd = %String::from_utf8_lossy(&cmd), "[CAT -> Rig]");
                    if let Err(e) = serializer.write_command(&cmd).await {
                        error!(error = %e, "link write failed");
                        let _ = fatal.try_send(e);
                        break;
                    }
                }
                None => {
                    debug!("command queue closed, send worker exiting");
                    break;
                }
            },

            samples = audio_rx.recv() => match samples {
                Some(samples) => {
                    if let Err(e) = serializer.write_audio(samples).await {
                        error!(error = %e, "link write failed");
                        let _ = fatal.try_send(e);
                        break;
                    }
                }
                None => {
                    debug!("outbound audio queue closed, send worker exiting");
                    break;
                }
            },
        }
    }

    if let Err(e) = serializer.shutdown().await {
        debug!(error = %e, "link close failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use usdx_core::frame::{RADIO_ID_REPLY, WARMUP_SEQUENCE};
    use usdx_test_harness::{mock_link, MockLinkHandle};

    const TICK: Duration = Duration::from_millis(500);

    fn started_engine() -> (Engine, MockLinkHandle) {
        let (reader, writer, handle) = mock_link();
        let mut engine = Engine::new(Box::new(reader), Box::new(writer));
        engine.start();
        (engine, handle)
    }

    async fn wait_for_writes(handle: &MockLinkHandle, n: usize) -> Vec<Vec<u8>> {
        tokio::time::timeout(TICK, handle.wait_for_writes(n))
            .await
            .expect("timed out waiting for wire writes")
    }

    #[tokio::test]
    async fn inbound_reply_reaches_reply_queue() {
        let (mut engine, handle) = started_engine();
        let mut replies = engine.take_replies().unwrap();

        handle.push_incoming(b"FA00014074000;");

        let reply = tokio::time::timeout(TICK, replies.recv()).await.unwrap();
        assert_eq!(reply.unwrap(), b"FA00014074000;");
        engine.close().await;
    }

    #[tokio::test]
    async fn inbound_burst_routes_audio_then_reply() {
        let (mut engine, handle) = started_engine();
        let mut replies = engine.take_replies().unwrap();
        let mut playback = engine.take_playback_frames().unwrap();

        handle.push_incoming(b"US\x80\x81;FA00014074000;");

        let samples = tokio::time::timeout(TICK, playback.recv()).await.unwrap();
        assert_eq!(samples.unwrap(), vec![0x80, 0x81]);

        let reply = tokio::time::timeout(TICK, replies.recv()).await.unwrap();
        assert_eq!(reply.unwrap(), b"FA00014074000;");
        engine.close().await;
    }

    #[tokio::test]
    async fn id_query_answered_locally_never_forwarded() {
        let (mut engine, handle) = started_engine();
        let mut replies = engine.take_replies().unwrap();

        engine.push_command("RX;ID;").await.unwrap();

        // RX reaches the wire; ID is answered from the reply queue.
        let writes = wait_for_writes(&handle, 1).await;
        assert_eq!(writes, vec![b"RX;".to_vec()]);

        let reply = tokio::time::timeout(TICK, replies.recv()).await.unwrap();
        assert_eq!(reply.unwrap(), RADIO_ID_REPLY);

        // Give the send worker a beat: ID must never show up on the wire.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.writes().iter().all(|w| !w.starts_with(b"ID")));
        engine.close().await;
    }

    #[tokio::test]
    async fn warmup_sequence_reaches_wire_in_order() {
        let (engine, handle) = started_engine();

        engine.push_command(WARMUP_SEQUENCE).await.unwrap();

        let writes = wait_for_writes(&handle, 4).await;
        assert_eq!(
            writes,
            vec![
                b";".to_vec(),
                b"MD2;".to_vec(),
                b"UA2;".to_vec(),
                b"RX;".to_vec(),
            ]
        );
        engine.close().await;
    }

    #[tokio::test]
    async fn tx_cycle_escapes_audio_and_guards_rx() {
        let (engine, handle) = started_engine();
        let capture = engine.capture_sink();

        engine.push_command("TX0;").await.unwrap();
        wait_for_writes(&handle, 1).await;

        capture.send(vec![0x80, 0x3B, 0x90]).await.unwrap();
        wait_for_writes(&handle, 2).await;

        engine.push_command("RX;").await.unwrap();
        let writes = wait_for_writes(&handle, 4).await;

        assert_eq!(
            writes,
            vec![
                b"TX0;".to_vec(),
                vec![0x80, 0x3A, 0x90],
                b";".to_vec(),
                b"RX;".to_vec(),
            ]
        );
        engine.close().await;
    }

    #[tokio::test]
    async fn audio_outside_transmit_never_reaches_wire() {
        let (engine, handle) = started_engine();
        let capture = engine.capture_sink();

        capture.send(vec![0x11; 48]).await.unwrap();
        // A command afterwards proves the send worker is alive and the
        // audio frame was consumed, not queued.
        engine.push_command("FA;").await.unwrap();

        let writes = wait_for_writes(&handle, 1).await;
        assert_eq!(writes, vec![b"FA;".to_vec()]);
        engine.close().await;
    }

    #[tokio::test]
    async fn close_flushes_and_releases_link() {
        let (engine, handle) = started_engine();

        engine.close().await;

        assert!(handle.is_closed());
        assert!(handle.flush_count() >= 1);
    }

    #[tokio::test]
    async fn push_command_after_close_reports_not_connected() {
        let (engine, _handle) = started_engine();
        let sink = engine.command_sink();

        engine.close().await;

        let result = sink.push("FA;").await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn read_failure_reported_on_fatal_channel() {
        let (reader, writer, handle) = mock_link();
        let mut engine = Engine::new(Box::new(reader), Box::new(writer));
        engine.start();
        let mut fatal = engine.take_fatal().unwrap();

        // Dropping the handle makes the next read fail like an
        // unplugged device.
        drop(handle);

        let err = tokio::time::timeout(TICK, fatal.recv()).await.unwrap();
        assert!(matches!(err, Some(Error::ConnectionLost)));
        engine.close().await;
    }
}
