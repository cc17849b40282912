// usdx-bridge -- user-space driver daemon that turns an audio-over-CAT
// QRP transceiver on one USB serial port into a virtual radio: a CAT
// pseudo-terminal for logging/digimode software plus a host audio
// playback/capture pair.
//
// Usage:
//   usdx-bridge --port /dev/ttyUSB0
//   usdx-bridge --port /dev/ttyUSB0 --audio-device "USB Audio CODEC"
//   LOG_LEVEL=debug usdx-bridge --port /dev/ttyUSB0

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use usdx_core::frame::{SHUTDOWN_SEQUENCE, WARMUP_SEQUENCE};
use usdx_mux::{CommandSink, Engine};
use usdx_transport::pty::TTY_BUF;
use usdx_transport::{AsyncTty, CatBridge, RadioAudio, SerialLink};

/// usdx-bridge -- CAT + audio virtual radio for one serial-attached rig.
#[derive(Parser)]
#[command(name = "usdx-bridge", version, about)]
struct Cli {
    /// Serial port of the radio (e.g. /dev/ttyUSB0).
    #[arg(long)]
    port: String,

    /// Host audio device name. Defaults to the system default device.
    #[arg(long)]
    audio_device: Option<String>,
}

/// Initialize tracing from the `LOG_LEVEL` environment variable
/// (default `info`).
fn init_logging() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Forward CAT commands from the client pty into the engine.
async fn cat_commands(tty: AsyncTty, sink: CommandSink, cancel: CancellationToken) {
    let mut buf = [0u8; TTY_BUF];
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            result = tty.read(&mut buf) => match result {
                Ok(0) => continue,
                Ok(n) => {
                    let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                    debug!(cmd = %text, "[CAT -> Rig]");
                    if sink.push(&text).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "CAT port read failed");
                    break;
                }
            }
        }
    }
}

/// Forward engine replies back to the client pty.
async fn cat_replies(
    tty: AsyncTty,
    mut replies: mpsc::Receiver<Vec<u8>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            reply = replies.recv() => match reply {
                Some(reply) => {
                    debug!(reply = %String::from_utf8_lossy(&reply), "[CAT <- Rig]");
                    if let Err(e) = tty.write_all(&reply).await {
                        warn!(error = %e, "CAT port write failed");
                        break;
                    }
                }
                None => break,
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let link = SerialLink::open(&cli.port).context("failed to open the radio's serial port")?;
    let (reader, writer) = link.split();
    let mut engine = Engine::new(Box::new(reader), Box::new(writer));

    // The radio needs a moment on the line before it will talk.
    info!("warming up, please wait...");
    tokio::time::sleep(Duration::from_secs(3)).await;
    engine.start();

    let mut fatal = engine.take_fatal().context("fatal channel already taken")?;
    let replies = engine.take_replies().context("reply queue already taken")?;
    let playback = engine
        .take_playback_frames()
        .context("playback queue already taken")?;

    let cancel = CancellationToken::new();

    // Host CAT side: pty bridge plus the two forwarding tasks.
    let bridge = CatBridge::open().context("failed to allocate CAT pseudo-terminals")?;
    info!(port = %bridge.client_path().display(), "CAT serial port ready");
    let mut adapters = bridge.spawn_copy(&cancel);
    adapters.push(tokio::spawn(cat_commands(
        bridge.engine_tty(),
        engine.command_sink(),
        cancel.clone(),
    )));
    adapters.push(tokio::spawn(cat_replies(
        bridge.engine_tty(),
        replies,
        cancel.clone(),
    )));

    // Host audio side.
    let mut audio = RadioAudio::new(cli.audio_device.as_deref());
    audio
        .start_playback(playback)
        .context("failed to start audio playback")?;
    audio
        .start_capture(engine.capture_sink())
        .context("failed to start audio capture")?;

    engine
        .push_command(WARMUP_SEQUENCE)
        .await
        .context("failed to send warm-up sequence")?;
    info!("driver ready, press Ctrl-C to stop");

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let fatal_err = tokio::select! {
        _ = tokio::signal::ctrl_c() => None,
        _ = sigterm.recv() => None,
        err = fatal.recv() => err,
    };

    if let Some(e) = &fatal_err {
        error!(error = %e, "link failure, shutting down");
    } else {
        info!("shutting down");
        // Tell the radio to stop streaming before the link goes away.
        let _ = engine.push_command(SHUTDOWN_SEQUENCE).await;
    }

    audio.stop();
    engine.close().await;
    cancel.cancel();
    for task in adapters {
        let _ = task.await;
    }

    match fatal_err {
        Some(e) => Err(e).context("radio link failed"),
        None => {
            info!("bye-bye!");
            Ok(())
        }
    }
}
