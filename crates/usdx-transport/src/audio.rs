//! cpal host-audio adapters for the radio's PCM streams.
//!
//! The radio's audio is 8-bit unsigned mono PCM in 48-byte frames, at
//! rates dictated by its internal clocks: 7820 Hz for receive audio
//! played to the host, 11520 Hz for transmit audio captured from the
//! host. A few hertz of deviation causes pitch drift but no protocol
//! failure.
//!
//! cpal uses a callback model: the OS audio subsystem invokes a closure
//! on a high-priority thread whenever samples are needed (playback) or
//! available (capture). The callbacks bridge to the engine's tokio
//! channels without ever blocking the audio thread:
//!
//! - **Playback**: `try_recv` on the inbound audio queue; when the
//!   queue is empty at pull time the callback substitutes a frame of
//!   silence (`0x80`) rather than underflowing.
//! - **Capture**: samples accumulate into fixed 48-byte frames and are
//!   `try_send`-ed to the outbound queue; frames are dropped rather
//!   than stalling the callback when the engine falls behind.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;
use tracing::error;

use usdx_core::error::{Error, Result};
use usdx_core::frame::{CHUNK_LEN, SILENCE};

/// Sample rate of receive audio played to the host.
pub const PLAYBACK_SAMPLE_RATE: u32 = 7820;

/// Sample rate of transmit audio captured from the host.
pub const CAPTURE_SAMPLE_RATE: u32 = 11520;

/// Host-audio backend bridging cpal streams to the engine's queues.
///
/// The cpal [`Stream`](cpal::Stream) objects are held inside this
/// struct; dropping them stops playback/capture, so keep the backend
/// alive for the lifetime of the driver.
pub struct RadioAudio {
    device_name: Option<String>,
    input_stream: Option<cpal::Stream>,
    output_stream: Option<cpal::Stream>,
}

impl RadioAudio {
    /// Target the named audio device, or the host default when `None`.
    ///
    /// No streams are opened until [`start_playback`](Self::start_playback)
    /// or [`start_capture`](Self::start_capture) is called.
    pub fn new(device_name: Option<&str>) -> Self {
        Self {
            device_name: device_name.map(str::to_string),
            input_stream: None,
            output_stream: None,
        }
    }

    /// Open the playback stream, fed from the engine's inbound audio
    /// queue.
    pub fn start_playback(&mut self, mut frames: mpsc::Receiver<Vec<u8>>) -> Result<()> {
        let device = find_device(self.device_name.as_deref(), false)?;
        let config = stream_config(PLAYBACK_SAMPLE_RATE);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [u8], _info: &cpal::OutputCallbackInfo| {
                    match frames.try_recv() {
                        Ok(frame) => fill_playback(data, &frame),
                        Err(_) => data.fill(SILENCE),
                    }
                },
                |err| error!(error = %err, "audio playback stream error"),
                None,
            )
            .map_err(|e| Error::Audio(format!("failed to build playback stream: {e}")))?;

        stream
            .play()
            .map_err(|e| Error::Audio(format!("failed to start playback stream: {e}")))?;
        self.output_stream = Some(stream);
        Ok(())
    }

    /// Open the capture stream, feeding the engine's outbound audio
    /// queue in fixed 48-byte frames.
    pub fn start_capture(&mut self, frames: mpsc::Sender<Vec<u8>>) -> Result<()> {
        let device = find_device(self.device_name.as_deref(), true)?;
        let config = stream_config(CAPTURE_SAMPLE_RATE);

        let mut carry: Vec<u8> = Vec::with_capacity(CHUNK_LEN);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[u8], _info: &cpal::InputCallbackInfo| {
                    chunk_capture(&mut carry, data, &frames);
                },
                |err| error!(error = %err, "audio capture stream error"),
                None,
            )
            .map_err(|e| Error::Audio(format!("failed to build capture stream: {e}")))?;

        stream
            .play()
            .map_err(|e| Error::Audio(format!("failed to start capture stream: {e}")))?;
        self.input_stream = Some(stream);
        Ok(())
    }

    /// Stop both streams and release the audio device.
    pub fn stop(&mut self) {
        self.input_stream = None;
        self.output_stream = None;
    }
}

/// 8-bit unsigned mono at the radio's rate, in chunk-sized callbacks.
fn stream_config(sample_rate: u32) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Fixed(CHUNK_LEN as u32),
    }
}

/// Find an audio device by name, or fall back to the host default.
fn find_device(name: Option<&str>, for_input: bool) -> Result<cpal::Device> {
    let host = cpal::default_host();

    let Some(name) = name else {
        return if for_input {
            host.default_input_device()
                .ok_or_else(|| Error::Audio("no default audio input device".into()))
        } else {
            host.default_output_device()
                .ok_or_else(|| Error::Audio("no default audio output device".into()))
        };
    };

    let devices = if for_input {
        host.input_devices()
            .map_err(|e| Error::Audio(format!("failed to enumerate input devices: {e}")))?
    } else {
        host.output_devices()
            .map_err(|e| Error::Audio(format!("failed to enumerate output devices: {e}")))?
    };

    for device in devices {
        if let Ok(desc) = device.name() {
            if desc == name {
                return Ok(device);
            }
        }
    }

    Err(Error::Audio(format!("audio device not found: {name}")))
}

/// Fill one playback callback buffer from a demuxed frame.
///
/// Frames may be shorter than the callback buffer (burst tails); the
/// remainder is padded with silence. Overlong frames are truncated.
fn fill_playback(out: &mut [u8], frame: &[u8]) {
    let n = out.len().min(frame.len());
    out[..n].copy_from_slice(&frame[..n]);
    out[n..].fill(SILENCE);
}

/// Accumulate captured samples into fixed chunk-length frames.
///
/// Complete frames are `try_send`-ed; a full queue drops the frame
/// instead of blocking the audio thread.
fn chunk_capture(carry: &mut Vec<u8>, data: &[u8], frames: &mpsc::Sender<Vec<u8>>) {
    for &sample in data {
        carry.push(sample);
        if carry.len() == CHUNK_LEN {
            let frame = std::mem::replace(carry, Vec::with_capacity(CHUNK_LEN));
            let _ = frames.try_send(frame);
        }
    }
}
