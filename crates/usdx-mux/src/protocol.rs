//! Framing rules for the radio's interleaved CAT/audio stream.
//!
//! The radio multiplexes two frame kinds onto the serial link with no
//! length prefix, separated by the `;` terminator:
//!
//! - A **CAT reply**: an ASCII payload followed by `;` (terminator
//!   included on the wire), e.g. `FA00014074000;`.
//! - An **audio frame**: up to [`CHUNK_LEN`] bytes of raw 8-bit unsigned
//!   PCM, either followed by `;` (closing a streaming burst) or
//!   terminating implicitly at the full chunk length.
//!
//! A burst opens with a CAT frame whose payload starts with the `US`
//! sentinel: its remaining bytes are the first audio payload. The burst
//! stays open across full-chunk fragments and closes at the next `;`.
//!
//! # Decoding
//!
//! [`decode_frame`] is a pure function over an accumulator slice plus
//! the one-bit streaming state. It returns at most one frame and the
//! number of bytes consumed; incomplete data stays in the accumulator.
//! A delimiterless run that has already reached the chunk length but is
//! not sentinel-prefixed cannot be distinguished from a garbled reply;
//! it is delivered as a CAT reply unchanged and the client decides.
//!
//! # Encoding
//!
//! Commands travel through the engine delimiter-free;
//! [`encode_command`] appends the single trailing `;` at transmit time.
//! Outbound audio shares the stream with the delimiter, so
//! [`escape_audio`] substitutes `0x3B` samples with `0x3A` before they
//! are written. There is no inbound un-escape: the radio performs the
//! same lossy substitution on its side.

use bytes::{BufMut, BytesMut};

use usdx_core::frame::{CHUNK_LEN, ESCAPED_TERMINATOR, STREAM_SENTINEL, TERMINATOR};

/// Result of attempting to decode one frame from the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// A complete CAT reply, terminator included.
    Reply {
        /// The reply bytes, ending with `;` (except for the garbled
        /// delimiterless case described in the module docs).
        frame: Vec<u8>,
        /// Number of bytes consumed from the accumulator.
        consumed: usize,
    },

    /// An audio frame extracted from a streaming burst.
    Audio {
        /// The PCM payload, sentinel and terminator stripped.
        samples: Vec<u8>,
        /// Number of bytes consumed from the accumulator.
        consumed: usize,
        /// Streaming state after this frame: `true` while the burst is
        /// still open (no terminator seen yet).
        streaming: bool,
    },

    /// Not enough data for a complete frame. Leave the bytes in the
    /// accumulator and wait for more.
    Incomplete,
}

/// Attempt to decode one frame from `buf`.
///
/// `streaming` is the parser's current state: `true` while inside an
/// audio burst. The caller owns the accumulator and drains `consumed`
/// bytes on success.
///
/// # Example
///
/// ```
/// use usdx_mux::protocol::{decode_frame, DecodeResult};
///
/// match decode_frame(b"FA00014074000;", false) {
///     DecodeResult::Reply { frame, consumed } => {
///         assert_eq!(frame, b"FA00014074000;");
///         assert_eq!(consumed, 14);
///     }
///     other => panic!("expected Reply, got {other:?}"),
/// }
/// ```
pub fn decode_frame(buf: &[u8], streaming: bool) -> DecodeResult {
    if buf.is_empty() {
        return DecodeResult::Incomplete;
    }

    // Everything up to and including the next terminator, or the whole
    // accumulator if none is present.
    let (data, has_term) = match buf.iter().position(|&b| b == TERMINATOR) {
        Some(pos) => (&buf[..=pos], true),
        None => (buf, false),
    };

    // A short delimiterless run outside a burst is a partial CAT reply.
    if !has_term && data.len() < CHUNK_LEN && !streaming {
        return DecodeResult::Incomplete;
    }

    let consumed = data.len();

    if streaming {
        let samples = if has_term { &data[..consumed - 1] } else { data };
        return DecodeResult::Audio {
            samples: samples.to_vec(),
            consumed,
            streaming: !has_term,
        };
    }

    if data.starts_with(STREAM_SENTINEL) {
        let body = &data[STREAM_SENTINEL.len()..];
        let samples = if has_term { &body[..body.len() - 1] } else { body };
        return DecodeResult::Audio {
            samples: samples.to_vec(),
            consumed,
            streaming: !has_term,
        };
    }

    DecodeResult::Reply {
        frame: data.to_vec(),
        consumed,
    }
}

/// Encode a delimiter-free command for the wire by appending the
/// terminator.
///
/// # Example
///
/// ```
/// use usdx_mux::protocol::encode_command;
///
/// assert_eq!(encode_command(b"MD2"), b"MD2;");
/// assert_eq!(encode_command(b""), b";");
/// ```
pub fn encode_command(cmd: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(cmd.len() + 1);
    buf.put_slice(cmd);
    buf.put_u8(TERMINATOR);
    buf.to_vec()
}

/// Substitute terminator-valued samples in-place so outbound audio can
/// never alias a frame boundary.
pub fn escape_audio(samples: &mut [u8]) {
    for sample in samples.iter_mut() {
        if *sample == TERMINATOR {
            *sample = ESCAPED_TERMINATOR;
        }
    }
}
