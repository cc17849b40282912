//! Wire-protocol constants for the radio's shared CAT/audio byte stream.
//!
//! The radio multiplexes two kinds of traffic onto one 115200-baud
//! serial link:
//!
//! - Semicolon-terminated ASCII CAT frames, in the standard Kenwood
//!   format (`FA00014074000;`, `MD2;`, ...).
//! - Raw 8-bit unsigned PCM audio, carried in bursts that open with a
//!   CAT frame whose payload starts with the [`STREAM_SENTINEL`] and
//!   close at the next [`TERMINATOR`].
//!
//! Because audio shares the stream with `;`-delimited text, outbound
//! samples equal to the terminator byte are substituted with
//! [`ESCAPED_TERMINATOR`] before transmission. The radio applies the
//! same lossy substitution on its side, so no un-escape exists.

/// CAT command/response terminator byte (`;`).
pub const TERMINATOR: u8 = b';';

/// Substitute for a `0x3B` audio sample on the wire.
///
/// One LSB of quantization error on a single sample value, inaudible at
/// 8-bit depth.
pub const ESCAPED_TERMINATOR: u8 = 0x3A;

/// Two-byte prefix that opens an inbound audio burst inside a CAT frame.
pub const STREAM_SENTINEL: &[u8] = b"US";

/// Audio frame quantum: the largest inbound audio frame the demux emits
/// and the fixed size of outbound capture frames.
pub const CHUNK_LEN: usize = 48;

/// Midpoint of the 8-bit unsigned PCM range; a frame of this value is
/// silence.
pub const SILENCE: u8 = 0x80;

/// The fixed identity reply this driver impersonates (Kenwood TS-480
/// family).
///
/// Answered locally without a radio round trip: hamlib sends `RX;ID;`
/// with a round-trip deadline the real link cannot meet.
pub const RADIO_ID_REPLY: &[u8] = b"ID020;";

/// Warm-up command sequence sent once at startup: digital mode 2,
/// USB-audio streaming mode 2, force receive. The leading empty command
/// flushes any partial frame the radio may be holding.
pub const WARMUP_SEQUENCE: &str = ";MD2;UA2;RX;";

/// Shutdown command sequence: disable USB-audio streaming.
pub const SHUTDOWN_SEQUENCE: &str = ";UA0;";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminator_is_semicolon() {
        assert_eq!(TERMINATOR, 0x3B);
        assert_eq!(ESCAPED_TERMINATOR, TERMINATOR - 1);
    }

    #[test]
    fn identity_reply_is_terminated() {
        assert_eq!(*RADIO_ID_REPLY.last().unwrap(), TERMINATOR);
    }

    #[test]
    fn lifecycle_sequences_are_terminated() {
        assert!(WARMUP_SEQUENCE.ends_with(';'));
        assert!(SHUTDOWN_SEQUENCE.ends_with(';'));
    }
}
