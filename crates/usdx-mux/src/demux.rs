//! Stateful frame demultiplexer for the inbound serial stream.
//!
//! [`FrameDemux`] wraps the pure [`decode_frame`](crate::protocol::decode_frame)
//! rules with the rolling accumulator and the single streaming-state bit.
//! The receive worker feeds it raw reads via [`push_bytes`](FrameDemux::push_bytes)
//! and drains complete frames with [`next_frame`](FrameDemux::next_frame).
//!
//! The accumulator is reset-on-emit: consumed bytes are drained as soon
//! as a frame is extracted, and the only data that can linger is a
//! partial CAT reply shorter than the chunk length, so the buffer stays
//! bounded by one chunk plus one read.

use crate::protocol::{decode_frame, DecodeResult};

/// A frame extracted from the inbound stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A CAT reply, terminator included, bound for the host CAT side.
    Reply(Vec<u8>),
    /// Raw 8-bit PCM samples, bound for host playback.
    Audio(Vec<u8>),
}

/// Accumulates inbound bytes and splits them into CAT replies and audio
/// frames.
#[derive(Debug, Default)]
pub struct FrameDemux {
    buf: Vec<u8>,
    streaming: bool,
}

impl FrameDemux {
    /// Create a demultiplexer in the idle (non-streaming) state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes read from the link.
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Extract the next complete frame, if one is available.
    ///
    /// Call in a loop after [`push_bytes`](Self::push_bytes) until it
    /// returns `None`; partial data stays buffered for the next read.
    pub fn next_frame(&mut self) -> Option<Frame> {
        match decode_frame(&self.buf, self.streaming) {
            DecodeResult::Reply { frame, consumed } => {
                self.buf.drain(..consumed);
                Some(Frame::Reply(frame))
            }
            DecodeResult::Audio {
                samples,
                consumed,
                streaming,
            } => {
                self.buf.drain(..consumed);
                self.streaming = streaming;
                Some(Frame::Audio(samples))
            }
            DecodeResult::Incomplete => None,
        }
    }

    /// Whether the parser is currently inside an audio burst.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usdx_core::frame::CHUNK_LEN;

    /// Drain all currently-available frames.
    fn drain(demux: &mut FrameDemux) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = demux.next_frame() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn pure_cat_reply() {
        let mut demux = FrameDemux::new();
        demux.push_bytes(b"FA00014074000;");

        assert_eq!(
            drain(&mut demux),
            vec![Frame::Reply(b"FA00014074000;".to_vec())]
        );
        assert!(!demux.is_streaming());
    }

    #[test]
    fn reply_split_across_reads() {
        let mut demux = FrameDemux::new();
        demux.push_bytes(b"FA000140");
        assert_eq!(demux.next_frame(), None);

        demux.push_bytes(b"74000;");
        assert_eq!(
            drain(&mut demux),
            vec![Frame::Reply(b"FA00014074000;".to_vec())]
        );
    }

    #[test]
    fn streaming_burst_across_chunks() {
        // A full sentinel-opened chunk, then a second chunk ending the
        // burst: two audio frames, in order.
        let mut first = b"US\x80\x81\x82".to_vec();
        first.resize(CHUNK_LEN, 0x90);

        let mut demux = FrameDemux::new();
        demux.push_bytes(&first);
        let frames = drain(&mut demux);
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            Frame::Audio(samples) => assert_eq!(samples.len(), CHUNK_LEN - 2),
            other => panic!("expected Audio, got {other:?}"),
        }
        assert!(demux.is_streaming());

        demux.push_bytes(b"\xA0\xA1\xA2;");
        assert_eq!(
            drain(&mut demux),
            vec![Frame::Audio(vec![0xA0, 0xA1, 0xA2])]
        );
        assert!(!demux.is_streaming());
    }

    #[test]
    fn interleaved_audio_then_reply() {
        let mut demux = FrameDemux::new();
        demux.push_bytes(b"US\x80\x81;FA00014074000;");

        assert_eq!(
            drain(&mut demux),
            vec![
                Frame::Audio(vec![0x80, 0x81]),
                Frame::Reply(b"FA00014074000;".to_vec()),
            ]
        );
        assert!(!demux.is_streaming());
    }

    #[test]
    fn mid_burst_short_fragment() {
        let mut demux = FrameDemux::new();
        let mut chunk = b"US".to_vec();
        chunk.resize(CHUNK_LEN, 0x80);
        demux.push_bytes(&chunk);
        drain(&mut demux);
        assert!(demux.is_streaming());

        // Inside the burst a short delimiterless fragment is emitted
        // immediately instead of waiting for a full chunk.
        demux.push_bytes(b"\x90\x91");
        assert_eq!(drain(&mut demux), vec![Frame::Audio(vec![0x90, 0x91])]);
        assert!(demux.is_streaming());
    }

    #[test]
    fn accumulator_drains_on_emit() {
        let mut demux = FrameDemux::new();
        for _ in 0..100 {
            demux.push_bytes(b"MD2;");
            assert_eq!(demux.next_frame(), Some(Frame::Reply(b"MD2;".to_vec())));
        }
        assert_eq!(demux.buf.len(), 0);
    }
}
