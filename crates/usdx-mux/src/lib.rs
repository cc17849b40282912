//! usdx-mux: The multiplexing protocol engine for the usdx driver.
//!
//! The radio carries CAT control traffic and digitized audio on one
//! 115200-baud serial stream. This crate sits between that stream and
//! the host-facing adapters, providing:
//!
//! - **Framing rules** ([`protocol`]) -- distinguish semicolon-terminated
//!   CAT replies from length-implicit audio frames without a length
//!   prefix, and escape outbound audio so it cannot alias the delimiter.
//! - **Demultiplexer** ([`demux`]) -- stateful accumulator that turns raw
//!   reads into [`Frame`](demux::Frame)s, tracking the streaming-burst
//!   state bit.
//! - **Serializer** ([`serializer`]) -- the single writer that interleaves
//!   commands and transmit audio with the radio's mode-transition
//!   handshakes and settle delays.
//! - **Responder** ([`responder`]) -- splits host command strings and
//!   answers identity queries locally, hiding link latency from CAT
//!   clients with tight round-trip deadlines.
//! - **Engine facade** ([`engine`]) -- wires the above into two workers
//!   over the split link and exposes the four bounded queues plus a
//!   Start/Close lifecycle.
//!
//! # Example
//!
//! ```
//! use usdx_mux::demux::{Frame, FrameDemux};
//!
//! let mut demux = FrameDemux::new();
//! demux.push_bytes(b"US\x90\x91;FA00014074000;");
//!
//! // The US-sentinel frame carries audio; the next frame is a CAT reply.
//! assert_eq!(demux.next_frame(), Some(Frame::Audio(vec![0x90, 0x91])));
//! assert_eq!(demux.next_frame(), Some(Frame::Reply(b"FA00014074000;".to_vec())));
//! ```

pub mod demux;
pub mod engine;
pub mod protocol;
pub mod responder;
pub mod serializer;

// Re-export the primary types for ergonomic `use usdx_mux::*`.
pub use demux::{Frame, FrameDemux};
pub use engine::Engine;
pub use responder::CommandSink;
