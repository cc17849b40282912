//! usdx-transport: Host-facing adapters for the usdx driver.
//!
//! The protocol engine in `usdx-mux` is pure plumbing between queues;
//! this crate provides the three places those queues meet the outside
//! world:
//!
//! - [`SerialLink`]: the single 115200-baud serial connection to the
//!   radio, split into the reader/writer halves the engine's two
//!   workers own.
//! - [`CatBridge`]: two pseudo-terminal pairs wired master-to-master so
//!   CAT clients (hamlib, wsjt-x, loggers) see an ordinary serial port.
//! - [`RadioAudio`]: cpal playback/capture streams carrying the radio's
//!   8-bit mono PCM to and from the host audio subsystem.

pub mod audio;
pub mod pty;
pub mod serial;

pub use audio::RadioAudio;
pub use pty::{AsyncTty, CatBridge};
pub use serial::SerialLink;
