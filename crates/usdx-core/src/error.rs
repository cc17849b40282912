//! Error types for the usdx driver.
//!
//! All fallible operations across the workspace return [`Result<T>`],
//! which uses [`Error`] as the error type. Link-level, pseudo-terminal,
//! audio-backend, and channel-lifecycle errors are all captured here.

/// The error type for all usdx operations.
///
/// The serial link to the radio is the reason this driver exists, so
/// link failures are treated as unrecoverable by the engine: workers
/// report them on the fatal channel and stop. The remaining variants
/// cover the host-facing adapters and channel lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A serial-link error (open failure, unusable port).
    #[error("link error: {0}")]
    Link(String),

    /// A pseudo-terminal error (allocation, raw-mode configuration).
    #[error("pty error: {0}")]
    Pty(String),

    /// A host-audio backend error (device not found, stream start failure).
    #[error("audio error: {0}")]
    Audio(String),

    /// The engine is not running (queue endpoint dropped).
    #[error("engine not running")]
    NotConnected,

    /// The serial link was lost unexpectedly (unplugged device, EOF).
    #[error("link connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
