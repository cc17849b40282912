//! usdx-core: Core traits, protocol constants, and error definitions for
//! the usdx driver.
//!
//! This crate defines the link-agnostic abstractions shared by the
//! protocol engine (`usdx-mux`), the host-facing adapters
//! (`usdx-transport`), and the test harness:
//!
//! - [`LinkReader`] / [`LinkWriter`] -- the two halves of the byte-level
//!   serial link to the radio
//! - [`frame`] -- wire-protocol constants (terminator, audio chunk size,
//!   stream sentinel, identity reply)
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod frame;
pub mod link;

// Re-export key types at crate root for ergonomic `use usdx_core::*`.
pub use error::{Error, Result};
pub use link::{LinkReader, LinkWriter};
