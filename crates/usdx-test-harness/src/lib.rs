//! usdx-test-harness: Scripted mock serial link for deterministic
//! testing of the protocol engine.
//!
//! This crate provides [`mock_link`], which builds an in-memory
//! [`LinkReader`](usdx_core::LinkReader) / [`LinkWriter`](usdx_core::LinkWriter)
//! pair plus a [`MockLinkHandle`] for scripting inbound bytes and
//! inspecting everything the engine wrote, without real radio hardware.

pub mod mock_link;

pub use mock_link::{mock_link, MockLinkHandle, MockLinkReader, MockLinkWriter};
