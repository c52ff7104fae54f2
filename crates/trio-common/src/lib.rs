//! Shared wire protocol for the trio relay hub.
//!
//! This crate provides:
//! - The fixed participant identifiers ([`role`])
//! - JSON envelope encoding and decoding ([`envelope`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod envelope;
pub mod role;

pub use envelope::{DecodeError, Envelope};
pub use role::Role;
