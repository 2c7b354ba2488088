//! Shared error plumbing and small text utilities used across agentdesk crates.

pub mod error;
pub mod text;

pub use error::FromMessage;
