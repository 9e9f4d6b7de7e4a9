//! # camlink Core
//!
//! Shared building blocks for the camlink crates: the error taxonomy used
//! across every layer and the identifier newtypes exchanged with the
//! signaling transport.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod ids;

// Re-export main types
pub use error::CamlinkError;
pub use ids::{CallId, ChannelId, PeerId};
