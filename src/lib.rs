//! Magnet-to-HTTP streaming: a bounded cache of swarm sessions and a
//! range-aware gateway that serves files while they are still downloading.

pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod logging;
pub mod server;
pub mod source;

pub use error::{Result, StreamError};
