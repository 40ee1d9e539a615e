// Session management: swarm sessions and the bounded registry that owns them.

pub mod magnet;
pub mod registry;
pub mod session;
pub mod stats;
