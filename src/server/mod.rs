// HTTP surface: API routes, Range handling and the streaming gateway.

pub mod handler;
pub mod models;
pub mod range;
pub mod stream;
