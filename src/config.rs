use std::time::Duration;

/// Maximum number of swarm sessions kept alive at once.
pub const MAX_SESSIONS: usize = 10;

/// Seconds to wait for torrent metadata before giving up on a magnet link.
pub const METADATA_TIMEOUT_SECS: u64 = 30;

/// Content type used when the file extension is not recognised.
pub const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

/// Suffixes accepted as playable media, lowercase.
pub const MEDIA_EXTENSIONS: [&str; 8] = [
    ".mp4", ".mkv", ".avi", ".mov", ".wmv", ".flv", ".webm", ".m4v",
];

/// Suffixes that outrank every other playable suffix regardless of size.
pub const PREFERRED_EXTENSIONS: [&str; 2] = [".mp4", ".mkv"];

/// Seconds the HTTP server gets to drain open responses at shutdown.
pub const SHUTDOWN_GRACE_SECS: u64 = 5;

/// Top-level configuration for the streaming server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP API binds to.
    pub bind_addr: String,
    /// Port the HTTP API listens on.
    pub port: u16,
    /// Base URL of the rqbit HTTP API that performs the swarm work.
    pub rqbit_url: String,
    /// Session capacity of the registry.
    pub max_sessions: usize,
    /// Metadata wait bound in seconds.
    pub metadata_timeout_secs: u64,
}

impl ServerConfig {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 3000,
            rqbit_url: "http://127.0.0.1:3030".to_string(),
            max_sessions: MAX_SESSIONS,
            metadata_timeout_secs: METADATA_TIMEOUT_SECS,
        }
    }
}
