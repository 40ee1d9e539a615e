// Error taxonomy shared by the registry, the gateway and the engine adapters.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Debug, Error)]
pub enum StreamError {
    /// Malformed or missing client input.
    #[error("{0}")]
    Validation(String),

    /// Unknown session or file index.
    #[error("{0}")]
    NotFound(String),

    #[error("Timeout waiting for torrent metadata after {secs}s. Check if the magnet link is valid and has active peers.")]
    MetadataTimeout { secs: u64 },

    #[error("No video files found in this torrent")]
    NoPlayableFile,

    #[error("Requested range not satisfiable for {size} byte file")]
    RangeNotSatisfiable { size: u64 },

    /// Read or transport failure while a response body is streaming.
    #[error("Stream I/O error: {0}")]
    StreamIo(#[from] std::io::Error),

    /// Unrecoverable error reported by the swarm engine.
    #[error("Engine error: {0}")]
    EngineFatal(String),
}

impl StreamError {
    pub fn engine(message: impl Into<String>) -> Self {
        Self::EngineFatal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::MetadataTimeout { .. }
            | Self::NoPlayableFile
            | Self::StreamIo(_)
            | Self::EngineFatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(e: reqwest::Error) -> Self {
        Self::EngineFatal(e.to_string())
    }
}

impl IntoResponse for StreamError {
    fn into_response(self) -> Response {
        if let Self::RangeNotSatisfiable { size } = &self {
            // 416 carries the file size and an empty body.
            return (
                self.status(),
                [(header::CONTENT_RANGE, format!("bytes */{}", size))],
            )
                .into_response();
        }
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
