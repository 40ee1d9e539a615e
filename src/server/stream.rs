// Range stream gateway: maps a Range header and a session file onto a progressive response.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tracing::{debug, error, warn};

use super::range::{resolve_range, RangeOutcome};
use crate::detect::selector::content_type_for;
use crate::engine::registry::SessionRegistry;
use crate::engine::session::Session;
use crate::error::{Result, StreamError};
use crate::source::traits::ByteRange;

pub enum DirectiveBody {
    Empty,
    Stream(BoxStream<'static, std::io::Result<bytes::Bytes>>),
}

/// Status, headers and body source for one stream request.
pub struct ResponseDirective {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: DirectiveBody,
}

impl IntoResponse for ResponseDirective {
    fn into_response(self) -> Response {
        let body = match self.body {
            DirectiveBody::Empty => Body::empty(),
            DirectiveBody::Stream(s) => Body::from_stream(s),
        };
        (self.status, self.headers, body).into_response()
    }
}

/// Resolved request before any engine read is opened.
pub struct StreamPlan {
    pub session: Arc<Session>,
    pub file_index: usize,
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `None` when the response has no body, otherwise the range to read
    /// (`Some(None)` is the whole file).
    pub read: Option<Option<ByteRange>>,
}

impl StreamPlan {
    /// The directive without a body, as answered to HEAD.
    pub fn into_head(self) -> ResponseDirective {
        ResponseDirective {
            status: self.status,
            headers: self.headers,
            body: DirectiveBody::Empty,
        }
    }
}

pub struct RangeStreamGateway {
    registry: Arc<SessionRegistry>,
}

fn content_disposition(file_name: &str) -> HeaderValue {
    let sanitized: String = file_name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if c == '"' { '\'' } else { c })
        .collect();
    HeaderValue::from_bytes(format!("inline; filename=\"{}\"", sanitized).as_bytes())
        .unwrap_or_else(|_| HeaderValue::from_static("inline"))
}

fn ascii_value(value: String) -> HeaderValue {
    // Only ever called with digits, '-', '/', '*' and a known content type.
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

impl RangeStreamGateway {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve session, file and range into status and headers.
    pub fn plan(
        &self,
        info_hash: &str,
        file_index: usize,
        range_header: Option<&str>,
    ) -> Result<StreamPlan> {
        // `get` refreshes recency, so an active reader is never the oldest candidate.
        let session = self
            .registry
            .get(info_hash)
            .ok_or_else(|| StreamError::NotFound("File not found".to_string()))?;
        let file = session
            .file(file_index)
            .ok_or_else(|| StreamError::NotFound("File not found".to_string()))?;
        let total = file.size;

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, ascii_value(content_type_for(&file.name)));
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        headers.insert(header::CONTENT_DISPOSITION, content_disposition(&file.name));

        let (status, read) = match resolve_range(range_header, total) {
            RangeOutcome::Full => {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(total));
                debug!("streaming entire file: {} ({} bytes)", file.name, total);
                (StatusCode::OK, Some(None))
            }
            RangeOutcome::Partial(range) => {
                headers.insert(
                    header::CONTENT_RANGE,
                    ascii_value(format!("bytes {}-{}/{}", range.start, range.end, total)),
                );
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(range.len()));
                debug!(
                    "streaming range {}-{}/{} for {}",
                    range.start, range.end, total, file.name
                );
                (StatusCode::PARTIAL_CONTENT, Some(Some(range)))
            }
            RangeOutcome::Unsatisfiable => {
                debug!("unsatisfiable range {:?} for {}", range_header, file.name);
                return Err(StreamError::RangeNotSatisfiable { size: total });
            }
            RangeOutcome::MultipleRanges => {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(0u64));
                debug!("multi-range request rejected for {}", file.name);
                (StatusCode::RANGE_NOT_SATISFIABLE, None)
            }
        };

        Ok(StreamPlan {
            session,
            file_index,
            status,
            headers,
            read,
        })
    }

    /// Build the full response directive, opening the engine read when there is a body.
    ///
    /// The first chunk is pulled before the directive is returned, so an engine
    /// failure up to that point becomes an error status instead of a truncated
    /// body. Failures after that end the body stream and the connection.
    pub async fn serve(
        &self,
        info_hash: &str,
        file_index: usize,
        range_header: Option<&str>,
    ) -> Result<ResponseDirective> {
        let plan = self.plan(info_hash, file_index, range_header)?;
        let Some(range) = plan.read else {
            return Ok(plan.into_head());
        };

        let mut source = plan.session.open_read(plan.file_index, range).await.map_err(|e| {
            error!("stream open failed for {}: {}", plan.session.info_hash(), e);
            e
        })?;

        let first = match source.next().await {
            Some(Ok(chunk)) => Some(chunk),
            Some(Err(e)) => {
                error!("stream error before first byte: {}", e);
                return Err(StreamError::StreamIo(e));
            }
            None => None,
        };

        let info_hash = plan.session.info_hash().to_string();
        let body = stream::iter(first.map(Ok))
            .chain(source)
            .map(move |item| {
                if let Err(e) = &item {
                    warn!("stream aborted for {}: {}", info_hash, e);
                }
                item
            })
            .boxed();

        Ok(ResponseDirective {
            status: plan.status,
            headers: plan.headers,
            body: DirectiveBody::Stream(body),
        })
    }
}
