//! `GET /v1/archive/{*path}`: stream a directory as a ZIP download.
//!
//! # Design
//! - Root validation happens before any byte is sent, so failures still get a problem document.
//! - Once streaming starts, failures only truncate the body.
//! - Dropping the body before it completes cancels the archive.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::Response;
use futures_util::Stream;
use serde::Deserialize;
use tokio::io::DuplexStream;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use zipline_core::FsPath;
use zipline_pipeline::{ArchiveCompletion, ArchiveError, ArchiveRequest};
use zipline_telemetry::RequestContext;

use crate::http::constants::{CONTENT_TYPE_ZIP, DEFAULT_ARCHIVE_NAME, HEADER_ARCHIVE_ID};
use crate::http::errors::ApiError;
use crate::http::subject::subject_from_headers;
use crate::state::ApiState;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ArchiveQuery {
    #[serde(default)]
    recursive: bool,
}

pub(crate) async fn archive_root(
    state: State<Arc<ApiState>>,
    query: Result<Query<ArchiveQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    stream_archive(state, String::new(), query, &headers).await
}

pub(crate) async fn archive_path(
    state: State<Arc<ApiState>>,
    Path(path): Path<String>,
    query: Result<Query<ArchiveQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    stream_archive(state, path, query, &headers).await
}

async fn stream_archive(
    State(state): State<Arc<ApiState>>,
    path: String,
    query: Result<Query<ArchiveQuery>, QueryRejection>,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let subject = subject_from_headers(headers)?;
    let root = FsPath::parse(&format!("/{}", path.trim_start_matches('/')))
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let download = state
        .archives
        .open(subject, root.clone(), query.recursive)
        .await
        .map_err(ApiError::from)?;
    let (body, request, completion) = download.into_parts();
    let http = correlation();
    info!(
        request_id = %request.id(),
        http_request_id = %http.request_id(),
        route = %http.route(),
        recursive = query.recursive,
        "archive stream opened"
    );
    let archive_id = HeaderValue::from_str(&request.id().to_string())
        .map_err(|err| ApiError::internal(err.to_string()))?;
    watch_completion(Arc::clone(&request), completion, http);

    let stream = ArchiveBody {
        inner: ReaderStream::new(body),
        guard: DisconnectGuard {
            request,
            finished: false,
        },
    };
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, CONTENT_TYPE_ZIP)
        .header(header::CONTENT_DISPOSITION, content_disposition(&root))
        .header(HEADER_ARCHIVE_ID, archive_id)
        .body(Body::from_stream(stream))
        .map_err(|err| ApiError::internal(err.to_string()))
}

/// Correlation of the enclosing HTTP request; empty outside the metrics layer.
fn correlation() -> RequestContext {
    RequestContext::current().unwrap_or_else(|| RequestContext::new("", ""))
}

fn watch_completion(
    request: Arc<ArchiveRequest>,
    completion: ArchiveCompletion,
    http: RequestContext,
) {
    tokio::spawn(async move {
        let http_request_id = http.request_id();
        match completion.await {
            Ok(summary) => info!(
                request_id = %request.id(),
                http_request_id = %http_request_id,
                entries = summary.entries,
                bytes = summary.bytes,
                problems = summary.problems.len(),
                "archive download finished"
            ),
            Err(ArchiveError::Cancelled) => debug!(
                request_id = %request.id(),
                http_request_id = %http_request_id,
                "archive download cancelled"
            ),
            Err(err) => warn!(
                request_id = %request.id(),
                http_request_id = %http_request_id,
                error = %err,
                "archive download failed"
            ),
        }
    });
}

fn content_disposition(root: &FsPath) -> HeaderValue {
    let stem: String = root
        .name()
        .unwrap_or(DEFAULT_ARCHIVE_NAME)
        .chars()
        .map(|ch| {
            if ch == ' ' || (ch.is_ascii_graphic() && ch != '"' && ch != '\\') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{stem}.zip\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"archive.zip\""))
}

struct DisconnectGuard {
    request: Arc<ArchiveRequest>,
    finished: bool,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.finished {
            debug!(request_id = %self.request.id(), "client dropped archive body");
            self.request.cancel();
        }
    }
}

struct ArchiveBody {
    inner: ReaderStream<DuplexStream>,
    guard: DisconnectGuard,
}

impl Stream for ArchiveBody {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = Pin::new(&mut self.inner).poll_next(cx);
        if let Poll::Ready(None) = polled {
            self.guard.finished = true;
        }
        polled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_uses_the_directory_name() -> Result<(), Box<dyn std::error::Error>> {
        let value = content_disposition(&FsPath::parse("/data/run 42")?);
        assert_eq!(value.to_str()?, "attachment; filename=\"run 42.zip\"");

        let root = content_disposition(&FsPath::root());
        assert_eq!(root.to_str()?, "attachment; filename=\"archive.zip\"");

        let quoted = content_disposition(&FsPath::parse("/a\"b")?);
        assert_eq!(quoted.to_str()?, "attachment; filename=\"a_b.zip\"");
        Ok(())
    }

    #[tokio::test]
    async fn correlation_reads_the_enclosing_request_scope() {
        let inside =
            zipline_telemetry::with_request_context("req-9", "/v1/archive/{*path}", async {
                correlation()
            })
            .await;
        assert_eq!(inside.request_id(), "req-9");
        assert_eq!(inside.route(), "/v1/archive/{*path}");
        assert_eq!(correlation().request_id(), "");
    }
}
