//! Request ids and the per-request tracing span.

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{HeaderMap, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Mints `req_<32 hex>` ids for requests that arrive without one.
#[derive(Clone, Copy, Default)]
pub struct ForgeRequestId;

impl ForgeRequestId {
    fn mint() -> String {
        format!("req_{}", Uuid::new_v4().simple())
    }
}

impl MakeRequestId for ForgeRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let value = Self::mint().parse().ok()?;
        Some(RequestId::new(value))
    }
}

fn request_id_of(headers: &HeaderMap) -> &str {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

/// Span for `TraceLayer`. Uses the route template rather than the raw path so
/// image and bundle ids stay out of span names.
pub fn request_span(request: &Request<Body>) -> tracing::Span {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(MatchedPath::as_str)
        .unwrap_or_else(|| request.uri().path());

    tracing::info_span!(
        "request",
        request_id = %request_id_of(request.headers()),
        method = %request.method(),
        route = %route,
    )
}
