//! Per-request trace ids and bounded request-body buffering.
//!
//! Every request runs inside an `http_request` span carrying its trace id,
//! which is echoed back in `x-trace-id`. The body is read once, up to
//! [`MAX_BODY_BYTES`], so that small JSON payloads can be logged; anything
//! larger is answered with 413 before a handler sees it.

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::time::Instant;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::error::ServerError;

pub static X_TRACE_ID: &str = "x-trace-id";

/// Same ceiling axum's `Json` extractor applies by default.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// JSON bodies at most this large are logged verbatim at debug level.
const MAX_LOGGED_BODY: usize = 1024;

pub async fn trace_middleware(req: Request, next: Next) -> Response {
    let started = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    let trace_header = HeaderValue::from_str(&trace_id.to_string()).ok();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        info!("→ request started");
        let mut response = match buffer_request(req).await {
            Ok(mut req) => {
                if let Some(value) = &trace_header {
                    req.headers_mut().insert(X_TRACE_ID, value.clone());
                }
                next.run(req).await
            }
            Err(err) => err.into_response(),
        };
        if let Some(value) = trace_header {
            response.headers_mut().insert(X_TRACE_ID, value);
        }

        info!(
            status = response.status().as_u16(),
            latency_ms = started.elapsed().as_millis(),
            "← response finished"
        );
        response
    }
    .instrument(span)
    .await
}

/// Read the whole body under [`MAX_BODY_BYTES`] and put it back.
async fn buffer_request(req: Request) -> Result<Request, ServerError> {
    let (parts, body) = req.into_parts();
    let bytes = Limited::new(body, MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                ServerError::BodyTooLarge {
                    limit: MAX_BODY_BYTES,
                }
            } else {
                ServerError::BodyUnreadable(e.to_string())
            }
        })?
        .to_bytes();

    log_body(&parts.headers, &bytes);
    Ok(Request::from_parts(parts, Body::from(bytes)))
}

fn log_body(headers: &HeaderMap, bytes: &Bytes) {
    if bytes.is_empty() {
        return;
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    match std::str::from_utf8(bytes) {
        Ok(text) if content_type.contains("application/json") && bytes.len() <= MAX_LOGGED_BODY => {
            debug!(body = text, "request body");
        }
        _ => debug!(content_type, size = bytes.len(), "request body skipped"),
    }
}
