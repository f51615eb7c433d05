use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::context::{ScopedContext, Slot};
use super::PipelineSettings;

/// First stage: give the call a correlation id and open its context scope.
///
/// Never rejects. The id is echoed on every response produced below this
/// stage, including error envelopes.
pub async fn correlation_middleware(
    State(settings): State<Arc<PipelineSettings>>,
    mut request: Request,
    next: Next,
) -> Response {
    let correlation_id = resolve_correlation_id(request.headers(), &settings.correlation_header).to_string();
    let header = settings.correlation_header.clone();
    let header_value = HeaderValue::from_str(&correlation_id).ok();

    // Downstream code sees the effective id even when the caller sent none
    if let Some(value) = &header_value {
        request.headers_mut().insert(header.clone(), value.clone());
    }

    let span = tracing::info_span!(
        "call",
        request_id = %correlation_id,
        tenant_id = tracing::field::Empty,
        method = %request.method(),
        path = %request.uri().path(),
    );

    ScopedContext::scope(
        async move {
            let _correlation = ScopedContext::bind(Slot::Correlation, correlation_id);
            tracing::debug!("Request ID assigned");

            let mut response = next.run(request).await;
            if let Some(value) = header_value {
                response.headers_mut().insert(header, value);
            }
            response
        }
        .instrument(span),
    )
    .await
}

/// Use the caller's id when it is a valid UUID, otherwise mint a new one
pub fn resolve_correlation_id(headers: &HeaderMap, header: &HeaderName) -> Uuid {
    headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| Uuid::try_parse(v).ok())
        .unwrap_or_else(Uuid::new_v4)
}
