//! HTTP front end
//!
//! Every path and method is routed to the dispatcher, which validates the
//! `url` query parameter, hands a job to the worker pool, and writes the
//! worker's result back verbatim.

use crate::{parse_target_url, Config, Metrics, PreviewError, WorkResult, WorkerPool};
use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::map_response;
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub const TIMEOUT_BODY: &str = r#"{"status":"error","message":"Request timeout"}"#;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<WorkerPool>,
    pub metrics: Arc<Metrics>,
}

/// Validate `raw`, run it through the pool, and return the result.
/// Invalid input is answered here without creating a job.
pub async fn dispatch(pool: &WorkerPool, metrics: &Metrics, raw: &str) -> WorkResult {
    if let Err(e) = parse_target_url(raw) {
        warn!("Invalid URL provided: {:?} ({})", raw, e);
        metrics.record_invalid_url();
        return WorkResult::invalid_url();
    }

    match pool.submit(raw.to_string()).await {
        Ok(result) => result,
        Err(e) => {
            error!("Failed to dispatch {}: {}", raw, e);
            WorkResult::internal()
        }
    }
}

/// First `url` value of a query string; missing means empty.
pub fn url_param(query: Option<&str>) -> String {
    query
        .and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == "url")
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_default()
}

async fn handle_preview(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let raw = url_param(query.as_deref());
    let result = dispatch(&state.pool, &state.metrics, &raw).await;
    into_response(result)
}

fn into_response(result: WorkResult) -> Response {
    let status = StatusCode::from_u16(result.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, result.body).into_response()
}

/// The timeout layer answers with an empty 408; give it a JSON body.
async fn timeout_body(response: Response) -> Response {
    if response.status() == StatusCode::REQUEST_TIMEOUT {
        return (StatusCode::REQUEST_TIMEOUT, TIMEOUT_BODY).into_response();
    }
    response
}

/// Catch-all router. The fixed headers sit outside the timeout so that
/// timed-out requests carry them too.
pub fn router(state: AppState, wait_timeout: Duration) -> Router {
    Router::new()
        .fallback(handle_preview)
        .with_state(state)
        .layer(TimeoutLayer::new(wait_timeout))
        .layer(map_response(timeout_body))
        .layer(SetResponseHeaderLayer::overriding(header::SERVER, HeaderValue::from_static("ami")))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET"),
        ))
}

/// Bind the configured address and serve until `shutdown` resolves.
pub async fn serve<F>(config: &Config, state: AppState, shutdown: F) -> Result<(), PreviewError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state, config.wait_timeout).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
