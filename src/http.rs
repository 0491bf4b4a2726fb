use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use driftnet_click::{ClickOutcome, ClickParams, IngestPipeline};
use serde::Deserialize;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
}

/// Raw `GET /click` query string per §6's wire format.
#[derive(Debug, Deserialize)]
pub struct ClickQuery {
    query_id: Option<String>,
    result_id: Option<String>,
    position: Option<u32>,
    page: Option<u32>,
    #[serde(rename = "ts")]
    timestamp: Option<i64>,
    #[serde(rename = "url")]
    destination_url: Option<String>,
    sig: Option<String>,
}

impl From<ClickQuery> for ClickParams {
    fn from(q: ClickQuery) -> Self {
        ClickParams {
            query_id: q.query_id,
            result_id: q.result_id,
            position: q.position,
            page: q.page,
            timestamp: q.timestamp,
            destination_url: q.destination_url,
            signature: q.sig,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/click", get(click_handler)).with_state(state)
}

async fn click_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<ClickQuery>,
) -> Response {
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok());

    let outcome = state
        .pipeline
        .handle(addr.ip(), user_agent, &query.into(), Utc::now());

    match outcome {
        ClickOutcome::Redirect { destination_url } => Redirect::temporary(&destination_url).into_response(),
        ClickOutcome::BadRequest(reason) => (StatusCode::BAD_REQUEST, reason).into_response(),
        ClickOutcome::SignatureMismatch => (StatusCode::FORBIDDEN, "signature mismatch").into_response(),
        ClickOutcome::Expired => (StatusCode::GONE, "click expired").into_response(),
        ClickOutcome::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate limited").into_response(),
    }
}
