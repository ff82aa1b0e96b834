use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::{storage::StorageRead, trigram};

use super::{
    models::{
        ErrorResponse, HealthResponse, SearchHitResponse, SearchParams, SearchResponse,
        StatsResponse,
    },
    AppState,
};

const DEFAULT_SEARCH_LIMIT: usize = 10;
const MAX_SEARCH_LIMIT: usize = 100;

fn error(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            message: message.to_string(),
        }),
    )
        .into_response()
}

pub async fn health<S: StorageRead + Clone + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    let uptime_secs = state.started_at.elapsed().map(|d| d.as_secs()).unwrap_or(0);
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            uptime_secs,
        }),
    )
}

pub async fn stats<S: StorageRead + Clone + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    match state.storage.counts() {
        Ok(counts) => Json(StatsResponse::from(counts)).into_response(),
        Err(err) => {
            log::error!("Failed to count catalog rows: {:?}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn last_run<S: StorageRead + Clone + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    match state.storage.load_last_report() {
        Ok(Some(report)) => Json(report).into_response(),
        Ok(None) => error(StatusCode::NOT_FOUND, "no ingestion run recorded yet"),
        Err(err) => {
            log::error!("Failed to load last run report: {:?}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn search<S: StorageRead + Clone + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let fragments = trigram::query_fragments(&params.q);
    if fragments.is_empty() {
        log::warn!("Rejected search with empty query {:?}", params.q);
        return error(StatusCode::BAD_REQUEST, "query must not be empty");
    }

    let limit = params
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);

    match state.storage.search(&fragments, limit) {
        Ok(hits) => Json(SearchResponse {
            query: params.q,
            hits: hits.into_iter().map(SearchHitResponse::from).collect(),
        })
        .into_response(),
        Err(err) => {
            log::error!("Search for {:?} failed: {:?}", params.q, err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn not_found() -> impl IntoResponse {
    error(StatusCode::NOT_FOUND, "endpoint not found")
}
