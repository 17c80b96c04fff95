use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::services::ingest::IngestStatus;
use crate::services::metrics::{render_metrics, METRICS_CONTENT_TYPE};
use crate::AppState;

/// Catalog stats
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogStats {
    channels: usize,
    generation: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    published_at: Option<DateTime<Utc>>,
}

/// Health check response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    version: &'static str,
    uptime: u64,
    catalog: CatalogStats,
    ingest: IngestStatus,
}

/// GET /health - Catalog and ingestion status
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();
    let generation = state.catalog.list();
    let ingest = state.ingestor.status();

    let status = match &ingest {
        IngestStatus::Pending => "starting",
        IngestStatus::Ready { .. } => "ok",
        // Still serving, but the last run did not refresh the catalog
        IngestStatus::Failed { .. } => "degraded",
    };

    let health = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION"),
        uptime,
        catalog: CatalogStats {
            channels: generation.len(),
            generation: generation.number(),
            published_at: (generation.number() > 0).then(|| generation.published_at()),
        },
        ingest,
    };

    Json(health)
}

/// GET /metrics - Prometheus text exposition of the default registry
pub async fn metrics() -> Response {
    match render_metrics() {
        Ok(text) => ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], text).into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

/// Readiness probe: ready once the first ingestion run has finished
pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.ingestor.status() {
        IngestStatus::Pending => (StatusCode::SERVICE_UNAVAILABLE, "not ready - catalog loading"),
        IngestStatus::Ready { .. } => (StatusCode::OK, "ready"),
        IngestStatus::Failed { .. } => (StatusCode::OK, "ready (last ingestion failed)"),
    }
}

/// Liveness probe
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::test_support::FakeUpstream;

    #[tokio::test]
    async fn test_not_ready_before_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let state = offline_state(dir.path());

        let response = get(state.clone(), "/ready").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = body_text(get(state, "/health").await).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "starting");
        assert_eq!(json["catalog"]["channels"], 0);
        assert_eq!(json["ingest"]["state"], "pending");
    }

    #[tokio::test]
    async fn test_ready_after_successful_run() {
        let upstream = FakeUpstream::start(200, PLAYLIST).await;
        let dir = tempfile::tempdir().unwrap();
        let config =
            crate::config::Config::for_tests(&upstream.url(), dir.path().join("lista.m3u"));
        let state = Arc::new(AppState::new(config).unwrap());
        state.ingestor.run_once().await.unwrap();

        let response = get(state.clone(), "/ready").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_text(get(state, "/health").await).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["catalog"]["channels"], 2);
        assert_eq!(json["catalog"]["generation"], 1);
        assert_eq!(json["ingest"]["source"], "downloaded");
    }

    #[tokio::test]
    async fn test_failed_run_is_degraded_but_ready() {
        let dir = tempfile::tempdir().unwrap();
        let state = offline_state(dir.path());
        assert!(state.ingestor.run_once().await.is_err());

        assert_eq!(get(state.clone(), "/ready").await.status(), StatusCode::OK);

        let body = body_text(get(state, "/health").await).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["ingest"]["state"], "failed");
    }

    #[tokio::test]
    async fn test_metrics_and_live() {
        let dir = tempfile::tempdir().unwrap();
        let state = offline_state(dir.path());
        state.catalog.replace(sample_channels());
        let _ = get(state.clone(), "/play/br_1").await;

        assert_eq!(get(state.clone(), "/live").await.status(), StatusCode::OK);

        let response = get(state, "/metrics").await;
        assert_eq!(response.headers()[header::CONTENT_TYPE], METRICS_CONTENT_TYPE);
        let body = body_text(response).await;
        assert!(body.contains("brasil_tv_play_requests_total"));
    }
}
