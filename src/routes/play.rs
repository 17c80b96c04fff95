use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::services::metrics::PLAY_REQUESTS;
use crate::AppState;

/// GET /play/:id - Redirect to the channel's upstream stream
pub async fn play_channel(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    if state.catalog_gated() {
        PLAY_REQUESTS.with_label_values(&["unavailable"]).inc();
        return super::catalog_loading();
    }

    let Some(channel) = state.catalog.resolve_channel(&id) else {
        PLAY_REQUESTS.with_label_values(&["not_found"]).inc();
        tracing::debug!("Channel not found: {}", id);
        return (StatusCode::NOT_FOUND, "Canal não encontrado.").into_response();
    };

    let Ok(location) = HeaderValue::from_str(&channel.stream_url) else {
        PLAY_REQUESTS.with_label_values(&["invalid_url"]).inc();
        tracing::warn!("Channel {} has an unusable stream URL", channel.id);
        return (StatusCode::BAD_GATEWAY, "URL do canal inválida.").into_response();
    };

    PLAY_REQUESTS.with_label_values(&["redirect"]).inc();
    tracing::info!("Redirecting {}: {}", channel.id, channel.name);

    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}
