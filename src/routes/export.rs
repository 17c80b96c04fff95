use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::services::m3u_writer::render_m3u;
use crate::AppState;

/// Base URL the exported stream lines point at
fn export_base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(base) = &state.config.public_base_url {
        return base.clone();
    }

    headers
        .get(header::HOST)
        .and_then(|host| host.to_str().ok())
        .filter(|host| !host.is_empty())
        .map(|host| format!("http://{}", host))
        .unwrap_or_else(|| format!("http://localhost:{}", state.config.port))
}

/// GET /lista.m3u - Catalog re-exported as M3U (for XCIPTV / OTT players)
pub async fn export_m3u(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if state.catalog_gated() {
        return super::catalog_loading();
    }

    let generation = state.catalog.list();
    let body = render_m3u(generation.channels(), &export_base_url(&state, &headers));

    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}
