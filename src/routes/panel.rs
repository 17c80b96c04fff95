use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use std::sync::Arc;

use crate::models::Channel;
use crate::AppState;

/// Channel grid; askama escapes every interpolated value
#[derive(Template)]
#[template(path = "panel.html")]
struct PanelTemplate<'a> {
    channels: &'a [Channel],
    total: usize,
    loading: bool,
}

/// GET / - Browsing panel with one card per channel
pub async fn channel_panel(State(state): State<Arc<AppState>>) -> Response {
    if state.catalog_gated() {
        return super::catalog_loading();
    }

    let generation = state.catalog.list();
    let page = PanelTemplate {
        channels: generation.channels(),
        total: generation.len(),
        loading: !state.ingestor.is_ready(),
    };

    match page.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("Failed to render channel panel: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Erro interno").into_response()
        }
    }
}
