//! Local HTTP upstream for tests that exercise real downloads

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;

type Canned = Arc<Mutex<(u16, String)>>;

/// Serves a canned status and body at `/br.m3u`; both can change mid-test
pub struct FakeUpstream {
    addr: SocketAddr,
    response: Canned,
}

async fn serve_canned(State(response): State<Canned>) -> impl IntoResponse {
    let (status, body) = response.lock().clone();
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        body,
    )
}

impl FakeUpstream {
    pub async fn start(status: u16, body: &str) -> Self {
        let response: Canned = Arc::new(Mutex::new((status, body.to_string())));
        let app = Router::new()
            .route("/br.m3u", get(serve_canned))
            .with_state(response.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, response }
    }

    pub fn url(&self) -> String {
        format!("http://{}/br.m3u", self.addr)
    }

    pub fn set_response(&self, status: u16, body: &str) {
        *self.response.lock() = (status, body.to_string());
    }
}
