//! Prometheus metrics, registered in the default registry

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter_vec, register_int_gauge, Encoder, IntCounterVec, IntGauge, TextEncoder,
};

pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

lazy_static! {
    /// Ingestion runs by outcome (`success`, `stale_snapshot`, `failed`)
    pub static ref INGEST_RUNS: IntCounterVec = register_int_counter_vec!(
        "brasil_tv_ingest_runs_total",
        "Playlist ingestion runs by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Channels in the live catalog generation
    pub static ref CATALOG_CHANNELS: IntGauge = register_int_gauge!(
        "brasil_tv_catalog_channels",
        "Channels in the live catalog generation"
    )
    .unwrap();

    /// Play requests by result (`redirect`, `not_found`, `unavailable`)
    pub static ref PLAY_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "brasil_tv_play_requests_total",
        "Play endpoint requests by result",
        &["result"]
    )
    .unwrap();
}

/// Every metric in the default registry, in the text exposition format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
