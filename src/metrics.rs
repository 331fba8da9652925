//! Metrics endpoint (spec §6 ambient observability).
//!
//! A Prometheus text-format scrape target served over plain HTTP via
//! `axum`, grounded in the monitoring module the other templates repo
//! in the pack uses `prometheus::register_counter!`/`register_gauge!`
//! for. This isn't a user-facing surface — no HTML, no interaction —
//! just the `/metrics` endpoint operators already expect.

use std::net::SocketAddr;

use anyhow::Result;
use axum::{routing::get, Router};
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, Encoder,
    HistogramVec, IntGauge, TextEncoder,
};
use tracing::{error, info};

#[derive(Clone)]
pub struct Metrics {
    pub kicks_total: CounterVec,
    pub takes_total: CounterVec,
    pub settlements_total: CounterVec,
    pub bond_collections_total: CounterVec,
    pub lp_redemptions_total: CounterVec,
    pub reward_actions_total: CounterVec,
    pub loop_errors_total: CounterVec,
    pub loop_duration_seconds: HistogramVec,
    pub last_loop_run_timestamp: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        Ok(Metrics {
            kicks_total: register_counter_vec!(
                "keeper_kicks_total",
                "Kick transactions submitted, by pool and outcome",
                &["pool", "outcome"]
            )?,
            takes_total: register_counter_vec!(
                "keeper_takes_total",
                "Take transactions submitted, by pool and mode",
                &["pool", "mode"]
            )?,
            settlements_total: register_counter_vec!(
                "keeper_settlements_total",
                "Settlement attempts, by pool and reason",
                &["pool", "reason"]
            )?,
            bond_collections_total: register_counter_vec!(
                "keeper_bond_collections_total",
                "Bond collection attempts, by pool and outcome",
                &["pool", "outcome"]
            )?,
            lp_redemptions_total: register_counter_vec!(
                "keeper_lp_redemptions_total",
                "LP redemptions, by pool and side",
                &["pool", "side"]
            )?,
            reward_actions_total: register_counter_vec!(
                "keeper_reward_actions_total",
                "Reward queue flushes, by token and result",
                &["token", "result"]
            )?,
            loop_errors_total: register_counter_vec!(
                "keeper_loop_errors_total",
                "Errors surfaced from a supervisor loop, by pool and loop kind",
                &["pool", "loop_kind"]
            )?,
            loop_duration_seconds: register_histogram_vec!(
                "keeper_loop_duration_seconds",
                "Wall time of one supervisor loop iteration",
                &["loop_kind"]
            )?,
            last_loop_run_timestamp: register_int_gauge!(
                "keeper_last_loop_run_timestamp",
                "Unix timestamp of the most recent supervisor loop iteration, any pool"
            )?,
        })
    }
}

async fn serve_metrics() -> String {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Runs the `/metrics` scrape endpoint until the process exits. Errors
/// binding the port are fatal (mirrors the teacher's fail-loud boot
/// behavior) since a misconfigured metrics port usually means a config
/// mistake worth surfacing immediately rather than running dark.
pub async fn run_metrics_server(port: u16) -> Result<()> {
    let app = Router::new().route("/metrics", get(serve_metrics));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("metrics endpoint listening on {addr}");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(|e| anyhow::anyhow!("metrics server error: {e}"))
}
