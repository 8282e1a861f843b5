use std::time::Instant;

use tokio::sync::broadcast;

use jigsaw_sync::authority::{self, AuthorityServer};
use jigsaw_sync::config::ServerConfig;
use jigsaw_sync::cut::CutDescription;
use jigsaw_sync::routes;
use jigsaw_sync::services::graph::PieceGraph;
use jigsaw_sync::state::AppState;

/// Intent queue depth in front of the authority task.
const INTENT_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env().expect("invalid configuration");
    let cut = CutDescription::grid(config.cols, config.rows, config.piece_width, config.piece_height)
        .expect("invalid puzzle dimensions");
    let graph = PieceGraph::scattered(&cut, config.seed).expect("puzzle cut failed");

    let server = AuthorityServer::new(graph, &config.authority, Instant::now());
    let (facts, _) = broadcast::channel(config.fact_channel_capacity);
    let (intents, _authority) = authority::spawn(server, facts.clone(), config.tick, INTENT_CHANNEL_CAPACITY);
    let state = AppState::new(intents, facts, cut);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .expect("failed to bind");

    tracing::info!(
        port = config.port,
        pieces = config.cols * config.rows,
        trust = ?config.authority.trust,
        tick_ms = config.tick.as_millis(),
        "jigsaw-sync listening"
    );
    axum::serve(listener, app).await.expect("server failed");
}
