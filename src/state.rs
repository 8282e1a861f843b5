//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds only channel handles into the authority task and the immutable cut.
//! No handler ever touches the piece graph directly: intents go in through
//! `intents`, batches come back out through `facts`.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::authority::{Inbound, SessionSnapshot};
use crate::cut::CutDescription;
use crate::frame::{Batch, Intent};

/// Clone is required by Axum. Every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    pub intents: mpsc::Sender<Inbound>,
    pub facts: broadcast::Sender<Arc<Batch>>,
    pub cut: Arc<CutDescription>,
}

impl AppState {
    #[must_use]
    pub fn new(intents: mpsc::Sender<Inbound>, facts: broadcast::Sender<Arc<Batch>>, cut: CutDescription) -> Self {
        Self { intents, facts, cut: Arc::new(cut) }
    }

    /// Queue an intent for the authority. Returns `false` once the authority
    /// task has stopped.
    pub async fn submit(&self, intent: Intent) -> bool {
        self.intents.send(Inbound::Intent(intent)).await.is_ok()
    }

    /// Ask the authority for its state as of the next flush.
    pub async fn request_snapshot(&self) -> Option<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.intents.send(Inbound::Snapshot(tx)).await.ok()?;
        rx.await.ok()
    }
}

#[cfg(test)]
pub mod test_helpers {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::authority::{self, AuthorityServer};
    use crate::config::AuthorityConfig;
    use crate::services::graph::PieceGraph;

    /// Fast tick so tests do not wait on the flush cadence.
    pub const TEST_TICK: Duration = Duration::from_millis(5);

    /// 2x1 grid of 60px pieces at their seeded scatter positions.
    #[must_use]
    pub fn test_cut() -> CutDescription {
        CutDescription::grid(2, 1, 60.0, 60.0).expect("grid cut should build")
    }

    /// State whose intent channel is held by the test instead of an authority.
    #[must_use]
    pub fn detached_app_state() -> (AppState, mpsc::Receiver<Inbound>) {
        let (tx, rx) = mpsc::channel(16);
        let (facts, _) = broadcast::channel(16);
        (AppState::new(tx, facts, test_cut()), rx)
    }

    /// State backed by a live authority task. Must run inside a tokio runtime.
    #[must_use]
    pub fn live_app_state() -> AppState {
        let cut = test_cut();
        let graph = PieceGraph::scattered(&cut, 1).expect("scattered graph should build");
        let server = AuthorityServer::new(graph, &AuthorityConfig::default(), Instant::now());
        let (facts, _) = broadcast::channel(64);
        let (intents, _handle) = authority::spawn(server, facts.clone(), TEST_TICK, 64);
        AppState::new(intents, facts, cut)
    }
}
