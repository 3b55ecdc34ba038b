use axum::{
    routing::{get, post},
    Router,
};
use slotfactory_execution::HistoryProvider;
use slotfactory_wss::Server;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::gamecenter::{ClientTags, GameCenter};

mod http;
mod ws;

/// Everything the HTTP handlers reach into.
#[derive(Clone)]
pub struct AppState {
    pub center: GameCenter,
    pub transport: Server<ClientTags>,
    pub history: Arc<dyn HistoryProvider>,
}

pub struct Api {
    state: AppState,
}

impl Api {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(http::healthz))
            .route("/ws", get(ws::connect))
            .route("/api/v1/games", get(http::list_games))
            .route("/api/v1/admin/kick_all", post(http::kick_all))
            .route("/api/v1/history", get(http::history))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }
}
