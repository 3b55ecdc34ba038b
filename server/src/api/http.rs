use axum::{
    extract::{Query, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use slotfactory_types::{GameInfo, TransactionRecord};

use super::AppState;
use crate::gamecenter::KickScope;

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 100;

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

#[derive(Serialize)]
struct GamesResponse {
    games: Vec<GameInfo>,
}

#[derive(Serialize)]
struct KickAllResponse {
    message: &'static str,
    scope: KickScope,
}

#[derive(Serialize)]
struct HistoryResponse {
    #[serde(rename = "playerID")]
    player_id: String,
    history: Vec<TransactionRecord>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct HistoryQuery {
    #[serde(rename = "playerID")]
    player_id: Option<String>,
    limit: Option<String>,
}

impl HistoryQuery {
    /// Unparseable limits fall back to the default; others are clamped.
    fn limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

pub(super) async fn healthz() -> Response {
    Json(HealthzResponse { ok: true }).into_response()
}

pub(super) async fn list_games(AxumState(state): AxumState<AppState>) -> Response {
    let games = state.center.games().await;
    Json(GamesResponse { games }).into_response()
}

pub(super) async fn kick_all(AxumState(state): AxumState<AppState>) -> Response {
    let scope = state.center.kick_all().await;
    tracing::info!(?scope, "kick_all requested");
    Json(KickAllResponse {
        message: "kick all signal sent",
        scope,
    })
    .into_response()
}

pub(super) async fn history(
    AxumState(state): AxumState<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let Some(player_id) = query.player_id.as_deref().filter(|id| !id.is_empty()) else {
        return error(StatusCode::BAD_REQUEST, "playerID is required");
    };
    match state.history.history(player_id, query.limit()).await {
        Ok(history) => Json(HistoryResponse {
            player_id: player_id.to_string(),
            history,
        })
        .into_response(),
        Err(err) => {
            tracing::error!(player_id, code = err.code, "history lookup failed: {}", err.message);
            error(StatusCode::INTERNAL_SERVER_ERROR, err.message)
        }
    }
}
