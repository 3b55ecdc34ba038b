//! Wire types shared by every slotfactory crate.
//!
//! Client frames are JSON text. Inbound frames are `{"action", "data"}` and
//! outbound frames are `{"action", "payload"}`; the payload schema is owned by
//! whichever game emits the action.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Unique id of a registered game session (e.g. `1001`).
pub type GameId = u32;

/// Action names carried in either envelope direction.
pub mod action {
    pub const LOGIN: &str = "login";
    pub const PLAY: &str = "play";

    pub const AUTH_SUCCESS: &str = "auth_success";
    pub const PLAYER_JOINED: &str = "player_joined";
    pub const PLAYER_LEFT: &str = "player_left";
    pub const PLAYER_LIST: &str = "player_list";
    pub const STATE_UPDATE: &str = "state_update";
    pub const PLAYER_BET: &str = "player_bet";
    pub const BET_RESULT: &str = "bet_result";
    pub const OPENING: &str = "opening";
    pub const WIN_RESULT: &str = "win_result";
    pub const GET_BALANCE: &str = "get_balance";
    pub const PLAY_RESULT: &str = "play_result";
}

/// Inbound actions the dispatch layer understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Login,
    Play,
}

impl Action {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            action::LOGIN => Some(Self::Login),
            action::PLAY => Some(Self::Play),
            _ => None,
        }
    }
}

/// Outer wrapper of every client-to-server frame.
#[derive(Clone, Debug, Deserialize)]
pub struct InboundEnvelope {
    pub action: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Outer wrapper of every server-to-client frame.
#[derive(Clone, Debug, Serialize)]
pub struct Envelope<'a, P> {
    pub action: &'a str,
    pub payload: P,
}

impl<'a, P: Serialize> Envelope<'a, P> {
    pub fn new(action: &'a str, payload: P) -> Self {
        Self { action, payload }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// `login` payload: session token plus the game to join once authenticated.
#[derive(Clone, Debug, Deserialize)]
pub struct LoginPayload {
    #[serde(default)]
    pub sid: String,
    #[serde(rename = "gameId", default)]
    pub game_id: GameId,
}

/// `play` payload.
#[derive(Clone, Debug, Deserialize)]
pub struct PlayPayload {
    #[serde(rename = "betAmount")]
    pub bet_amount: Decimal,
}

#[derive(Clone, Debug, Serialize)]
pub struct AuthSuccess {
    pub message: &'static str,
    #[serde(rename = "playerID")]
    pub player_id: String,
}

/// Control command name for the fleet-wide disconnect.
pub const CONTROL_KICK_ALL: &str = "kick_all";

/// Fleet-wide instruction carried on the shared control channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub action: String,
    #[serde(default)]
    pub data: String,
}

impl ControlCommand {
    pub fn kick_all() -> Self {
        Self {
            action: CONTROL_KICK_ALL.to_string(),
            data: String::new(),
        }
    }
}

/// Roster entry returned by the admin surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInfo {
    pub id: String,
    #[serde(rename = "playerCount")]
    pub player_count: i64,
}

/// One wallet balance mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: i64,
    #[serde(rename = "playerID")]
    pub player_id: String,
    pub amount: Decimal,
    #[serde(rename = "transactionType")]
    pub transaction_type: String,
    #[serde(rename = "balanceAfter")]
    pub balance_after: Decimal,
    /// Unix time in milliseconds.
    #[serde(rename = "createdAt")]
    pub created_at: u64,
}
