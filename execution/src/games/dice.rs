//! Game 1000: single-player dice.
//!
//! Every `play` is resolved immediately: roll `1..=6`, a 1 pays six times the
//! stake, and the stake and win move through one debit-and-credit call.

use crate::game::{payout, GameSession, RandomSpinner, Spinner};
use crate::player::Player;
use crate::wallet::WalletService;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use slotfactory_types::{action, GameId};
use slotfactory_wss::ConnectionId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const DICE_GAME_ID: GameId = 1000;
const FACES: u32 = 6;
const WINNING_FACE: u32 = 1;
const MULTIPLIER: u32 = 6;

const NON_POSITIVE: &str = "bet amount must be positive";
const TOO_LARGE: &str = "bet amount too large";

#[derive(Debug, Serialize)]
struct BalanceResult {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    balance: Option<Decimal>,
}

#[derive(Debug, Serialize)]
struct PlayResult {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(rename = "betAmount")]
    bet_amount: Decimal,
    #[serde(rename = "winAmount", skip_serializing_if = "Option::is_none")]
    win_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dice: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    balance: Option<Decimal>,
}

impl PlayResult {
    fn failed(bet_amount: Decimal, error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            bet_amount,
            win_amount: None,
            dice: None,
            balance: None,
        }
    }
}

pub struct DiceGame {
    wallet: WalletService,
    spinner: Arc<dyn Spinner>,
    /// One entry per seated connection, so a player id logged in twice counts twice.
    seated: Mutex<HashSet<(String, ConnectionId)>>,
}

impl DiceGame {
    pub fn new(wallet: WalletService) -> Self {
        Self::with_spinner(wallet, Arc::new(RandomSpinner))
    }

    pub fn with_spinner(wallet: WalletService, spinner: Arc<dyn Spinner>) -> Self {
        Self {
            wallet,
            spinner,
            seated: Mutex::new(HashSet::new()),
        }
    }

    fn seated(&self) -> MutexGuard<'_, HashSet<(String, ConnectionId)>> {
        self.seated.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl GameSession for DiceGame {
    fn id(&self) -> GameId {
        DICE_GAME_ID
    }

    fn player_count(&self) -> usize {
        self.seated().len()
    }

    async fn add_player(&self, player: Player) {
        self.seated().insert(seat_key(&player));
        tracing::info!(game_id = DICE_GAME_ID, player_id = player.id(), "player added");

        let reply = match self.wallet.balance(player.id()).await {
            Ok(balance) => BalanceResult {
                success: true,
                error: None,
                balance: Some(balance),
            },
            Err(e) => BalanceResult {
                success: false,
                error: Some(e.message),
                balance: None,
            },
        };
        player.send(action::GET_BALANCE, reply);
    }

    async fn remove_player(&self, player: &Player) {
        if self.seated().remove(&seat_key(player)) {
            tracing::info!(game_id = DICE_GAME_ID, player_id = player.id(), "player removed");
        }
    }

    async fn play(&self, player: &Player, bet_amount: Decimal) {
        if bet_amount <= Decimal::ZERO {
            player.send(
                action::PLAY_RESULT,
                PlayResult::failed(bet_amount, NON_POSITIVE.to_string()),
            );
            return;
        }

        let dice = self.spinner.spin(FACES);
        let Some(win_amount) = payout(bet_amount, dice, WINNING_FACE, MULTIPLIER) else {
            tracing::warn!(game_id = DICE_GAME_ID, player_id = player.id(), %bet_amount, "win amount overflows");
            player.send(
                action::PLAY_RESULT,
                PlayResult::failed(bet_amount, TOO_LARGE.to_string()),
            );
            return;
        };
        let reply = match self
            .wallet
            .debit_and_credit(player.id(), bet_amount, win_amount)
            .await
        {
            Ok(balance) => PlayResult {
                success: true,
                error: None,
                bet_amount,
                win_amount: Some(win_amount),
                dice: Some(dice),
                balance: Some(balance),
            },
            Err(e) => PlayResult::failed(bet_amount, e.message),
        };
        tracing::debug!(game_id = DICE_GAME_ID, player_id = player.id(), dice, %win_amount, "dice rolled");
        player.send(action::PLAY_RESULT, reply);
    }
}

fn seat_key(player: &Player) -> (String, ConnectionId) {
    (player.id().to_string(), player.client().id())
}
