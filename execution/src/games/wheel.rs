//! Game 1001: timed multiplayer wheel.
//!
//! ## Phases
//!
//! 1. **Waiting** - no wagers accepted; counts down `waiting_ticks`
//! 2. **Betting** - `play` accumulates a stake per player; counts down
//!    `betting_ticks`, then the round settles
//!
//! Settlement is not a stored phase. When the betting countdown elapses the
//! session draws one number in `1..=10` under the lock, snapshots and resets
//! every positive stake, and switches to Waiting in the same critical section.
//! Sends happen after the lock is released. Wallet calls run on a spawned
//! task, one per settling player, so a slow backend never holds up another
//! player's wager, another player's settlement or the next tick.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let wheel = WheelGame::new(WheelConfig::default(), wallet);
//! let timer = wheel.start();
//! game_center.register_game(wheel.clone());
//! // ...
//! wheel.stop();
//! timer.await?;
//! ```

use crate::game::{payout, GameSession, RandomSpinner, Spinner};
use crate::player::Player;
use crate::wallet::WalletService;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use slotfactory_types::{action, GameId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const WHEEL_GAME_ID: GameId = 1001;
const FACES: u32 = 10;
const WINNING_FACE: u32 = 1;
const MULTIPLIER: u32 = 10;

const NOT_BETTING: &str = "not in betting state";
const NON_POSITIVE: &str = "bet amount must be positive";
const TOO_LARGE: &str = "bet amount too large";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Phase {
    Waiting,
    Betting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WheelConfig {
    pub tick: Duration,
    pub betting_ticks: u32,
    pub waiting_ticks: u32,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            betting_ticks: 10,
            waiting_ticks: 3,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
struct PlayerInfo {
    id: String,
    name: String,
    #[serde(rename = "betAmount")]
    bet_amount: Decimal,
}

#[derive(Debug, Serialize)]
struct PlayerList {
    players: Vec<PlayerInfo>,
}

#[derive(Debug, Serialize)]
struct PlayerJoined {
    player: PlayerInfo,
}

#[derive(Debug, Serialize)]
struct PlayerLeft {
    #[serde(rename = "playerId")]
    player_id: String,
}

#[derive(Clone, Copy, Debug, Serialize)]
struct StateUpdate {
    state: Phase,
    countdown: u32,
}

#[derive(Debug, Serialize)]
struct PlayerBet {
    #[serde(rename = "playerId")]
    player_id: String,
    #[serde(rename = "betAmount")]
    bet_amount: Decimal,
    #[serde(rename = "totalBet")]
    total_bet: Decimal,
}

#[derive(Debug, Serialize)]
struct BetResult {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
    #[serde(rename = "totalBet", skip_serializing_if = "Option::is_none")]
    total_bet: Option<Decimal>,
}

#[derive(Debug, Serialize)]
struct Opening {
    number: u32,
}

#[derive(Debug, Serialize)]
struct WinResult {
    #[serde(rename = "betAmount")]
    bet_amount: Decimal,
    #[serde(rename = "winAmount")]
    win_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

struct Seat {
    player: Player,
    stake: Decimal,
}

impl Seat {
    fn info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.player.id().to_string(),
            name: self.player.name().to_string(),
            bet_amount: self.stake,
        }
    }
}

struct Table {
    phase: Phase,
    countdown: u32,
    seats: HashMap<String, Seat>,
}

impl Table {
    fn players(&self) -> Vec<Player> {
        self.seats.values().map(|seat| seat.player.clone()).collect()
    }

    fn state(&self) -> StateUpdate {
        StateUpdate {
            state: self.phase,
            countdown: self.countdown,
        }
    }

    fn enter(&mut self, phase: Phase, countdown: u32) {
        self.phase = phase;
        self.countdown = countdown;
        tracing::info!(game_id = WHEEL_GAME_ID, ?phase, countdown, "state changed");
    }
}

enum Transition {
    Opened {
        recipients: Vec<Player>,
        update: StateUpdate,
    },
    Settled {
        number: u32,
        stakes: Vec<(Player, Decimal)>,
        recipients: Vec<Player>,
        update: StateUpdate,
    },
}

pub struct WheelGame {
    config: WheelConfig,
    wallet: WalletService,
    spinner: Arc<dyn Spinner>,
    table: RwLock<Table>,
    stop: CancellationToken,
}

impl WheelGame {
    pub fn new(config: WheelConfig, wallet: WalletService) -> Arc<Self> {
        Self::with_spinner(config, wallet, Arc::new(RandomSpinner))
    }

    pub fn with_spinner(
        config: WheelConfig,
        wallet: WalletService,
        spinner: Arc<dyn Spinner>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            wallet,
            spinner,
            table: RwLock::new(Table {
                phase: Phase::Waiting,
                countdown: 0,
                seats: HashMap::new(),
            }),
            stop: CancellationToken::new(),
        })
    }

    /// Spawns the tick loop. The first tick fires immediately.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let game = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = time::interval(game.config.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(game_id = WHEEL_GAME_ID, "game loop started");
            loop {
                tokio::select! {
                    _ = game.stop.cancelled() => break,
                    _ = ticker.tick() => {
                        game.tick();
                    }
                }
            }
            tracing::info!(game_id = WHEEL_GAME_ID, "game loop stopped");
        })
    }

    pub fn phase(&self) -> (Phase, u32) {
        let table = self.read();
        (table.phase, table.countdown)
    }

    /// Stake accumulated by `player_id` in the current round.
    pub fn stake(&self, player_id: &str) -> Option<Decimal> {
        self.read().seats.get(player_id).map(|seat| seat.stake)
    }

    /// Advances the countdown by one tick, transitioning when it elapses.
    ///
    /// When a round settles, the wallet calls run on the returned task.
    pub fn tick(&self) -> Option<JoinHandle<()>> {
        let transition = {
            let mut table = self.write();
            table.countdown = table.countdown.saturating_sub(1);
            if table.countdown > 0 {
                return None;
            }
            match table.phase {
                Phase::Waiting => {
                    table.enter(Phase::Betting, self.config.betting_ticks);
                    Transition::Opened {
                        recipients: table.players(),
                        update: table.state(),
                    }
                }
                Phase::Betting => {
                    let number = self.spinner.spin(FACES);
                    let stakes = table
                        .seats
                        .values_mut()
                        .filter(|seat| seat.stake > Decimal::ZERO)
                        .map(|seat| {
                            let stake = std::mem::take(&mut seat.stake);
                            (seat.player.clone(), stake)
                        })
                        .collect();
                    table.enter(Phase::Waiting, self.config.waiting_ticks);
                    Transition::Settled {
                        number,
                        stakes,
                        recipients: table.players(),
                        update: table.state(),
                    }
                }
            }
        };

        match transition {
            Transition::Opened { recipients, update } => {
                broadcast(&recipients, action::STATE_UPDATE, update);
                None
            }
            Transition::Settled {
                number,
                stakes,
                recipients,
                update,
            } => {
                tracing::info!(game_id = WHEEL_GAME_ID, number, settling = stakes.len(), "wheel opened");
                broadcast(&recipients, action::OPENING, Opening { number });
                broadcast(&recipients, action::STATE_UPDATE, update);
                Some(tokio::spawn(settle_round(self.wallet.clone(), number, stakes)))
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Table> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Table> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn settle_round(wallet: WalletService, number: u32, stakes: Vec<(Player, Decimal)>) {
    let mut settlements = JoinSet::new();
    for (player, stake) in stakes {
        settlements.spawn(settle(wallet.clone(), player, stake, number));
    }
    while let Some(joined) = settlements.join_next().await {
        if let Err(e) = joined {
            tracing::error!(game_id = WHEEL_GAME_ID, number, error = %e, "settlement task failed");
        }
    }
}

async fn settle(wallet: WalletService, player: Player, stake: Decimal, number: u32) {
    let Some(win_amount) = payout(stake, number, WINNING_FACE, MULTIPLIER) else {
        tracing::warn!(game_id = WHEEL_GAME_ID, player_id = player.id(), %stake, "win amount overflows");
        player.send(
            action::WIN_RESULT,
            WinResult {
                bet_amount: stake,
                win_amount: Decimal::ZERO,
                balance: None,
                error: Some(TOO_LARGE.to_string()),
            },
        );
        return;
    };
    let result = match wallet.debit_and_credit(player.id(), stake, win_amount).await {
        Ok(balance) => WinResult {
            bet_amount: stake,
            win_amount,
            balance: Some(balance),
            error: None,
        },
        Err(e) => WinResult {
            bet_amount: stake,
            win_amount,
            balance: None,
            error: Some(e.message),
        },
    };
    player.send(action::WIN_RESULT, result);
}

/// New stake total, if it can still be paid out on a win.
fn raise(stake: Decimal, bet_amount: Decimal) -> Option<Decimal> {
    let total = stake.checked_add(bet_amount)?;
    payout(total, WINNING_FACE, WINNING_FACE, MULTIPLIER).map(|_| total)
}

fn broadcast<P: Serialize>(players: &[Player], action: &str, payload: P) {
    for player in players {
        player.send(action, &payload);
    }
}

#[async_trait]
impl GameSession for WheelGame {
    fn id(&self) -> GameId {
        WHEEL_GAME_ID
    }

    fn player_count(&self) -> usize {
        self.read().seats.len()
    }

    async fn add_player(&self, player: Player) {
        let (joined, others, roster, state) = {
            let mut table = self.write();
            let seat = Seat {
                player: player.clone(),
                stake: Decimal::ZERO,
            };
            let joined = seat.info();
            table.seats.insert(player.id().to_string(), seat);
            let (others, roster): (Vec<_>, Vec<_>) = table
                .seats
                .values()
                .filter(|seat| seat.player.id() != player.id())
                .map(|seat| (seat.player.clone(), seat.info()))
                .unzip();
            (joined, others, roster, table.state())
        };
        tracing::info!(game_id = WHEEL_GAME_ID, player_id = player.id(), "player added");

        broadcast(&others, action::PLAYER_JOINED, PlayerJoined { player: joined });
        player.send(action::PLAYER_LIST, PlayerList { players: roster });
        player.send(action::STATE_UPDATE, state);
    }

    async fn remove_player(&self, player: &Player) {
        let remaining = {
            let mut table = self.write();
            // A reconnect may already have replaced this seat.
            match table.seats.get(player.id()) {
                Some(seat) if seat.player == *player => {}
                _ => return,
            }
            table.seats.remove(player.id());
            table.players()
        };
        tracing::info!(game_id = WHEEL_GAME_ID, player_id = player.id(), "player removed");
        broadcast(
            &remaining,
            action::PLAYER_LEFT,
            PlayerLeft {
                player_id: player.id().to_string(),
            },
        );
    }

    async fn play(&self, player: &Player, bet_amount: Decimal) {
        let accepted = {
            let mut table = self.write();
            let phase = table.phase;
            let Some(seat) = table.seats.get_mut(player.id()) else {
                return;
            };
            if phase != Phase::Betting {
                Err(NOT_BETTING)
            } else if bet_amount <= Decimal::ZERO {
                Err(NON_POSITIVE)
            } else if let Some(total_bet) = raise(seat.stake, bet_amount) {
                seat.stake = total_bet;
                Ok((total_bet, table.players()))
            } else {
                Err(TOO_LARGE)
            }
        };

        match accepted {
            Err(error) => player.send(
                action::BET_RESULT,
                BetResult {
                    success: false,
                    error: Some(error),
                    total_bet: None,
                },
            ),
            Ok((total_bet, recipients)) => {
                player.send(
                    action::BET_RESULT,
                    BetResult {
                        success: true,
                        error: None,
                        total_bet: Some(total_bet),
                    },
                );
                broadcast(
                    &recipients,
                    action::PLAYER_BET,
                    PlayerBet {
                        player_id: player.id().to_string(),
                        bet_amount,
                        total_bet,
                    },
                );
            }
        }
    }

    fn stop(&self) {
        self.stop.cancel();
    }
}
