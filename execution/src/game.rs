//! Capability contract shared by every game session.
//!
//! The dispatch layer only ever talks to games through [`GameSession`]; each
//! implementation owns its player roster and any timers it runs. Outcomes are
//! drawn through a [`Spinner`] so tests can pin the result of a round.

use crate::player::Player;
use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use slotfactory_types::GameId;

#[async_trait]
pub trait GameSession: Send + Sync {
    fn id(&self) -> GameId;

    /// Players currently seated in this process.
    fn player_count(&self) -> usize;

    async fn add_player(&self, player: Player);

    async fn remove_player(&self, player: &Player);

    /// Handles a wager. Rule violations are reported to `player`, never returned.
    async fn play(&self, player: &Player, bet_amount: Decimal);

    /// Stops any timer the session runs. Idempotent.
    fn stop(&self) {}
}

/// Source of round outcomes.
pub trait Spinner: Send + Sync {
    /// Uniform draw in `1..=faces`.
    fn spin(&self, faces: u32) -> u32;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RandomSpinner;

impl Spinner for RandomSpinner {
    fn spin(&self, faces: u32) -> u32 {
        rand::thread_rng().gen_range(1..=faces.max(1))
    }
}

/// Win amount for a stake: `stake * multiplier` on the winning face, else zero.
/// `None` when the win does not fit in a [`Decimal`].
pub fn payout(stake: Decimal, outcome: u32, winning_face: u32, multiplier: u32) -> Option<Decimal> {
    if outcome == winning_face {
        stake.checked_mul(Decimal::from(multiplier))
    } else {
        Some(Decimal::ZERO)
    }
}
