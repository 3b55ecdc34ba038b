//! Slotfactory execution layer.
//!
//! This crate holds everything between an authenticated connection and the
//! wallet: the [`Player`] identity, the [`GameSession`] contract with the dice
//! and wheel games, the [`WalletService`] façade and the [`LoginService`].
//!
//! ## Concurrency requirements
//! - Game sessions never hold their lock across an `.await`.
//! - Sends to players are non-blocking and happen after the lock is released.
//! - A settlement moves each player's stake and win through exactly one
//!   debit-and-credit call.

pub mod game;
pub mod games;
pub mod login;
pub mod player;
pub mod wallet;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use game::{GameSession, RandomSpinner, Spinner};
pub use login::{AuthClient, LoginError, LoginService, UserData};
pub use player::Player;
pub use wallet::{HistoryProvider, MemoryLedger, Payment, PaymentError, WalletService};
