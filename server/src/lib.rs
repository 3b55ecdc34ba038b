//! Slotfactory game server.
//!
//! Glues the transport ([`slotfactory_wss`]) to the games
//! ([`slotfactory_execution`]) through the [`gamecenter::GameCenter`], and
//! exposes the admin HTTP surface next to the `/ws` upgrade route.
//!
//! ## Shared state
//! Only player counts and control commands leave the process, through the
//! traits in [`fleet`]. Everything else is owned by one instance.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod fleet;
pub mod gamecenter;
pub mod wallet;

pub use app::{Adapters, App};
pub use config::{AppConfig, ConfigError, Mode};
pub use gamecenter::{ClientTags, Fleet, GameCenter, KickScope};
