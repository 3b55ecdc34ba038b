//! WebSocket transport for slotfactory.
//!
//! A [`Server`] upgrades HTTP requests into [`Connection`]s, runs a read and a
//! write pump per connection, and hands lifecycle events to a [`Hub`] that
//! fans them out to registered [`Subscriber`]s.

mod config;
mod connection;
mod hub;
mod server;
mod subscriber;

pub use config::WsConfig;
pub use connection::{
    Client, ClientHandle, Connection, ConnectionId, Outlet, SendError, QUEUE_FULL_REASON,
};
pub use hub::{Hub, HubClosed, HubHandle, SHUTDOWN_REASON};
pub use server::Server;
pub use subscriber::Subscriber;
