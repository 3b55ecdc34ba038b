//! Single-task owner of the live connection set.
//!
//! Every lifecycle change and inbound frame arrives on one channel, so the
//! events of a given connection are dispatched in the order its pumps
//! produced them: connect, then messages, then disconnect.

use crate::connection::{Client, ConnectionId};
use crate::subscriber::Subscriber;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const SHUTDOWN_REASON: &str = "server is shutting down";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("hub stopped")]
pub struct HubClosed;

enum HubEvent<T> {
    Subscribe(Arc<dyn Subscriber<T>>),
    Register(Client<T>),
    Unregister(ConnectionId),
    Inbound(ConnectionId, Vec<u8>),
}

pub struct Hub<T> {
    events: mpsc::Receiver<HubEvent<T>>,
    clients: HashMap<ConnectionId, Client<T>>,
    subscribers: Vec<Arc<dyn Subscriber<T>>>,
    shutdown: CancellationToken,
}

/// Producer side of the hub's event stream.
pub struct HubHandle<T> {
    events: mpsc::Sender<HubEvent<T>>,
}

impl<T> Clone for HubHandle<T> {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Hub<T> {
    pub fn new(capacity: usize, shutdown: CancellationToken) -> (Self, HubHandle<T>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let hub = Self {
            events: rx,
            clients: HashMap::new(),
            subscribers: Vec::new(),
            shutdown,
        };
        (hub, HubHandle { events: tx })
    }

    /// Processes events until the shutdown token fires.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
            }
        }
        self.shut_down();
    }

    fn handle(&mut self, event: HubEvent<T>) {
        match event {
            HubEvent::Subscribe(subscriber) => self.subscribers.push(subscriber),
            HubEvent::Register(client) => {
                tracing::info!(client_id = %client.id(), remote = %client.remote_addr(), "client registered");
                self.clients.insert(client.id(), client.clone());
                for subscriber in &self.subscribers {
                    subscriber.on_connect(&client);
                }
            }
            HubEvent::Unregister(id) => {
                let Some(client) = self.clients.remove(&id) else {
                    return;
                };
                client.handle().close();
                tracing::info!(client_id = %id, "client unregistered");
                for subscriber in &self.subscribers {
                    subscriber.on_disconnect(&client);
                }
            }
            HubEvent::Inbound(id, message) => {
                let Some(client) = self.clients.get(&id) else {
                    tracing::debug!(client_id = %id, "dropping message from unregistered client");
                    return;
                };
                tracing::debug!(client_id = %id, bytes = message.len(), "message received from client");
                for subscriber in &self.subscribers {
                    subscriber.on_message(client, &message);
                }
            }
        }
    }

    fn shut_down(&mut self) {
        tracing::info!(clients = self.clients.len(), "hub shutting down");
        for (_, client) in self.clients.drain() {
            client.kick(SHUTDOWN_REASON);
        }
    }
}

impl<T> HubHandle<T> {
    pub async fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) -> Result<(), HubClosed> {
        self.push(HubEvent::Subscribe(subscriber)).await
    }

    pub async fn register(&self, client: Client<T>) -> Result<(), HubClosed> {
        self.push(HubEvent::Register(client)).await
    }

    pub async fn unregister(&self, id: ConnectionId) -> Result<(), HubClosed> {
        self.push(HubEvent::Unregister(id)).await
    }

    pub async fn inbound(&self, id: ConnectionId, message: Vec<u8>) -> Result<(), HubClosed> {
        self.push(HubEvent::Inbound(id, message)).await
    }

    async fn push(&self, event: HubEvent<T>) -> Result<(), HubClosed> {
        self.events.send(event).await.map_err(|_| HubClosed)
    }
}
