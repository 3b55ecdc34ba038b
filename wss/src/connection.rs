use axum::http::{header::USER_AGENT, HeaderMap};
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    watch,
};
use uuid::Uuid;

/// Reason used when a connection is dropped for not draining its outbound queue.
pub const QUEUE_FULL_REASON: &str = "outbound queue full";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("connection closed")]
    Closed,
    #[error("outbound queue full")]
    QueueFull,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum CloseState {
    Open,
    /// `None` closes without a reason (hub unregistration, pump failure).
    Closing(Option<String>),
}

struct Inner {
    id: ConnectionId,
    remote_addr: SocketAddr,
    headers: HeaderMap,
    outbound: mpsc::Sender<String>,
    close: watch::Sender<CloseState>,
}

/// Cloneable sending half of one connection.
///
/// Holds no application state, so it can be embedded in domain records
/// (players) without creating reference cycles back to the connection.
#[derive(Clone)]
pub struct ClientHandle {
    inner: Arc<Inner>,
}

impl ClientHandle {
    /// Creates a handle and the [`Outlet`] that drains it.
    ///
    /// The server pairs the outlet with a socket write pump; tests can hold
    /// it directly to observe what a client would receive.
    pub fn new(remote_addr: SocketAddr, headers: HeaderMap, capacity: usize) -> (Self, Outlet) {
        let (outbound, outbound_rx) = mpsc::channel(capacity.max(1));
        let (close, close_rx) = watch::channel(CloseState::Open);
        let handle = Self {
            inner: Arc::new(Inner {
                id: ConnectionId::new(),
                remote_addr,
                headers,
                outbound,
                close,
            }),
        };
        let outlet = Outlet {
            outbound: outbound_rx,
            close: close_rx,
        };
        (handle, outlet)
    }

    /// Handle not backed by a socket; everything sent lands in the outlet.
    pub fn detached(capacity: usize) -> (Self, Outlet) {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 0)), HeaderMap::new(), capacity)
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_addr
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.inner
            .headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
    }

    /// Enqueues a text frame without waiting for it to be flushed.
    ///
    /// A full queue means the peer is not keeping up: the connection is
    /// kicked rather than letting the caller block.
    pub fn send(&self, message: String) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        match self.inner.outbound.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(client_id = %self.id(), "outbound queue full, kicking client");
                self.kick(QUEUE_FULL_REASON);
                Err(SendError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }

    /// Closes the connection with `reason` as the close frame text.
    ///
    /// Best effort: a connection that is already closing keeps its first reason.
    pub fn kick(&self, reason: &str) {
        self.transition(Some(reason.to_string()));
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.inner.close.borrow(), CloseState::Closing(_))
    }

    pub(crate) fn close(&self) {
        self.transition(None);
    }

    pub(crate) fn close_watch(&self) -> watch::Receiver<CloseState> {
        self.inner.close.subscribe()
    }

    fn transition(&self, reason: Option<String>) {
        self.inner.close.send_if_modified(|state| match state {
            CloseState::Open => {
                *state = CloseState::Closing(reason);
                true
            }
            CloseState::Closing(_) => false,
        });
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.inner.id)
            .field("remote_addr", &self.inner.remote_addr)
            .finish()
    }
}

/// Receiving half of a [`ClientHandle`].
pub struct Outlet {
    pub(crate) outbound: mpsc::Receiver<String>,
    pub(crate) close: watch::Receiver<CloseState>,
}

impl Outlet {
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }

    /// Drains every frame queued so far.
    pub fn drain(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Some(frame) = self.try_recv() {
            frames.push(frame);
        }
        frames
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.close.borrow(), CloseState::Closing(_))
    }

    /// Close frame reason, if the connection was kicked with one.
    pub fn close_reason(&self) -> Option<String> {
        match &*self.close.borrow() {
            CloseState::Closing(reason) => reason.clone(),
            CloseState::Open => None,
        }
    }
}

pub(crate) async fn wait_closing(close: &mut watch::Receiver<CloseState>) -> Option<String> {
    loop {
        {
            let state = close.borrow_and_update();
            if let CloseState::Closing(reason) = &*state {
                return reason.clone();
            }
        }
        if close.changed().await.is_err() {
            return None;
        }
    }
}

/// A live connection plus the application tags attached to it.
pub struct Connection<T> {
    handle: ClientHandle,
    tags: RwLock<T>,
}

/// Shared reference to a registered connection.
pub type Client<T> = Arc<Connection<T>>;

impl<T: Default> Connection<T> {
    pub fn new(handle: ClientHandle) -> Self {
        Self {
            handle,
            tags: RwLock::new(T::default()),
        }
    }
}

impl<T> Connection<T> {
    pub fn handle(&self) -> &ClientHandle {
        &self.handle
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.handle.remote_addr()
    }

    pub fn send(&self, message: String) -> Result<(), SendError> {
        self.handle.send(message)
    }

    pub fn kick(&self, reason: &str) {
        self.handle.kick(reason)
    }

    /// Reads the tag record.
    pub fn tag<R>(&self, read: impl FnOnce(&T) -> R) -> R {
        let tags = self.tags.read().unwrap_or_else(PoisonError::into_inner);
        read(&tags)
    }

    /// Mutates the tag record.
    pub fn update_tags<R>(&self, update: impl FnOnce(&mut T) -> R) -> R {
        let mut tags = self.tags.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut tags)
    }
}
