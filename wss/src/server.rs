use crate::config::WsConfig;
use crate::connection::{wait_closing, ClientHandle, Connection, Outlet};
use crate::hub::{Hub, HubClosed, HubHandle};
use crate::subscriber::Subscriber;
use axum::{
    extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, timeout, Instant};
use tokio_util::sync::CancellationToken;

/// Accepts WebSocket upgrades and feeds the resulting connections to a hub.
pub struct Server<T> {
    config: Arc<WsConfig>,
    hub: HubHandle<T>,
}

impl<T> Clone for Server<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            hub: self.hub.clone(),
        }
    }
}

impl<T: Default + Send + Sync + 'static> Server<T> {
    /// Spawns the hub loop. Cancelling `shutdown` kicks every client and
    /// stops the hub; the returned handle resolves once it has.
    pub fn start(config: WsConfig, shutdown: CancellationToken) -> (Self, JoinHandle<()>) {
        let (hub, handle) = Hub::new(config.hub_capacity(), shutdown);
        let task = tokio::spawn(hub.run());
        let server = Self {
            config: Arc::new(config),
            hub: handle,
        };
        (server, task)
    }

    pub async fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) -> Result<(), HubClosed> {
        self.hub.subscribe(subscriber).await
    }

    /// Completes the protocol upgrade for one request.
    pub fn upgrade(&self, ws: WebSocketUpgrade, remote: SocketAddr, headers: HeaderMap) -> Response {
        let server = self.clone();
        let max_message_bytes = self.config.max_message_bytes();
        ws.max_message_size(max_message_bytes)
            .max_frame_size(max_message_bytes)
            .on_failed_upgrade(move |error| {
                tracing::warn!(%remote, ?error, "websocket upgrade failed");
            })
            .on_upgrade(move |socket| server.accept(socket, remote, headers))
            .into_response()
    }

    async fn accept(self, socket: WebSocket, remote: SocketAddr, headers: HeaderMap) {
        let (handle, outlet) = ClientHandle::new(remote, headers, self.config.outbound_capacity());
        let client = Arc::new(Connection::<T>::new(handle.clone()));
        if self.hub.register(client).await.is_err() {
            tracing::warn!(%remote, "hub stopped, rejecting connection");
            return;
        }

        let (sink, stream) = socket.split();
        tokio::spawn(write_pump(sink, outlet, handle.clone(), self.config.clone()));
        read_pump(stream, handle, self.hub, self.config).await;
    }
}

async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut outlet: Outlet,
    handle: ClientHandle,
    config: Arc<WsConfig>,
) {
    let write_wait = config.write_wait();
    let ping_period = config.ping_period();
    let mut ping = time::interval_at(Instant::now() + ping_period, ping_period);

    loop {
        tokio::select! {
            biased;
            reason = wait_closing(&mut outlet.close) => {
                // Frames queued before the kick still go out ahead of the close frame.
                for text in outlet.drain() {
                    if !matches!(timeout(write_wait, sink.send(Message::Text(text))).await, Ok(Ok(()))) {
                        break;
                    }
                }
                let frame = CloseFrame {
                    code: close_code::NORMAL,
                    reason: reason.unwrap_or_default().into(),
                };
                let _ = timeout(write_wait, sink.send(Message::Close(Some(frame)))).await;
                break;
            }
            message = outlet.outbound.recv() => {
                let Some(text) = message else {
                    break;
                };
                match timeout(write_wait, sink.send(Message::Text(text))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!(client_id = %handle.id(), error = %e, "write failed");
                        break;
                    }
                    Err(_) => {
                        tracing::warn!(client_id = %handle.id(), "write timed out, closing connection");
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                if !matches!(timeout(write_wait, sink.send(Message::Ping(Vec::new()))).await, Ok(Ok(()))) {
                    tracing::debug!(client_id = %handle.id(), "ping failed, closing connection");
                    break;
                }
            }
        }
    }

    handle.close();
    let _ = sink.close().await;
}

async fn read_pump<T>(
    mut stream: SplitStream<WebSocket>,
    handle: ClientHandle,
    hub: HubHandle<T>,
    config: Arc<WsConfig>,
) {
    let id = handle.id();
    let pong_wait = config.pong_wait();
    let mut closing = handle.close_watch();
    let deadline = time::sleep(pong_wait);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = wait_closing(&mut closing) => break,
            _ = &mut deadline => {
                tracing::debug!(client_id = %id, "pong deadline elapsed");
                break;
            }
            frame = stream.next() => {
                let inbound = match frame {
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Binary(bytes))) => bytes,
                    Some(Ok(Message::Pong(_))) => {
                        deadline.as_mut().reset(Instant::now() + pong_wait);
                        continue;
                    }
                    Some(Ok(Message::Ping(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(client_id = %id, error = %e, "read failed");
                        break;
                    }
                };
                if hub.inbound(id, inbound).await.is_err() {
                    break;
                }
            }
        }
    }

    handle.close();
    let _ = hub.unregister(id).await;
}
