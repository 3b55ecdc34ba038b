#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use slotfactory_execution::{MemoryLedger, Payment};
use slotfactory_server::auth::MockAuthClient;
use slotfactory_server::{Adapters, App, AppConfig, Fleet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct Running {
    pub addr: SocketAddr,
    pub app: App,
    pub shutdown: CancellationToken,
}

pub fn mock_adapters(payment: Arc<dyn Payment>) -> Adapters {
    Adapters {
        auth: Arc::new(MockAuthClient::new()),
        payment,
        fleet: Fleet::local(),
    }
}

pub async fn start_app(adapters: Adapters) -> (App, CancellationToken) {
    let shutdown = CancellationToken::new();
    let app = App::start(&AppConfig::default(), adapters, shutdown.clone())
        .await
        .unwrap();
    (app, shutdown)
}

pub async fn serve() -> Running {
    let (app, shutdown) = start_app(mock_adapters(Arc::new(MemoryLedger::new()))).await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    Running {
        addr,
        app,
        shutdown,
    }
}

pub async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    socket
}

pub async fn send(socket: &mut Socket, frame: Value) {
    socket.send(Message::Text(frame.to_string())).await.unwrap();
}

pub async fn send_raw(socket: &mut Socket, frame: &str) {
    socket.send(Message::Text(frame.to_string())).await.unwrap();
}

pub async fn login(socket: &mut Socket, game_id: u32) -> String {
    send(
        socket,
        serde_json::json!({"action": "login", "data": {"sid": "token", "gameId": game_id}}),
    )
    .await;
    let auth = next_action(socket, "auth_success").await;
    auth["payload"]["playerID"].as_str().unwrap().to_string()
}

pub async fn next_frame(socket: &mut Socket) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("read failed");
        match frame {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Skips frames until one with `action` arrives.
pub async fn next_action(socket: &mut Socket, action: &str) -> Value {
    loop {
        let frame = next_frame(socket).await;
        if frame["action"] == action {
            return frame;
        }
    }
}

pub async fn close_reason(socket: &mut Socket) -> Option<String> {
    loop {
        let frame = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for close");
        match frame {
            Some(Ok(Message::Close(frame))) => return frame.map(|f| f.reason.into_owned()),
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return None,
        }
    }
}

pub async fn request(app: &App, method: Method, uri: &str) -> (StatusCode, Value) {
    let response = app
        .router()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

pub async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
