use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State as AxumState},
    http::HeaderMap,
    response::Response,
};
use std::net::SocketAddr;

use super::AppState;

pub(super) async fn connect(
    AxumState(state): AxumState<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    state.transport.upgrade(ws, addr, headers)
}
