//! Dispatch between connections and game sessions.
//!
//! The [`GameCenter`] is the hub's only subscriber. Each connection gets a
//! bounded inbox drained by its own task, so slow login or wallet work never
//! stalls the hub while frames from one client are still handled in order.

use crate::fleet::{ControlBus, PlayerCounter, RedisFleet};
use futures::StreamExt;
use serde::Serialize;
use slotfactory_execution::{GameSession, LoginError, LoginService, Player};
use slotfactory_types::{
    action, Action, AuthSuccess, ControlCommand, GameId, GameInfo, InboundEnvelope, LoginPayload,
    PlayPayload, CONTROL_KICK_ALL,
};
use slotfactory_wss::{Client, ConnectionId, Subscriber};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const INVALID_MESSAGE_REASON: &str = "invalid message format";
pub const MISSING_TOKEN_REASON: &str = "auth failed: token is missing";
pub const AUTH_FAILED_REASON: &str = "authentication failed";
pub const NOT_LOGGED_IN_REASON: &str = "Not Login";
pub const NOT_IN_GAME_REASON: &str = "Not in any game";
pub const GAME_NOT_FOUND_REASON: &str = "game not found";
pub const KICK_ALL_REASON: &str = "api kick !";
pub const INBOX_FULL_REASON: &str = "too many pending messages";
pub const INTERNAL_ERROR_REASON: &str = "internal server error";

const AUTH_SUCCESS_MESSAGE: &str = "authenticated successfully";
const INBOX_CAPACITY: usize = 64;
const CONTROL_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Per-connection state attached by the game center.
#[derive(Clone, Debug, Default)]
pub struct ClientTags {
    pub player: Option<Player>,
    pub game_id: Option<GameId>,
}

/// Optional cross-instance adapters. Without them the center is process local.
#[derive(Clone, Default)]
pub struct Fleet {
    pub counter: Option<Arc<dyn PlayerCounter>>,
    pub bus: Option<Arc<dyn ControlBus>>,
}

impl Fleet {
    pub fn local() -> Self {
        Self::default()
    }

    pub fn redis(fleet: Arc<RedisFleet>) -> Self {
        Self {
            counter: Some(fleet.clone()),
            bus: Some(fleet),
        }
    }
}

/// How far a kick-all request reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KickScope {
    Fleet,
    Local,
}

struct Entry {
    client: Client<ClientTags>,
    inbox: mpsc::Sender<Vec<u8>>,
}

struct Inner {
    login: LoginService,
    games: RwLock<BTreeMap<GameId, Arc<dyn GameSession>>>,
    clients: Mutex<HashMap<ConnectionId, Entry>>,
    fleet: Fleet,
}

#[derive(Clone)]
pub struct GameCenter {
    inner: Arc<Inner>,
}

impl GameCenter {
    pub fn new(login: LoginService, fleet: Fleet) -> Self {
        Self {
            inner: Arc::new(Inner {
                login,
                games: RwLock::new(BTreeMap::new()),
                clients: Mutex::new(HashMap::new()),
                fleet,
            }),
        }
    }

    /// Makes `game` joinable under its id, stopping any session it replaces.
    pub fn register_game(&self, game: Arc<dyn GameSession>) {
        let id = game.id();
        let previous = self
            .inner
            .games
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, game);
        if let Some(previous) = previous {
            tracing::warn!(game_id = id, "replacing registered game");
            previous.stop();
        }
        tracing::info!(game_id = id, "game registered");
    }

    pub fn unregister_game(&self, id: GameId) -> Option<Arc<dyn GameSession>> {
        let removed = self
            .inner
            .games
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(game) = &removed {
            game.stop();
            tracing::info!(game_id = id, "game unregistered");
        }
        removed
    }

    pub fn game(&self, id: GameId) -> Option<Arc<dyn GameSession>> {
        self.inner
            .games
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Stops the timers of every registered game.
    pub fn stop_games(&self) {
        let games = self.inner.games.read().unwrap_or_else(PoisonError::into_inner);
        for game in games.values() {
            game.stop();
        }
    }

    /// Registered games with their player counts, ordered by id.
    ///
    /// Counts come from the fleet counter when one is configured, falling back
    /// to this process' rosters if it cannot be read.
    pub async fn games(&self) -> Vec<GameInfo> {
        let local: Vec<(GameId, usize)> = {
            let games = self.inner.games.read().unwrap_or_else(PoisonError::into_inner);
            games
                .iter()
                .map(|(id, game)| (*id, game.player_count()))
                .collect()
        };
        if let Some(counter) = &self.inner.fleet.counter {
            let ids: Vec<GameId> = local.iter().map(|(id, _)| *id).collect();
            match counter.counts(&ids).await {
                Ok(counts) if counts.len() == ids.len() => {
                    return ids
                        .into_iter()
                        .zip(counts)
                        .map(|(id, count)| game_info(id, count))
                        .collect();
                }
                Ok(counts) => tracing::warn!(
                    expected = ids.len(),
                    received = counts.len(),
                    "fleet counter returned a partial roster, using local counts"
                ),
                Err(err) => tracing::warn!("fleet counter unavailable, using local counts: {err}"),
            }
        }
        local
            .into_iter()
            .map(|(id, count)| game_info(id, count as i64))
            .collect()
    }

    /// Disconnects every client in the fleet.
    ///
    /// Without a control bus, or when publishing fails, only this process'
    /// clients are kicked.
    pub async fn kick_all(&self) -> KickScope {
        if let Some(bus) = &self.inner.fleet.bus {
            match bus.publish(&ControlCommand::kick_all()).await {
                Ok(()) => {
                    tracing::info!("kick_all published");
                    return KickScope::Fleet;
                }
                Err(err) => tracing::warn!("kick_all publish failed, kicking local clients: {err}"),
            }
        }
        self.kick_local();
        KickScope::Local
    }

    /// Kicks every connection registered in this process. Returns how many.
    pub fn kick_local(&self) -> usize {
        let clients: Vec<Client<ClientTags>> = {
            let clients = self.inner.clients.lock().unwrap_or_else(PoisonError::into_inner);
            clients.values().map(|entry| entry.client.clone()).collect()
        };
        for client in &clients {
            client.kick(KICK_ALL_REASON);
        }
        clients.len()
    }

    pub fn client_count(&self) -> usize {
        self.inner
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Follows the control channel until `shutdown` fires.
    ///
    /// Returns `None` when no bus is configured.
    pub fn spawn_control_listener(&self, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        let bus = self.inner.fleet.bus.clone()?;
        let center = self.clone();
        Some(tokio::spawn(async move {
            loop {
                let subscribed = tokio::select! {
                    _ = shutdown.cancelled() => return,
                    subscribed = bus.subscribe() => subscribed,
                };
                match subscribed {
                    Ok(mut commands) => {
                        tracing::info!("control listener subscribed");
                        loop {
                            tokio::select! {
                                _ = shutdown.cancelled() => return,
                                next = commands.next() => match next {
                                    Some(payload) => center.handle_control(&payload),
                                    None => break,
                                },
                            }
                        }
                        tracing::warn!("control stream ended, resubscribing");
                    }
                    Err(err) => tracing::warn!("control subscribe failed: {err}"),
                }
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(CONTROL_RECONNECT_DELAY) => {}
                }
            }
        }))
    }

    fn handle_control(&self, payload: &[u8]) {
        let command: ControlCommand = match serde_json::from_slice(payload) {
            Ok(command) => command,
            Err(err) => {
                tracing::warn!("skipping malformed control command: {err}");
                return;
            }
        };
        match command.action.as_str() {
            CONTROL_KICK_ALL => {
                let kicked = self.kick_local();
                tracing::info!(kicked, "kick_all received");
            }
            other => tracing::warn!(action = other, "unknown control command"),
        }
    }

    /// Handles inbound frames one at a time, then leaves the game once the
    /// inbox closes. Each frame runs on its own task so a panicking handler
    /// only costs the client its connection.
    async fn drive(self, client: Client<ClientTags>, mut inbox: mpsc::Receiver<Vec<u8>>) {
        while let Some(message) = inbox.recv().await {
            if client.handle().is_closed() {
                continue;
            }
            let center = self.clone();
            let task_client = client.clone();
            let handled = tokio::spawn(async move {
                center.handle_message(&task_client, &message).await;
            })
            .await;
            if let Err(err) = handled {
                tracing::error!(client_id = %client.id(), error = %err, "message handler failed");
                client.kick(INTERNAL_ERROR_REASON);
            }
        }
        self.leave_game(&client).await;
    }

    async fn handle_message(&self, client: &Client<ClientTags>, message: &[u8]) {
        let envelope: InboundEnvelope = match serde_json::from_slice(message) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(client_id = %client.id(), "invalid envelope: {err}");
                client.kick(INVALID_MESSAGE_REASON);
                return;
            }
        };
        match Action::parse(&envelope.action) {
            Some(Action::Login) => match serde_json::from_value::<LoginPayload>(envelope.data) {
                Ok(payload) => self.login(client, payload).await,
                Err(err) => tracing::warn!(client_id = %client.id(), "invalid login payload: {err}"),
            },
            Some(Action::Play) => match serde_json::from_value::<PlayPayload>(envelope.data) {
                Ok(payload) => self.play(client, payload).await,
                Err(err) => tracing::warn!(client_id = %client.id(), "invalid play payload: {err}"),
            },
            None => tracing::warn!(client_id = %client.id(), action = %envelope.action, "unknown action"),
        }
    }

    async fn login(&self, client: &Client<ClientTags>, payload: LoginPayload) {
        let player = match self
            .inner
            .login
            .authenticate(&payload.sid, client.handle().clone())
            .await
        {
            Ok(player) => player,
            Err(LoginError::MissingToken) => {
                client.kick(MISSING_TOKEN_REASON);
                return;
            }
            Err(err) => {
                tracing::error!(client_id = %client.id(), error = %err, "authentication failed");
                client.kick(AUTH_FAILED_REASON);
                return;
            }
        };
        self.leave_game(client).await;
        client.update_tags(|tags| tags.player = Some(player.clone()));
        tracing::info!(client_id = %client.id(), player_id = player.id(), "player authenticated");
        player.send(
            action::AUTH_SUCCESS,
            AuthSuccess {
                message: AUTH_SUCCESS_MESSAGE,
                player_id: player.id().to_string(),
            },
        );
        self.join_game(client, player, payload.game_id).await;
    }

    async fn join_game(&self, client: &Client<ClientTags>, player: Player, game_id: GameId) {
        let Some(game) = self.game(game_id) else {
            tracing::warn!(client_id = %client.id(), game_id, "login for unknown game");
            client.kick(GAME_NOT_FOUND_REASON);
            return;
        };
        client.update_tags(|tags| tags.game_id = Some(game_id));
        tracing::info!(player_id = player.id(), game_id, "player joined game");
        game.add_player(player).await;
        if let Some(counter) = &self.inner.fleet.counter {
            if let Err(err) = counter.incr(game_id).await {
                tracing::warn!(game_id, "player count increment failed: {err}");
            }
        }
    }

    async fn leave_game(&self, client: &Client<ClientTags>) {
        let (player, game_id) = client.update_tags(|tags| (tags.player.clone(), tags.game_id.take()));
        let (Some(player), Some(game_id)) = (player, game_id) else {
            return;
        };
        if let Some(game) = self.game(game_id) {
            game.remove_player(&player).await;
        }
        tracing::info!(player_id = player.id(), game_id, "player left game");
        if let Some(counter) = &self.inner.fleet.counter {
            if let Err(err) = counter.decr(game_id).await {
                tracing::warn!(game_id, "player count decrement failed: {err}");
            }
        }
    }

    async fn play(&self, client: &Client<ClientTags>, payload: PlayPayload) {
        let Some(player) = client.tag(|tags| tags.player.clone()) else {
            client.kick(NOT_LOGGED_IN_REASON);
            return;
        };
        let Some(game_id) = client.tag(|tags| tags.game_id) else {
            client.kick(NOT_IN_GAME_REASON);
            return;
        };
        let Some(game) = self.game(game_id) else {
            client.kick(GAME_NOT_FOUND_REASON);
            return;
        };
        game.play(&player, payload.bet_amount).await;
    }
}

fn game_info(id: GameId, player_count: i64) -> GameInfo {
    GameInfo {
        id: id.to_string(),
        player_count,
    }
}

impl Subscriber<ClientTags> for GameCenter {
    fn on_connect(&self, client: &Client<ClientTags>) {
        let (inbox, rx) = mpsc::channel(INBOX_CAPACITY);
        self.inner
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                client.id(),
                Entry {
                    client: client.clone(),
                    inbox,
                },
            );
        tracing::debug!(
            client_id = %client.id(),
            remote = %client.remote_addr(),
            user_agent = client.handle().user_agent().unwrap_or("-"),
            "client connected"
        );
        tokio::spawn(self.clone().drive(client.clone(), rx));
    }

    fn on_disconnect(&self, client: &Client<ClientTags>) {
        // Dropping the inbox sender lets the worker drain and leave its game.
        self.inner
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&client.id());
    }

    fn on_message(&self, client: &Client<ClientTags>, message: &[u8]) {
        let inbox = {
            let clients = self.inner.clients.lock().unwrap_or_else(PoisonError::into_inner);
            match clients.get(&client.id()) {
                Some(entry) => entry.inbox.clone(),
                None => return,
            }
        };
        match inbox.try_send(message.to_vec()) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(client_id = %client.id(), "inbox full, kicking client");
                client.kick(INBOX_FULL_REASON);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MockAuthClient;
    use crate::fleet::FleetError;
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use rust_decimal::Decimal;
    use slotfactory_execution::games::{DiceGame, DICE_GAME_ID};
    use slotfactory_execution::mocks::{detached_client, frames};
    use slotfactory_execution::{AuthClient, MemoryLedger, UserData, WalletService};
    use slotfactory_wss::{Connection, Outlet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::broadcast;

    struct RecordingGame {
        id: GameId,
        panics_on_play: bool,
        seated: Mutex<Vec<String>>,
        plays: Mutex<Vec<(String, Decimal)>>,
        stopped: AtomicUsize,
    }

    impl RecordingGame {
        fn new(id: GameId) -> Arc<Self> {
            Arc::new(Self {
                id,
                panics_on_play: false,
                seated: Mutex::new(Vec::new()),
                plays: Mutex::new(Vec::new()),
                stopped: AtomicUsize::new(0),
            })
        }

        fn panicking(id: GameId) -> Arc<Self> {
            Arc::new(Self {
                id,
                panics_on_play: true,
                seated: Mutex::new(Vec::new()),
                plays: Mutex::new(Vec::new()),
                stopped: AtomicUsize::new(0),
            })
        }

        fn seated(&self) -> Vec<String> {
            self.seated.lock().unwrap().clone()
        }

        fn plays(&self) -> Vec<(String, Decimal)> {
            self.plays.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GameSession for RecordingGame {
        fn id(&self) -> GameId {
            self.id
        }

        fn player_count(&self) -> usize {
            self.seated.lock().unwrap().len()
        }

        async fn add_player(&self, player: Player) {
            self.seated.lock().unwrap().push(player.id().to_string());
        }

        async fn remove_player(&self, player: &Player) {
            self.seated.lock().unwrap().retain(|id| id != player.id());
        }

        async fn play(&self, player: &Player, bet_amount: Decimal) {
            if self.panics_on_play {
                panic!("wager handler failed");
            }
            self.plays
                .lock()
                .unwrap()
                .push((player.id().to_string(), bet_amount));
        }

        fn stop(&self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Rejecting;

    #[async_trait]
    impl AuthClient for Rejecting {
        async fn verify_token(&self, _token: &str) -> Result<UserData, LoginError> {
            Err(LoginError::Verification("signature mismatch".into()))
        }
    }

    #[derive(Default)]
    struct MemoryCounter {
        counts: Mutex<HashMap<GameId, i64>>,
    }

    #[async_trait]
    impl PlayerCounter for MemoryCounter {
        async fn incr(&self, game: GameId) -> Result<i64, FleetError> {
            let mut counts = self.counts.lock().unwrap();
            let count = counts.entry(game).or_default();
            *count += 1;
            Ok(*count)
        }

        async fn decr(&self, game: GameId) -> Result<i64, FleetError> {
            let mut counts = self.counts.lock().unwrap();
            let count = counts.entry(game).or_default();
            *count -= 1;
            Ok(*count)
        }

        async fn counts(&self, games: &[GameId]) -> Result<Vec<i64>, FleetError> {
            let counts = self.counts.lock().unwrap();
            Ok(games
                .iter()
                .map(|game| counts.get(game).copied().unwrap_or(0) + 40)
                .collect())
        }
    }

    struct BrokenFleet;

    #[async_trait]
    impl PlayerCounter for BrokenFleet {
        async fn incr(&self, _game: GameId) -> Result<i64, FleetError> {
            Err(FleetError::Closed)
        }

        async fn decr(&self, _game: GameId) -> Result<i64, FleetError> {
            Err(FleetError::Closed)
        }

        async fn counts(&self, _games: &[GameId]) -> Result<Vec<i64>, FleetError> {
            Err(FleetError::Closed)
        }
    }

    #[async_trait]
    impl ControlBus for BrokenFleet {
        async fn publish(&self, _command: &ControlCommand) -> Result<(), FleetError> {
            Err(FleetError::Closed)
        }

        async fn subscribe(&self) -> Result<BoxStream<'static, Vec<u8>>, FleetError> {
            Err(FleetError::Closed)
        }
    }

    struct MemoryBus {
        tx: broadcast::Sender<Vec<u8>>,
    }

    impl MemoryBus {
        fn new() -> Arc<Self> {
            let (tx, _) = broadcast::channel(16);
            Arc::new(Self { tx })
        }
    }

    #[async_trait]
    impl ControlBus for MemoryBus {
        async fn publish(&self, command: &ControlCommand) -> Result<(), FleetError> {
            let _ = self.tx.send(serde_json::to_vec(command)?);
            Ok(())
        }

        async fn subscribe(&self) -> Result<BoxStream<'static, Vec<u8>>, FleetError> {
            let rx = self.tx.subscribe();
            Ok(futures::stream::unfold(rx, |mut rx| async move {
                loop {
                    match rx.recv().await {
                        Ok(payload) => return Some((payload, rx)),
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            })
            .boxed())
        }
    }

    fn center_with(auth: Arc<dyn AuthClient>, fleet: Fleet) -> GameCenter {
        GameCenter::new(LoginService::new(auth), fleet)
    }

    fn mock_center() -> GameCenter {
        center_with(Arc::new(MockAuthClient::new()), Fleet::local())
    }

    fn connect(center: &GameCenter) -> (Client<ClientTags>, Outlet) {
        let (handle, outlet) = detached_client();
        let client: Client<ClientTags> = Arc::new(Connection::new(handle));
        center.on_connect(&client);
        (client, outlet)
    }

    fn login(sid: &str, game_id: GameId) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "action": "login",
            "data": {"sid": sid, "gameId": game_id}
        }))
        .unwrap()
    }

    fn play(amount: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "action": "play",
            "data": {"betAmount": amount}
        }))
        .unwrap()
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn malformed_envelope_kicks() {
        let center = mock_center();
        let (client, outlet) = connect(&center);
        center.handle_message(&client, br#"{"action":}"#).await;
        assert_eq!(outlet.close_reason().as_deref(), Some(INVALID_MESSAGE_REASON));
    }

    #[tokio::test]
    async fn malformed_inner_payload_is_dropped() {
        let center = mock_center();
        let (client, mut outlet) = connect(&center);
        center.handle_message(&client, &play("abc")).await;
        center
            .handle_message(&client, br#"{"action":"login","data":{"sid":7}}"#)
            .await;
        center
            .handle_message(&client, br#"{"action":"spin","data":{}}"#)
            .await;
        assert!(!outlet.is_closed());
        assert!(outlet.drain().is_empty());
    }

    #[tokio::test]
    async fn play_requires_login_then_game() {
        let center = mock_center();
        let (client, outlet) = connect(&center);
        center.handle_message(&client, &play("10")).await;
        assert_eq!(outlet.close_reason().as_deref(), Some(NOT_LOGGED_IN_REASON));

        let (client, outlet) = connect(&center);
        let (handle, _) = detached_client();
        client.update_tags(|tags| tags.player = Some(Player::new("p", "P", handle)));
        center.handle_message(&client, &play("10")).await;
        assert_eq!(outlet.close_reason().as_deref(), Some(NOT_IN_GAME_REASON));

        let (client, outlet) = connect(&center);
        let (handle, _) = detached_client();
        client.update_tags(|tags| {
            tags.player = Some(Player::new("p", "P", handle));
            tags.game_id = Some(4242);
        });
        center.handle_message(&client, &play("10")).await;
        assert_eq!(outlet.close_reason().as_deref(), Some(GAME_NOT_FOUND_REASON));
    }

    #[tokio::test]
    async fn missing_token_and_rejected_token_use_distinct_reasons() {
        let center = mock_center();
        let (client, outlet) = connect(&center);
        center
            .handle_message(&client, br#"{"action":"login","data":{"gameId":1000}}"#)
            .await;
        assert_eq!(outlet.close_reason().as_deref(), Some(MISSING_TOKEN_REASON));

        let center = center_with(Arc::new(Rejecting), Fleet::local());
        let (client, outlet) = connect(&center);
        center.handle_message(&client, &login("forged", 1000)).await;
        assert_eq!(outlet.close_reason().as_deref(), Some(AUTH_FAILED_REASON));
        assert!(client.tag(|tags| tags.player.is_none()));
    }

    #[tokio::test]
    async fn login_to_unknown_game_authenticates_then_kicks() {
        let center = mock_center();
        let (client, mut outlet) = connect(&center);
        center.handle_message(&client, &login("token", 9)).await;
        let frames = frames(&mut outlet);
        assert_eq!(frames[0]["action"], "auth_success");
        assert_eq!(outlet.close_reason().as_deref(), Some(GAME_NOT_FOUND_REASON));
        assert_eq!(client.tag(|tags| tags.game_id), None);
    }

    #[tokio::test]
    async fn login_joins_game_and_routes_play() {
        let center = mock_center();
        let game = RecordingGame::new(1001);
        center.register_game(game.clone());
        let (client, mut outlet) = connect(&center);

        center.handle_message(&client, &login("token", 1001)).await;
        let frames = frames(&mut outlet);
        assert_eq!(frames[0]["action"], "auth_success");
        assert_eq!(frames[0]["payload"]["message"], "authenticated successfully");
        let player_id = frames[0]["payload"]["playerID"].as_str().unwrap().to_string();
        assert_eq!(game.seated(), vec![player_id.clone()]);
        assert_eq!(client.tag(|tags| tags.game_id), Some(1001));

        center.handle_message(&client, &play("25")).await;
        assert_eq!(game.plays(), vec![(player_id, Decimal::from(25))]);
    }

    #[tokio::test]
    async fn relogin_leaves_previous_game() {
        let center = mock_center();
        let first = RecordingGame::new(1000);
        let second = RecordingGame::new(1001);
        center.register_game(first.clone());
        center.register_game(second.clone());
        let (client, _outlet) = connect(&center);

        center.handle_message(&client, &login("a", 1000)).await;
        center.handle_message(&client, &login("b", 1001)).await;
        assert!(first.seated().is_empty());
        assert_eq!(second.seated().len(), 1);
        assert_eq!(client.tag(|tags| tags.game_id), Some(1001));
    }

    #[tokio::test]
    async fn subscriber_path_joins_and_disconnect_leaves() {
        let center = mock_center();
        let wallet = WalletService::new(Arc::new(MemoryLedger::new()));
        center.register_game(Arc::new(DiceGame::new(wallet)));
        let (client, mut outlet) = connect(&center);
        assert_eq!(center.client_count(), 1);

        center.on_message(&client, &login("token", DICE_GAME_ID));
        let auth = outlet.recv().await.unwrap();
        assert!(auth.contains("auth_success"));
        let balance: serde_json::Value = serde_json::from_str(&outlet.recv().await.unwrap()).unwrap();
        assert_eq!(balance["action"], "get_balance");
        assert_eq!(balance["payload"]["success"], true);

        let dice = center.game(DICE_GAME_ID).unwrap();
        assert_eq!(dice.player_count(), 1);
        center.on_disconnect(&client);
        assert_eq!(center.client_count(), 0);
        wait_until(|| dice.player_count() == 0).await;
        wait_until(|| client.tag(|tags| tags.game_id.is_none())).await;
    }

    #[tokio::test]
    async fn panicking_handler_kicks_and_still_leaves_the_game() {
        let counter = Arc::new(MemoryCounter::default());
        let center = center_with(
            Arc::new(MockAuthClient::new()),
            Fleet {
                counter: Some(counter.clone()),
                bus: None,
            },
        );
        let game = RecordingGame::panicking(1000);
        center.register_game(game.clone());
        let (client, mut outlet) = connect(&center);

        center.on_message(&client, &login("token", 1000));
        let auth = outlet.recv().await.unwrap();
        assert!(auth.contains("auth_success"));
        wait_until(|| game.seated().len() == 1).await;
        assert_eq!(counter.counts.lock().unwrap().get(&1000), Some(&1));

        center.on_message(&client, &play("10"));
        wait_until(|| outlet.is_closed()).await;
        assert_eq!(outlet.close_reason().as_deref(), Some(INTERNAL_ERROR_REASON));

        center.on_disconnect(&client);
        wait_until(|| game.seated().is_empty()).await;
        wait_until(|| counter.counts.lock().unwrap().get(&1000) == Some(&0)).await;
    }

    #[tokio::test]
    async fn counter_tracks_joins_and_leaves() {
        let counter = Arc::new(MemoryCounter::default());
        let center = center_with(
            Arc::new(MockAuthClient::new()),
            Fleet {
                counter: Some(counter.clone()),
                bus: None,
            },
        );
        center.register_game(RecordingGame::new(1000));
        center.register_game(RecordingGame::new(1001));
        let (client, _outlet) = connect(&center);
        center.handle_message(&client, &login("token", 1001)).await;
        assert_eq!(counter.counts.lock().unwrap().get(&1001), Some(&1));

        let games = center.games().await;
        assert_eq!(games[0], game_info(1000, 40));
        assert_eq!(games[1], game_info(1001, 41));

        center.leave_game(&client).await;
        assert_eq!(counter.counts.lock().unwrap().get(&1001), Some(&0));
    }

    #[tokio::test]
    async fn games_fall_back_to_local_counts() {
        let center = center_with(
            Arc::new(MockAuthClient::new()),
            Fleet {
                counter: Some(Arc::new(BrokenFleet)),
                bus: None,
            },
        );
        center.register_game(RecordingGame::new(1001));
        center.register_game(RecordingGame::new(1000));
        let (client, _outlet) = connect(&center);
        center.handle_message(&client, &login("token", 1000)).await;

        let games = center.games().await;
        assert_eq!(games, vec![game_info(1000, 1), game_info(1001, 0)]);
    }

    #[tokio::test]
    async fn kick_all_without_bus_is_local() {
        let center = mock_center();
        let (_a, a) = connect(&center);
        let (_b, b) = connect(&center);
        assert_eq!(center.kick_all().await, KickScope::Local);
        assert_eq!(a.close_reason().as_deref(), Some(KICK_ALL_REASON));
        assert_eq!(b.close_reason().as_deref(), Some(KICK_ALL_REASON));
    }

    #[tokio::test]
    async fn kick_all_degrades_when_publish_fails() {
        let center = center_with(
            Arc::new(MockAuthClient::new()),
            Fleet {
                counter: None,
                bus: Some(Arc::new(BrokenFleet)),
            },
        );
        let (_client, outlet) = connect(&center);
        assert_eq!(center.kick_all().await, KickScope::Local);
        assert_eq!(outlet.close_reason().as_deref(), Some(KICK_ALL_REASON));
    }

    #[tokio::test]
    async fn kick_all_reaches_every_listening_center() {
        let bus = MemoryBus::new();
        let fleet = Fleet {
            counter: None,
            bus: Some(bus.clone()),
        };
        let here = center_with(Arc::new(MockAuthClient::new()), fleet.clone());
        let there = center_with(Arc::new(MockAuthClient::new()), fleet);
        let shutdown = CancellationToken::new();
        let listeners = [
            here.spawn_control_listener(shutdown.clone()).unwrap(),
            there.spawn_control_listener(shutdown.clone()).unwrap(),
        ];
        wait_until(|| bus.tx.receiver_count() >= 2).await;

        let (_a, a) = connect(&here);
        let (_b, b) = connect(&there);
        bus.tx.send(b"not json".to_vec()).unwrap();
        assert_eq!(here.kick_all().await, KickScope::Fleet);
        wait_until(|| a.is_closed() && b.is_closed()).await;
        assert_eq!(b.close_reason().as_deref(), Some(KICK_ALL_REASON));

        shutdown.cancel();
        for listener in listeners {
            listener.await.unwrap();
        }
    }

    #[test]
    fn unregister_stops_the_session() {
        let center = mock_center();
        let game = RecordingGame::new(1001);
        center.register_game(game.clone());
        center.register_game(RecordingGame::new(1001));
        assert_eq!(game.stopped.load(Ordering::SeqCst), 1);
        assert!(center.unregister_game(1001).is_some());
        assert!(center.unregister_game(1001).is_none());
        assert!(center.game(1001).is_none());
    }

    #[test]
    fn kick_scope_serializes_lowercase() {
        assert_eq!(serde_json::to_value(KickScope::Fleet).unwrap(), "fleet");
        assert_eq!(serde_json::to_value(KickScope::Local).unwrap(), "local");
    }
}
