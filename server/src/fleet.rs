//! State shared across every running server instance.
//!
//! Two primitives only: a pub/sub channel carrying [`ControlCommand`]s and
//! one counter per game id. Neither is locked across instances, so counts are
//! eventually consistent and commands are delivered at most once.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use slotfactory_types::{ControlCommand, GameId};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

pub const DEFAULT_CONTROL_CHANNEL: &str = "game_control";
pub const DEFAULT_COUNT_PREFIX: &str = "games";

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("invalid control command: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("fleet channel closed")]
    Closed,
}

/// Fleet-wide command channel.
#[async_trait]
pub trait ControlBus: Send + Sync {
    async fn publish(&self, command: &ControlCommand) -> Result<(), FleetError>;

    /// Raw payloads published on the channel, in arrival order.
    async fn subscribe(&self) -> Result<BoxStream<'static, Vec<u8>>, FleetError>;
}

/// Fleet-wide live player counts, keyed by game id.
#[async_trait]
pub trait PlayerCounter: Send + Sync {
    async fn incr(&self, game: GameId) -> Result<i64, FleetError>;

    async fn decr(&self, game: GameId) -> Result<i64, FleetError>;

    /// Counts for `games`, in the same order; missing counters read as zero.
    async fn counts(&self, games: &[GameId]) -> Result<Vec<i64>, FleetError>;
}

pub struct RedisFleet {
    client: redis::Client,
    channel: String,
    prefix: String,
    connection: Mutex<Option<ConnectionManager>>,
}

impl RedisFleet {
    pub fn new(url: &str, channel: String, prefix: String) -> Result<Self, FleetError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            channel,
            prefix,
            connection: Mutex::new(None),
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    fn count_key(&self, game: GameId) -> String {
        count_key(&self.prefix, game)
    }

    async fn ensure_connection(&self) -> Result<MutexGuard<'_, Option<ConnectionManager>>, FleetError> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            *guard = Some(self.client.get_connection_manager().await?);
        }
        Ok(guard)
    }

    async fn query<T: redis::FromRedisValue>(&self, command: redis::Cmd) -> Result<T, FleetError> {
        let mut guard = self.ensure_connection().await?;
        let Some(connection) = guard.as_mut() else {
            return Err(FleetError::Closed);
        };
        let result: redis::RedisResult<T> = command.query_async(connection).await;
        if result.is_err() {
            *guard = None;
        }
        Ok(result?)
    }
}

pub fn count_key(prefix: &str, game: GameId) -> String {
    format!("{prefix}:{game}:count")
}

#[async_trait]
impl ControlBus for RedisFleet {
    async fn publish(&self, command: &ControlCommand) -> Result<(), FleetError> {
        let payload = serde_json::to_vec(command)?;
        let mut publish = redis::cmd("PUBLISH");
        publish.arg(&self.channel).arg(payload);
        let _receivers: i64 = self.query(publish).await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<BoxStream<'static, Vec<u8>>, FleetError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;
        let stream = pubsub
            .into_on_message()
            .filter_map(|message| async move {
                match message.get_payload::<Vec<u8>>() {
                    Ok(payload) => Some(payload),
                    Err(err) => {
                        tracing::warn!("control payload decode failed: {err}");
                        None
                    }
                }
            });
        Ok(stream.boxed())
    }
}

#[async_trait]
impl PlayerCounter for RedisFleet {
    async fn incr(&self, game: GameId) -> Result<i64, FleetError> {
        let mut incr = redis::cmd("INCR");
        incr.arg(self.count_key(game));
        self.query(incr).await
    }

    async fn decr(&self, game: GameId) -> Result<i64, FleetError> {
        let mut decr = redis::cmd("DECR");
        decr.arg(self.count_key(game));
        self.query(decr).await
    }

    async fn counts(&self, games: &[GameId]) -> Result<Vec<i64>, FleetError> {
        if games.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = games.iter().map(|game| self.count_key(*game)).collect();
        let mut mget = redis::cmd("MGET");
        mget.arg(&keys);
        let values: Vec<Option<i64>> = self.query(mget).await?;
        Ok(values
            .into_iter()
            .map(|value| value.unwrap_or(0).max(0))
            .collect())
    }
}
