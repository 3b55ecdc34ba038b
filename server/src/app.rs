//! Wiring of adapters, games, transport and HTTP surface.

use anyhow::{Context, Result};
use axum::Router;
use slotfactory_execution::games::{DiceGame, WheelGame};
use slotfactory_execution::{AuthClient, LoginService, MemoryLedger, Payment, WalletService};
use slotfactory_wss::Server;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{Api, AppState};
use crate::auth::{HttpAuthClient, MockAuthClient};
use crate::config::{AppConfig, Mode};
use crate::fleet::RedisFleet;
use crate::gamecenter::{ClientTags, Fleet, GameCenter};
use crate::wallet::HttpPayment;

/// External collaborators the runtime talks to.
pub struct Adapters {
    pub auth: Arc<dyn AuthClient>,
    pub payment: Arc<dyn Payment>,
    pub fleet: Fleet,
}

impl Adapters {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let (auth, payment): (Arc<dyn AuthClient>, Arc<dyn Payment>) = match config.mode {
            Mode::Mock => {
                tracing::info!("using mock identity and in-memory wallet");
                (Arc::new(MockAuthClient::new()), Arc::new(MemoryLedger::new()))
            }
            Mode::Real => {
                let auth_url = config
                    .auth_url
                    .as_deref()
                    .context("auth_url is required in real mode")?;
                let wallet_url = config
                    .wallet
                    .base_url
                    .as_deref()
                    .context("wallet.base_url is required in real mode")?;
                let api_key = config.wallet.api_key.clone().unwrap_or_default();
                tracing::info!(%auth_url, %wallet_url, "using remote identity and wallet");
                (
                    Arc::new(HttpAuthClient::new(auth_url).context("failed to build identity client")?),
                    Arc::new(HttpPayment::new(wallet_url, api_key).context("failed to build wallet client")?),
                )
            }
        };
        let fleet = match &config.redis.url {
            Some(url) => {
                let redis = RedisFleet::new(
                    url,
                    config.redis.channel.clone(),
                    config.redis.count_prefix.clone(),
                )
                .context("invalid redis url")?;
                tracing::info!(channel = %config.redis.channel, "fleet channel enabled");
                Fleet::redis(Arc::new(redis))
            }
            None => {
                tracing::info!("no redis configured, fleet operations stay local");
                Fleet::local()
            }
        };
        Ok(Self {
            auth,
            payment,
            fleet,
        })
    }
}

/// A running instance: games ticking, hub accepting, control channel followed.
pub struct App {
    center: GameCenter,
    router: Router,
    tasks: Vec<JoinHandle<()>>,
}

impl App {
    /// Starts every background task. They run until `shutdown` is cancelled
    /// and [`App::finish`] is called.
    pub async fn start(config: &AppConfig, adapters: Adapters, shutdown: CancellationToken) -> Result<Self> {
        let wallet = WalletService::new(adapters.payment);
        let center = GameCenter::new(LoginService::new(adapters.auth), adapters.fleet);

        center.register_game(Arc::new(DiceGame::new(wallet.clone())));
        let wheel = WheelGame::new(config.wheel_config(), wallet.clone());
        let mut tasks = vec![wheel.start()];
        center.register_game(wheel);

        let (transport, hub) = Server::<ClientTags>::start(config.ws_config(), shutdown.clone());
        tasks.push(hub);
        transport
            .subscribe(Arc::new(center.clone()))
            .await
            .context("hub stopped before the game center subscribed")?;
        tasks.extend(center.spawn_control_listener(shutdown));

        let router = Api::new(AppState {
            center: center.clone(),
            transport,
            history: Arc::new(wallet),
        })
        .router();

        Ok(Self {
            center,
            router,
            tasks,
        })
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn center(&self) -> &GameCenter {
        &self.center
    }

    /// Stops the game timers and waits for the background tasks to exit.
    pub async fn finish(self) {
        self.center.stop_games();
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::warn!("background task failed: {err}");
            }
        }
    }
}
