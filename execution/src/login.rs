use crate::player::Player;
use async_trait::async_trait;
use serde::Deserialize;
use slotfactory_wss::ClientHandle;
use std::sync::Arc;
use thiserror::Error;

/// Identity returned by the external verifier.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UserData {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoginError {
    #[error("token is missing")]
    MissingToken,
    #[error("token verification failed: {0}")]
    Verification(String),
}

#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn verify_token(&self, token: &str) -> Result<UserData, LoginError>;
}

/// Turns a session token into a [`Player`] bound to one connection.
///
/// Every call re-verifies the token; nothing is cached.
#[derive(Clone)]
pub struct LoginService {
    auth: Arc<dyn AuthClient>,
}

impl LoginService {
    pub fn new(auth: Arc<dyn AuthClient>) -> Self {
        Self { auth }
    }

    pub async fn authenticate(&self, token: &str, client: ClientHandle) -> Result<Player, LoginError> {
        if token.is_empty() {
            return Err(LoginError::MissingToken);
        }
        let user = self.auth.verify_token(token).await?;
        Ok(Player::new(user.id, user.name, client))
    }
}
