//! Identity providers behind [`AuthClient`].

use async_trait::async_trait;
use slotfactory_execution::{AuthClient, LoginError, UserData};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const MOCK_FIRST_ID: u64 = 1_000_000;
const VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts any token and mints a fresh player per login.
pub struct MockAuthClient {
    next_id: AtomicU64,
}

impl MockAuthClient {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(MOCK_FIRST_ID),
        }
    }
}

impl Default for MockAuthClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthClient for MockAuthClient {
    async fn verify_token(&self, _token: &str) -> Result<UserData, LoginError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(UserData {
            id: id.to_string(),
            name: format!("MockPlayer{id}"),
        })
    }
}

/// Verifies tokens against `POST {base_url}/verify`.
pub struct HttpAuthClient {
    http: reqwest::Client,
    verify_url: String,
}

impl HttpAuthClient {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(VERIFY_TIMEOUT).build()?;
        Ok(Self {
            http,
            verify_url: format!("{}/verify", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl AuthClient for HttpAuthClient {
    async fn verify_token(&self, token: &str) -> Result<UserData, LoginError> {
        let response = self
            .http
            .post(&self.verify_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| LoginError::Verification(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoginError::Verification(format!(
                "identity provider returned {status}"
            )));
        }
        response
            .json::<UserData>()
            .await
            .map_err(|e| LoginError::Verification(e.to_string()))
    }
}
