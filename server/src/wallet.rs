//! HTTP client for the operator's wallet.
//!
//! Balances live upstream; this process only keeps a short audit trail of the
//! mutations it made so the history endpoint has something to serve.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use slotfactory_execution::wallet::TransactionType;
use slotfactory_execution::{HistoryProvider, Payment, PaymentError};
use slotfactory_types::TransactionRecord;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const WALLET_TIMEOUT: Duration = Duration::from_secs(5);
/// Records kept per player.
const AUDIT_DEPTH: usize = 100;

#[derive(Deserialize)]
struct BalanceReply {
    balance: Decimal,
}

#[derive(Deserialize)]
struct ErrorReply {
    code: u16,
    message: String,
}

#[derive(Default)]
struct Audit {
    next_id: i64,
    records: HashMap<String, VecDeque<TransactionRecord>>,
}

pub struct HttpPayment {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    audit: Mutex<Audit>,
}

impl HttpPayment {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(WALLET_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            audit: Mutex::new(Audit::default()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn call(&self, request: reqwest::RequestBuilder) -> Result<Decimal, PaymentError> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| {
                tracing::warn!("wallet request failed: {err}");
                PaymentError::unavailable()
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(match response.json::<ErrorReply>().await {
                Ok(reply) => PaymentError::new(reply.code, reply.message),
                Err(_) => {
                    tracing::warn!(%status, "wallet rejected request");
                    PaymentError::unavailable()
                }
            });
        }
        response
            .json::<BalanceReply>()
            .await
            .map(|reply| reply.balance)
            .map_err(|err| {
                tracing::warn!("wallet reply undecodable: {err}");
                PaymentError::unavailable()
            })
    }

    fn record(&self, player_id: &str, amount: Decimal, kind: TransactionType, balance_after: Decimal) {
        let mut audit = self.audit.lock().unwrap_or_else(PoisonError::into_inner);
        audit.next_id += 1;
        let record = TransactionRecord {
            id: audit.next_id,
            player_id: player_id.to_string(),
            amount,
            transaction_type: kind.as_str().to_string(),
            balance_after,
            created_at: now_millis(),
        };
        let records = audit.records.entry(player_id.to_string()).or_default();
        records.push_front(record);
        records.truncate(AUDIT_DEPTH);
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[async_trait]
impl HistoryProvider for HttpPayment {
    async fn history(
        &self,
        player_id: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, PaymentError> {
        let audit = self.audit.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(audit
            .records
            .get(player_id)
            .map(|records| records.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Payment for HttpPayment {
    async fn balance(&self, player_id: &str) -> Result<Decimal, PaymentError> {
        self.call(self.http.get(self.url(&format!("/balance/{player_id}"))))
            .await
    }

    async fn debit(&self, player_id: &str, amount: Decimal) -> Result<Decimal, PaymentError> {
        let body = serde_json::json!({"playerID": player_id, "amount": amount});
        let balance = self.call(self.http.post(self.url("/debit")).json(&body)).await?;
        self.record(player_id, -amount, TransactionType::Bet, balance);
        Ok(balance)
    }

    async fn credit(&self, player_id: &str, amount: Decimal) -> Result<Decimal, PaymentError> {
        let body = serde_json::json!({"playerID": player_id, "amount": amount});
        let balance = self.call(self.http.post(self.url("/credit")).json(&body)).await?;
        self.record(player_id, amount, TransactionType::Pay, balance);
        Ok(balance)
    }

    async fn debit_and_credit(
        &self,
        player_id: &str,
        debit: Decimal,
        credit: Decimal,
    ) -> Result<Decimal, PaymentError> {
        let body = serde_json::json!({
            "playerID": player_id,
            "debitAmount": debit,
            "creditAmount": credit,
        });
        let balance = self.call(self.http.post(self.url("/spin")).json(&body)).await?;
        self.record(player_id, credit - debit, TransactionType::BetAndPay, balance);
        Ok(balance)
    }
}
