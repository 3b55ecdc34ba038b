//! Wallet façade over a pluggable [`Payment`] backend.
//!
//! The façade adds logging and nothing else: no retries, no caching. The
//! backend owns atomicity, in particular [`Payment::debit_and_credit`] must
//! either apply both legs as one balance mutation or leave the balance
//! untouched.

mod memory;

pub use memory::{MemoryLedger, DEFAULT_STARTING_BALANCE};

use async_trait::async_trait;
use rust_decimal::Decimal;
use slotfactory_types::TransactionRecord;
use std::sync::Arc;
use thiserror::Error;

/// Typed failure returned by every wallet call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("payment error {code}: {message}")]
pub struct PaymentError {
    pub code: u16,
    pub message: String,
}

impl PaymentError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn insufficient_balance() -> Self {
        Self::new(400, "balance is not enough")
    }

    pub fn invalid_amount() -> Self {
        Self::new(400, "amount must not be negative")
    }

    pub fn overflow() -> Self {
        Self::new(400, "amount out of range")
    }

    pub fn unavailable() -> Self {
        Self::new(502, "External API error")
    }

    pub fn unsupported(operation: &str) -> Self {
        Self::new(500, format!("{operation} is not supported"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionType {
    Bet,
    Pay,
    BetAndPay,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bet => "BET",
            Self::Pay => "PAY",
            Self::BetAndPay => "BETANDPAY",
        }
    }
}

#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Most recent transactions first, at most `limit` of them.
    async fn history(
        &self,
        player_id: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, PaymentError>;
}

#[async_trait]
pub trait Payment: HistoryProvider {
    async fn balance(&self, player_id: &str) -> Result<Decimal, PaymentError>;

    /// Fails with [`PaymentError::insufficient_balance`] rather than going negative.
    async fn debit(&self, player_id: &str, amount: Decimal) -> Result<Decimal, PaymentError>;

    async fn credit(&self, player_id: &str, amount: Decimal) -> Result<Decimal, PaymentError>;

    /// Applies `-debit + credit` as a single mutation and returns the new balance.
    async fn debit_and_credit(
        &self,
        player_id: &str,
        debit: Decimal,
        credit: Decimal,
    ) -> Result<Decimal, PaymentError>;
}

#[derive(Clone)]
pub struct WalletService {
    payment: Arc<dyn Payment>,
}

impl WalletService {
    pub fn new(payment: Arc<dyn Payment>) -> Self {
        Self { payment }
    }

    pub async fn balance(&self, player_id: &str) -> Result<Decimal, PaymentError> {
        self.payment.balance(player_id).await.inspect_err(|e| {
            tracing::error!(player_id, error = %e, "get balance failed");
        })
    }

    pub async fn debit(&self, player_id: &str, amount: Decimal) -> Result<Decimal, PaymentError> {
        self.payment.debit(player_id, amount).await.inspect_err(|e| {
            tracing::error!(player_id, %amount, error = %e, "debit failed");
        })
    }

    pub async fn credit(&self, player_id: &str, amount: Decimal) -> Result<Decimal, PaymentError> {
        self.payment.credit(player_id, amount).await.inspect_err(|e| {
            tracing::error!(player_id, %amount, error = %e, "credit failed");
        })
    }

    pub async fn debit_and_credit(
        &self,
        player_id: &str,
        debit: Decimal,
        credit: Decimal,
    ) -> Result<Decimal, PaymentError> {
        self.payment
            .debit_and_credit(player_id, debit, credit)
            .await
            .inspect_err(|e| {
                tracing::error!(player_id, %debit, %credit, error = %e, "debit and credit failed");
            })
    }
}

#[async_trait]
impl HistoryProvider for WalletService {
    async fn history(
        &self,
        player_id: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, PaymentError> {
        self.payment.history(player_id, limit).await.inspect_err(|e| {
            tracing::error!(player_id, limit, error = %e, "get history failed");
        })
    }
}
