use super::{HistoryProvider, Payment, PaymentError, TransactionType};
use async_trait::async_trait;
use rust_decimal::Decimal;
use slotfactory_types::TransactionRecord;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_STARTING_BALANCE: Decimal = Decimal::from_parts(100_000, 0, 0, false, 0);

#[derive(Default)]
struct Ledger {
    balances: HashMap<String, Decimal>,
    history: HashMap<String, Vec<TransactionRecord>>,
    next_id: i64,
}

impl Ledger {
    fn balance(&mut self, player_id: &str, seed: Decimal) -> Decimal {
        *self
            .balances
            .entry(player_id.to_string())
            .or_insert(seed)
    }

    fn commit(
        &mut self,
        player_id: &str,
        amount: Decimal,
        kind: TransactionType,
        balance_after: Decimal,
    ) {
        self.balances.insert(player_id.to_string(), balance_after);
        self.next_id += 1;
        let record = TransactionRecord {
            id: self.next_id,
            player_id: player_id.to_string(),
            amount,
            transaction_type: kind.as_str().to_string(),
            balance_after,
            created_at: now_millis(),
        };
        self.history
            .entry(player_id.to_string())
            .or_default()
            .push(record);
    }
}

/// In-process ledger used in mock mode and tests.
///
/// Accounts are created on first touch with the starting balance. Every
/// operation runs under one lock, so a debit-and-credit is observed either
/// fully or not at all.
pub struct MemoryLedger {
    starting_balance: Decimal,
    ledger: Mutex<Ledger>,
    fail_next_credit: AtomicBool,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::with_starting_balance(DEFAULT_STARTING_BALANCE)
    }

    pub fn with_starting_balance(starting_balance: Decimal) -> Self {
        Self {
            starting_balance,
            ledger: Mutex::new(Ledger::default()),
            fail_next_credit: AtomicBool::new(false),
        }
    }

    /// Makes the next credit leg fail after its debit has been computed.
    pub fn fail_next_credit(&self) {
        self.fail_next_credit.store(true, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn credit_fails(&self) -> bool {
        self.fail_next_credit.swap(false, Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryProvider for MemoryLedger {
    async fn history(
        &self,
        player_id: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, PaymentError> {
        let ledger = self.lock();
        Ok(ledger
            .history
            .get(player_id)
            .map(|records| records.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Payment for MemoryLedger {
    async fn balance(&self, player_id: &str) -> Result<Decimal, PaymentError> {
        Ok(self.lock().balance(player_id, self.starting_balance))
    }

    async fn debit(&self, player_id: &str, amount: Decimal) -> Result<Decimal, PaymentError> {
        if amount.is_sign_negative() {
            return Err(PaymentError::invalid_amount());
        }
        let mut ledger = self.lock();
        let balance = ledger.balance(player_id, self.starting_balance);
        if balance < amount {
            return Err(PaymentError::insufficient_balance());
        }
        let after = balance - amount;
        ledger.commit(player_id, amount, TransactionType::Bet, after);
        Ok(after)
    }

    async fn credit(&self, player_id: &str, amount: Decimal) -> Result<Decimal, PaymentError> {
        if amount.is_sign_negative() {
            return Err(PaymentError::invalid_amount());
        }
        if self.credit_fails() {
            return Err(PaymentError::unavailable());
        }
        let mut ledger = self.lock();
        let after = ledger
            .balance(player_id, self.starting_balance)
            .checked_add(amount)
            .ok_or_else(PaymentError::overflow)?;
        ledger.commit(player_id, amount, TransactionType::Pay, after);
        Ok(after)
    }

    async fn debit_and_credit(
        &self,
        player_id: &str,
        debit: Decimal,
        credit: Decimal,
    ) -> Result<Decimal, PaymentError> {
        if debit.is_sign_negative() || credit.is_sign_negative() {
            return Err(PaymentError::invalid_amount());
        }
        let mut ledger = self.lock();
        let balance = ledger.balance(player_id, self.starting_balance);
        if balance < debit {
            return Err(PaymentError::insufficient_balance());
        }
        let debited = balance - debit;
        if self.credit_fails() {
            return Err(PaymentError::unavailable());
        }
        let after = debited
            .checked_add(credit)
            .ok_or_else(PaymentError::overflow)?;
        let net = credit.checked_sub(debit).ok_or_else(PaymentError::overflow)?;
        ledger.commit(player_id, net, TransactionType::BetAndPay, after);
        Ok(after)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
