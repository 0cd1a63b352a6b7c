//! Balance mutation and its paired ledger entry. Every change to a user's
//! virtual balance goes through `debit` or `credit`, which derive the new
//! balance and the immutable Transaction record together so the two can
//! never disagree. Testable without a database.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::TradeError;
use crate::types::transaction::{Transaction, TxnReason, TxnType};

/// Debit `amount` from `balance`. Fails `InsufficientBalance` before the
/// balance would go negative; on success returns the new balance and the
/// DEBIT entry carrying matching before/after values.
pub fn debit(
    user_id: Uuid,
    balance: Decimal,
    amount: Decimal,
    reason: TxnReason,
    meta: serde_json::Value,
    now: DateTime<Utc>,
) -> Result<(Decimal, Transaction), TradeError> {
    if amount > balance {
        return Err(TradeError::InsufficientBalance {
            required: amount,
            available: balance,
        });
    }
    let after = balance - amount;
    Ok((after, entry(user_id, TxnType::Debit, amount, balance, after, reason, meta, now)))
}

/// Credit `amount` to `balance`. Returns the new balance and the CREDIT entry.
pub fn credit(
    user_id: Uuid,
    balance: Decimal,
    amount: Decimal,
    reason: TxnReason,
    meta: serde_json::Value,
    now: DateTime<Utc>,
) -> (Decimal, Transaction) {
    let after = balance + amount;
    (after, entry(user_id, TxnType::Credit, amount, balance, after, reason, meta, now))
}

#[allow(clippy::too_many_arguments)]
fn entry(
    user_id: Uuid,
    txn_type: TxnType,
    amount: Decimal,
    before: Decimal,
    after: Decimal,
    reason: TxnReason,
    meta: serde_json::Value,
    now: DateTime<Utc>,
) -> Transaction {
    Transaction {
        id: Uuid::new_v4(),
        user_id,
        txn_type,
        amount,
        balance_before: before,
        balance_after: after,
        reason,
        meta,
        created_at: now,
    }
}

/// Replay a chronological ledger sequence from a starting balance. Used to
/// check ledger fidelity: the result must equal the current balance.
pub fn replay(starting_balance: Decimal, entries: &[Transaction]) -> Decimal {
    entries.iter().fold(starting_balance, |bal, e| match e.txn_type {
        TxnType::Credit => bal + e.amount,
        TxnType::Debit => bal - e.amount,
    })
}
