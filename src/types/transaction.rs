use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxnType {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxnReason {
    BuyOrder,
    SellOrder,
    PartialExit,
    OrderCancelled,
    InitialCredit,
    AddFunds,
}

/// Immutable ledger entry for one balance mutation. Invariant:
/// balance_after == balance_before + amount for Credit, - amount for Debit.
/// A user's entries in chronological order reconstruct their balance exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub txn_type: TxnType,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub reason: TxnReason,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
