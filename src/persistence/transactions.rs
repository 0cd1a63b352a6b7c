//! Ledger persistence: append-only inserts and history reads. There is no
//! update or delete path for transactions by design of the schema.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::types::transaction::{Transaction, TxnReason, TxnType};

fn type_to_str(t: TxnType) -> &'static str {
    match t {
        TxnType::Credit => "CREDIT",
        TxnType::Debit => "DEBIT",
    }
}

fn str_to_type(s: &str) -> Result<TxnType, sqlx::Error> {
    match s {
        "CREDIT" => Ok(TxnType::Credit),
        "DEBIT" => Ok(TxnType::Debit),
        other => Err(sqlx::Error::Decode(
            format!("unknown transaction type: {other}").into(),
        )),
    }
}

fn reason_to_str(r: TxnReason) -> &'static str {
    match r {
        TxnReason::BuyOrder => "BUY_ORDER",
        TxnReason::SellOrder => "SELL_ORDER",
        TxnReason::PartialExit => "PARTIAL_EXIT",
        TxnReason::OrderCancelled => "ORDER_CANCELLED",
        TxnReason::InitialCredit => "INITIAL_CREDIT",
        TxnReason::AddFunds => "ADD_FUNDS",
    }
}

fn str_to_reason(s: &str) -> Result<TxnReason, sqlx::Error> {
    match s {
        "BUY_ORDER" => Ok(TxnReason::BuyOrder),
        "SELL_ORDER" => Ok(TxnReason::SellOrder),
        "PARTIAL_EXIT" => Ok(TxnReason::PartialExit),
        "ORDER_CANCELLED" => Ok(TxnReason::OrderCancelled),
        "INITIAL_CREDIT" => Ok(TxnReason::InitialCredit),
        "ADD_FUNDS" => Ok(TxnReason::AddFunds),
        other => Err(sqlx::Error::Decode(
            format!("unknown transaction reason: {other}").into(),
        )),
    }
}

#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub txn_type: String,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub reason: String,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

fn row_to_transaction(row: TransactionRow) -> Result<Transaction, sqlx::Error> {
    Ok(Transaction {
        id: row.id,
        user_id: row.user_id,
        txn_type: str_to_type(&row.txn_type)?,
        amount: row.amount,
        balance_before: row.balance_before,
        balance_after: row.balance_after,
        reason: str_to_reason(&row.reason)?,
        meta: row.meta,
        created_at: row.created_at,
    })
}

/// Append one ledger entry inside the executor's unit of work.
pub async fn insert_transaction(
    conn: &mut PgConnection,
    txn: &Transaction,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO transactions (id, user_id, txn_type, amount, balance_before, balance_after, \
         reason, meta, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(txn.id)
    .bind(txn.user_id)
    .bind(type_to_str(txn.txn_type))
    .bind(txn.amount)
    .bind(txn.balance_before)
    .bind(txn.balance_after)
    .bind(reason_to_str(txn.reason))
    .bind(&txn.meta)
    .bind(txn.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// A user's ledger, newest first (for GET /balance/history).
pub async fn list_for_user(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        "SELECT id, user_id, txn_type, amount, balance_before, balance_after, reason, meta, \
         created_at FROM transactions WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(row_to_transaction).collect()
}

/// Lifetime credit and debit totals for the history summary.
pub async fn totals_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<(Decimal, Decimal), sqlx::Error> {
    let (credit, debit): (Option<Decimal>, Option<Decimal>) = sqlx::query_as(
        "SELECT SUM(amount) FILTER (WHERE txn_type = 'CREDIT'), \
                SUM(amount) FILTER (WHERE txn_type = 'DEBIT') \
         FROM transactions WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok((credit.unwrap_or_default(), debit.unwrap_or_default()))
}
