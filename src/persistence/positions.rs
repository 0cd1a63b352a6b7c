//! Position persistence. The partial unique index on (user_id, symbol)
//! WHERE status = 'ACTIVE' backs the one-active-position rule; inserts race
//! on it rather than on a query pattern.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::types::position::{Position, PositionStatus};

fn status_to_str(status: PositionStatus) -> &'static str {
    match status {
        PositionStatus::Active => "ACTIVE",
        PositionStatus::Closed => "CLOSED",
    }
}

fn str_to_status(s: &str) -> Result<PositionStatus, sqlx::Error> {
    match s {
        "ACTIVE" => Ok(PositionStatus::Active),
        "CLOSED" => Ok(PositionStatus::Closed),
        other => Err(sqlx::Error::Decode(
            format!("unknown position status: {other}").into(),
        )),
    }
}

#[derive(Debug, FromRow)]
pub struct PositionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub total_quantity: Decimal,
    pub average_price: Decimal,
    pub current_price: Decimal,
    pub invested_amount: Decimal,
    pub current_value: Decimal,
    pub pnl: Decimal,
    pub pnl_percentage: Decimal,
    pub order_ids: serde_json::Value,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn row_to_position(row: PositionRow) -> Result<Position, sqlx::Error> {
    Ok(Position {
        id: row.id,
        user_id: row.user_id,
        symbol: row.symbol,
        total_quantity: row.total_quantity,
        average_price: row.average_price,
        current_price: row.current_price,
        invested_amount: row.invested_amount,
        current_value: row.current_value,
        pnl: row.pnl,
        pnl_percentage: row.pnl_percentage,
        order_ids: serde_json::from_value(row.order_ids)
            .map_err(|e| sqlx::Error::Decode(e.to_string().into()))?,
        status: str_to_status(&row.status)?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

const POSITION_COLUMNS: &str = "id, user_id, symbol, total_quantity, average_price, current_price, \
     invested_amount, current_value, pnl, pnl_percentage, order_ids, status, created_at, updated_at";

fn encode_err(e: serde_json::Error) -> sqlx::Error {
    sqlx::Error::Encode(Box::new(e))
}

/// Insert a new position. The partial unique index rejects a second ACTIVE
/// row for the same (user, symbol).
pub async fn insert_position(conn: &mut PgConnection, position: &Position) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO positions (id, user_id, symbol, total_quantity, average_price, current_price, \
         invested_amount, current_value, pnl, pnl_percentage, order_ids, status, created_at, \
         updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
    )
    .bind(position.id)
    .bind(position.user_id)
    .bind(&position.symbol)
    .bind(position.total_quantity)
    .bind(position.average_price)
    .bind(position.current_price)
    .bind(position.invested_amount)
    .bind(position.current_value)
    .bind(position.pnl)
    .bind(position.pnl_percentage)
    .bind(serde_json::to_value(&position.order_ids).map_err(encode_err)?)
    .bind(status_to_str(position.status))
    .bind(position.created_at)
    .bind(position.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Overwrite a position snapshot after a merge or shrink.
pub async fn update_position(conn: &mut PgConnection, position: &Position) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE positions SET total_quantity = $1, average_price = $2, current_price = $3, \
         invested_amount = $4, current_value = $5, pnl = $6, pnl_percentage = $7, order_ids = $8, \
         status = $9, updated_at = $10 WHERE id = $11",
    )
    .bind(position.total_quantity)
    .bind(position.average_price)
    .bind(position.current_price)
    .bind(position.invested_amount)
    .bind(position.current_value)
    .bind(position.pnl)
    .bind(position.pnl_percentage)
    .bind(serde_json::to_value(&position.order_ids).map_err(encode_err)?)
    .bind(status_to_str(position.status))
    .bind(position.updated_at)
    .bind(position.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// The active position for (user, symbol), if any. Plain read.
pub async fn find_active(
    pool: &PgPool,
    user_id: Uuid,
    symbol: &str,
) -> Result<Option<Position>, sqlx::Error> {
    let row = sqlx::query_as::<_, PositionRow>(&format!(
        "SELECT {POSITION_COLUMNS} FROM positions \
         WHERE user_id = $1 AND symbol = $2 AND status = 'ACTIVE'"
    ))
    .bind(user_id)
    .bind(symbol)
    .fetch_optional(pool)
    .await?;
    row.map(row_to_position).transpose()
}

/// The active position for (user, symbol) with a row lock, for the
/// read-modify-write inside the executor's transaction.
pub async fn active_for_update(
    conn: &mut PgConnection,
    user_id: Uuid,
    symbol: &str,
) -> Result<Option<Position>, sqlx::Error> {
    let row = sqlx::query_as::<_, PositionRow>(&format!(
        "SELECT {POSITION_COLUMNS} FROM positions \
         WHERE user_id = $1 AND symbol = $2 AND status = 'ACTIVE' FOR UPDATE"
    ))
    .bind(user_id)
    .bind(symbol)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(row_to_position).transpose()
}

/// All active positions for a user, newest first (for GET /positions).
pub async fn list_active_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<Position>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PositionRow>(&format!(
        "SELECT {POSITION_COLUMNS} FROM positions \
         WHERE user_id = $1 AND status = 'ACTIVE' ORDER BY created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(row_to_position).collect()
}
