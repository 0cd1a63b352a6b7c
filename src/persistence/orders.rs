//! Order persistence: insert, update after partial exit or cancellation,
//! fetch by id (optionally locked), list for the API.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::types::order::{Order, OrderKind, OrderSide, OrderStatus};

fn side_to_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "BUY",
        OrderSide::Sell => "SELL",
    }
}

fn kind_to_str(kind: OrderKind) -> &'static str {
    match kind {
        OrderKind::Market => "MARKET",
        OrderKind::Limit => "LIMIT",
        OrderKind::StopLoss => "STOP_LOSS",
    }
}

fn status_to_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "PENDING",
        OrderStatus::Open => "OPEN",
        OrderStatus::PartiallyClosed => "PARTIALLY_CLOSED",
        OrderStatus::Closed => "CLOSED",
        OrderStatus::Cancelled => "CANCELLED",
    }
}

fn str_to_side(s: &str) -> Result<OrderSide, sqlx::Error> {
    match s {
        "BUY" => Ok(OrderSide::Buy),
        "SELL" => Ok(OrderSide::Sell),
        other => Err(decode_err(format!("unknown order side: {other}"))),
    }
}

fn str_to_kind(s: &str) -> Result<OrderKind, sqlx::Error> {
    match s {
        "MARKET" => Ok(OrderKind::Market),
        "LIMIT" => Ok(OrderKind::Limit),
        "STOP_LOSS" => Ok(OrderKind::StopLoss),
        other => Err(decode_err(format!("unknown order kind: {other}"))),
    }
}

fn str_to_status(s: &str) -> Result<OrderStatus, sqlx::Error> {
    match s {
        "PENDING" => Ok(OrderStatus::Pending),
        "OPEN" => Ok(OrderStatus::Open),
        "PARTIALLY_CLOSED" => Ok(OrderStatus::PartiallyClosed),
        "CLOSED" => Ok(OrderStatus::Closed),
        "CANCELLED" => Ok(OrderStatus::Cancelled),
        other => Err(decode_err(format!("unknown order status: {other}"))),
    }
}

fn decode_err(msg: String) -> sqlx::Error {
    sqlx::Error::Decode(msg.into())
}

fn encode_err(e: serde_json::Error) -> sqlx::Error {
    sqlx::Error::Encode(Box::new(e))
}

#[derive(Debug, FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub side: String,
    pub kind: String,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub limit_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
    pub invested_amount: Decimal,
    pub current_value: Option<Decimal>,
    pub pnl: Decimal,
    pub pnl_percentage: Decimal,
    pub charges: serde_json::Value,
    pub partial_exits: serde_json::Value,
    pub remaining_quantity: Decimal,
    pub status: String,
    pub executed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

fn row_to_order(row: OrderRow) -> Result<Order, sqlx::Error> {
    Ok(Order {
        id: row.id,
        user_id: row.user_id,
        symbol: row.symbol,
        side: str_to_side(&row.side)?,
        kind: str_to_kind(&row.kind)?,
        quantity: row.quantity,
        entry_price: row.entry_price,
        limit_price: row.limit_price,
        stop_loss_price: row.stop_loss_price,
        take_profit_price: row.take_profit_price,
        invested_amount: row.invested_amount,
        current_value: row.current_value,
        pnl: row.pnl,
        pnl_percentage: row.pnl_percentage,
        charges: serde_json::from_value(row.charges).map_err(|e| decode_err(e.to_string()))?,
        partial_exits: serde_json::from_value(row.partial_exits)
            .map_err(|e| decode_err(e.to_string()))?,
        remaining_quantity: row.remaining_quantity,
        status: str_to_status(&row.status)?,
        executed_at: row.executed_at,
        closed_at: row.closed_at,
        closed_price: row.closed_price,
        created_at: row.created_at,
    })
}

const ORDER_COLUMNS: &str = "id, user_id, symbol, side, kind, quantity, entry_price, limit_price, \
     stop_loss_price, take_profit_price, invested_amount, current_value, pnl, pnl_percentage, \
     charges, partial_exits, remaining_quantity, status, executed_at, closed_at, closed_price, \
     created_at";

/// Insert a freshly planned order.
pub async fn insert_order(conn: &mut PgConnection, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO orders (id, user_id, symbol, side, kind, quantity, entry_price, limit_price, \
         stop_loss_price, take_profit_price, invested_amount, current_value, pnl, pnl_percentage, \
         charges, partial_exits, remaining_quantity, status, executed_at, closed_at, closed_price, \
         created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, \
         $19, $20, $21, $22)",
    )
    .bind(order.id)
    .bind(order.user_id)
    .bind(&order.symbol)
    .bind(side_to_str(order.side))
    .bind(kind_to_str(order.kind))
    .bind(order.quantity)
    .bind(order.entry_price)
    .bind(order.limit_price)
    .bind(order.stop_loss_price)
    .bind(order.take_profit_price)
    .bind(order.invested_amount)
    .bind(order.current_value)
    .bind(order.pnl)
    .bind(order.pnl_percentage)
    .bind(serde_json::to_value(&order.charges).map_err(encode_err)?)
    .bind(serde_json::to_value(&order.partial_exits).map_err(encode_err)?)
    .bind(order.remaining_quantity)
    .bind(status_to_str(order.status))
    .bind(order.executed_at)
    .bind(order.closed_at)
    .bind(order.closed_price)
    .bind(order.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Persist the mutable fields of an order after a partial exit or a
/// cancellation. Identity fields never change.
pub async fn update_order(conn: &mut PgConnection, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE orders SET partial_exits = $1, remaining_quantity = $2, status = $3, \
         pnl = $4, pnl_percentage = $5, current_value = $6, executed_at = $7, closed_at = $8, \
         closed_price = $9 WHERE id = $10",
    )
    .bind(serde_json::to_value(&order.partial_exits).map_err(encode_err)?)
    .bind(order.remaining_quantity)
    .bind(status_to_str(order.status))
    .bind(order.pnl)
    .bind(order.pnl_percentage)
    .bind(order.current_value)
    .bind(order.executed_at)
    .bind(order.closed_at)
    .bind(order.closed_price)
    .bind(order.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn find_order(pool: &PgPool, order_id: Uuid) -> Result<Option<Order>, sqlx::Error> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
    ))
    .bind(order_id)
    .fetch_optional(pool)
    .await?;
    row.map(row_to_order).transpose()
}

/// Fetch an order with a row lock for the duration of the transaction.
pub async fn order_for_update(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> Result<Option<Order>, sqlx::Error> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
    ))
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(row_to_order).transpose()
}

/// List a user's orders, newest first, optionally filtered by status.
pub async fn list_orders_for_user(
    pool: &PgPool,
    user_id: Uuid,
    status_filter: Option<OrderStatus>,
) -> Result<Vec<Order>, sqlx::Error> {
    let rows = if let Some(status) = status_filter {
        sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 AND status = $2 \
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .bind(status_to_str(status))
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await?
    };
    rows.into_iter().map(row_to_order).collect()
}

/// Parse a status filter coming from the API query string.
pub fn parse_status(s: &str) -> Option<OrderStatus> {
    str_to_status(s).ok()
}
