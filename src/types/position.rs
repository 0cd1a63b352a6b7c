use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::order::{OrderId, Price, Qty};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Active,
    Closed,
}

/// Aggregated holding per (user, symbol). At most one Active row per pair;
/// the store enforces this with a partial unique index. Invariants at each
/// buy merge: invested_amount == total_quantity * average_price,
/// current_value == total_quantity * current_price, pnl == current_value -
/// invested_amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub total_quantity: Qty,
    pub average_price: Price,
    pub current_price: Price,
    pub invested_amount: Decimal,
    pub current_value: Decimal,
    pub pnl: Decimal,
    pub pnl_percentage: Decimal,
    pub order_ids: Vec<OrderId>,
    pub status: PositionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
