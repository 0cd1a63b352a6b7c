use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::charges::Charges;

pub type Price = Decimal;
pub type Qty = Decimal;
pub type OrderId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    #[default]
    Market,
    Limit,
    StopLoss,
}

/// Order lifecycle: Pending -> Open -> {PartiallyClosed -> Closed | Closed},
/// with Pending -> Cancelled as the alternate terminal edge. Market orders
/// enter directly at Open. Closed and Cancelled orders are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Open,
    PartiallyClosed,
    Closed,
    Cancelled,
}

/// One partial liquidation of an open order, kept in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialExitRecord {
    pub percentage: Decimal,
    pub price: Price,
    pub quantity: Qty,
    pub pnl: Decimal,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: Qty,
    pub entry_price: Price,
    pub limit_price: Option<Price>,
    pub stop_loss_price: Option<Price>,
    pub take_profit_price: Option<Price>,
    pub invested_amount: Decimal,
    pub current_value: Option<Decimal>,
    pub pnl: Decimal,
    pub pnl_percentage: Decimal,
    pub charges: Charges,
    pub partial_exits: Vec<PartialExitRecord>,
    pub remaining_quantity: Qty,
    pub status: OrderStatus,
    pub executed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_price: Option<Price>,
    pub created_at: DateTime<Utc>,
}
