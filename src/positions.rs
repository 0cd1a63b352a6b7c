//! Position aggregation: weighted-average merge on buys, proportional
//! shrink on sells. Snapshot in, new snapshot out; the executor applies the
//! result inside its unit of work. Testable without a database.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::charges::round_money;
use crate::types::order::{OrderId, Price, Qty};
use crate::types::position::{Position, PositionStatus};

/// Merge a buy into the active position for (user, symbol), or create one.
/// Weighted average on merge: new_avg = (old_invested + invested) /
/// (old_qty + qty). The contributing order id is appended in order.
#[allow(clippy::too_many_arguments)]
pub fn merge_buy(
    existing: Option<&Position>,
    user_id: Uuid,
    symbol: &str,
    order_id: OrderId,
    quantity: Qty,
    entry_price: Price,
    invested_amount: Decimal,
    market_price: Price,
    now: DateTime<Utc>,
) -> Position {
    match existing {
        Some(pos) => {
            let total_invested = pos.invested_amount + invested_amount;
            let total_qty = pos.total_quantity + quantity;
            let current_value = total_qty * market_price;
            let pnl = current_value - total_invested;

            let mut order_ids = pos.order_ids.clone();
            order_ids.push(order_id);

            Position {
                total_quantity: total_qty,
                average_price: total_invested / total_qty,
                current_price: market_price,
                invested_amount: total_invested,
                current_value,
                pnl,
                pnl_percentage: pnl_percentage(pnl, total_invested),
                order_ids,
                updated_at: now,
                ..pos.clone()
            }
        }
        None => Position {
            id: Uuid::new_v4(),
            user_id,
            symbol: symbol.to_string(),
            total_quantity: quantity,
            average_price: entry_price,
            current_price: market_price,
            invested_amount,
            current_value: invested_amount,
            pnl: Decimal::ZERO,
            pnl_percentage: Decimal::ZERO,
            order_ids: vec![order_id],
            status: PositionStatus::Active,
            created_at: now,
            updated_at: now,
        },
    }
}

/// Shrink a position by a sale. The cost basis is the proportional share of
/// the invested amount (not FIFO/LIFO lot tracking): invested * sell_qty /
/// total_qty. Average price is unchanged by a sell. Quantity reaching zero
/// closes the position and clears any rounding dust from invested_amount.
/// Returns the new snapshot and the cost basis allocated to the sale.
pub fn apply_sell(
    position: &Position,
    sell_quantity: Qty,
    market_price: Price,
    now: DateTime<Utc>,
) -> (Position, Decimal) {
    let cost_basis = position.invested_amount * sell_quantity / position.total_quantity;
    let remaining_qty = position.total_quantity - sell_quantity;
    let remaining_invested = position.invested_amount - cost_basis;

    let updated = if remaining_qty <= Decimal::ZERO {
        Position {
            total_quantity: Decimal::ZERO,
            invested_amount: Decimal::ZERO,
            current_value: Decimal::ZERO,
            pnl: Decimal::ZERO,
            pnl_percentage: Decimal::ZERO,
            current_price: market_price,
            status: PositionStatus::Closed,
            updated_at: now,
            ..position.clone()
        }
    } else {
        let current_value = remaining_qty * market_price;
        let pnl = current_value - remaining_invested;
        Position {
            total_quantity: remaining_qty,
            invested_amount: remaining_invested,
            current_price: market_price,
            current_value,
            pnl,
            pnl_percentage: pnl_percentage(pnl, remaining_invested),
            updated_at: now,
            ..position.clone()
        }
    };

    (updated, cost_basis)
}

/// P&L as a percentage of the invested amount, rounded to 2 decimals.
/// Zero when nothing is invested.
pub fn pnl_percentage(pnl: Decimal, invested: Decimal) -> Decimal {
    if invested.is_zero() {
        Decimal::ZERO
    } else {
        round_money(pnl / invested * dec!(100))
    }
}
