//! Order execution workflows: buy, sell, order-level partial exit, cancel,
//! and funds management. Each workflow is split into a pure planner that
//! derives the complete outcome (order, position, ledger entry, new balance)
//! from immutable snapshots, and an applier that persists the plan inside a
//! single database transaction. The planners are testable without a
//! database; the appliers own atomicity and per-user serialization.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::charges::{compute_charges, Charges};
use crate::error::TradeError;
use crate::ledger;
use crate::oracle::PriceOracle;
use crate::persistence;
use crate::positions;
use crate::types::order::{Order, OrderId, OrderKind, OrderSide, OrderStatus, PartialExitRecord, Price, Qty};
use crate::types::position::Position;
use crate::types::transaction::{Transaction, TxnReason};

const HUNDRED: Decimal = dec!(100);

#[derive(Debug, Clone, Deserialize)]
pub struct BuyRequest {
    pub symbol: String,
    pub quantity: Qty,
    #[serde(default)]
    pub kind: OrderKind,
    pub limit_price: Option<Price>,
    pub stop_loss_price: Option<Price>,
    pub take_profit_price: Option<Price>,
}

/// Either an explicit quantity or a percentage of the current position.
#[derive(Debug, Clone, Deserialize)]
pub struct SellRequest {
    pub symbol: String,
    pub quantity: Option<Qty>,
    pub exit_percentage: Option<Decimal>,
    #[serde(default)]
    pub kind: OrderKind,
    pub limit_price: Option<Price>,
}

#[derive(Debug, Serialize)]
pub struct BuyOutcome {
    pub order: Order,
    pub position: Position,
    pub charges: Charges,
}

#[derive(Debug, Serialize)]
pub struct SellOutcome {
    pub order: Order,
    pub position: Position,
    pub net_pnl: Decimal,
    pub charges: Charges,
}

#[derive(Debug, Serialize)]
pub struct PartialExitOutcome {
    pub order: Order,
    pub position: Position,
    pub net_pnl: Decimal,
    pub charges: Charges,
}

#[derive(Debug, Serialize)]
pub struct CancelOutcome {
    pub order: Order,
}

/// Everything a buy mutates, derived up front.
#[derive(Debug)]
pub struct BuyPlan {
    pub order: Order,
    pub position: Position,
    pub transaction: Transaction,
    pub new_balance: Decimal,
    pub charges: Charges,
    pub total_debit: Decimal,
}

#[derive(Debug)]
pub struct SellPlan {
    pub order: Order,
    pub position: Position,
    pub transaction: Transaction,
    pub new_balance: Decimal,
    pub charges: Charges,
    pub net_pnl: Decimal,
    pub credit_amount: Decimal,
}

#[derive(Debug)]
pub struct PartialExitPlan {
    pub order: Order,
    pub position: Position,
    pub transaction: Transaction,
    pub new_balance: Decimal,
    pub charges: Charges,
    pub net_pnl: Decimal,
    pub credit_amount: Decimal,
}

#[derive(Debug)]
pub struct CancelPlan {
    pub order: Order,
    pub transaction: Transaction,
    pub new_balance: Decimal,
    pub refund: Decimal,
}

fn valid_limit(kind: OrderKind, limit_price: Option<Price>) -> Option<Price> {
    match (kind, limit_price) {
        (OrderKind::Limit, Some(p)) if p > Decimal::ZERO => Some(p),
        _ => None,
    }
}

/// Plan a buy: validate, price the order, compute charges, debit the
/// balance, and merge the position. No side effects.
pub fn plan_buy(
    user_id: Uuid,
    balance: Decimal,
    active_position: Option<&Position>,
    market_price: Price,
    req: &BuyRequest,
    now: DateTime<Utc>,
) -> Result<BuyPlan, TradeError> {
    if req.quantity <= Decimal::ZERO {
        return Err(TradeError::InvalidQuantity);
    }

    let entry_price = valid_limit(req.kind, req.limit_price).unwrap_or(market_price);
    let invested_amount = req.quantity * entry_price;
    if invested_amount <= Decimal::ZERO {
        return Err(TradeError::InvalidAmount);
    }

    let charges = compute_charges(invested_amount, false);
    let total_debit = invested_amount + charges.total_charges;

    let is_market = req.kind == OrderKind::Market;
    let order = Order {
        id: Uuid::new_v4(),
        user_id,
        symbol: req.symbol.clone(),
        side: OrderSide::Buy,
        kind: req.kind,
        quantity: req.quantity,
        entry_price,
        limit_price: req.limit_price,
        stop_loss_price: req.stop_loss_price,
        take_profit_price: req.take_profit_price,
        invested_amount,
        current_value: Some(invested_amount),
        pnl: Decimal::ZERO,
        pnl_percentage: Decimal::ZERO,
        charges: charges.clone(),
        partial_exits: Vec::new(),
        remaining_quantity: req.quantity,
        status: if is_market { OrderStatus::Open } else { OrderStatus::Pending },
        executed_at: is_market.then_some(now),
        closed_at: None,
        closed_price: None,
        created_at: now,
    };

    let meta = json!({
        "order_id": order.id,
        "symbol": req.symbol,
        "quantity": req.quantity,
        "price": entry_price,
        "charges": charges,
    });
    let (new_balance, transaction) =
        ledger::debit(user_id, balance, total_debit, TxnReason::BuyOrder, meta, now)?;

    let position = positions::merge_buy(
        active_position,
        user_id,
        &req.symbol,
        order.id,
        req.quantity,
        entry_price,
        invested_amount,
        market_price,
        now,
    );

    Ok(BuyPlan {
        order,
        position,
        transaction,
        new_balance,
        charges,
        total_debit,
    })
}

/// Plan a sell against the active position: proportional cost basis, net
/// P&L after charges, a CLOSED sell order record, and the shrunken (or
/// closed) position. No side effects.
pub fn plan_sell(
    balance: Decimal,
    position: &Position,
    market_price: Price,
    req: &SellRequest,
    now: DateTime<Utc>,
) -> Result<SellPlan, TradeError> {
    let sell_quantity = match req.exit_percentage {
        Some(pct) => position.total_quantity * pct / HUNDRED,
        None => req.quantity.ok_or(TradeError::InvalidQuantity)?,
    };
    if sell_quantity <= Decimal::ZERO {
        return Err(TradeError::InvalidQuantity);
    }
    if sell_quantity > position.total_quantity {
        return Err(TradeError::InsufficientQuantity {
            requested: sell_quantity,
            available: position.total_quantity,
        });
    }

    let exit_price = valid_limit(req.kind, req.limit_price).unwrap_or(market_price);
    let sale_amount = sell_quantity * exit_price;

    let (updated_position, cost_basis) =
        positions::apply_sell(position, sell_quantity, market_price, now);

    let gross_pnl = sale_amount - cost_basis;
    let charges = compute_charges(sale_amount, true);
    let net_pnl = gross_pnl - charges.total_charges;
    let credit_amount = sale_amount - charges.total_charges;

    let order = Order {
        id: Uuid::new_v4(),
        user_id: position.user_id,
        symbol: position.symbol.clone(),
        side: OrderSide::Sell,
        kind: req.kind,
        quantity: sell_quantity,
        entry_price: position.average_price,
        limit_price: req.limit_price,
        stop_loss_price: None,
        take_profit_price: None,
        invested_amount: cost_basis,
        current_value: Some(sale_amount),
        pnl: net_pnl,
        pnl_percentage: positions::pnl_percentage(net_pnl, cost_basis),
        charges: charges.clone(),
        partial_exits: Vec::new(),
        remaining_quantity: Decimal::ZERO,
        status: OrderStatus::Closed,
        executed_at: Some(now),
        closed_at: Some(now),
        closed_price: Some(exit_price),
        created_at: now,
    };

    let meta = json!({
        "order_id": order.id,
        "symbol": position.symbol,
        "quantity": sell_quantity,
        "price": exit_price,
        "pnl": net_pnl,
        "charges": charges,
    });
    let (new_balance, transaction) = ledger::credit(
        position.user_id,
        balance,
        credit_amount,
        TxnReason::SellOrder,
        meta,
        now,
    );

    Ok(SellPlan {
        order,
        position: updated_position,
        transaction,
        new_balance,
        charges,
        net_pnl,
        credit_amount,
    })
}

/// Plan an order-level partial exit. The exit liquidates a percentage of
/// the order's remaining quantity at market and appends a sub-record; the
/// same quantity is taken out of the active position so order-level and
/// position-level accounting cannot diverge. PartiallyClosed orders may be
/// exited again until nothing remains.
pub fn plan_partial_exit(
    order: &Order,
    active_position: Option<&Position>,
    balance: Decimal,
    market_price: Price,
    exit_percentage: Decimal,
    now: DateTime<Utc>,
) -> Result<PartialExitPlan, TradeError> {
    if !matches!(order.status, OrderStatus::Open | OrderStatus::PartiallyClosed) {
        return Err(TradeError::InvalidState(format!(
            "Order {} is not open for partial exit",
            order.id
        )));
    }
    if exit_percentage <= Decimal::ZERO || exit_percentage > HUNDRED {
        return Err(TradeError::InvalidQuantity);
    }

    let exit_quantity = order.remaining_quantity * exit_percentage / HUNDRED;
    if exit_quantity <= Decimal::ZERO {
        return Err(TradeError::InvalidQuantity);
    }

    let position = active_position.ok_or_else(|| TradeError::NoOpenPosition(order.symbol.clone()))?;
    if exit_quantity > position.total_quantity {
        return Err(TradeError::InsufficientQuantity {
            requested: exit_quantity,
            available: position.total_quantity,
        });
    }

    let sale_amount = exit_quantity * market_price;
    let cost_basis = order.invested_amount * exit_quantity / order.quantity;
    let charges = compute_charges(sale_amount, true);
    let net_pnl = (sale_amount - cost_basis) - charges.total_charges;
    let credit_amount = sale_amount - charges.total_charges;

    let remaining = order.remaining_quantity - exit_quantity;
    let fully_closed = remaining <= Decimal::ZERO;

    let mut partial_exits = order.partial_exits.clone();
    partial_exits.push(PartialExitRecord {
        percentage: exit_percentage,
        price: market_price,
        quantity: exit_quantity,
        pnl: net_pnl,
        executed_at: now,
    });

    let updated_order = Order {
        partial_exits,
        remaining_quantity: if fully_closed { Decimal::ZERO } else { remaining },
        status: if fully_closed { OrderStatus::Closed } else { OrderStatus::PartiallyClosed },
        closed_at: if fully_closed { Some(now) } else { order.closed_at },
        ..order.clone()
    };

    let (updated_position, _) = positions::apply_sell(position, exit_quantity, market_price, now);

    let meta = json!({
        "order_id": order.id,
        "symbol": order.symbol,
        "exit_percentage": exit_percentage,
        "quantity": exit_quantity,
        "price": market_price,
        "pnl": net_pnl,
        "charges": charges,
    });
    let (new_balance, transaction) = ledger::credit(
        order.user_id,
        balance,
        credit_amount,
        TxnReason::PartialExit,
        meta,
        now,
    );

    Ok(PartialExitPlan {
        order: updated_order,
        position: updated_position,
        transaction,
        new_balance,
        charges,
        net_pnl,
        credit_amount,
    })
}

/// Plan a cancellation: only PENDING orders, full refund of the invested
/// amount plus charges.
pub fn plan_cancel(
    order: &Order,
    balance: Decimal,
    now: DateTime<Utc>,
) -> Result<CancelPlan, TradeError> {
    if order.status != OrderStatus::Pending {
        return Err(TradeError::InvalidState(
            "Only pending orders can be cancelled".to_string(),
        ));
    }

    let refund = order.invested_amount + order.charges.total_charges;
    let meta = json!({ "order_id": order.id, "symbol": order.symbol });
    let (new_balance, transaction) = ledger::credit(
        order.user_id,
        balance,
        refund,
        TxnReason::OrderCancelled,
        meta,
        now,
    );

    let cancelled = Order {
        status: OrderStatus::Cancelled,
        ..order.clone()
    };

    Ok(CancelPlan {
        order: cancelled,
        transaction,
        new_balance,
        refund,
    })
}

/// Orchestrates the trade workflows against the store and the price oracle.
/// Every mutation runs inside one database transaction with the user row
/// locked, so operations for a given user are serialized and either apply
/// completely or not at all. The oracle is consulted before the transaction
/// opens; no lock is ever held across network I/O.
pub struct OrderExecutor {
    pool: PgPool,
    oracle: Arc<dyn PriceOracle>,
}

impl OrderExecutor {
    pub fn new(pool: PgPool, oracle: Arc<dyn PriceOracle>) -> Self {
        Self { pool, oracle }
    }

    pub async fn place_buy(&self, user_id: Uuid, req: &BuyRequest) -> Result<BuyOutcome, TradeError> {
        if req.quantity <= Decimal::ZERO {
            return Err(TradeError::InvalidQuantity);
        }

        let market_price = self.oracle.current_price(&req.symbol).await?;

        let mut tx = self.pool.begin().await?;
        let balance = persistence::users::balance_for_update(&mut tx, user_id)
            .await?
            .ok_or(TradeError::UserNotFound(user_id))?;
        let existing = persistence::positions::active_for_update(&mut tx, user_id, &req.symbol).await?;

        let plan = plan_buy(user_id, balance, existing.as_ref(), market_price, req, Utc::now())?;

        persistence::users::update_balance(&mut tx, user_id, plan.new_balance).await?;
        persistence::orders::insert_order(&mut tx, &plan.order).await?;
        persistence::transactions::insert_transaction(&mut tx, &plan.transaction).await?;
        if existing.is_some() {
            persistence::positions::update_position(&mut tx, &plan.position).await?;
        } else {
            persistence::positions::insert_position(&mut tx, &plan.position).await?;
        }
        tx.commit().await?;

        info!(
            %user_id,
            symbol = %req.symbol,
            order_id = %plan.order.id,
            total_debit = %plan.total_debit,
            "buy order executed"
        );

        Ok(BuyOutcome {
            order: plan.order,
            position: plan.position,
            charges: plan.charges,
        })
    }

    pub async fn place_sell(&self, user_id: Uuid, req: &SellRequest) -> Result<SellOutcome, TradeError> {
        // Fast precondition check before touching the oracle.
        persistence::positions::find_active(&self.pool, user_id, &req.symbol)
            .await?
            .ok_or_else(|| TradeError::NoOpenPosition(req.symbol.clone()))?;

        let market_price = self.oracle.current_price(&req.symbol).await?;

        let mut tx = self.pool.begin().await?;
        let balance = persistence::users::balance_for_update(&mut tx, user_id)
            .await?
            .ok_or(TradeError::UserNotFound(user_id))?;
        let position = persistence::positions::active_for_update(&mut tx, user_id, &req.symbol)
            .await?
            .ok_or_else(|| TradeError::NoOpenPosition(req.symbol.clone()))?;

        let plan = plan_sell(balance, &position, market_price, req, Utc::now())?;

        persistence::users::update_balance(&mut tx, user_id, plan.new_balance).await?;
        persistence::orders::insert_order(&mut tx, &plan.order).await?;
        persistence::transactions::insert_transaction(&mut tx, &plan.transaction).await?;
        persistence::positions::update_position(&mut tx, &plan.position).await?;
        tx.commit().await?;

        info!(
            %user_id,
            symbol = %req.symbol,
            order_id = %plan.order.id,
            net_pnl = %plan.net_pnl,
            credit = %plan.credit_amount,
            "sell order executed"
        );

        Ok(SellOutcome {
            order: plan.order,
            position: plan.position,
            net_pnl: plan.net_pnl,
            charges: plan.charges,
        })
    }

    pub async fn partial_exit(
        &self,
        order_id: OrderId,
        exit_percentage: Decimal,
    ) -> Result<PartialExitOutcome, TradeError> {
        let order = persistence::orders::find_order(&self.pool, order_id)
            .await?
            .ok_or(TradeError::OrderNotFound(order_id))?;

        let market_price = self.oracle.current_price(&order.symbol).await?;

        let mut tx = self.pool.begin().await?;
        let order = persistence::orders::order_for_update(&mut tx, order_id)
            .await?
            .ok_or(TradeError::OrderNotFound(order_id))?;
        let balance = persistence::users::balance_for_update(&mut tx, order.user_id)
            .await?
            .ok_or(TradeError::UserNotFound(order.user_id))?;
        let position =
            persistence::positions::active_for_update(&mut tx, order.user_id, &order.symbol).await?;

        let plan = plan_partial_exit(
            &order,
            position.as_ref(),
            balance,
            market_price,
            exit_percentage,
            Utc::now(),
        )?;

        persistence::users::update_balance(&mut tx, order.user_id, plan.new_balance).await?;
        persistence::orders::update_order(&mut tx, &plan.order).await?;
        persistence::transactions::insert_transaction(&mut tx, &plan.transaction).await?;
        persistence::positions::update_position(&mut tx, &plan.position).await?;
        tx.commit().await?;

        info!(
            user_id = %order.user_id,
            %order_id,
            exit_percentage = %exit_percentage,
            net_pnl = %plan.net_pnl,
            "partial exit executed"
        );

        Ok(PartialExitOutcome {
            order: plan.order,
            position: plan.position,
            net_pnl: plan.net_pnl,
            charges: plan.charges,
        })
    }

    pub async fn cancel_order(&self, user_id: Uuid, order_id: OrderId) -> Result<CancelOutcome, TradeError> {
        let mut tx = self.pool.begin().await?;
        let order = persistence::orders::order_for_update(&mut tx, order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or(TradeError::OrderNotFound(order_id))?;
        let balance = persistence::users::balance_for_update(&mut tx, user_id)
            .await?
            .ok_or(TradeError::UserNotFound(user_id))?;

        let plan = plan_cancel(&order, balance, Utc::now())?;

        persistence::users::update_balance(&mut tx, user_id, plan.new_balance).await?;
        persistence::orders::update_order(&mut tx, &plan.order).await?;
        persistence::transactions::insert_transaction(&mut tx, &plan.transaction).await?;
        tx.commit().await?;

        info!(%user_id, %order_id, refund = %plan.refund, "order cancelled");

        Ok(CancelOutcome { order: plan.order })
    }

    /// Credit funds to a user's balance with a paired ledger entry.
    pub async fn add_funds(
        &self,
        user_id: Uuid,
        amount: Decimal,
        reason: TxnReason,
    ) -> Result<(Decimal, Transaction), TradeError> {
        if amount <= Decimal::ZERO {
            return Err(TradeError::InvalidAmount);
        }

        let mut tx = self.pool.begin().await?;
        let balance = persistence::users::balance_for_update(&mut tx, user_id)
            .await?
            .ok_or(TradeError::UserNotFound(user_id))?;

        let (new_balance, transaction) =
            ledger::credit(user_id, balance, amount, reason, json!({}), Utc::now());

        persistence::users::update_balance(&mut tx, user_id, new_balance).await?;
        persistence::transactions::insert_transaction(&mut tx, &transaction).await?;
        tx.commit().await?;

        info!(%user_id, %amount, ?reason, "funds credited");

        Ok((new_balance, transaction))
    }
}
