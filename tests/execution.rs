//! Execution planner tests: buy, sell, partial exit, and cancellation,
//! including the end-to-end balance conservation scenario. Planners are
//! pure, so the whole lifecycle is checked without a database.

use chrono::Utc;
use paper_exchange::error::TradeError;
use paper_exchange::execution::{
    plan_buy, plan_cancel, plan_partial_exit, plan_sell, BuyRequest, SellRequest,
};
use paper_exchange::ledger::replay;
use paper_exchange::types::order::{OrderKind, OrderSide, OrderStatus};
use paper_exchange::types::position::PositionStatus;
use paper_exchange::types::transaction::{TxnReason, TxnType};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

fn market_buy(symbol: &str, quantity: Decimal) -> BuyRequest {
    BuyRequest {
        symbol: symbol.to_string(),
        quantity,
        kind: OrderKind::Market,
        limit_price: None,
        stop_loss_price: None,
        take_profit_price: None,
    }
}

fn limit_buy(symbol: &str, quantity: Decimal, limit_price: Decimal) -> BuyRequest {
    BuyRequest {
        symbol: symbol.to_string(),
        quantity,
        kind: OrderKind::Limit,
        limit_price: Some(limit_price),
        stop_loss_price: None,
        take_profit_price: None,
    }
}

fn market_sell(symbol: &str, quantity: Decimal) -> SellRequest {
    SellRequest {
        symbol: symbol.to_string(),
        quantity: Some(quantity),
        exit_percentage: None,
        kind: OrderKind::Market,
        limit_price: None,
    }
}

#[test]
fn market_buy_debits_balance_and_opens_order() {
    let user_id = Uuid::new_v4();
    let plan = plan_buy(
        user_id,
        dec!(100000),
        None,
        dec!(100),
        &market_buy("BTCUSDT", dec!(10)),
        Utc::now(),
    )
    .unwrap();

    assert_eq!(plan.order.side, OrderSide::Buy);
    assert_eq!(plan.order.status, OrderStatus::Open);
    assert!(plan.order.executed_at.is_some());
    assert_eq!(plan.order.entry_price, dec!(100));
    assert_eq!(plan.order.invested_amount, dec!(1000));
    assert_eq!(plan.order.remaining_quantity, dec!(10));

    assert_eq!(plan.charges.total_charges, dec!(3.18));
    assert_eq!(plan.total_debit, dec!(1003.18));
    assert_eq!(plan.new_balance, dec!(98996.82));

    assert_eq!(plan.transaction.txn_type, TxnType::Debit);
    assert_eq!(plan.transaction.reason, TxnReason::BuyOrder);
    assert_eq!(plan.transaction.amount, dec!(1003.18));
    assert_eq!(plan.transaction.balance_before, dec!(100000));
    assert_eq!(plan.transaction.balance_after, dec!(98996.82));

    assert_eq!(plan.position.total_quantity, dec!(10));
    assert_eq!(plan.position.average_price, dec!(100));
    assert_eq!(plan.position.order_ids, vec![plan.order.id]);
}

#[test]
fn limit_buy_uses_limit_price_and_stays_pending() {
    let plan = plan_buy(
        Uuid::new_v4(),
        dec!(10000),
        None,
        dec!(100),
        &limit_buy("BTCUSDT", dec!(5), dec!(95)),
        Utc::now(),
    )
    .unwrap();

    assert_eq!(plan.order.status, OrderStatus::Pending);
    assert!(plan.order.executed_at.is_none());
    assert_eq!(plan.order.entry_price, dec!(95));
    assert_eq!(plan.order.invested_amount, dec!(475));
}

#[test]
fn limit_buy_with_invalid_limit_falls_back_to_market() {
    let plan = plan_buy(
        Uuid::new_v4(),
        dec!(10000),
        None,
        dec!(100),
        &limit_buy("BTCUSDT", dec!(5), dec!(0)),
        Utc::now(),
    )
    .unwrap();
    assert_eq!(plan.order.entry_price, dec!(100));
}

#[test]
fn buy_rejects_non_positive_quantity() {
    let err = plan_buy(
        Uuid::new_v4(),
        dec!(10000),
        None,
        dec!(100),
        &market_buy("BTCUSDT", dec!(0)),
        Utc::now(),
    )
    .unwrap_err();
    assert!(matches!(err, TradeError::InvalidQuantity));
}

#[test]
fn buy_rejects_insufficient_balance() {
    // balance 100 cannot cover invested 100 + charges.
    let err = plan_buy(
        Uuid::new_v4(),
        dec!(100),
        None,
        dec!(100),
        &market_buy("BTCUSDT", dec!(1)),
        Utc::now(),
    )
    .unwrap_err();

    match err {
        TradeError::InsufficientBalance { required, available } => {
            assert_eq!(required, dec!(102.12));
            assert_eq!(available, dec!(100));
        }
        other => panic!("expected InsufficientBalance, got {other:?}"),
    }
}

#[test]
fn repeat_buys_merge_with_weighted_average() {
    let user_id = Uuid::new_v4();
    let now = Utc::now();

    let first = plan_buy(user_id, dec!(100000), None, dec!(100), &market_buy("ETHUSDT", dec!(10)), now).unwrap();
    let second = plan_buy(
        user_id,
        first.new_balance,
        Some(&first.position),
        dec!(110),
        &market_buy("ETHUSDT", dec!(5)),
        now,
    )
    .unwrap();

    let pos = &second.position;
    assert_eq!(pos.total_quantity, dec!(15));
    assert_eq!(pos.invested_amount, dec!(1550));
    assert!((pos.average_price - dec!(1550) / dec!(15)).abs() < dec!(0.01));
}

#[test]
fn sell_full_position_end_to_end() {
    // Spec scenario: 100000 -> buy 10 @ 100 -> 98996.82 -> sell 10 @ 110.
    let user_id = Uuid::new_v4();
    let now = Utc::now();

    let buy = plan_buy(user_id, dec!(100000), None, dec!(100), &market_buy("BTCUSDT", dec!(10)), now).unwrap();
    assert_eq!(buy.new_balance, dec!(98996.82));

    let sell = plan_sell(
        buy.new_balance,
        &buy.position,
        dec!(110),
        &market_sell("BTCUSDT", dec!(10)),
        now,
    )
    .unwrap();

    assert_eq!(sell.charges.total_charges, dec!(3.57));
    assert_eq!(sell.net_pnl, dec!(96.43));
    assert_eq!(sell.credit_amount, dec!(1096.43));
    assert_eq!(sell.new_balance, dec!(100093.25));

    assert_eq!(sell.order.side, OrderSide::Sell);
    assert_eq!(sell.order.status, OrderStatus::Closed);
    assert_eq!(sell.order.entry_price, dec!(100));
    assert_eq!(sell.order.closed_price, Some(dec!(110)));
    assert_eq!(sell.order.invested_amount, dec!(1000));
    assert_eq!(sell.order.pnl, dec!(96.43));

    assert_eq!(sell.position.status, PositionStatus::Closed);
    assert_eq!(sell.position.total_quantity, dec!(0));

    // Ledger fidelity: replaying both entries reproduces the final balance.
    let entries = vec![buy.transaction, sell.transaction];
    assert_eq!(replay(dec!(100000), &entries), dec!(100093.25));
}

#[test]
fn sell_rejects_oversell() {
    let user_id = Uuid::new_v4();
    let now = Utc::now();
    let buy = plan_buy(user_id, dec!(100000), None, dec!(100), &market_buy("BTCUSDT", dec!(5)), now).unwrap();

    let err = plan_sell(
        buy.new_balance,
        &buy.position,
        dec!(100),
        &market_sell("BTCUSDT", dec!(6)),
        now,
    )
    .unwrap_err();

    match err {
        TradeError::InsufficientQuantity { requested, available } => {
            assert_eq!(requested, dec!(6));
            assert_eq!(available, dec!(5));
        }
        other => panic!("expected InsufficientQuantity, got {other:?}"),
    }
}

#[test]
fn sell_by_percentage_computes_quantity_from_position() {
    let user_id = Uuid::new_v4();
    let now = Utc::now();
    let buy = plan_buy(user_id, dec!(100000), None, dec!(100), &market_buy("BTCUSDT", dec!(10)), now).unwrap();

    let req = SellRequest {
        symbol: "BTCUSDT".to_string(),
        quantity: None,
        exit_percentage: Some(dec!(50)),
        kind: OrderKind::Market,
        limit_price: None,
    };
    let sell = plan_sell(buy.new_balance, &buy.position, dec!(110), &req, now).unwrap();

    assert_eq!(sell.order.quantity, dec!(5));
    assert_eq!(sell.position.total_quantity, dec!(5));
    assert_eq!(sell.position.average_price, dec!(100));
    assert_eq!(sell.position.status, PositionStatus::Active);
}

#[test]
fn sell_without_quantity_or_percentage_is_invalid() {
    let user_id = Uuid::new_v4();
    let now = Utc::now();
    let buy = plan_buy(user_id, dec!(100000), None, dec!(100), &market_buy("BTCUSDT", dec!(10)), now).unwrap();

    let req = SellRequest {
        symbol: "BTCUSDT".to_string(),
        quantity: None,
        exit_percentage: None,
        kind: OrderKind::Market,
        limit_price: None,
    };
    let err = plan_sell(buy.new_balance, &buy.position, dec!(110), &req, now).unwrap_err();
    assert!(matches!(err, TradeError::InvalidQuantity));
}

#[test]
fn partial_exit_halves_order_and_position() {
    let user_id = Uuid::new_v4();
    let now = Utc::now();
    let buy = plan_buy(user_id, dec!(100000), None, dec!(100), &market_buy("BTCUSDT", dec!(10)), now).unwrap();

    let plan = plan_partial_exit(
        &buy.order,
        Some(&buy.position),
        buy.new_balance,
        dec!(110),
        dec!(50),
        now,
    )
    .unwrap();

    // sale 550, cost basis 500, charges 0.55 + 0.099 + 2 + 0.1375 -> 2.79.
    assert_eq!(plan.charges.total_charges, dec!(2.79));
    assert_eq!(plan.net_pnl, dec!(47.21));
    assert_eq!(plan.credit_amount, dec!(547.21));

    assert_eq!(plan.order.status, OrderStatus::PartiallyClosed);
    assert_eq!(plan.order.remaining_quantity, dec!(5));
    assert_eq!(plan.order.partial_exits.len(), 1);
    let record = &plan.order.partial_exits[0];
    assert_eq!(record.percentage, dec!(50));
    assert_eq!(record.quantity, dec!(5));
    assert_eq!(record.pnl, dec!(47.21));

    // The position shrinks by the same quantity: no divergent state.
    assert_eq!(plan.position.total_quantity, dec!(5));
    assert_eq!(plan.position.invested_amount, dec!(500));
    assert_eq!(plan.position.status, PositionStatus::Active);

    assert_eq!(plan.transaction.txn_type, TxnType::Credit);
    assert_eq!(plan.transaction.reason, TxnReason::PartialExit);
}

#[test]
fn second_partial_exit_closes_the_order() {
    let user_id = Uuid::new_v4();
    let now = Utc::now();
    let buy = plan_buy(user_id, dec!(100000), None, dec!(100), &market_buy("BTCUSDT", dec!(10)), now).unwrap();

    let first = plan_partial_exit(&buy.order, Some(&buy.position), buy.new_balance, dec!(110), dec!(50), now).unwrap();
    let second = plan_partial_exit(
        &first.order,
        Some(&first.position),
        first.new_balance,
        dec!(110),
        dec!(100),
        now,
    )
    .unwrap();

    assert_eq!(second.order.status, OrderStatus::Closed);
    assert_eq!(second.order.remaining_quantity, dec!(0));
    assert!(second.order.closed_at.is_some());
    assert_eq!(second.order.partial_exits.len(), 2);
    assert_eq!(second.position.status, PositionStatus::Closed);

    let exited: Decimal = second.order.partial_exits.iter().map(|r| r.quantity).sum();
    assert_eq!(exited, buy.order.quantity);
}

#[test]
fn partial_exit_requires_open_order() {
    let user_id = Uuid::new_v4();
    let now = Utc::now();
    let pending = plan_buy(user_id, dec!(100000), None, dec!(100), &limit_buy("BTCUSDT", dec!(10), dec!(95)), now).unwrap();

    let err = plan_partial_exit(
        &pending.order,
        Some(&pending.position),
        pending.new_balance,
        dec!(110),
        dec!(50),
        now,
    )
    .unwrap_err();
    assert!(matches!(err, TradeError::InvalidState(_)));
}

#[test]
fn partial_exit_rejects_bad_percentage() {
    let user_id = Uuid::new_v4();
    let now = Utc::now();
    let buy = plan_buy(user_id, dec!(100000), None, dec!(100), &market_buy("BTCUSDT", dec!(10)), now).unwrap();

    for pct in [dec!(0), dec!(-5), dec!(101)] {
        let err = plan_partial_exit(&buy.order, Some(&buy.position), buy.new_balance, dec!(110), pct, now)
            .unwrap_err();
        assert!(matches!(err, TradeError::InvalidQuantity), "pct {pct}");
    }
}

#[test]
fn partial_exit_requires_active_position() {
    let user_id = Uuid::new_v4();
    let now = Utc::now();
    let buy = plan_buy(user_id, dec!(100000), None, dec!(100), &market_buy("BTCUSDT", dec!(10)), now).unwrap();

    let err = plan_partial_exit(&buy.order, None, buy.new_balance, dec!(110), dec!(50), now).unwrap_err();
    assert!(matches!(err, TradeError::NoOpenPosition(_)));
}

#[test]
fn cancel_refunds_exactly_and_only_once() {
    let user_id = Uuid::new_v4();
    let now = Utc::now();
    let starting_balance = dec!(100000);

    let buy = plan_buy(user_id, starting_balance, None, dec!(100), &limit_buy("BTCUSDT", dec!(10), dec!(95)), now).unwrap();
    assert_eq!(buy.order.status, OrderStatus::Pending);

    let cancel = plan_cancel(&buy.order, buy.new_balance, now).unwrap();
    assert_eq!(cancel.order.status, OrderStatus::Cancelled);
    assert_eq!(cancel.refund, buy.total_debit);
    // Balance restored to exactly its pre-order value.
    assert_eq!(cancel.new_balance, starting_balance);
    assert_eq!(cancel.transaction.txn_type, TxnType::Credit);
    assert_eq!(cancel.transaction.reason, TxnReason::OrderCancelled);

    // A second cancellation attempt fails InvalidState.
    let err = plan_cancel(&cancel.order, cancel.new_balance, now).unwrap_err();
    assert!(matches!(err, TradeError::InvalidState(_)));
}

#[test]
fn cancel_rejects_open_orders() {
    let user_id = Uuid::new_v4();
    let now = Utc::now();
    let buy = plan_buy(user_id, dec!(100000), None, dec!(100), &market_buy("BTCUSDT", dec!(10)), now).unwrap();

    let err = plan_cancel(&buy.order, buy.new_balance, now).unwrap_err();
    assert!(matches!(err, TradeError::InvalidState(_)));
}

#[test]
fn lifecycle_ledger_replays_to_final_balance() {
    let user_id = Uuid::new_v4();
    let now = Utc::now();
    let mut entries = Vec::new();

    let buy1 = plan_buy(user_id, dec!(100000), None, dec!(100), &market_buy("BTCUSDT", dec!(10)), now).unwrap();
    entries.push(buy1.transaction);
    let buy2 = plan_buy(user_id, buy1.new_balance, Some(&buy1.position), dec!(105), &market_buy("BTCUSDT", dec!(4)), now).unwrap();
    entries.push(buy2.transaction);
    let sell = plan_sell(
        buy2.new_balance,
        &buy2.position,
        dec!(120),
        &market_sell("BTCUSDT", dec!(14)),
        now,
    )
    .unwrap();
    entries.push(sell.transaction);

    assert_eq!(replay(dec!(100000), &entries), sell.new_balance);
    assert_eq!(sell.position.status, PositionStatus::Closed);
}
