//! Trade charge breakdown: trading fee, GST on the fee, a flat transaction
//! charge, and STT on sells. Pure math, no I/O.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

const TRADING_FEE_PERCENT: Decimal = dec!(0.1);
const GST_PERCENT: Decimal = dec!(18);
const TRANSACTION_CHARGE: Decimal = dec!(2);
const STT_PERCENT: Decimal = dec!(0.025);
const HUNDRED: Decimal = dec!(100);

/// Fee breakdown for one trade. Each field is independently rounded to
/// 2 decimal places; `total_charges` is rounded from the full-precision sum
/// of the parts, not from the rounded parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charges {
    pub trading_fee: Decimal,
    pub gst: Decimal,
    pub transaction_charge: Decimal,
    pub stt: Decimal,
    pub total_charges: Decimal,
}

/// Round a monetary figure to 2 decimal places, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Compute the charge breakdown for a gross trade amount. STT applies only
/// on the sell side. The caller validates that `gross_amount` is positive.
pub fn compute_charges(gross_amount: Decimal, is_sell: bool) -> Charges {
    let trading_fee = gross_amount * TRADING_FEE_PERCENT / HUNDRED;
    let gst = trading_fee * GST_PERCENT / HUNDRED;
    let stt = if is_sell {
        gross_amount * STT_PERCENT / HUNDRED
    } else {
        Decimal::ZERO
    };
    let total = trading_fee + gst + TRANSACTION_CHARGE + stt;

    Charges {
        trading_fee: round_money(trading_fee),
        gst: round_money(gst),
        transaction_charge: TRANSACTION_CHARGE,
        stt: round_money(stt),
        total_charges: round_money(total),
    }
}
