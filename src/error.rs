use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Failure taxonomy for the execution engine. Validation and precondition
/// variants are raised before any write; Persistence failures roll back the
/// whole unit of work, so no variant ever leaves a partial mutation visible.
#[derive(Error, Debug)]
pub enum TradeError {
    #[error("Invalid quantity: must be a positive number")]
    InvalidQuantity,

    #[error("Invalid investment amount calculated")]
    InvalidAmount,

    #[error("Insufficient balance. Required: {required}, Available: {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    #[error("Insufficient quantity. Available: {available}, Requested: {requested}")]
    InsufficientQuantity { requested: Decimal, available: Decimal },

    #[error("No open position found for {0}")]
    NoOpenPosition(String),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("Invalid order state: {0}")]
    InvalidState(String),

    #[error("Price unavailable for {0}")]
    PriceUnavailable(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
}
