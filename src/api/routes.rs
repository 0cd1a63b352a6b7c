//! Thin HTTP surface over the executor: auth, funds, trade commands, and
//! read endpoints. All domain logic lives in the engine; handlers only
//! translate requests and map error kinds to stable statuses.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::auth::{self, AuthUser};
use crate::error::TradeError;
use crate::execution::{BuyRequest, OrderExecutor, SellRequest};
use crate::persistence;
use crate::types::transaction::TxnReason;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub executor: Arc<OrderExecutor>,
    pub jwt_secret: Vec<u8>,
    pub default_balance: Decimal,
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/balance", get(get_balance))
        .route("/balance/add", post(add_balance))
        .route("/balance/history", get(balance_history))
        .route("/orders/buy", post(place_buy))
        .route("/orders/sell", post(place_sell))
        .route("/orders/{id}/partial-exit", post(partial_exit))
        .route("/orders/{id}/cancel", post(cancel_order))
        .route("/orders", get(list_orders))
        .route("/orders/{id}", get(get_order))
        .route("/positions", get(list_positions))
        .with_state(state)
}

async fn health() -> &'static str {
    "healthy"
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

impl IntoResponse for TradeError {
    fn into_response(self) -> Response {
        let status = match &self {
            TradeError::InvalidQuantity
            | TradeError::InvalidAmount
            | TradeError::InsufficientBalance { .. }
            | TradeError::InsufficientQuantity { .. } => StatusCode::BAD_REQUEST,
            TradeError::NoOpenPosition(_)
            | TradeError::OrderNotFound(_)
            | TradeError::UserNotFound(_) => StatusCode::NOT_FOUND,
            TradeError::InvalidState(_) => StatusCode::CONFLICT,
            TradeError::PriceUnavailable(_) => StatusCode::BAD_GATEWAY,
            TradeError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_body(status, self.to_string())
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let unauthorized = || error_body(StatusCode::UNAUTHORIZED, "Invalid or missing token".into());

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(unauthorized)?;

        let claims = auth::decode_token(&state.jwt_secret, token).map_err(|_| unauthorized())?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| unauthorized())?;
        Ok(AuthUser { user_id })
    }
}

#[derive(Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, Response> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(error_body(StatusCode::BAD_REQUEST, "email is required".into()));
    }
    if req.password.is_empty() {
        return Err(error_body(StatusCode::BAD_REQUEST, "password is required".into()));
    }

    let password_hash = auth::hash_password(&req.password)
        .map_err(|_| error_body(StatusCode::INTERNAL_SERVER_ERROR, "hashing failed".into()))?;

    let user_id = Uuid::new_v4();
    persistence::users::insert_user(&state.pool, user_id, &email, &password_hash, "USD")
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                error_body(StatusCode::CONFLICT, "email already registered".into())
            }
            _ => TradeError::from(e).into_response(),
        })?;

    // Seed the starting balance through the ledger so the very first entry
    // is an INITIAL_CREDIT with balance_before = 0.
    let mut balance = Decimal::ZERO;
    if state.default_balance > Decimal::ZERO {
        let (new_balance, _) = state
            .executor
            .add_funds(user_id, state.default_balance, TxnReason::InitialCredit)
            .await
            .map_err(IntoResponse::into_response)?;
        balance = new_balance;
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "user_id": user_id, "email": email, "virtual_balance": balance })),
    )
        .into_response())
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, Response> {
    let email = req.email.trim().to_lowercase();
    let user = persistence::users::get_user_by_email(&state.pool, &email)
        .await
        .map_err(|e| TradeError::from(e).into_response())?
        .filter(|u| auth::verify_password(&req.password, &u.password_hash))
        .ok_or_else(|| error_body(StatusCode::UNAUTHORIZED, "invalid credentials".into()))?;

    let token = auth::create_token(&state.jwt_secret, user.id)
        .map_err(|_| error_body(StatusCode::INTERNAL_SERVER_ERROR, "token creation failed".into()))?;
    Ok(Json(json!({ "token": token, "user_id": user.id })).into_response())
}

async fn get_balance(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, TradeError> {
    let row = persistence::users::get_user_by_id(&state.pool, user.user_id)
        .await?
        .ok_or(TradeError::UserNotFound(user.user_id))?;
    Ok(Json(json!({ "virtual_balance": row.virtual_balance, "currency": row.currency }))
        .into_response())
}

#[derive(Deserialize)]
struct AddBalanceRequest {
    amount: Decimal,
}

async fn add_balance(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<AddBalanceRequest>,
) -> Result<Response, TradeError> {
    let (balance, txn) = state
        .executor
        .add_funds(user.user_id, req.amount, TxnReason::AddFunds)
        .await?;
    Ok(Json(json!({ "virtual_balance": balance, "transaction": txn })).into_response())
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

async fn balance_history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, TradeError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let transactions = persistence::transactions::list_for_user(&state.pool, user.user_id, limit).await?;
    let (total_credit, total_debit) =
        persistence::transactions::totals_for_user(&state.pool, user.user_id).await?;
    Ok(Json(json!({
        "transactions": transactions,
        "summary": { "total_credit": total_credit, "total_debit": total_debit },
    }))
    .into_response())
}

async fn place_buy(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<BuyRequest>,
) -> Result<Response, TradeError> {
    let outcome = state.executor.place_buy(user.user_id, &req).await?;
    Ok(Json(outcome).into_response())
}

async fn place_sell(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<SellRequest>,
) -> Result<Response, TradeError> {
    let outcome = state.executor.place_sell(user.user_id, &req).await?;
    Ok(Json(outcome).into_response())
}

#[derive(Deserialize)]
struct PartialExitRequest {
    exit_percentage: Decimal,
}

async fn partial_exit(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
    Json(req): Json<PartialExitRequest>,
) -> Result<Response, TradeError> {
    // Ownership check before the engine touches anything.
    persistence::orders::find_order(&state.pool, order_id)
        .await?
        .filter(|o| o.user_id == user.user_id)
        .ok_or(TradeError::OrderNotFound(order_id))?;

    let outcome = state.executor.partial_exit(order_id, req.exit_percentage).await?;
    Ok(Json(outcome).into_response())
}

async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Response, TradeError> {
    let outcome = state.executor.cancel_order(user.user_id, order_id).await?;
    Ok(Json(outcome).into_response())
}

#[derive(Deserialize)]
struct OrdersQuery {
    status: Option<String>,
}

async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrdersQuery>,
) -> Result<Response, TradeError> {
    let status = query.status.as_deref().and_then(persistence::orders::parse_status);
    let orders = persistence::orders::list_orders_for_user(&state.pool, user.user_id, status).await?;
    Ok(Json(orders).into_response())
}

async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Response, TradeError> {
    let order = persistence::orders::find_order(&state.pool, order_id)
        .await?
        .filter(|o| o.user_id == user.user_id)
        .ok_or(TradeError::OrderNotFound(order_id))?;
    Ok(Json(order).into_response())
}

async fn list_positions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, TradeError> {
    let positions = persistence::positions::list_active_for_user(&state.pool, user.user_id).await?;
    Ok(Json(positions).into_response())
}
