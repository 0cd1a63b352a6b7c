//! User persistence: account rows and the authoritative cash balance.
//! `balance_for_update` takes the row lock that serializes all balance and
//! position mutations for one user.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

/// Row returned from DB (email is stored lowercase).
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub virtual_balance: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// Insert a user. Email must already be lowercase.
pub async fn insert_user(
    pool: &PgPool,
    id: Uuid,
    email: &str,
    password_hash: &str,
    currency: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, virtual_balance, currency) \
         VALUES ($1, $2, $3, 0, $4)",
    )
    .bind(id)
    .bind(email)
    .bind(password_hash)
    .bind(currency)
    .execute(pool)
    .await?;
    Ok(())
}

/// Get a user by email (lowercase). For login.
pub async fn get_user_by_email(
    pool: &PgPool,
    email_lowercase: &str,
) -> Result<Option<UserRow>, sqlx::Error> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, email, password_hash, virtual_balance, currency, created_at \
         FROM users WHERE email = $1",
    )
    .bind(email_lowercase)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<UserRow>, sqlx::Error> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, email, password_hash, virtual_balance, currency, created_at \
         FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Read the balance with a row lock. Must run inside a transaction; the
/// lock is held until commit or rollback.
pub async fn balance_for_update(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<Option<Decimal>, sqlx::Error> {
    let row: Option<(Decimal,)> =
        sqlx::query_as("SELECT virtual_balance FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(row.map(|(b,)| b))
}

/// Write the new balance derived by the ledger. Only called with the row
/// lock held.
pub async fn update_balance(
    conn: &mut PgConnection,
    user_id: Uuid,
    balance: Decimal,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET virtual_balance = $1 WHERE id = $2")
        .bind(balance)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
