//! Database layer: pool, migrations, and access for users, orders,
//! positions, and the transaction ledger. Mutating functions take a
//! `PgConnection` so they can participate in the executor's unit of work;
//! read paths take the pool directly.

pub mod orders;
pub mod pool;
pub mod positions;
pub mod transactions;
pub mod users;

pub use pool::{create_pool_and_migrate, run_migrations};
pub use sqlx::PgPool;
