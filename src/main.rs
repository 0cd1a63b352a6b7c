use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use paper_exchange::api::routes::{app_router, AppState};
use paper_exchange::execution::OrderExecutor;
use paper_exchange::oracle::BinanceOracle;
use paper_exchange::persistence::create_pool_and_migrate;
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("paper_exchange=info".parse().unwrap()))
        .init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let jwt_secret = std::env::var("JWT_SECRET").expect("JWT_SECRET must be set").into_bytes();
    let bind_addr = env_or("BIND_ADDR", "0.0.0.0:3000");
    let default_balance =
        Decimal::from_str(&env_or("DEFAULT_VIRTUAL_BALANCE", "100000")).expect("invalid DEFAULT_VIRTUAL_BALANCE");
    let price_base_url = env_or("PRICE_API_BASE_URL", "https://api.binance.com");
    let price_timeout: u64 = env_or("PRICE_TIMEOUT_SECS", "3").parse().expect("invalid PRICE_TIMEOUT_SECS");
    let price_ttl: u64 = env_or("PRICE_CACHE_TTL_SECS", "60").parse().expect("invalid PRICE_CACHE_TTL_SECS");

    let pool = create_pool_and_migrate(&database_url, 5)
        .await
        .expect("database connection and migration failed");

    let oracle = Arc::new(BinanceOracle::new(
        price_base_url,
        Duration::from_secs(price_timeout),
        Duration::from_secs(price_ttl),
    ));
    let executor = Arc::new(OrderExecutor::new(pool.clone(), oracle));

    let state = AppState {
        pool,
        executor,
        jwt_secret,
        default_balance,
    };

    let app = app_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await.unwrap();
    info!(%bind_addr, "listening");
    axum::serve(listener, app).await.unwrap();
}
