//! Oracle adapter tests: static oracle behavior and price cache TTL.

use std::time::Duration;

use paper_exchange::error::TradeError;
use paper_exchange::oracle::{PriceCache, PriceOracle, StaticOracle};
use rust_decimal_macros::dec;

#[tokio::test]
async fn static_oracle_returns_configured_price() {
    let oracle = StaticOracle::new();
    oracle.set_price("BTCUSDT", dec!(50000)).await;

    let price = oracle.current_price("BTCUSDT").await.unwrap();
    assert_eq!(price, dec!(50000));
}

#[tokio::test]
async fn static_oracle_unknown_symbol_is_unavailable() {
    let oracle = StaticOracle::new();
    let err = oracle.current_price("DOGEUSDT").await.unwrap_err();
    match err {
        TradeError::PriceUnavailable(symbol) => assert_eq!(symbol, "DOGEUSDT"),
        other => panic!("expected PriceUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn static_oracle_price_can_be_updated() {
    let oracle = StaticOracle::new();
    oracle.set_price("ETHUSDT", dec!(3000)).await;
    oracle.set_price("ETHUSDT", dec!(3100)).await;
    assert_eq!(oracle.current_price("ETHUSDT").await.unwrap(), dec!(3100));
}

#[tokio::test]
async fn cache_hit_within_ttl() {
    let cache = PriceCache::new(Duration::from_secs(60));
    cache.put("BTCUSDT", dec!(50000)).await;
    assert_eq!(cache.get("BTCUSDT").await, Some(dec!(50000)));
}

#[tokio::test]
async fn cache_miss_for_unknown_symbol() {
    let cache = PriceCache::new(Duration::from_secs(60));
    assert_eq!(cache.get("BTCUSDT").await, None);
}

#[tokio::test]
async fn cache_expires_after_ttl() {
    let cache = PriceCache::new(Duration::from_millis(20));
    cache.put("BTCUSDT", dec!(50000)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cache.get("BTCUSDT").await, None);
}

#[tokio::test]
async fn cache_overwrite_refreshes_entry() {
    let cache = PriceCache::new(Duration::from_secs(60));
    cache.put("BTCUSDT", dec!(50000)).await;
    cache.put("BTCUSDT", dec!(51000)).await;
    assert_eq!(cache.get("BTCUSDT").await, Some(dec!(51000)));
}
