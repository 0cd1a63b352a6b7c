//! Market price oracle: the only network I/O on the trade hot path. The
//! engine makes a single call per workflow and treats every failure mode
//! (network, unknown symbol, malformed body, bad price) as PriceUnavailable.
//! Caching and timeouts live here in the adapter, never in the executor.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::TradeError;
use crate::types::order::Price;

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Current market price for a symbol. Must be positive.
    async fn current_price(&self, symbol: &str) -> Result<Price, TradeError>;
}

/// Explicit key -> (price, fetched-at) cache with a fixed TTL, owned by the
/// adapter that fills it.
pub struct PriceCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Price, Instant)>>,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, symbol: &str) -> Option<Price> {
        let guard = self.entries.read().await;
        guard
            .get(symbol)
            .filter(|(_, at)| at.elapsed() < self.ttl)
            .map(|(price, _)| *price)
    }

    pub async fn put(&self, symbol: &str, price: Price) {
        let mut guard = self.entries.write().await;
        guard.insert(symbol.to_string(), (price, Instant::now()));
    }
}

/// Binance spot ticker adapter.
pub struct BinanceOracle {
    client: reqwest::Client,
    base_url: String,
    cache: PriceCache,
}

#[derive(Deserialize)]
struct TickerResponse {
    price: String,
}

impl BinanceOracle {
    pub fn new(base_url: impl Into<String>, timeout: Duration, cache_ttl: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build reqwest client"),
            base_url: base_url.into(),
            cache: PriceCache::new(cache_ttl),
        }
    }
}

#[async_trait]
impl PriceOracle for BinanceOracle {
    async fn current_price(&self, symbol: &str) -> Result<Price, TradeError> {
        if let Some(price) = self.cache.get(symbol).await {
            return Ok(price);
        }

        let unavailable = || TradeError::PriceUnavailable(symbol.to_string());

        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| {
                warn!(symbol, error = %e, "price request failed");
                unavailable()
            })?;

        if !response.status().is_success() {
            warn!(symbol, status = %response.status(), "price request rejected");
            return Err(unavailable());
        }

        let ticker: TickerResponse = response.json().await.map_err(|e| {
            warn!(symbol, error = %e, "malformed ticker response");
            unavailable()
        })?;

        let price = Decimal::from_str(&ticker.price).map_err(|_| unavailable())?;
        if price <= Decimal::ZERO {
            return Err(unavailable());
        }

        self.cache.put(symbol, price).await;
        Ok(price)
    }
}

/// Fixed price map, settable at runtime. Serves tests and offline demo mode.
#[derive(Default)]
pub struct StaticOracle {
    prices: RwLock<HashMap<String, Price>>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_price(&self, symbol: &str, price: Price) {
        let mut guard = self.prices.write().await;
        guard.insert(symbol.to_string(), price);
    }
}

#[async_trait]
impl PriceOracle for StaticOracle {
    async fn current_price(&self, symbol: &str) -> Result<Price, TradeError> {
        let guard = self.prices.read().await;
        guard
            .get(symbol)
            .copied()
            .ok_or_else(|| TradeError::PriceUnavailable(symbol.to_string()))
    }
}
