use async_trait::async_trait;

use crate::{BestBidAsk, Fill, Order, Result, TradingMode, TradingPair};

/// Source of top-of-book prices.
///
/// `BitvavoClient` and `BitvavoPublic` implement this against the exchange.
/// Tests script it directly.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    async fn best_bid_ask(&self, pair: &TradingPair) -> Result<BestBidAsk>;
}

/// Sink for market orders.
///
/// `BitvavoClient` implements this for live trading, `PaperClient` for test mode.
/// Only `OrderExecutor` in `crates/engine` should hold a `dyn OrderPort`.
#[async_trait]
pub trait OrderPort: Send + Sync {
    /// Submit a market order and return the fill confirmation.
    async fn submit(&self, order: &Order) -> Result<Fill>;

    /// Whether fills from this port move real money.
    fn mode(&self) -> TradingMode;
}
