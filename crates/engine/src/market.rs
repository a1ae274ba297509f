use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use common::{BestBidAsk, Error, MarketDataPort, Result, TradingPair};
use paper::SyntheticFeed;

/// What the market-data chain produced for one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceRead {
    /// A genuine top-of-book read.
    Market(BestBidAsk),
    /// No genuine read was possible; a random walk from the last known price.
    Synthetic(f64),
    /// Nothing usable. Carries the reason for the log.
    Unavailable(String),
}

impl PriceRead {
    pub fn is_genuine(&self) -> bool {
        matches!(self, PriceRead::Market(_))
    }
}

/// Primary source, optional fallback source, optional synthetic walk.
/// Every network read is bounded by `timeout`.
pub struct MarketFeed {
    primary: Arc<dyn MarketDataPort>,
    fallback: Option<Arc<dyn MarketDataPort>>,
    synthetic: Option<SyntheticFeed>,
    timeout: Duration,
}

impl MarketFeed {
    pub fn new(primary: Arc<dyn MarketDataPort>, timeout: Duration) -> Self {
        Self {
            primary,
            fallback: None,
            synthetic: None,
            timeout,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn MarketDataPort>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_synthetic(mut self, synthetic: SyntheticFeed) -> Self {
        self.synthetic = Some(synthetic);
        self
    }

    /// Give the synthetic walk a starting point before any genuine read.
    pub async fn seed(&self, pair: &TradingPair, price: f64) {
        if let Some(synthetic) = &self.synthetic {
            synthetic.observe(pair, price).await;
        }
    }

    pub async fn read(&self, pair: &TradingPair) -> PriceRead {
        match self.read_genuine(pair).await {
            Ok(quote) => {
                if let Some(synthetic) = &self.synthetic {
                    synthetic.observe(pair, quote.mid()).await;
                }
                PriceRead::Market(quote)
            }
            Err(e) => {
                if let Some(synthetic) = &self.synthetic {
                    if let Some(price) = synthetic.next(pair).await {
                        warn!(%pair, error = %e, price, "Market data unavailable, using synthetic sample");
                        return PriceRead::Synthetic(price);
                    }
                }
                PriceRead::Unavailable(e.to_string())
            }
        }
    }

    async fn read_genuine(&self, pair: &TradingPair) -> Result<BestBidAsk> {
        let primary_err = match self.read_port(self.primary.as_ref(), pair).await {
            Ok(quote) => return Ok(quote),
            Err(e) => e,
        };

        let Some(fallback) = &self.fallback else {
            return Err(primary_err);
        };
        warn!(%pair, error = %primary_err, "Primary market data failed, trying fallback");

        self.read_port(fallback.as_ref(), pair)
            .await
            .map_err(|fallback_err| Error::MarketDataUnavailable {
                pair: pair.to_string(),
                reason: format!("primary: {primary_err}; fallback: {fallback_err}"),
            })
    }

    async fn read_port(&self, port: &dyn MarketDataPort, pair: &TradingPair) -> Result<BestBidAsk> {
        let quote = tokio::time::timeout(self.timeout, port.best_bid_ask(pair))
            .await
            .map_err(|_| Error::MarketDataUnavailable {
                pair: pair.to_string(),
                reason: format!("timed out after {:?}", self.timeout),
            })??;

        let valid = |p: f64| p.is_finite() && p > 0.0;
        if !valid(quote.bid) || !valid(quote.ask) {
            return Err(Error::MarketDataUnavailable {
                pair: pair.to_string(),
                reason: format!("unusable quote bid={} ask={}", quote.bid, quote.ask),
            });
        }
        debug!(%pair, bid = quote.bid, ask = quote.ask, "Market quote");
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed(Option<BestBidAsk>);

    #[async_trait]
    impl MarketDataPort for Fixed {
        async fn best_bid_ask(&self, pair: &TradingPair) -> Result<BestBidAsk> {
            self.0.ok_or_else(|| Error::Http(format!("no data for {pair}")))
        }
    }

    struct Hangs;

    #[async_trait]
    impl MarketDataPort for Hangs {
        async fn best_bid_ask(&self, _pair: &TradingPair) -> Result<BestBidAsk> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(Error::Other("unreachable".into()))
        }
    }

    fn quote() -> BestBidAsk {
        BestBidAsk { bid: 99.0, ask: 101.0 }
    }

    fn pair() -> TradingPair {
        TradingPair::new("BTC", "EUR")
    }

    #[tokio::test]
    async fn primary_read_wins() {
        let feed = MarketFeed::new(Arc::new(Fixed(Some(quote()))), Duration::from_secs(1));
        assert_eq!(feed.read(&pair()).await, PriceRead::Market(quote()));
    }

    #[tokio::test]
    async fn falls_back_to_secondary_source() {
        let feed = MarketFeed::new(Arc::new(Fixed(None)), Duration::from_secs(1))
            .with_fallback(Arc::new(Fixed(Some(quote()))));
        assert_eq!(feed.read(&pair()).await, PriceRead::Market(quote()));
    }

    #[tokio::test]
    async fn unavailable_without_synthetic() {
        let feed = MarketFeed::new(Arc::new(Fixed(None)), Duration::from_secs(1))
            .with_fallback(Arc::new(Fixed(None)));
        assert!(matches!(feed.read(&pair()).await, PriceRead::Unavailable(_)));
    }

    #[tokio::test]
    async fn slow_source_times_out_into_synthetic() {
        let feed = MarketFeed::new(Arc::new(Hangs), Duration::from_millis(20))
            .with_synthetic(SyntheticFeed::seeded(0.005, 1));
        feed.seed(&pair(), 100.0).await;
        match feed.read(&pair()).await {
            PriceRead::Synthetic(p) => assert!((p / 100.0 - 1.0).abs() <= 0.005 + 1e-12),
            other => panic!("expected synthetic sample, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejects_zero_quotes() {
        let zero = BestBidAsk { bid: 0.0, ask: 101.0 };
        let feed = MarketFeed::new(Arc::new(Fixed(Some(zero))), Duration::from_secs(1));
        assert!(!feed.read(&pair()).await.is_genuine());
    }
}
