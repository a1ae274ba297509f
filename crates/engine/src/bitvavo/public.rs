use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use common::{BestBidAsk, Error, MarketDataPort, Result, TradingPair};

use super::{exchange_error, parse_price, BASE_URL};

/// Unauthenticated Bitvavo market data. Secondary source when the authenticated
/// book call fails, and the only source in test mode.
pub struct BitvavoPublic {
    http: Client,
    base_url: String,
}

impl BitvavoPublic {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: Client::builder()
                .use_rustls_tls()
                .timeout(timeout)
                .build()
                .map_err(|e| Error::Http(e.to_string()))?,
            base_url: BASE_URL.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct TickerBook {
    bid: Option<String>,
    ask: Option<String>,
}

fn parse_ticker_book(body: &str) -> Result<BestBidAsk> {
    let ticker: TickerBook = serde_json::from_str(body)?;
    let bid = ticker
        .bid
        .ok_or_else(|| Error::Http("ticker has no bid".into()))?;
    let ask = ticker
        .ask
        .ok_or_else(|| Error::Http("ticker has no ask".into()))?;
    Ok(BestBidAsk {
        bid: parse_price("bid", &bid)?,
        ask: parse_price("ask", &ask)?,
    })
}

#[async_trait]
impl MarketDataPort for BitvavoPublic {
    async fn best_bid_ask(&self, pair: &TradingPair) -> Result<BestBidAsk> {
        let url = format!("{}/ticker/book?market={pair}", self.base_url);
        debug!(%pair, "Fetching public ticker book");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(exchange_error(status, &body));
        }
        parse_ticker_book(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ticker_book() {
        let body = r#"{"market":"ETH-EUR","bid":"2500.1","bidSize":"1","ask":"2500.9","askSize":"2"}"#;
        let quote = parse_ticker_book(body).unwrap();
        assert_eq!(quote.bid, 2500.1);
        assert_eq!(quote.ask, 2500.9);
    }

    #[test]
    fn missing_side_is_an_error() {
        assert!(parse_ticker_book(r#"{"market":"ETH-EUR","bid":"1"}"#).is_err());
        assert!(parse_ticker_book(r#"{"market":"ETH-EUR","bid":"0","ask":"1"}"#).is_err());
    }
}
