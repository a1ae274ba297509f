use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use common::{
    BestBidAsk, Error, Fill, MarketDataPort, Order, OrderPort, OrderSizing, Result,
    TradingMode, TradingPair,
};

use super::{exchange_error, parse_book, BASE_URL};

/// Milliseconds the exchange accepts between signing and receipt.
const ACCESS_WINDOW_MS: u64 = 10_000;

/// Authenticated Bitvavo REST client. Used for order placement and the primary book read.
pub struct BitvavoClient {
    api_key: String,
    secret: String,
    operator_id: i64,
    http: Client,
    base_url: String,
}

impl BitvavoClient {
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        operator_id: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let operator_id = operator_id.trim().parse::<i64>().map_err(|_| {
            Error::Config(format!("BITVAVO_OPERATOR_ID must be numeric, got: '{operator_id}'"))
        })?;
        Ok(Self {
            api_key: api_key.into(),
            secret: secret.into(),
            operator_id,
            http: Client::builder()
                .use_rustls_tls()
                .timeout(timeout)
                .build()
                .map_err(|e| Error::Http(e.to_string()))?,
            base_url: BASE_URL.to_string(),
        })
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }

    /// Hex HMAC-SHA256 over `timestamp + method + /v2 path + body`.
    fn sign(&self, timestamp: u64, method: &Method, path: &str, body: &str) -> String {
        sign_request(&self.secret, timestamp, method.as_str(), path, body)
    }

    async fn signed_request(&self, method: Method, path: &str, body: Option<String>) -> Result<String> {
        let ts = Self::timestamp_ms();
        let body = body.unwrap_or_default();
        let signature = self.sign(ts, &method, &format!("/v2{path}"), &body);
        let url = format!("{}{path}", self.base_url);

        let mut req = self
            .http
            .request(method, &url)
            .header("Bitvavo-Access-Key", &self.api_key)
            .header("Bitvavo-Access-Signature", signature)
            .header("Bitvavo-Access-Timestamp", ts.to_string())
            .header("Bitvavo-Access-Window", ACCESS_WINDOW_MS.to_string());
        if !body.is_empty() {
            req = req.header("Content-Type", "application/json").body(body);
        }

        let resp = req.send().await.map_err(|e| Error::Http(e.to_string()))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() || text.contains("\"errorCode\"") {
            return Err(exchange_error(status, &text));
        }
        Ok(text)
    }
}

pub(crate) fn sign_request(secret: &str, timestamp: u64, method: &str, path: &str, body: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let payload = format!("{timestamp}{method}{path}{body}");
    // HMAC accepts keys of any length, so this never fails.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[async_trait]
impl MarketDataPort for BitvavoClient {
    async fn best_bid_ask(&self, pair: &TradingPair) -> Result<BestBidAsk> {
        let body = self
            .signed_request(Method::GET, &format!("/{pair}/book?depth=1"), None)
            .await?;
        parse_book(&body)
    }
}

#[async_trait]
impl OrderPort for BitvavoClient {
    async fn submit(&self, order: &Order) -> Result<Fill> {
        let request = OrderRequest::market(order, self.operator_id);
        let payload = serde_json::to_string(&request)?;

        debug!(pair = %order.pair, side = %order.side, sizing = %order.sizing, "Submitting order to Bitvavo");
        let body = self.signed_request(Method::POST, "/order", Some(payload)).await?;
        parse_order_response(order, &body)
    }

    fn mode(&self) -> TradingMode {
        TradingMode::Live
    }
}

// ─── Request / response types ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderRequest {
    market: String,
    side: String,
    order_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount_quote: Option<String>,
    operator_id: i64,
}

impl OrderRequest {
    fn market(order: &Order, operator_id: i64) -> Self {
        let (amount, amount_quote) = match order.sizing {
            OrderSizing::Base(a) => (Some(format!("{a:.8}")), None),
            OrderSizing::Quote(q) => (None, Some(format!("{q:.2}"))),
        };
        Self {
            market: order.pair.to_string(),
            side: order.side.to_string(),
            order_type: "market",
            amount,
            amount_quote,
            operator_id,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: String,
    #[serde(default)]
    filled_amount: Option<String>,
    #[serde(default)]
    filled_amount_quote: Option<String>,
    #[serde(default)]
    fee_paid: Option<String>,
    #[serde(default)]
    fills: Vec<FillDetail>,
}

#[derive(Deserialize)]
struct FillDetail {
    price: String,
    amount: String,
    #[serde(default)]
    fee: Option<String>,
}

fn number(value: &Option<String>) -> f64 {
    value
        .as_deref()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Turn a market order response into a fill. The average price comes from the
/// order totals, or from the individual fills when totals are missing.
fn parse_order_response(order: &Order, body: &str) -> Result<Fill> {
    let resp: OrderResponse = serde_json::from_str(body)?;

    let mut filled_amount = number(&resp.filled_amount);
    let mut filled_quote = number(&resp.filled_amount_quote);
    let mut fee = number(&resp.fee_paid);

    if filled_amount <= 0.0 || filled_quote <= 0.0 {
        filled_amount = 0.0;
        filled_quote = 0.0;
        let mut fill_fees = 0.0;
        for f in &resp.fills {
            let price: f64 = f.price.parse().unwrap_or(0.0);
            let amount: f64 = f.amount.parse().unwrap_or(0.0);
            filled_amount += amount;
            filled_quote += price * amount;
            fill_fees += number(&f.fee);
        }
        if fee <= 0.0 {
            fee = fill_fees;
        }
    }

    if filled_amount <= 0.0 || filled_quote <= 0.0 {
        return Err(Error::OrderRejected {
            reason: format!("order {} reported no fills", resp.order_id),
        });
    }

    Ok(Fill {
        order_id: resp.order_id,
        pair: order.pair.clone(),
        side: order.side,
        fill_price: filled_quote / filled_amount,
        filled_amount,
        fee,
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderSide;

    fn order(side: OrderSide, sizing: OrderSizing) -> Order {
        Order::market(TradingPair::new("BTC", "EUR"), side, sizing, 100.0)
    }

    #[test]
    fn signature_is_hex_hmac_of_request() {
        let a = sign_request("secret", 1_700_000_000_000, "POST", "/v2/order", "{}");
        let b = sign_request("secret", 1_700_000_000_000, "POST", "/v2/order", "{}");
        let c = sign_request("secret", 1_700_000_000_001, "POST", "/v2/order", "{}");
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn order_request_uses_amount_quote_for_quote_sizing() {
        let req = OrderRequest::market(&order(OrderSide::Buy, OrderSizing::Quote(10.256)), 1001);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["market"], "BTC-EUR");
        assert_eq!(json["side"], "buy");
        assert_eq!(json["orderType"], "market");
        assert_eq!(json["amountQuote"], "10.26");
        assert_eq!(json["operatorId"], 1001);
        assert!(json.get("amount").is_none());
    }

    #[test]
    fn order_request_uses_amount_for_base_sizing() {
        let req = OrderRequest::market(&order(OrderSide::Sell, OrderSizing::Base(0.004)), 1);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["amount"], "0.00400000");
        assert!(json.get("amountQuote").is_none());
    }

    #[test]
    fn fill_price_from_order_totals() {
        let body = r#"{"orderId":"abc","filledAmount":"0.004","filledAmountQuote":"10.52","feePaid":"0.026","fills":[]}"#;
        let fill = parse_order_response(&order(OrderSide::Sell, OrderSizing::Base(0.004)), body).unwrap();
        assert_eq!(fill.order_id, "abc");
        assert!((fill.fill_price - 2630.0).abs() < 1e-6);
        assert!((fill.fee - 0.026).abs() < 1e-12);
    }

    #[test]
    fn fill_price_from_individual_fills() {
        let body = r#"{"orderId":"abc","fills":[
            {"price":"100","amount":"0.05","fee":"0.01"},
            {"price":"102","amount":"0.05","fee":"0.01"}]}"#;
        let fill = parse_order_response(&order(OrderSide::Buy, OrderSizing::Quote(10.1)), body).unwrap();
        assert!((fill.fill_price - 101.0).abs() < 1e-9);
        assert!((fill.filled_amount - 0.1).abs() < 1e-12);
        assert!((fill.fee - 0.02).abs() < 1e-12);
    }

    #[test]
    fn unfilled_order_is_rejected() {
        let body = r#"{"orderId":"abc","filledAmount":"0","fills":[]}"#;
        assert!(matches!(
            parse_order_response(&order(OrderSide::Buy, OrderSizing::Quote(10.0)), body),
            Err(Error::OrderRejected { .. })
        ));
    }
}
