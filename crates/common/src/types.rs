use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Asset, Error, ProceedsStrategy};

/// A tradable market, rendered the way Bitvavo names it (`BTC-EUR`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().trim().to_uppercase(),
            quote: quote.into().trim().to_uppercase(),
        }
    }
}

impl std::fmt::Display for TradingPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

impl FromStr for TradingPair {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('-') {
            Some((base, quote)) if !base.trim().is_empty() && !quote.trim().is_empty() => {
                Ok(TradingPair::new(base, quote))
            }
            _ => Err(Error::Config(format!(
                "market must look like 'BASE-QUOTE', got: '{s}'"
            ))),
        }
    }
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// How a market order is sized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSizing {
    /// Spend or receive this much quote currency (`amountQuote`).
    Quote(f64),
    /// Trade this many units of the base asset (`amount`).
    Base(f64),
}

impl OrderSizing {
    pub fn amount(&self) -> f64 {
        match self {
            OrderSizing::Quote(a) | OrderSizing::Base(a) => *a,
        }
    }

    /// Approximate quote value at `price`.
    pub fn quote_value(&self, price: f64) -> f64 {
        match self {
            OrderSizing::Quote(a) => *a,
            OrderSizing::Base(a) => *a * price,
        }
    }
}

impl std::fmt::Display for OrderSizing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSizing::Quote(a) => write!(f, "amountQuote={a}"),
            OrderSizing::Base(a) => write!(f, "amount={a}"),
        }
    }
}

/// A market order to be submitted to the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub pair: TradingPair,
    pub side: OrderSide,
    pub sizing: OrderSizing,
    /// Last observed price when the order was decided on.
    pub reference_price: f64,
}

impl Order {
    pub fn market(
        pair: TradingPair,
        side: OrderSide,
        sizing: OrderSizing,
        reference_price: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pair,
            side,
            sizing,
            reference_price,
        }
    }
}

/// Confirmation of a filled order returned by the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub pair: TradingPair,
    pub side: OrderSide,
    pub fill_price: f64,
    /// Base units filled.
    pub filled_amount: f64,
    /// Fee in quote currency.
    pub fee: f64,
    pub timestamp: DateTime<Utc>,
}

impl Fill {
    /// Gross quote value of the fill.
    pub fn quote_value(&self) -> f64 {
        self.fill_price * self.filled_amount
    }
}

/// Top of the order book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestBidAsk {
    pub bid: f64,
    pub ask: f64,
}

impl BestBidAsk {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

/// Whether orders reach the real exchange or are simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Test,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Test => write!(f, "test"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
    Failed,
    Test,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Completed => write!(f, "completed"),
            TransactionStatus::Failed => write!(f, "failed"),
            TransactionStatus::Test => write!(f, "test"),
        }
    }
}

/// Append-only order log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub asset_id: i64,
    pub side: OrderSide,
    pub sizing: OrderSizing,
    /// Fill price, or the reference price when the order failed.
    pub price: f64,
    pub filled_amount: f64,
    pub fee: f64,
    pub mode: TradingMode,
    pub status: TransactionStatus,
    pub order_id: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only tick log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSample {
    pub asset_id: i64,
    pub price: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub synthetic: bool,
    pub timestamp: DateTime<Utc>,
}

/// Append-only record of a signal being armed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEvent {
    pub asset_id: i64,
    pub side: OrderSide,
    pub price: f64,
    pub trigger: f64,
    pub trail_stop: f64,
    pub mode: TradingMode,
    pub timestamp: DateTime<Utc>,
}

/// Append-only record of a proceeds calculation after a sell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProceedsDecision {
    pub asset_id: i64,
    pub strategy: ProceedsStrategy,
    pub ratio: f64,
    pub sell_amount: f64,
    pub original_amount: f64,
    pub profit: f64,
    pub profit_pct: f64,
    pub new_buy_amount: f64,
    pub retained_amount: f64,
    /// `None` when no reinvestment buy was attempted.
    pub reinvestment_success: Option<bool>,
    pub sell_transaction_id: Option<i64>,
    pub buy_transaction_id: Option<i64>,
    pub error: Option<String>,
    pub mode: TradingMode,
    pub timestamp: DateTime<Utc>,
}

/// How close an asset is to acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Temperature {
    /// Trigger crossed, waiting for the trailing pull-back.
    Hot,
    /// Price between the matrix price and the trigger.
    Warm,
    Cold,
}

impl std::fmt::Display for Temperature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Temperature::Hot => write!(f, "hot"),
            Temperature::Warm => write!(f, "warm"),
            Temperature::Cold => write!(f, "cold"),
        }
    }
}

/// Read-only copy of an asset plus the last price the engine saw for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetView {
    pub asset: Asset,
    pub last_price: Option<f64>,
}

impl AssetView {
    /// Unrealized P/L in percent against the matrix price (holding only).
    pub fn pl_pct(&self) -> Option<f64> {
        let price = self.last_price?;
        (self.asset.holding && self.asset.matrix_price > 0.0)
            .then(|| (price / self.asset.matrix_price - 1.0) * 100.0)
    }

    /// Percent the price still has to move to reach the trigger.
    /// Negative once the trigger has been crossed.
    pub fn distance_to_trigger_pct(&self) -> Option<f64> {
        let price = self.last_price?;
        let trigger = self.asset.trigger();
        if trigger <= 0.0 || price <= 0.0 {
            return None;
        }
        Some(if self.asset.holding {
            (trigger / price - 1.0) * 100.0
        } else {
            (price / trigger - 1.0) * 100.0
        })
    }

    pub fn temperature(&self) -> Temperature {
        let Some(price) = self.last_price else {
            return Temperature::Cold;
        };
        let matrix = self.asset.matrix_price;
        if self.asset.holding {
            let trigger = self.asset.sell_trigger();
            if price >= trigger {
                Temperature::Hot
            } else if price > matrix {
                Temperature::Warm
            } else {
                Temperature::Cold
            }
        } else {
            let trigger = self.asset.buy_trigger();
            if price <= trigger {
                Temperature::Hot
            } else if price < matrix {
                Temperature::Warm
            } else {
                Temperature::Cold
            }
        }
    }
}

/// Read-only operator commands sent to the scheduler via the command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Holdings,
    Watching,
    Armed,
    Dump,
    Base(String),
    Help,
}

impl FromStr for OperatorCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "h" => Ok(OperatorCommand::Holdings),
            "w" => Ok(OperatorCommand::Watching),
            "t" => Ok(OperatorCommand::Armed),
            "f" => Ok(OperatorCommand::Dump),
            "?" | "help" => Ok(OperatorCommand::Help),
            base if base.len() >= 2 && base.chars().all(|c| c.is_ascii_alphanumeric()) => {
                Ok(OperatorCommand::Base(base.to_uppercase()))
            }
            other => Err(Error::Other(format!("unknown command '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::tests::sample_params;

    #[test]
    fn pair_round_trips_through_market_name() {
        let pair: TradingPair = "btc-eur".parse().unwrap();
        assert_eq!(pair, TradingPair::new("BTC", "EUR"));
        assert_eq!(pair.to_string(), "BTC-EUR");
        assert!("BTCEUR".parse::<TradingPair>().is_err());
    }

    #[test]
    fn view_temperature_for_watching_asset() {
        let asset = Asset::new(sample_params());
        let view = |p| AssetView { asset: asset.clone(), last_price: Some(p) };
        assert_eq!(view(96.0).temperature(), Temperature::Hot);
        assert_eq!(view(98.0).temperature(), Temperature::Warm);
        assert_eq!(view(101.0).temperature(), Temperature::Cold);
    }

    #[test]
    fn view_pl_only_for_holdings() {
        let mut asset = Asset::new(sample_params());
        let watching = AssetView { asset: asset.clone(), last_price: Some(110.0) };
        assert!(watching.pl_pct().is_none());

        asset.holding = true;
        let holding = AssetView { asset, last_price: Some(110.0) };
        assert!((holding.pl_pct().unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn operator_commands_parse() {
        assert_eq!("h".parse::<OperatorCommand>().unwrap(), OperatorCommand::Holdings);
        assert_eq!("t".parse::<OperatorCommand>().unwrap(), OperatorCommand::Armed);
        assert_eq!(
            "eth".parse::<OperatorCommand>().unwrap(),
            OperatorCommand::Base("ETH".into())
        );
        assert!("".parse::<OperatorCommand>().is_err());
    }
}
