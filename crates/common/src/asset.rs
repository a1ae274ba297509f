use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, TradingPair};

/// How the proceeds of a sale flow into the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProceedsStrategy {
    /// Sell only the allocated quote amount, keep the profit out of the market.
    #[default]
    Eur,
    /// Liquidate the whole base holding and compound everything.
    Crypto,
    /// Reinvest the allocation plus a ratio of the profit.
    Split,
}

impl std::fmt::Display for ProceedsStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProceedsStrategy::Eur => write!(f, "eur"),
            ProceedsStrategy::Crypto => write!(f, "crypto"),
            ProceedsStrategy::Split => write!(f, "split"),
        }
    }
}

impl FromStr for ProceedsStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eur" => Ok(ProceedsStrategy::Eur),
            "crypto" => Ok(ProceedsStrategy::Crypto),
            "split" => Ok(ProceedsStrategy::Split),
            other => Err(Error::Config(format!(
                "proceeds strategy must be 'eur', 'crypto' or 'split', got: '{other}'"
            ))),
        }
    }
}

/// Top-level position state of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetState {
    /// Not holding; watching the ask for a buy.
    Watching,
    /// Holding; watching the bid for a sell.
    Holding,
}

impl std::fmt::Display for AssetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetState::Watching => write!(f, "watching"),
            AssetState::Holding => write!(f, "holding"),
        }
    }
}

/// The persisted fields of an asset. Every construction path (TOML seed, stored row)
/// converts into this first and then goes through [`Asset::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct AssetParams {
    pub id: i64,
    pub name: String,
    pub pair: TradingPair,
    pub allocated_amount: f64,
    pub last_buy_price: f64,
    pub matrix_price: f64,
    pub holding: bool,
    pub high_water: f64,
    pub low_water: f64,
    pub gain: f64,
    pub trail: f64,
    pub deal_count: i64,
    pub last_update_time: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub proceeds_strategy: ProceedsStrategy,
    pub proceeds_ratio: f64,
    pub active: bool,
}

/// One tracked (base, quote, strategy-variant) position with its trailing window.
///
/// `buy_armed`, `sell_armed` and `trail_stop` are derived state. They are never
/// loaded from storage; restart reconciliation recomputes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: i64,
    pub name: String,
    pub pair: TradingPair,
    /// Quote-currency amount committed to this asset's position.
    pub allocated_amount: f64,
    /// Fill price of the open position, 0 when not holding.
    pub last_buy_price: f64,
    /// Reference price for the gain and trail thresholds.
    pub matrix_price: f64,
    pub holding: bool,
    pub high_water: f64,
    pub low_water: f64,
    pub gain: f64,
    pub trail: f64,
    pub buy_armed: bool,
    pub sell_armed: bool,
    /// Price at which an armed signal fires; meaningless while unarmed.
    pub trail_stop: f64,
    pub deal_count: i64,
    pub last_update_time: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub proceeds_strategy: ProceedsStrategy,
    pub proceeds_ratio: f64,
    pub active: bool,
}

impl Asset {
    pub fn new(params: AssetParams) -> Self {
        Self {
            id: params.id,
            name: params.name,
            pair: params.pair,
            allocated_amount: params.allocated_amount,
            last_buy_price: params.last_buy_price,
            matrix_price: params.matrix_price,
            holding: params.holding,
            high_water: params.high_water,
            low_water: params.low_water,
            gain: params.gain,
            trail: params.trail,
            buy_armed: false,
            sell_armed: false,
            trail_stop: 0.0,
            deal_count: params.deal_count,
            last_update_time: params.last_update_time,
            cooldown_until: params.cooldown_until,
            proceeds_strategy: params.proceeds_strategy,
            proceeds_ratio: params.proceeds_ratio,
            active: params.active,
        }
    }

    pub fn state(&self) -> AssetState {
        if self.holding {
            AssetState::Holding
        } else {
            AssetState::Watching
        }
    }

    pub fn base(&self) -> &str {
        &self.pair.base
    }

    pub fn buy_trigger(&self) -> f64 {
        self.matrix_price * (1.0 - self.gain)
    }

    pub fn sell_trigger(&self) -> f64 {
        self.matrix_price * (1.0 + self.gain)
    }

    /// The trigger relevant to the current state.
    pub fn trigger(&self) -> f64 {
        if self.holding {
            self.sell_trigger()
        } else {
            self.buy_trigger()
        }
    }

    pub fn is_armed(&self) -> bool {
        self.buy_armed || self.sell_armed
    }

    pub fn disarm(&mut self) {
        self.buy_armed = false;
        self.sell_armed = false;
        self.trail_stop = 0.0;
    }

    /// Start a fresh trailing window at `price` after a position transition.
    pub fn reset_window(&mut self, price: f64) {
        self.matrix_price = price;
        self.high_water = price;
        self.low_water = price;
        self.disarm();
    }

    /// Remaining cooldown, if the asset must still be skipped at `now`.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.cooldown_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Units of base asset held, estimated from the allocation and the buy price.
    pub fn units_held(&self) -> Option<f64> {
        (self.holding && self.last_buy_price > 0.0)
            .then(|| self.allocated_amount / self.last_buy_price)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_params() -> AssetParams {
        AssetParams {
            id: 1,
            name: "btc-1".into(),
            pair: TradingPair::new("BTC", "EUR"),
            allocated_amount: 10.0,
            last_buy_price: 0.0,
            matrix_price: 100.0,
            holding: false,
            high_water: 100.0,
            low_water: 100.0,
            gain: 0.03,
            trail: 0.01,
            deal_count: 0,
            last_update_time: None,
            cooldown_until: None,
            proceeds_strategy: ProceedsStrategy::Eur,
            proceeds_ratio: 0.5,
            active: true,
        }
    }

    #[test]
    fn new_asset_starts_unarmed() {
        let asset = Asset::new(sample_params());
        assert!(!asset.buy_armed && !asset.sell_armed);
        assert_eq!(asset.state(), AssetState::Watching);
    }

    #[test]
    fn triggers_follow_matrix_and_gain() {
        let asset = Asset::new(sample_params());
        assert!((asset.buy_trigger() - 97.0).abs() < 1e-9);
        assert!((asset.sell_trigger() - 103.0).abs() < 1e-9);
    }

    #[test]
    fn proceeds_strategy_parses_case_insensitively() {
        assert_eq!("Split".parse::<ProceedsStrategy>().unwrap(), ProceedsStrategy::Split);
        assert!("hodl".parse::<ProceedsStrategy>().is_err());
    }

    #[test]
    fn cooldown_remaining_only_in_future() {
        let mut asset = Asset::new(sample_params());
        let now = Utc::now();
        asset.cooldown_until = Some(now - chrono::Duration::seconds(5));
        assert!(asset.cooldown_remaining(now).is_none());
        asset.cooldown_until = Some(now + chrono::Duration::seconds(5));
        assert!(asset.cooldown_remaining(now).is_some());
    }
}
