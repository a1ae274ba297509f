use serde::{Deserialize, Serialize};
use tracing::info;

use common::{AssetParams, Error, ProceedsStrategy, Result, TradingPair};

/// Asset seed file (TOML).
///
/// Example `config/assets.toml`:
/// ```toml
/// [[asset]]
/// name = "btc-main"
/// base = "BTC"
/// quote = "EUR"
/// allocated_amount = 10.0
/// matrix_price = 60000.0
/// gain = 0.03
/// trail = 0.01
/// proceeds_strategy = "split"
/// proceeds_ratio = 0.5
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetFileConfig {
    #[serde(rename = "asset", default)]
    pub assets: Vec<AssetSeed>,
}

/// One `[[asset]]` entry. Only inserted when no stored asset carries the same `name`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetSeed {
    /// Unique key matched against stored rows.
    pub name: String,
    pub base: String,
    pub quote: String,
    pub allocated_amount: f64,
    pub matrix_price: f64,
    pub gain: f64,
    pub trail: f64,
    #[serde(default)]
    pub proceeds_strategy: Option<ProceedsStrategy>,
    #[serde(default)]
    pub proceeds_ratio: Option<f64>,
    #[serde(default)]
    pub holding: bool,
    #[serde(default)]
    pub last_buy_price: f64,
}

impl AssetFileConfig {
    /// Load from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read asset config at '{path}': {e}"))
        })?;
        let cfg = Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse asset config at '{path}': {e}")))?;
        info!(path, count = cfg.assets.len(), "Loaded asset seeds");
        Ok(cfg)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let cfg: AssetFileConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;

        let mut names = std::collections::HashSet::new();
        for seed in &cfg.assets {
            if !names.insert(seed.name.as_str()) {
                return Err(Error::Config(format!("duplicate asset name '{}'", seed.name)));
            }
        }
        Ok(cfg)
    }
}

impl AssetSeed {
    /// Validate the seed and normalise it into asset parameters.
    /// Seeds without their own proceeds settings take the given defaults.
    pub fn to_params(
        &self,
        default_strategy: ProceedsStrategy,
        default_ratio: f64,
    ) -> Result<AssetParams> {
        let invalid = |what: &str| Error::Config(format!("asset '{}': {what}", self.name));

        if self.name.trim().is_empty() {
            return Err(Error::Config("asset name must not be empty".into()));
        }
        if !(self.allocated_amount > 0.0) {
            return Err(invalid("allocated_amount must be positive"));
        }
        if !(self.matrix_price > 0.0) {
            return Err(invalid("matrix_price must be positive"));
        }
        if !(self.gain > 0.0 && self.gain < 1.0) {
            return Err(invalid("gain must lie in (0, 1)"));
        }
        if !(self.trail > 0.0 && self.trail < 1.0) {
            return Err(invalid("trail must lie in (0, 1)"));
        }
        let ratio = self.proceeds_ratio.unwrap_or(default_ratio);
        if !(0.0..=1.0).contains(&ratio) {
            return Err(invalid("proceeds_ratio must lie in [0, 1]"));
        }
        if self.holding && !(self.last_buy_price > 0.0) {
            return Err(invalid("a holding seed needs last_buy_price"));
        }

        Ok(AssetParams {
            id: 0,
            name: self.name.trim().to_string(),
            pair: TradingPair::new(&self.base, &self.quote),
            allocated_amount: self.allocated_amount,
            last_buy_price: if self.holding { self.last_buy_price } else { 0.0 },
            matrix_price: self.matrix_price,
            holding: self.holding,
            high_water: self.matrix_price,
            low_water: self.matrix_price,
            gain: self.gain,
            trail: self.trail,
            deal_count: 0,
            last_update_time: None,
            cooldown_until: None,
            proceeds_strategy: self.proceeds_strategy.unwrap_or(default_strategy),
            proceeds_ratio: ratio,
            active: true,
        })
    }
}
