use std::str::FromStr;
use std::time::Duration;

use crate::{Error, ProceedsStrategy, Result, TradingMode};

/// Bitvavo API credentials. Only present in live mode.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub operator_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"***")
            .field("api_secret", &"***")
            .field("operator_id", &self.operator_id)
            .finish()
    }
}

/// All configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub trading_mode: TradingMode,
    pub credentials: Option<Credentials>,

    // Storage
    pub database_url: String,
    pub asset_config_path: String,
    pub snapshot_dir: String,

    // Proceeds defaults for seeds that do not set their own
    pub default_proceeds_strategy: ProceedsStrategy,
    pub default_proceeds_ratio: f64,
    pub eur_deactivate: bool,

    // Scheduling
    pub asset_delay: Duration,
    pub cycle_interval: Duration,
    pub cooldown: Duration,

    // Market data
    pub market_timeout: Duration,
    pub synthetic_fallback: bool,
    pub synthetic_max_step: f64,

    // Paper trading
    pub paper_slippage_bps: f64,
    pub paper_fee_bps: f64,

    // Dashboard, disabled unless a port is set
    pub dashboard_port: Option<u16>,
    pub dashboard_token: Option<String>,
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let trading_mode = match get("TRADING_MODE")
            .unwrap_or_else(|| "test".into())
            .to_lowercase()
            .as_str()
        {
            "test" | "paper" => TradingMode::Test,
            "live" => TradingMode::Live,
            other => {
                return Err(Error::Config(format!(
                    "TRADING_MODE must be 'test' or 'live', got: '{other}'"
                )))
            }
        };

        let credentials = match trading_mode {
            TradingMode::Live => {
                let required = |key: &str| {
                    get(key).ok_or_else(|| {
                        Error::Config(format!(
                            "Required environment variable '{key}' is not set (needed in live mode)"
                        ))
                    })
                };
                Some(Credentials {
                    api_key: required("BITVAVO_API_KEY")?,
                    api_secret: required("BITVAVO_API_SECRET")?,
                    operator_id: required("BITVAVO_OPERATOR_ID")?,
                })
            }
            TradingMode::Test => None,
        };

        let default_proceeds_strategy = get("DEFAULT_PROCEEDS_STRATEGY")
            .map(|v| ProceedsStrategy::from_str(&v))
            .transpose()?
            .unwrap_or_default();

        let default_proceeds_ratio: f64 = parse_or(&get, "DEFAULT_PROCEEDS_RATIO", 0.5)?;
        if !(0.0..=1.0).contains(&default_proceeds_ratio) {
            return Err(Error::Config(format!(
                "DEFAULT_PROCEEDS_RATIO must lie in [0, 1], got: {default_proceeds_ratio}"
            )));
        }

        let synthetic_max_step: f64 = parse_or(&get, "SYNTHETIC_MAX_STEP", 0.005)?;
        if !(synthetic_max_step > 0.0 && synthetic_max_step < 1.0) {
            return Err(Error::Config(format!(
                "SYNTHETIC_MAX_STEP must lie in (0, 1), got: {synthetic_max_step}"
            )));
        }

        let synthetic_fallback = match get("SYNTHETIC_FALLBACK") {
            Some(v) => parse_bool("SYNTHETIC_FALLBACK", &v)?,
            None => trading_mode == TradingMode::Test,
        };

        let eur_deactivate = match get("EUR_DEACTIVATE") {
            Some(v) => parse_bool("EUR_DEACTIVATE", &v)?,
            None => true,
        };

        let dashboard_port: Option<u16> = get("DASHBOARD_PORT")
            .map(|v| {
                v.parse()
                    .map_err(|_| Error::Config(format!("DASHBOARD_PORT is not a port: '{v}'")))
            })
            .transpose()?;
        let dashboard_token = get("DASHBOARD_TOKEN");
        if dashboard_port.is_some() && dashboard_token.is_none() {
            return Err(Error::Config(
                "DASHBOARD_TOKEN must be set when DASHBOARD_PORT enables the dashboard".into(),
            ));
        }

        Ok(Config {
            trading_mode,
            credentials,
            database_url: get("DATABASE_URL").unwrap_or_else(|| "sqlite://trailbot.db".into()),
            asset_config_path: get("ASSET_CONFIG_PATH")
                .unwrap_or_else(|| "config/assets.toml".into()),
            snapshot_dir: get("SNAPSHOT_DIR").unwrap_or_else(|| "snapshots".into()),
            default_proceeds_strategy,
            default_proceeds_ratio,
            eur_deactivate,
            asset_delay: Duration::from_millis(parse_or(&get, "ASSET_DELAY_MS", 200)?),
            cycle_interval: Duration::from_secs(parse_or(&get, "CYCLE_INTERVAL_SECS", 5)?),
            cooldown: Duration::from_secs(parse_or(&get, "COOLDOWN_SECS", 0)?),
            market_timeout: Duration::from_secs(parse_or(&get, "MARKET_TIMEOUT_SECS", 10)?),
            synthetic_fallback,
            synthetic_max_step,
            paper_slippage_bps: parse_or(&get, "PAPER_SLIPPAGE_BPS", 10.0)?,
            paper_fee_bps: parse_or(&get, "PAPER_FEE_BPS", 25.0)?,
            dashboard_port,
            dashboard_token,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: '{v}'"))),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!(
            "{key} must be a boolean, got: '{other}'"
        ))),
    }
}
