pub mod config;
pub mod proceeds;
pub mod trailing;

pub use config::{AssetFileConfig, AssetSeed};
pub use proceeds::{calculate, plan_sell, round_base, round_quote, ProceedsOutcome, SellPlan};
pub use trailing::{observe, reconcile, Observation, Reconciliation};
