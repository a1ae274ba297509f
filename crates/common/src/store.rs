use async_trait::async_trait;

use crate::{Asset, AssetParams, PriceSample, ProceedsDecision, Result, SignalEvent, Transaction};

/// Durable storage the engine depends on.
///
/// The asset record is authoritative for `holding` and `matrix_price`. The four
/// log tables are append-only and never read back to re-derive trading state.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Insert a seeded asset and return it with its assigned id.
    async fn insert_asset(&self, params: AssetParams) -> Result<Asset>;

    /// Overwrite the stored record of `asset`.
    async fn save_asset(&self, asset: &Asset) -> Result<()>;

    /// All assets, active or not, ordered by id.
    async fn load_all_assets(&self) -> Result<Vec<Asset>>;

    /// Active assets of `base` that are currently holding.
    async fn assets_holding(&self, base: &str) -> Result<Vec<Asset>>;

    /// Returns the id of the new log row.
    async fn append_transaction(&self, tx: &Transaction) -> Result<i64>;

    async fn append_price_sample(&self, sample: &PriceSample) -> Result<()>;

    async fn append_signal_event(&self, event: &SignalEvent) -> Result<()>;

    async fn append_proceeds_decision(&self, decision: &ProceedsDecision) -> Result<()>;
}
