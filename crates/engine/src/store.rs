use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};

use common::{
    Asset, AssetParams, Error, OrderSizing, PersistenceStore, PriceSample, ProceedsDecision,
    ProceedsStrategy, Result, SignalEvent, TradingPair, Transaction,
};

/// `PersistenceStore` backed by sqlite.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and run pending migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        sqlx::migrate!("../../migrations").run(&pool).await?;
        info!(url, "Database ready");
        Ok(Self { pool })
    }

    /// Private in-memory database. A single connection that never expires, since
    /// each sqlite memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("../../migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const ASSET_COLUMNS: &str = "id, name, base, quote, allocated_amount, last_buy_price, \
     matrix_price, holding, high_water, low_water, gain, trail, deal_count, \
     last_update_time, cooldown_until, proceeds_strategy, proceeds_ratio, active";

/// Raw `assets` row.
#[derive(Debug, FromRow)]
struct AssetRow {
    id: i64,
    name: String,
    base: String,
    quote: String,
    allocated_amount: f64,
    last_buy_price: f64,
    matrix_price: f64,
    holding: bool,
    high_water: f64,
    low_water: f64,
    gain: f64,
    trail: f64,
    deal_count: i64,
    last_update_time: Option<String>,
    cooldown_until: Option<String>,
    proceeds_strategy: String,
    proceeds_ratio: f64,
    active: bool,
}

fn parse_time(column: &str, id: i64, value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(&v)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| {
                    Error::Persistence(format!("asset {id}: bad {column} '{v}': {e}"))
                })
        })
        .transpose()
}

impl TryFrom<AssetRow> for Asset {
    type Error = Error;

    fn try_from(row: AssetRow) -> Result<Self> {
        let proceeds_strategy = ProceedsStrategy::from_str(&row.proceeds_strategy)
            .map_err(|e| Error::Persistence(format!("asset {}: {e}", row.id)))?;
        let last_update_time = parse_time("last_update_time", row.id, row.last_update_time)?;
        let cooldown_until = parse_time("cooldown_until", row.id, row.cooldown_until)?;

        Ok(Asset::new(AssetParams {
            id: row.id,
            name: row.name,
            pair: TradingPair::new(row.base, row.quote),
            allocated_amount: row.allocated_amount,
            last_buy_price: row.last_buy_price,
            matrix_price: row.matrix_price,
            holding: row.holding,
            high_water: row.high_water,
            low_water: row.low_water,
            gain: row.gain,
            trail: row.trail,
            deal_count: row.deal_count,
            last_update_time,
            cooldown_until,
            proceeds_strategy,
            proceeds_ratio: row.proceeds_ratio,
            active: row.active,
        }))
    }
}

fn sizing_columns(sizing: &OrderSizing) -> (&'static str, f64) {
    match sizing {
        OrderSizing::Quote(a) => ("quote", *a),
        OrderSizing::Base(a) => ("base", *a),
    }
}

#[async_trait]
impl PersistenceStore for SqliteStore {
    async fn insert_asset(&self, params: AssetParams) -> Result<Asset> {
        let id = sqlx::query(
            r#"
            INSERT INTO assets (
                name, base, quote, allocated_amount, last_buy_price, matrix_price,
                holding, high_water, low_water, gain, trail, deal_count,
                last_update_time, cooldown_until, proceeds_strategy, proceeds_ratio, active
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(&params.name)
        .bind(&params.pair.base)
        .bind(&params.pair.quote)
        .bind(params.allocated_amount)
        .bind(params.last_buy_price)
        .bind(params.matrix_price)
        .bind(params.holding)
        .bind(params.high_water)
        .bind(params.low_water)
        .bind(params.gain)
        .bind(params.trail)
        .bind(params.deal_count)
        .bind(params.last_update_time.map(|t| t.to_rfc3339()))
        .bind(params.cooldown_until.map(|t| t.to_rfc3339()))
        .bind(params.proceeds_strategy.to_string())
        .bind(params.proceeds_ratio)
        .bind(params.active)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        debug!(asset_id = id, name = %params.name, "Inserted asset");
        Ok(Asset::new(AssetParams { id, ..params }))
    }

    async fn save_asset(&self, asset: &Asset) -> Result<()> {
        let rows = sqlx::query(
            r#"
            UPDATE assets SET
                allocated_amount = ?1, last_buy_price = ?2, matrix_price = ?3, holding = ?4,
                high_water = ?5, low_water = ?6, gain = ?7, trail = ?8, deal_count = ?9,
                last_update_time = ?10, cooldown_until = ?11, proceeds_strategy = ?12,
                proceeds_ratio = ?13, active = ?14
            WHERE id = ?15
            "#,
        )
        .bind(asset.allocated_amount)
        .bind(asset.last_buy_price)
        .bind(asset.matrix_price)
        .bind(asset.holding)
        .bind(asset.high_water)
        .bind(asset.low_water)
        .bind(asset.gain)
        .bind(asset.trail)
        .bind(asset.deal_count)
        .bind(asset.last_update_time.map(|t| t.to_rfc3339()))
        .bind(asset.cooldown_until.map(|t| t.to_rfc3339()))
        .bind(asset.proceeds_strategy.to_string())
        .bind(asset.proceeds_ratio)
        .bind(asset.active)
        .bind(asset.id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(Error::Persistence(format!("asset {} does not exist", asset.id)));
        }
        Ok(())
    }

    async fn load_all_assets(&self) -> Result<Vec<Asset>> {
        let rows: Vec<AssetRow> =
            sqlx::query_as(&format!("SELECT {ASSET_COLUMNS} FROM assets ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Asset::try_from).collect()
    }

    async fn assets_holding(&self, base: &str) -> Result<Vec<Asset>> {
        let rows: Vec<AssetRow> = sqlx::query_as(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets \
             WHERE base = ?1 AND holding = 1 AND active = 1 ORDER BY id"
        ))
        .bind(base)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Asset::try_from).collect()
    }

    async fn append_transaction(&self, tx: &Transaction) -> Result<i64> {
        let (sizing, requested) = sizing_columns(&tx.sizing);
        let id = sqlx::query(
            r#"
            INSERT INTO transactions (
                asset_id, side, sizing, requested_amount, price, filled_amount, fee,
                mode, status, order_id, error, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(tx.asset_id)
        .bind(tx.side.to_string())
        .bind(sizing)
        .bind(requested)
        .bind(tx.price)
        .bind(tx.filled_amount)
        .bind(tx.fee)
        .bind(tx.mode.to_string())
        .bind(tx.status.to_string())
        .bind(&tx.order_id)
        .bind(&tx.error)
        .bind(tx.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    async fn append_price_sample(&self, sample: &PriceSample) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO price_samples (asset_id, price, bid, ask, synthetic, sampled_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(sample.asset_id)
        .bind(sample.price)
        .bind(sample.bid)
        .bind(sample.ask)
        .bind(sample.synthetic)
        .bind(sample.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_signal_event(&self, event: &SignalEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO signal_events (asset_id, side, price, trigger_price, trail_stop, mode, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(event.asset_id)
        .bind(event.side.to_string())
        .bind(event.price)
        .bind(event.trigger)
        .bind(event.trail_stop)
        .bind(event.mode.to_string())
        .bind(event.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_proceeds_decision(&self, d: &ProceedsDecision) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO proceeds_decisions (
                asset_id, strategy, ratio, sell_amount, original_amount, profit, profit_pct,
                new_buy_amount, retained_amount, reinvestment_success,
                sell_transaction_id, buy_transaction_id, error, mode, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(d.asset_id)
        .bind(d.strategy.to_string())
        .bind(d.ratio)
        .bind(d.sell_amount)
        .bind(d.original_amount)
        .bind(d.profit)
        .bind(d.profit_pct)
        .bind(d.new_buy_amount)
        .bind(d.retained_amount)
        .bind(d.reinvestment_success)
        .bind(d.sell_transaction_id)
        .bind(d.buy_transaction_id)
        .bind(&d.error)
        .bind(d.mode.to_string())
        .bind(d.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderSide, TradingMode, TransactionStatus};
    use sqlx::Row;

    fn params(name: &str, base: &str) -> AssetParams {
        AssetParams {
            id: 0,
            name: name.into(),
            pair: TradingPair::new(base, "EUR"),
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
            proceeds_strategy: ProceedsStrategy::Split,
            proceeds_ratio: 0.25,
            active: true,
        }
    }

    #[tokio::test]
    async fn asset_round_trips_through_sqlite() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut asset = store.insert_asset(params("btc-1", "BTC")).await.unwrap();
        assert!(asset.id > 0);

        asset.holding = true;
        asset.last_buy_price = 98.0;
        asset.reset_window(98.0);
        asset.deal_count = 1;
        asset.last_update_time = Some(Utc::now());
        asset.sell_armed = true;
        store.save_asset(&asset).await.unwrap();

        let loaded = store.load_all_assets().await.unwrap();
        assert_eq!(loaded.len(), 1);
        let got = &loaded[0];
        assert!(got.holding);
        assert_eq!(got.matrix_price, 98.0);
        assert_eq!(got.proceeds_strategy, ProceedsStrategy::Split);
        assert_eq!(got.last_update_time.map(|t| t.timestamp()), asset.last_update_time.map(|t| t.timestamp()));
        // Armed flags are derived and never loaded.
        assert!(!got.sell_armed);
    }

    #[tokio::test]
    async fn names_are_unique() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_asset(params("btc-1", "BTC")).await.unwrap();
        assert!(store.insert_asset(params("btc-1", "BTC")).await.is_err());
    }

    #[tokio::test]
    async fn saving_unknown_asset_is_a_persistence_error() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut ghost = Asset::new(params("ghost", "BTC"));
        ghost.id = 42;
        let err = store.save_asset(&ghost).await.unwrap_err();
        assert!(err.is_persistence());
    }

    #[tokio::test]
    async fn holding_query_filters_by_base_and_state() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut a = store.insert_asset(params("btc-1", "BTC")).await.unwrap();
        let mut b = store.insert_asset(params("btc-2", "BTC")).await.unwrap();
        let mut c = store.insert_asset(params("eth-1", "ETH")).await.unwrap();
        for asset in [&mut a, &mut b, &mut c] {
            asset.holding = true;
        }
        b.active = false;
        for asset in [&a, &b, &c] {
            store.save_asset(asset).await.unwrap();
        }

        let held = store.assets_holding("BTC").await.unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].name, "btc-1");
    }

    #[tokio::test]
    async fn unknown_strategy_in_row_is_rejected() {
        let store = SqliteStore::in_memory().await.unwrap();
        let asset = store.insert_asset(params("btc-1", "BTC")).await.unwrap();
        sqlx::query("UPDATE assets SET proceeds_strategy = 'hodl' WHERE id = ?1")
            .bind(asset.id)
            .execute(store.pool())
            .await
            .unwrap();
        let err = store.load_all_assets().await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[tokio::test]
    async fn transactions_are_appended_with_ids() {
        let store = SqliteStore::in_memory().await.unwrap();
        let asset = store.insert_asset(params("btc-1", "BTC")).await.unwrap();
        let tx = Transaction {
            asset_id: asset.id,
            side: OrderSide::Buy,
            sizing: OrderSizing::Quote(10.0),
            price: 100.0,
            filled_amount: 0.1,
            fee: 0.025,
            mode: TradingMode::Test,
            status: TransactionStatus::Test,
            order_id: Some("o-1".into()),
            error: None,
            timestamp: Utc::now(),
        };
        let first = store.append_transaction(&tx).await.unwrap();
        let second = store.append_transaction(&tx).await.unwrap();
        assert!(second > first);

        let row = sqlx::query("SELECT sizing, status FROM transactions WHERE id = ?1")
            .bind(first)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("sizing"), "quote");
        assert_eq!(row.get::<String, _>("status"), "test");
    }
}
