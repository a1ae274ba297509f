use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, MarketDataPort, OrderPort, PersistenceStore, TradingMode};
use engine::{
    seed_assets, spawn_console, BitvavoClient, BitvavoPublic, CycleScheduler, MarketFeed,
    OrderExecutor, SchedulerConfig, SqliteStore, TickContext, TradeSettings,
};
use paper::{PaperClient, SyntheticFeed};
use strategy::AssetFileConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };
    info!(mode = %cfg.trading_mode, "TrailBot starting");

    // ── Database ──────────────────────────────────────────────────────────────
    let store = SqliteStore::connect(&cfg.database_url)
        .await
        .context("failed to open the asset store")?;

    let seeds = AssetFileConfig::load(&cfg.asset_config_path)?;
    let assets = seed_assets(
        &store,
        &seeds,
        cfg.default_proceeds_strategy,
        cfg.default_proceeds_ratio,
    )
    .await?;
    info!(
        assets = assets.len(),
        active = assets.iter().filter(|a| a.active).count(),
        holding = assets.iter().filter(|a| a.holding).count(),
        "Assets loaded"
    );

    // ── Exchange ports (injected based on TRADING_MODE) ───────────────────────
    let public: Arc<dyn MarketDataPort> = Arc::new(BitvavoPublic::new(cfg.market_timeout)?);
    let (primary, fallback, orders): (
        Arc<dyn MarketDataPort>,
        Option<Arc<dyn MarketDataPort>>,
        Arc<dyn OrderPort>,
    ) = match (&cfg.trading_mode, &cfg.credentials) {
        (TradingMode::Live, Some(creds)) => {
            info!("Live trading mode, orders go to Bitvavo");
            let client = Arc::new(BitvavoClient::new(
                creds.api_key.clone(),
                creds.api_secret.clone(),
                &creds.operator_id,
                cfg.market_timeout,
            )?);
            (client.clone() as Arc<dyn MarketDataPort>, Some(public), client as Arc<dyn OrderPort>)
        }
        (TradingMode::Live, None) => anyhow::bail!("live trading requires Bitvavo credentials"),
        (TradingMode::Test, _) => {
            info!(
                slippage_bps = cfg.paper_slippage_bps,
                fee_bps = cfg.paper_fee_bps,
                "Test mode, orders are simulated"
            );
            let paper = Arc::new(PaperClient::new(cfg.paper_slippage_bps, cfg.paper_fee_bps));
            (public, None, paper as Arc<dyn OrderPort>)
        }
    };

    let mut feed = MarketFeed::new(primary, cfg.market_timeout);
    if let Some(fallback) = fallback {
        feed = feed.with_fallback(fallback);
    }
    if cfg.synthetic_fallback {
        warn!(max_step = cfg.synthetic_max_step, "Synthetic price fallback enabled");
        feed = feed.with_synthetic(SyntheticFeed::new(cfg.synthetic_max_step));
    }

    // ── Engine ────────────────────────────────────────────────────────────────
    let feed = Arc::new(feed);
    let store: Arc<dyn PersistenceStore> = Arc::new(store);
    let ctx = TickContext {
        store: store.clone(),
        executor: OrderExecutor::new(orders, store),
        settings: TradeSettings {
            cooldown: chrono::Duration::from_std(cfg.cooldown)?,
            eur_deactivate: cfg.eur_deactivate,
        },
        feed: Some(feed.clone()),
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (scheduler, handle) = CycleScheduler::new(
        assets,
        feed,
        ctx,
        SchedulerConfig {
            asset_delay: cfg.asset_delay,
            cycle_interval: cfg.cycle_interval,
            snapshot_dir: PathBuf::from(&cfg.snapshot_dir),
        },
        shutdown_rx.clone(),
    );

    // ── Dashboard API ─────────────────────────────────────────────────────────
    if let (Some(port), Some(token)) = (cfg.dashboard_port, cfg.dashboard_token.clone()) {
        let state = api::AppState {
            snapshot: handle.snapshot_handle(),
            trading_mode: cfg.trading_mode,
            dashboard_token: token,
        };
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = api::serve(state, port, shutdown).await {
                error!(error = %e, "Dashboard API failed");
            }
        });
    }

    // ── Spawn all tasks ───────────────────────────────────────────────────────
    let mut engine_task = tokio::spawn(scheduler.run());
    spawn_console(handle);

    info!("All subsystems started. Waiting for shutdown signal.");
    let interrupted = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for ctrl-c")?;
            true
        }
        res = &mut engine_task => {
            if let Err(e) = res {
                error!(error = %e, "Scheduler task panicked");
            }
            false
        }
    };
    if interrupted {
        info!("Shutdown signal received, finishing the current tick");
        let _ = shutdown_tx.send(true);
        if let Err(e) = engine_task.await {
            error!(error = %e, "Scheduler task panicked");
        }
    }
    info!("TrailBot stopped");
    Ok(())
}
