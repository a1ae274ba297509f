use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, error, info, warn};

use common::{
    Asset, AssetView, OperatorCommand, PersistenceStore, ProceedsStrategy, Result, TradingMode,
};
use strategy::AssetFileConfig;

use crate::market::{MarketFeed, PriceRead};
use crate::report;
use crate::signal::{AssetSignalEngine, TickContext, TickOutcome};

/// Insert every seed whose name is not stored yet, then load all assets.
/// Stored rows win over seeds with the same name.
pub async fn seed_assets(
    store: &dyn PersistenceStore,
    seeds: &AssetFileConfig,
    default_strategy: ProceedsStrategy,
    default_ratio: f64,
) -> Result<Vec<Asset>> {
    let existing: HashSet<String> = store
        .load_all_assets()
        .await?
        .into_iter()
        .map(|a| a.name)
        .collect();

    for seed in &seeds.assets {
        if existing.contains(seed.name.trim()) {
            debug!(name = %seed.name, "Seed already stored, keeping stored state");
            continue;
        }
        let asset = store
            .insert_asset(seed.to_params(default_strategy, default_ratio)?)
            .await?;
        info!(asset_id = asset.id, name = %asset.name, pair = %asset.pair, "Seeded new asset");
    }

    store.load_all_assets().await
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pause between two assets within a cycle.
    pub asset_delay: Duration,
    /// Pause between two full cycles.
    pub cycle_interval: Duration,
    pub snapshot_dir: PathBuf,
}

/// Cloneable handle for the console and the dashboard.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<OperatorCommand>,
    snapshot: Arc<RwLock<Vec<AssetView>>>,
}

impl SchedulerHandle {
    /// Queue an operator command. Returns false once the scheduler is gone.
    pub async fn send(&self, cmd: OperatorCommand) -> bool {
        self.command_tx.send(cmd).await.is_ok()
    }

    pub async fn snapshot(&self) -> Vec<AssetView> {
        self.snapshot.read().await.clone()
    }

    pub fn snapshot_handle(&self) -> Arc<RwLock<Vec<AssetView>>> {
        self.snapshot.clone()
    }
}

/// Drives all assets sequentially in a stable order, one cycle after another.
pub struct CycleScheduler {
    engines: Vec<AssetSignalEngine>,
    feed: Arc<MarketFeed>,
    ctx: TickContext,
    config: SchedulerConfig,
    snapshot: Arc<RwLock<Vec<AssetView>>>,
    command_rx: mpsc::Receiver<OperatorCommand>,
    commands_open: bool,
    shutdown: watch::Receiver<bool>,
    shutdown_open: bool,
}

impl CycleScheduler {
    pub fn new(
        mut assets: Vec<Asset>,
        feed: Arc<MarketFeed>,
        ctx: TickContext,
        config: SchedulerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, SchedulerHandle) {
        assets.sort_by_key(|a| a.id);
        let engines: Vec<AssetSignalEngine> =
            assets.into_iter().map(AssetSignalEngine::new).collect();
        let snapshot = Arc::new(RwLock::new(engines.iter().map(|e| e.view()).collect()));
        let (command_tx, command_rx) = mpsc::channel(32);

        let handle = SchedulerHandle {
            command_tx,
            snapshot: snapshot.clone(),
        };
        let scheduler = CycleScheduler {
            engines,
            feed,
            ctx,
            config,
            snapshot,
            command_rx,
            commands_open: true,
            shutdown,
            shutdown_open: true,
        };
        (scheduler, handle)
    }

    pub fn engines(&self) -> &[AssetSignalEngine] {
        &self.engines
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run until shutdown. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!(
            assets = self.engines.len(),
            asset_delay_ms = self.config.asset_delay.as_millis() as u64,
            cycle_interval_s = self.config.cycle_interval.as_secs(),
            "Scheduler starting"
        );
        self.reconcile_all().await;

        let mut cycle: u64 = 0;
        loop {
            cycle += 1;
            debug!(cycle, "Cycle start");
            if !self.run_cycle().await {
                break;
            }
            if self.wait(self.config.cycle_interval).await {
                break;
            }
        }
        info!(cycles = cycle, "Scheduler stopped");
    }

    /// Recompute every active asset's armed state from one fresh sample.
    pub async fn reconcile_all(&mut self) {
        let live = self.ctx.executor.mode() == TradingMode::Live;
        for i in 0..self.engines.len() {
            let engine = &mut self.engines[i];
            let asset = engine.asset();
            self.feed.seed(&asset.pair, asset.matrix_price).await;
            if !asset.active {
                continue;
            }

            let fresh = match self.feed.read(&asset.pair).await {
                PriceRead::Market(q) => Some(if asset.holding { q.bid } else { q.ask }),
                PriceRead::Synthetic(p) if !live => Some(p),
                _ => None,
            };
            let Some(fresh) = fresh else {
                warn!(
                    asset_id = asset.id,
                    pair = %asset.pair,
                    "No genuine sample at startup, asset stays unarmed until its first genuine tick"
                );
                continue;
            };
            if let Err(e) = engine.reconcile(fresh, &self.ctx).await {
                error!(asset_id = engine.asset().id, error = %e, "Reconciliation failed");
            }
            self.snapshot.write().await[i] = engine.view();
        }
    }

    /// One pass over all assets. Returns false when interrupted by shutdown.
    pub async fn run_cycle(&mut self) -> bool {
        let count = self.engines.len();
        for i in 0..count {
            if self.stopping() {
                return false;
            }
            self.drain_commands().await;
            self.tick_asset(i).await;
            if i + 1 < count && self.wait(self.config.asset_delay).await {
                return false;
            }
        }
        true
    }

    async fn tick_asset(&mut self, i: usize) {
        let engine = &mut self.engines[i];
        let asset = engine.asset();
        if !asset.active {
            return;
        }
        if let Some(remaining) = asset.cooldown_remaining(Utc::now()) {
            info!(
                asset_id = asset.id,
                pair = %asset.pair,
                remaining_s = remaining.num_seconds(),
                "In cooldown, skipping"
            );
            return;
        }

        let read = self.feed.read(&asset.pair).await;
        match engine.tick(&read, &self.ctx).await {
            Ok(TickOutcome::NoOp) => {}
            Ok(outcome) => debug!(asset_id = engine.asset().id, ?outcome, "Tick"),
            Err(e) => error!(
                asset_id = engine.asset().id,
                pair = %engine.asset().pair,
                error = %e,
                "Tick failed, state not advanced"
            ),
        }
        self.snapshot.write().await[i] = engine.view();
    }

    /// Sleep for `duration` while serving operator commands. Returns true on shutdown.
    async fn wait(&mut self, duration: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            if self.stopping() {
                return true;
            }
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return self.stopping(),
                changed = self.shutdown.changed(), if self.shutdown_open => {
                    if changed.is_err() {
                        self.shutdown_open = false;
                    }
                }
                cmd = self.command_rx.recv(), if self.commands_open => match cmd {
                    Some(cmd) => self.respond(cmd).await,
                    None => self.commands_open = false,
                },
            }
        }
    }

    async fn drain_commands(&mut self) {
        while let Ok(cmd) = self.command_rx.try_recv() {
            self.respond(cmd).await;
        }
    }

    async fn respond(&self, cmd: OperatorCommand) {
        let text = self.handle_command(cmd).await;
        println!("{text}");
    }

    /// Render a read-only report. Never touches trading state.
    pub async fn handle_command(&self, cmd: OperatorCommand) -> String {
        let views = self.snapshot.read().await.clone();
        match cmd {
            OperatorCommand::Holdings => report::holdings(&views),
            OperatorCommand::Watching => report::watching(&views),
            OperatorCommand::Armed => report::armed(&views),
            OperatorCommand::Base(base) => report::for_base(&views, &base),
            OperatorCommand::Help => report::HELP.to_string(),
            OperatorCommand::Dump => match report::dump_csv(&views, &self.config.snapshot_dir) {
                Ok(path) => {
                    info!(path = %path.display(), "Snapshot written");
                    format!("Snapshot written to {}", path.display())
                }
                Err(e) => {
                    error!(error = %e, "Snapshot failed");
                    format!("Snapshot failed: {e}")
                }
            },
        }
    }
}
