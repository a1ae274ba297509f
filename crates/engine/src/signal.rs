use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use common::{
    Asset, AssetView, Error, Fill, Order, OrderSide, OrderSizing, PersistenceStore, PriceSample,
    ProceedsDecision, ProceedsStrategy, Result, SignalEvent, TradingMode,
};
use risk::{check_exposure, GuardDecision};
use strategy::{calculate, observe, plan_sell, reconcile, round_quote, Observation, Reconciliation};

use crate::executor::OrderExecutor;
use crate::market::{MarketFeed, PriceRead};

/// Trading behaviour shared by all assets.
#[derive(Debug, Clone)]
pub struct TradeSettings {
    /// Skip window applied after every executed transition. Zero disables it.
    pub cooldown: chrono::Duration,
    /// Deactivate `eur` assets after a completed sell.
    pub eur_deactivate: bool,
}

impl Default for TradeSettings {
    fn default() -> Self {
        Self {
            cooldown: chrono::Duration::zero(),
            eur_deactivate: true,
        }
    }
}

/// Collaborators a tick needs. Owned by the scheduler and lent to each engine.
#[derive(Clone)]
pub struct TickContext {
    pub store: Arc<dyn PersistenceStore>,
    pub executor: OrderExecutor,
    pub settings: TradeSettings,
    /// Source of the fresh ask read before a reinvestment buy.
    /// Without one the sell fill price stands in for it.
    pub feed: Option<Arc<MarketFeed>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Inactive,
    MarketUnavailable(String),
    /// Another position of the same base is open and the market is above its matrix price.
    RisingMarket { lowest_matrix: f64 },
    /// Synthetic sample while orders are live. Never observed.
    SyntheticSample,
    /// Waiting for a genuine sample to reconcile the restored state.
    AwaitingReconciliation,
    InvalidSample,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    NoOp,
    NewExtremum(f64),
    Reconciled(Reconciliation),
    SignalArmed { side: OrderSide, trail_stop: f64 },
    OrderExecuted { side: OrderSide, fill_price: f64, reinvested: Option<bool> },
    OrderFailed { side: OrderSide, error: String },
}

/// Trailing state machine for one tracked asset.
///
/// Every mutation happens on a copy that is persisted first and committed in memory
/// only after the write succeeded, so memory never runs ahead of disk.
pub struct AssetSignalEngine {
    asset: Asset,
    /// False until restart reconciliation ran against a usable sample.
    reconciled: bool,
    last_price: Option<f64>,
}

impl AssetSignalEngine {
    pub fn new(asset: Asset) -> Self {
        Self {
            asset,
            reconciled: false,
            last_price: None,
        }
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn is_reconciled(&self) -> bool {
        self.reconciled
    }

    pub fn view(&self) -> AssetView {
        AssetView {
            asset: self.asset.clone(),
            last_price: self.last_price,
        }
    }

    async fn commit(&mut self, next: Asset, ctx: &TickContext) -> Result<()> {
        ctx.store.save_asset(&next).await?;
        self.asset = next;
        Ok(())
    }

    fn stamp(asset: &mut Asset, now: DateTime<Utc>, settings: &TradeSettings) {
        asset.last_update_time = Some(now);
        if settings.cooldown > chrono::Duration::zero() {
            asset.cooldown_until = Some(now + settings.cooldown);
        }
    }

    fn apply_buy(asset: &mut Asset, fill: &Fill) {
        asset.holding = true;
        asset.last_buy_price = fill.fill_price;
        asset.reset_window(fill.fill_price);
        asset.deal_count += 1;
    }

    /// Choose the side of the book the current state watches.
    fn sample_of(&self, read: &PriceRead) -> Option<(f64, Option<f64>, Option<f64>, bool)> {
        match read {
            PriceRead::Market(q) => {
                let sample = if self.asset.holding { q.bid } else { q.ask };
                Some((sample, Some(q.bid), Some(q.ask), false))
            }
            PriceRead::Synthetic(p) => Some((*p, None, None, true)),
            PriceRead::Unavailable(_) => None,
        }
    }

    /// Restart reconciliation against one fresh sample.
    pub async fn reconcile(&mut self, fresh: f64, ctx: &TickContext) -> Result<Reconciliation> {
        let mut next = self.asset.clone();
        let result = reconcile(&mut next, fresh);

        if next.low_water != self.asset.low_water || next.high_water != self.asset.high_water {
            next.last_update_time = Some(Utc::now());
            ctx.store.save_asset(&next).await?;
        }
        self.asset = next;
        self.reconciled = result != Reconciliation::Skipped;

        match result {
            Reconciliation::Reset { stale_extremum, extremum } => warn!(
                asset_id = self.asset.id,
                pair = %self.asset.pair,
                stale_extremum,
                extremum,
                fresh,
                "Stale trailing extremum reset on restart"
            ),
            Reconciliation::Armed { trail_stop } => info!(
                asset_id = self.asset.id,
                pair = %self.asset.pair,
                state = %self.asset.state(),
                trail_stop,
                "Signal re-armed on restart"
            ),
            Reconciliation::Unarmed => debug!(asset_id = self.asset.id, "Reconciled unarmed"),
            Reconciliation::Skipped => {}
        }
        Ok(result)
    }

    /// Consume one market read. Persistence errors abort the tick without advancing
    /// in-memory state; order failures are reported in the outcome.
    pub async fn tick(&mut self, read: &PriceRead, ctx: &TickContext) -> Result<TickOutcome> {
        if !self.asset.active {
            return Ok(TickOutcome::Skipped(SkipReason::Inactive));
        }
        let Some((sample, bid, ask, synthetic)) = self.sample_of(read) else {
            let reason = match read {
                PriceRead::Unavailable(r) => r.clone(),
                _ => String::new(),
            };
            warn!(asset_id = self.asset.id, pair = %self.asset.pair, %reason, "No market data, skipping tick");
            return Ok(TickOutcome::Skipped(SkipReason::MarketUnavailable(reason)));
        };
        if !(sample.is_finite() && sample > 0.0) {
            return Ok(TickOutcome::Skipped(SkipReason::InvalidSample));
        }
        self.last_price = Some(sample);

        let now = Utc::now();
        let record = PriceSample {
            asset_id: self.asset.id,
            price: sample,
            bid,
            ask,
            synthetic,
            timestamp: now,
        };
        if let Err(e) = ctx.store.append_price_sample(&record).await {
            warn!(asset_id = self.asset.id, error = %e, "Failed to log price sample");
        }

        let live = ctx.executor.mode() == TradingMode::Live;
        if !self.reconciled {
            if synthetic && live {
                return Ok(TickOutcome::Skipped(SkipReason::AwaitingReconciliation));
            }
            let result = self.reconcile(sample, ctx).await?;
            return Ok(TickOutcome::Reconciled(result));
        }
        if synthetic && live {
            // A synthetic sample may neither move the extremum nor arm a live signal.
            debug!(
                asset_id = self.asset.id,
                pair = %self.asset.pair,
                price = sample,
                "Synthetic sample ignored while orders are live"
            );
            return Ok(TickOutcome::Skipped(SkipReason::SyntheticSample));
        }

        if !self.asset.holding {
            let held = ctx.store.assets_holding(self.asset.base()).await?;
            if let GuardDecision::SkipRisingMarket { lowest_matrix, held } =
                check_exposure(&self.asset, sample, &held)
            {
                info!(
                    asset_id = self.asset.id,
                    pair = %self.asset.pair,
                    ask = sample,
                    lowest_matrix,
                    held,
                    "Buy check skipped: market above open position"
                );
                return Ok(TickOutcome::Skipped(SkipReason::RisingMarket { lowest_matrix }));
            }
        }

        let mut next = self.asset.clone();
        match observe(&mut next, sample) {
            Observation::Ignored => Ok(TickOutcome::Skipped(SkipReason::InvalidSample)),
            Observation::Unchanged => Ok(TickOutcome::NoOp),
            Observation::NewExtremum { extremum } => {
                next.last_update_time = Some(now);
                self.commit(next, ctx).await?;
                debug!(asset_id = self.asset.id, pair = %self.asset.pair, extremum, "New trailing extremum");
                Ok(TickOutcome::NewExtremum(extremum))
            }
            Observation::Armed { side, trail_stop } => {
                next.last_update_time = Some(now);
                let trigger = next.trigger();
                self.commit(next, ctx).await?;
                info!(
                    asset_id = self.asset.id,
                    pair = %self.asset.pair,
                    %side,
                    price = sample,
                    trigger,
                    trail_stop,
                    "Signal armed"
                );
                let event = SignalEvent {
                    asset_id: self.asset.id,
                    side,
                    price: sample,
                    trigger,
                    trail_stop,
                    mode: ctx.executor.mode(),
                    timestamp: now,
                };
                if let Err(e) = ctx.store.append_signal_event(&event).await {
                    warn!(asset_id = self.asset.id, error = %e, "Failed to log signal event");
                }
                Ok(TickOutcome::SignalArmed { side, trail_stop })
            }
            Observation::Fire { side, trail_stop } => {
                // Only the trail stop can differ from the committed state here.
                self.asset = next;
                info!(asset_id = self.asset.id, pair = %self.asset.pair, %side, price = sample, trail_stop, "Trailing trigger crossed");
                match side {
                    OrderSide::Buy => self.execute_buy(sample, ctx).await,
                    OrderSide::Sell => self.execute_sell(sample, ctx).await,
                }
            }
        }
    }

    /// Ask for the reinvestment buy. Synthetic prices are refused while orders are live.
    async fn fresh_ask(&self, fill_price: f64, ctx: &TickContext) -> Result<f64> {
        let Some(feed) = &ctx.feed else {
            return Ok(fill_price);
        };
        let pair = &self.asset.pair;
        match feed.read(pair).await {
            PriceRead::Market(q) => Ok(q.ask),
            PriceRead::Synthetic(p) if ctx.executor.mode() != TradingMode::Live => Ok(p),
            PriceRead::Synthetic(_) => Err(Error::MarketDataUnavailable {
                pair: pair.to_string(),
                reason: "only a synthetic ask is available".into(),
            }),
            PriceRead::Unavailable(reason) => Err(Error::MarketDataUnavailable {
                pair: pair.to_string(),
                reason,
            }),
        }
    }

    async fn execute_buy(&mut self, ask: f64, ctx: &TickContext) -> Result<TickOutcome> {
        let order = Order::market(
            self.asset.pair.clone(),
            OrderSide::Buy,
            OrderSizing::Quote(round_quote(self.asset.allocated_amount)),
            ask,
        );
        let exec = ctx.executor.execute(self.asset.id, &order).await;
        let fill = match exec.outcome {
            Ok(fill) => fill,
            Err(e) => {
                warn!(asset_id = self.asset.id, error = %e, "Buy failed, signal stays armed");
                return Ok(TickOutcome::OrderFailed {
                    side: OrderSide::Buy,
                    error: e.to_string(),
                });
            }
        };

        let mut next = self.asset.clone();
        Self::apply_buy(&mut next, &fill);
        Self::stamp(&mut next, Utc::now(), &ctx.settings);
        if let Err(e) = self.commit(next, ctx).await {
            error!(asset_id = self.asset.id, order_id = %fill.order_id, error = %e, "Buy filled but asset state could not be persisted");
            return Err(e);
        }

        info!(
            asset_id = self.asset.id,
            pair = %self.asset.pair,
            price = fill.fill_price,
            amount = fill.filled_amount,
            deals = self.asset.deal_count,
            "Bought, now holding"
        );
        Ok(TickOutcome::OrderExecuted {
            side: OrderSide::Buy,
            fill_price: fill.fill_price,
            reinvested: None,
        })
    }

    async fn execute_sell(&mut self, bid: f64, ctx: &TickContext) -> Result<TickOutcome> {
        let plan = plan_sell(&self.asset, bid);
        info!(
            asset_id = self.asset.id,
            pair = %self.asset.pair,
            strategy = %self.asset.proceeds_strategy,
            sizing = %plan.sizing,
            expected_proceeds = plan.expected_proceeds,
            profit = plan.profit,
            leftover_value = plan.leftover_value,
            "Sell planned"
        );

        let order = Order::market(self.asset.pair.clone(), OrderSide::Sell, plan.sizing, bid);
        let exec = ctx.executor.execute(self.asset.id, &order).await;
        let sell_tx = exec.transaction_id;
        let fill = match exec.outcome {
            Ok(fill) => fill,
            Err(e) => {
                warn!(asset_id = self.asset.id, error = %e, "Sell failed, signal stays armed");
                return Ok(TickOutcome::OrderFailed {
                    side: OrderSide::Sell,
                    error: e.to_string(),
                });
            }
        };

        let original = self.asset.allocated_amount;
        let strategy = self.asset.proceeds_strategy;
        let ratio = self.asset.proceeds_ratio;
        let outcome = calculate(fill.quote_value(), original, strategy, ratio);

        // The sale itself: back to watching from the fill price.
        let mut sold = self.asset.clone();
        sold.holding = false;
        sold.last_buy_price = 0.0;
        sold.reset_window(fill.fill_price);
        Self::stamp(&mut sold, Utc::now(), &ctx.settings);
        let reinvest_amount = round_quote(outcome.new_buy_amount);
        if strategy == ProceedsStrategy::Eur && ctx.settings.eur_deactivate {
            sold.active = false;
        }
        if let Err(e) = self.commit(sold, ctx).await {
            error!(asset_id = self.asset.id, order_id = %fill.order_id, error = %e, "Sell filled but asset state could not be persisted");
            return Err(e);
        }
        info!(
            asset_id = self.asset.id,
            pair = %self.asset.pair,
            price = fill.fill_price,
            proceeds = fill.quote_value(),
            profit = outcome.profit,
            profit_pct = outcome.profit_pct,
            "Sold, now watching"
        );
        if !self.asset.active {
            info!(asset_id = self.asset.id, pair = %self.asset.pair, "Profit realized, asset deactivated");
        }

        let mut reinvested = None;
        let mut buy_tx = None;
        let mut reinvest_error = None;
        let mut persist_error = None;
        if reinvest_amount > 0.0 {
            let reinvest = match self.fresh_ask(fill.fill_price, ctx).await {
                Ok(ask) => {
                    let order = Order::market(
                        self.asset.pair.clone(),
                        OrderSide::Buy,
                        OrderSizing::Quote(reinvest_amount),
                        ask,
                    );
                    let exec = ctx.executor.execute(self.asset.id, &order).await;
                    buy_tx = exec.transaction_id;
                    exec.outcome
                }
                Err(e) => Err(e),
            };
            match reinvest {
                Ok(buy) => {
                    let mut next = self.asset.clone();
                    next.allocated_amount = outcome.new_buy_amount;
                    Self::apply_buy(&mut next, &buy);
                    Self::stamp(&mut next, Utc::now(), &ctx.settings);
                    match self.commit(next, ctx).await {
                        Ok(()) => {
                            reinvested = Some(true);
                            info!(
                                asset_id = self.asset.id,
                                pair = %self.asset.pair,
                                amount = outcome.new_buy_amount,
                                price = buy.fill_price,
                                "Proceeds reinvested, holding again"
                            );
                        }
                        Err(e) => {
                            error!(asset_id = self.asset.id, order_id = %buy.order_id, error = %e, "Reinvestment filled but asset state could not be persisted");
                            reinvested = Some(true);
                            persist_error = Some(e);
                        }
                    }
                }
                Err(e) => {
                    // The allocation stays at its pre-sale value; proceeds wait in quote currency.
                    error!(
                        asset_id = self.asset.id,
                        pair = %self.asset.pair,
                        amount = outcome.new_buy_amount,
                        error = %e,
                        "Reinvestment buy failed, allocation rolled back"
                    );
                    reinvested = Some(false);
                    reinvest_error = Some(e.to_string());
                }
            }
        }

        let decision = ProceedsDecision {
            asset_id: self.asset.id,
            strategy,
            ratio,
            sell_amount: fill.quote_value(),
            original_amount: original,
            profit: outcome.profit,
            profit_pct: outcome.profit_pct,
            new_buy_amount: outcome.new_buy_amount,
            retained_amount: outcome.retained_amount,
            reinvestment_success: reinvested,
            sell_transaction_id: sell_tx,
            buy_transaction_id: buy_tx,
            error: reinvest_error,
            mode: ctx.executor.mode(),
            timestamp: Utc::now(),
        };
        if let Err(e) = ctx.store.append_proceeds_decision(&decision).await {
            warn!(asset_id = self.asset.id, error = %e, "Failed to log proceeds decision");
        }

        if let Some(e) = persist_error {
            return Err(e);
        }
        Ok(TickOutcome::OrderExecuted {
            side: OrderSide::Sell,
            fill_price: fill.fill_price,
            reinvested,
        })
    }
}
