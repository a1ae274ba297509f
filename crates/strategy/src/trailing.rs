//! Trailing-threshold state machine.
//!
//! Pure functions over [`Asset`]: they update the extrema and the derived armed
//! state in place and report what happened. Persisting the result and submitting
//! orders is the caller's job.

use common::{Asset, OrderSide};

/// Outcome of feeding one price sample to an asset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// Sample was not a usable price (non-finite or not positive). Nothing changed.
    Ignored,
    /// Nothing changed.
    Unchanged,
    /// The favourable extremum moved; must be persisted.
    NewExtremum { extremum: f64 },
    /// The gain threshold was crossed on this sample.
    Armed { side: OrderSide, trail_stop: f64 },
    /// An armed signal saw its trailing pull-back; an order should be submitted.
    Fire { side: OrderSide, trail_stop: f64 },
}

impl Observation {
    /// Whether the asset record changed and has to be written back.
    pub fn mutated(&self) -> bool {
        matches!(
            self,
            Observation::NewExtremum { .. } | Observation::Armed { .. }
        )
    }
}

/// Outcome of restart reconciliation for one asset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciliation {
    /// Sample was not usable; the asset stays unarmed until a genuine tick reconciles it.
    Skipped,
    /// Persisted extremum is still supported by the market; the signal is re-armed.
    Armed { trail_stop: f64 },
    /// Persisted extremum never crossed the trigger.
    Unarmed,
    /// Persisted extremum crossed the trigger but the market moved back; the window
    /// restarts from the fresh sample.
    Reset { stale_extremum: f64, extremum: f64 },
}

fn usable(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Feed one sample: the best ask while watching, the best bid while holding.
pub fn observe(asset: &mut Asset, sample: f64) -> Observation {
    if !usable(sample) {
        return Observation::Ignored;
    }
    if asset.holding {
        observe_holding(asset, sample)
    } else {
        observe_watching(asset, sample)
    }
}

fn observe_watching(asset: &mut Asset, ask: f64) -> Observation {
    let moved = ask < asset.low_water;
    if moved {
        asset.low_water = ask;
    }

    if !asset.buy_armed {
        if asset.low_water < asset.buy_trigger() {
            asset.buy_armed = true;
            asset.trail_stop = asset.low_water * (1.0 + asset.trail);
            return Observation::Armed {
                side: OrderSide::Buy,
                trail_stop: asset.trail_stop,
            };
        }
    } else {
        if moved {
            asset.trail_stop = asset.low_water * (1.0 + asset.trail);
        }
        if ask >= asset.trail_stop {
            return Observation::Fire {
                side: OrderSide::Buy,
                trail_stop: asset.trail_stop,
            };
        }
    }

    if moved {
        Observation::NewExtremum { extremum: ask }
    } else {
        Observation::Unchanged
    }
}

fn observe_holding(asset: &mut Asset, bid: f64) -> Observation {
    let moved = bid > asset.high_water;
    if moved {
        asset.high_water = bid;
    }

    if !asset.sell_armed {
        if asset.high_water >= asset.sell_trigger() {
            asset.sell_armed = true;
            asset.trail_stop = asset.high_water * (1.0 - asset.trail);
            return Observation::Armed {
                side: OrderSide::Sell,
                trail_stop: asset.trail_stop,
            };
        }
    } else {
        if moved {
            asset.trail_stop = asset.high_water * (1.0 - asset.trail);
        }
        if bid <= asset.trail_stop {
            return Observation::Fire {
                side: OrderSide::Sell,
                trail_stop: asset.trail_stop,
            };
        }
    }

    if moved {
        Observation::NewExtremum { extremum: bid }
    } else {
        Observation::Unchanged
    }
}

/// Recompute the armed sub-state after a restart from one fresh sample.
///
/// Stored armed flags are never trusted. The persisted extremum only keeps the
/// signal armed while the fresh sample is still beyond the trigger; otherwise the
/// extremum restarts at the fresh sample, clamped so it never passes the matrix price.
pub fn reconcile(asset: &mut Asset, fresh: f64) -> Reconciliation {
    asset.disarm();
    normalize_extrema(asset);
    if !usable(fresh) {
        return Reconciliation::Skipped;
    }

    if asset.holding {
        let trigger = asset.sell_trigger();
        if asset.high_water < trigger {
            return Reconciliation::Unarmed;
        }
        if fresh >= trigger {
            asset.high_water = asset.high_water.max(fresh);
            asset.sell_armed = true;
            asset.trail_stop = asset.high_water * (1.0 - asset.trail);
            return Reconciliation::Armed {
                trail_stop: asset.trail_stop,
            };
        }
        let stale = asset.high_water;
        asset.high_water = fresh.max(asset.matrix_price);
        Reconciliation::Reset {
            stale_extremum: stale,
            extremum: asset.high_water,
        }
    } else {
        let trigger = asset.buy_trigger();
        if asset.low_water >= trigger {
            return Reconciliation::Unarmed;
        }
        if fresh < trigger {
            asset.low_water = asset.low_water.min(fresh);
            asset.buy_armed = true;
            asset.trail_stop = asset.low_water * (1.0 + asset.trail);
            return Reconciliation::Armed {
                trail_stop: asset.trail_stop,
            };
        }
        let stale = asset.low_water;
        asset.low_water = fresh.min(asset.matrix_price);
        Reconciliation::Reset {
            stale_extremum: stale,
            extremum: asset.low_water,
        }
    }
}

/// Pull an out-of-range stored extremum back onto the matrix price.
fn normalize_extrema(asset: &mut Asset) {
    if asset.holding {
        if !usable(asset.high_water) || asset.high_water < asset.matrix_price {
            asset.high_water = asset.matrix_price;
        }
    } else if !usable(asset.low_water) || asset.low_water > asset.matrix_price {
        asset.low_water = asset.matrix_price;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AssetParams, ProceedsStrategy, TradingPair};

    fn watching(trail: f64) -> Asset {
        Asset::new(AssetParams {
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
            trail,
            deal_count: 0,
            last_update_time: None,
            cooldown_until: None,
            proceeds_strategy: ProceedsStrategy::Eur,
            proceeds_ratio: 0.5,
            active: true,
        })
    }

    fn holding(trail: f64) -> Asset {
        let mut a = watching(trail);
        a.holding = true;
        a.last_buy_price = 100.0;
        a
    }

    #[test]
    fn watching_arms_below_trigger_and_fires_on_pullback() {
        let mut a = watching(0.01);
        assert_eq!(observe(&mut a, 100.0), Observation::Unchanged);

        match observe(&mut a, 96.0) {
            Observation::Armed { side: OrderSide::Buy, trail_stop } => {
                assert!((trail_stop - 96.96).abs() < 1e-9)
            }
            other => panic!("expected Armed, got {other:?}"),
        }
        assert!(a.buy_armed);
        assert_eq!(a.low_water, 96.0);

        assert!(matches!(
            observe(&mut a, 97.0),
            Observation::Fire { side: OrderSide::Buy, .. }
        ));
    }

    #[test]
    fn wider_trail_waits_for_larger_pullback() {
        let mut a = watching(0.035);
        let seq = [100.0, 96.0, 97.0, 98.97];
        let results: Vec<_> = seq.iter().map(|p| observe(&mut a, *p)).collect();
        assert!(matches!(results[1], Observation::Armed { .. }));
        assert_eq!(results[2], Observation::Unchanged);
        assert_eq!(results[3], Observation::Unchanged);
        assert!((a.trail_stop - 99.36).abs() < 1e-9);
        assert!(matches!(observe(&mut a, 99.5), Observation::Fire { .. }));
    }

    #[test]
    fn trail_stop_tightens_with_new_low() {
        let mut a = watching(0.01);
        observe(&mut a, 96.0);
        assert_eq!(observe(&mut a, 95.0), Observation::NewExtremum { extremum: 95.0 });
        assert!((a.trail_stop - 95.95).abs() < 1e-9);
        // 96.0 would have fired against the old stop but not against the tightened one.
        assert_eq!(observe(&mut a, 95.9), Observation::Unchanged);
        assert!(matches!(observe(&mut a, 96.0), Observation::Fire { .. }));
    }

    #[test]
    fn dip_above_trigger_is_only_an_extremum() {
        let mut a = watching(0.01);
        assert_eq!(observe(&mut a, 98.0), Observation::NewExtremum { extremum: 98.0 });
        assert!(!a.buy_armed);
        assert_eq!(observe(&mut a, 99.0), Observation::Unchanged);
        assert_eq!(a.low_water, 98.0);
    }

    #[test]
    fn holding_mirrors_watching() {
        let mut a = holding(0.01);
        assert_eq!(observe(&mut a, 102.0), Observation::NewExtremum { extremum: 102.0 });
        assert!(matches!(
            observe(&mut a, 103.0),
            Observation::Armed { side: OrderSide::Sell, .. }
        ));
        assert!((a.trail_stop - 101.97).abs() < 1e-9);
        assert_eq!(observe(&mut a, 105.0), Observation::NewExtremum { extremum: 105.0 });
        assert!((a.trail_stop - 103.95).abs() < 1e-9);
        assert!(matches!(
            observe(&mut a, 103.9),
            Observation::Fire { side: OrderSide::Sell, .. }
        ));
    }

    #[test]
    fn garbage_samples_are_ignored() {
        let mut a = watching(0.01);
        assert_eq!(observe(&mut a, f64::NAN), Observation::Ignored);
        assert_eq!(observe(&mut a, 0.0), Observation::Ignored);
        assert_eq!(observe(&mut a, -5.0), Observation::Ignored);
        assert_eq!(a.low_water, 100.0);
    }

    #[test]
    fn reconcile_rearms_when_market_still_below_trigger() {
        let mut a = watching(0.01);
        a.low_water = 95.0;
        assert!(matches!(reconcile(&mut a, 96.0), Reconciliation::Armed { .. }));
        assert!(a.buy_armed);
        assert!((a.trail_stop - 95.95).abs() < 1e-9);
    }

    #[test]
    fn reconcile_resets_stale_extremum() {
        let mut a = watching(0.01);
        a.low_water = 95.0;
        a.buy_armed = true;
        assert_eq!(
            reconcile(&mut a, 101.0),
            Reconciliation::Reset { stale_extremum: 95.0, extremum: 100.0 }
        );
        assert!(!a.buy_armed);
        assert_eq!(a.low_water, 100.0);

        let mut b = watching(0.01);
        b.low_water = 95.0;
        reconcile(&mut b, 98.5);
        assert_eq!(b.low_water, 98.5);
    }

    #[test]
    fn reconcile_holding_side() {
        let mut a = holding(0.01);
        a.high_water = 104.0;
        assert!(matches!(reconcile(&mut a, 103.5), Reconciliation::Armed { .. }));
        assert!(a.sell_armed);

        let mut b = holding(0.01);
        b.high_water = 104.0;
        assert!(matches!(reconcile(&mut b, 99.0), Reconciliation::Reset { .. }));
        assert_eq!(b.high_water, 100.0);
    }

    #[test]
    fn reconcile_without_sample_leaves_asset_unarmed() {
        let mut a = watching(0.01);
        a.low_water = 95.0;
        a.buy_armed = true;
        assert_eq!(reconcile(&mut a, f64::NAN), Reconciliation::Skipped);
        assert!(!a.is_armed());
        assert_eq!(a.low_water, 95.0);
    }
}
