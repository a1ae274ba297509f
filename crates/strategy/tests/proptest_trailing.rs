use common::{Asset, AssetParams, ProceedsStrategy, TradingPair};
use proptest::prelude::*;
use strategy::{calculate, observe, reconcile, Observation};

fn asset(holding: bool, gain: f64, trail: f64) -> Asset {
    Asset::new(AssetParams {
        id: 1,
        name: "prop".into(),
        pair: TradingPair::new("BTC", "EUR"),
        allocated_amount: 10.0,
        last_buy_price: if holding { 100.0 } else { 0.0 },
        matrix_price: 100.0,
        holding,
        high_water: 100.0,
        low_water: 100.0,
        gain,
        trail,
        deal_count: 0,
        last_update_time: None,
        cooldown_until: None,
        proceeds_strategy: ProceedsStrategy::Eur,
        proceeds_ratio: 0.5,
        active: true,
    })
}

fn check_armed_implications(a: &Asset) {
    if a.buy_armed {
        assert!(!a.holding);
        assert!(a.low_water < a.matrix_price * (1.0 - a.gain));
    }
    if a.sell_armed {
        assert!(a.holding);
        assert!(a.high_water >= a.matrix_price * (1.0 + a.gain));
    }
}

proptest! {
    /// Between buys, `low_water` never increases and arming implies the trigger was crossed.
    #[test]
    fn low_water_is_non_increasing_while_watching(
        prices in prop::collection::vec(50.0f64..150.0, 1..200),
        gain in 0.005f64..0.2,
        trail in 0.001f64..0.1,
    ) {
        let mut a = asset(false, gain, trail);
        let mut prev = a.low_water;
        for p in prices {
            let obs = observe(&mut a, p);
            prop_assert!(a.low_water <= prev);
            prop_assert!(a.low_water <= a.matrix_price);
            check_armed_implications(&a);
            prev = a.low_water;
            if matches!(obs, Observation::Fire { .. }) {
                break;
            }
        }
    }

    /// Between sells, `high_water` never decreases.
    #[test]
    fn high_water_is_non_decreasing_while_holding(
        prices in prop::collection::vec(50.0f64..150.0, 1..200),
        gain in 0.005f64..0.2,
        trail in 0.001f64..0.1,
    ) {
        let mut a = asset(true, gain, trail);
        let mut prev = a.high_water;
        for p in prices {
            let obs = observe(&mut a, p);
            prop_assert!(a.high_water >= prev);
            prop_assert!(a.high_water >= a.matrix_price);
            check_armed_implications(&a);
            prev = a.high_water;
            if matches!(obs, Observation::Fire { .. }) {
                break;
            }
        }
    }

    /// The trail stop only ever moves toward the market once armed.
    #[test]
    fn trail_stop_never_loosens(
        prices in prop::collection::vec(50.0f64..150.0, 1..200),
    ) {
        let mut a = asset(false, 0.03, 0.01);
        let mut stop: Option<f64> = None;
        for p in prices {
            let obs = observe(&mut a, p);
            if a.buy_armed {
                if let Some(s) = stop {
                    prop_assert!(a.trail_stop <= s);
                }
                stop = Some(a.trail_stop);
            }
            if matches!(obs, Observation::Fire { .. }) {
                break;
            }
        }
    }

    /// Feeding the same fresh sample twice after a reload yields the same sub-state.
    #[test]
    fn reconciliation_is_idempotent(
        holding in any::<bool>(),
        extremum in 50.0f64..150.0,
        fresh in 50.0f64..150.0,
    ) {
        let mut a = asset(holding, 0.03, 0.01);
        if holding {
            a.high_water = extremum;
        } else {
            a.low_water = extremum;
        }

        reconcile(&mut a, fresh);
        let first = a.clone();
        reconcile(&mut a, fresh);

        prop_assert_eq!(first.buy_armed, a.buy_armed);
        prop_assert_eq!(first.sell_armed, a.sell_armed);
        prop_assert_eq!(first.low_water, a.low_water);
        prop_assert_eq!(first.high_water, a.high_water);
        check_armed_implications(&a);
    }

    /// New buy plus retained amount never exceeds what the sell returned.
    #[test]
    fn proceeds_are_conserved(
        proceeds in 0.0f64..1000.0,
        original in 0.01f64..1000.0,
        ratio in 0.0f64..=1.0,
    ) {
        for strategy in [ProceedsStrategy::Eur, ProceedsStrategy::Crypto, ProceedsStrategy::Split] {
            let out = calculate(proceeds, original, strategy, ratio);
            prop_assert!(out.new_buy_amount >= 0.0);
            prop_assert!(out.retained_amount >= -1e-9);
            prop_assert!(out.new_buy_amount + out.retained_amount <= proceeds + 1e-9);
        }
    }
}
