use common::{Asset, OrderSizing, ProceedsStrategy};

/// Result of splitting a sale's proceeds between the next buy and realized profit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProceedsOutcome {
    /// Quote amount for an immediate reinvestment buy. Zero means no buy.
    pub new_buy_amount: f64,
    /// Quote amount kept out of the market.
    pub retained_amount: f64,
    pub profit: f64,
    pub profit_pct: f64,
}

/// Decide how the gross proceeds of a sell are redeployed.
///
/// `ratio` is only used by [`ProceedsStrategy::Split`] and is clamped to `[0, 1]`.
pub fn calculate(
    sell_proceeds: f64,
    original_amount: f64,
    strategy: ProceedsStrategy,
    ratio: f64,
) -> ProceedsOutcome {
    let profit = sell_proceeds - original_amount;
    let profit_pct = if original_amount > 0.0 {
        profit / original_amount * 100.0
    } else {
        0.0
    };

    let (new_buy_amount, retained_amount) = match strategy {
        ProceedsStrategy::Eur => (0.0, sell_proceeds),
        ProceedsStrategy::Crypto => (sell_proceeds, 0.0),
        ProceedsStrategy::Split => {
            if profit > 0.0 {
                let new_buy = original_amount + profit * ratio.clamp(0.0, 1.0);
                (new_buy, sell_proceeds - new_buy)
            } else {
                // A loss is never topped up from outside the position.
                (original_amount.min(sell_proceeds), 0.0)
            }
        }
    };

    ProceedsOutcome {
        new_buy_amount,
        retained_amount,
        profit,
        profit_pct,
    }
}

/// Sizing of a sell order, decided from the last observed bid before submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SellPlan {
    pub sizing: OrderSizing,
    /// Quote amount the order is expected to return.
    pub expected_proceeds: f64,
    /// Unrealized profit of the whole holding at the observed price.
    pub profit: f64,
    /// Value of the base asset left in the wallet after the sell.
    pub leftover_value: f64,
}

/// Round a base-asset amount to the exchange's 8 decimals.
pub fn round_base(amount: f64) -> f64 {
    (amount * 1e8).round() / 1e8
}

/// Round a quote amount to cents.
pub fn round_quote(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Size the sell order for `asset` at the observed `price`.
///
/// `split` uses the profit estimated at `price`, not the eventual fill price, so the
/// amount reinvested afterwards can differ from what was assumed here.
pub fn plan_sell(asset: &Asset, price: f64) -> SellPlan {
    let original = asset.allocated_amount;

    let Some(units) = asset.units_held() else {
        return SellPlan {
            sizing: OrderSizing::Quote(round_quote(original)),
            expected_proceeds: original,
            profit: 0.0,
            leftover_value: 0.0,
        };
    };

    let value = units * price;
    let profit = value - original;

    match asset.proceeds_strategy {
        ProceedsStrategy::Crypto => SellPlan {
            sizing: OrderSizing::Base(round_base(units)),
            expected_proceeds: value,
            profit,
            leftover_value: 0.0,
        },
        ProceedsStrategy::Split => {
            let ratio = asset.proceeds_ratio.clamp(0.0, 1.0);
            let (sell_quote, leftover) = if profit > 0.0 {
                (original + profit * ratio, profit * (1.0 - ratio))
            } else {
                (original, 0.0)
            };
            SellPlan {
                sizing: OrderSizing::Quote(round_quote(sell_quote)),
                expected_proceeds: sell_quote,
                profit,
                leftover_value: leftover,
            }
        }
        ProceedsStrategy::Eur => SellPlan {
            sizing: OrderSizing::Quote(round_quote(original)),
            expected_proceeds: original,
            profit,
            leftover_value: profit.max(0.0),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AssetParams, TradingPair};

    fn held_eth(strategy: ProceedsStrategy) -> Asset {
        Asset::new(AssetParams {
            id: 7,
            name: "eth".into(),
            pair: TradingPair::new("ETH", "EUR"),
            allocated_amount: 10.0,
            last_buy_price: 2500.0,
            matrix_price: 2500.0,
            holding: true,
            high_water: 2500.0,
            low_water: 2500.0,
            gain: 0.05,
            trail: 0.01,
            deal_count: 1,
            last_update_time: None,
            cooldown_until: None,
            proceeds_strategy: strategy,
            proceeds_ratio: 0.5,
            active: true,
        })
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn eur_sells_allocation_and_leaves_profit_in_crypto() {
        let plan = plan_sell(&held_eth(ProceedsStrategy::Eur), 2630.0);
        assert_eq!(plan.sizing, OrderSizing::Quote(10.0));
        assert!(close(plan.leftover_value, 0.52));
    }

    #[test]
    fn crypto_liquidates_the_full_holding() {
        let plan = plan_sell(&held_eth(ProceedsStrategy::Crypto), 2630.0);
        assert_eq!(plan.sizing, OrderSizing::Base(0.004));
        assert!(close(plan.expected_proceeds, 10.52));
        assert_eq!(plan.leftover_value, 0.0);
    }

    #[test]
    fn split_sells_allocation_plus_half_the_profit() {
        let plan = plan_sell(&held_eth(ProceedsStrategy::Split), 2630.0);
        assert_eq!(plan.sizing, OrderSizing::Quote(10.26));
        assert!(close(plan.leftover_value, 0.26));
    }

    #[test]
    fn split_on_loss_sells_only_the_allocation() {
        let plan = plan_sell(&held_eth(ProceedsStrategy::Split), 2400.0);
        assert_eq!(plan.sizing, OrderSizing::Quote(10.0));
        assert_eq!(plan.leftover_value, 0.0);
    }

    #[test]
    fn missing_buy_price_falls_back_to_allocation() {
        let mut asset = held_eth(ProceedsStrategy::Crypto);
        asset.last_buy_price = 0.0;
        let plan = plan_sell(&asset, 2630.0);
        assert_eq!(plan.sizing, OrderSizing::Quote(10.0));
    }

    #[test]
    fn calculate_eur_retains_everything() {
        let out = calculate(10.52, 10.0, ProceedsStrategy::Eur, 0.5);
        assert_eq!(out.new_buy_amount, 0.0);
        assert!(close(out.retained_amount, 10.52));
        assert!(close(out.profit, 0.52));
        assert!(close(out.profit_pct, 5.2));
    }

    #[test]
    fn calculate_crypto_compounds_everything() {
        let out = calculate(10.52, 10.0, ProceedsStrategy::Crypto, 0.5);
        assert!(close(out.new_buy_amount, 10.52));
        assert_eq!(out.retained_amount, 0.0);
    }

    #[test]
    fn calculate_split_profit_and_loss() {
        let win = calculate(10.52, 10.0, ProceedsStrategy::Split, 0.5);
        assert!(close(win.new_buy_amount, 10.26));
        assert!(close(win.retained_amount, 0.26));

        let loss = calculate(9.6, 10.0, ProceedsStrategy::Split, 0.5);
        assert!(close(loss.new_buy_amount, 9.6));
        assert_eq!(loss.retained_amount, 0.0);
        assert!(loss.profit < 0.0);
    }

    #[test]
    fn calculate_clamps_ratio() {
        let out = calculate(12.0, 10.0, ProceedsStrategy::Split, 3.0);
        assert!(close(out.new_buy_amount, 12.0));
        assert!(close(out.retained_amount, 0.0));
    }
}
