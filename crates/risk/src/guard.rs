use serde::Serialize;

use common::Asset;

/// Verdict of the pre-buy exposure guard for one watching asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GuardDecision {
    /// No other position in the same base currency is open.
    Proceed,
    /// Positions are open, but the ask is below all their matrix prices: scaling in is allowed.
    DipEntry { lowest_matrix: f64 },
    /// Positions are open and the market is above the lowest of their matrix prices.
    /// The buy check is skipped for this tick.
    SkipRisingMarket { lowest_matrix: f64, held: usize },
}

impl GuardDecision {
    pub fn allows_buy(&self) -> bool {
        !matches!(self, GuardDecision::SkipRisingMarket { .. })
    }
}

/// Decide whether `asset` may evaluate a buy at `ask`, given the holding assets of
/// its base currency. The asset itself and inactive rows are not counted.
pub fn check_exposure(asset: &Asset, ask: f64, holding: &[Asset]) -> GuardDecision {
    let mut held = 0;
    let mut lowest_matrix = f64::INFINITY;
    for other in holding {
        if other.id == asset.id
            || !other.holding
            || !other.active
            || other.pair.base != asset.pair.base
        {
            continue;
        }
        held += 1;
        lowest_matrix = lowest_matrix.min(other.matrix_price);
    }

    if held == 0 {
        GuardDecision::Proceed
    } else if ask < lowest_matrix {
        GuardDecision::DipEntry { lowest_matrix }
    } else {
        GuardDecision::SkipRisingMarket { lowest_matrix, held }
    }
}
