use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;

use common::TradingPair;

/// Per-pair random walk used when no genuine market read is possible.
///
/// Each step moves the last known price by at most `max_step` (fractional) in either
/// direction. Samples from here are flagged synthetic and never justify a live order.
pub struct SyntheticFeed {
    max_step: f64,
    last: Mutex<HashMap<TradingPair, f64>>,
    rng: Mutex<StdRng>,
}

impl SyntheticFeed {
    pub fn new(max_step: f64) -> Self {
        Self::with_rng(max_step, StdRng::from_entropy())
    }

    /// Deterministic walk for tests.
    pub fn seeded(max_step: f64, seed: u64) -> Self {
        Self::with_rng(max_step, StdRng::seed_from_u64(seed))
    }

    fn with_rng(max_step: f64, rng: StdRng) -> Self {
        Self {
            max_step: max_step.abs(),
            last: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
        }
    }

    /// Record a genuine price so the walk continues from it.
    pub async fn observe(&self, pair: &TradingPair, price: f64) {
        if price.is_finite() && price > 0.0 {
            self.last.lock().await.insert(pair.clone(), price);
        }
    }

    /// Next synthetic price, or `None` when nothing is known about `pair` yet.
    pub async fn next(&self, pair: &TradingPair) -> Option<f64> {
        let mut last = self.last.lock().await;
        let price = last.get_mut(pair)?;
        let step = if self.max_step > 0.0 {
            self.rng.lock().await.gen_range(-self.max_step..=self.max_step)
        } else {
            0.0
        };
        *price *= 1.0 + step;
        Some(*price)
    }
}
