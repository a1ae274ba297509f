pub mod synthetic;

pub use synthetic::SyntheticFeed;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{Error, Fill, Order, OrderPort, OrderSide, OrderSizing, Result, TradingMode};

/// Simulated order port for test mode.
///
/// Fills are simulated at the order's reference price with configurable slippage
/// and a taker fee. No order ever reaches the exchange.
pub struct PaperClient {
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
    /// Fee in basis points of the filled quote value.
    fee_bps: f64,
    /// Every simulated fill, oldest first.
    fills: Arc<RwLock<Vec<Fill>>>,
    /// Number of upcoming submissions to reject.
    pending_rejections: Arc<RwLock<usize>>,
}

impl PaperClient {
    pub fn new(slippage_bps: f64, fee_bps: f64) -> Self {
        info!(slippage_bps, fee_bps, "PaperClient initialized");
        Self {
            slippage_bps,
            fee_bps,
            fills: Arc::new(RwLock::new(Vec::new())),
            pending_rejections: Arc::new(RwLock::new(0)),
        }
    }

    /// Reject the next `n` submissions, as an exchange outage would.
    pub async fn reject_next(&self, n: usize) {
        *self.pending_rejections.write().await = n;
    }

    /// Simulated fills so far (for auditing and tests).
    pub async fn fills(&self) -> Vec<Fill> {
        self.fills.read().await.clone()
    }
}

#[async_trait]
impl OrderPort for PaperClient {
    async fn submit(&self, order: &Order) -> Result<Fill> {
        {
            let mut pending = self.pending_rejections.write().await;
            if *pending > 0 {
                *pending -= 1;
                return Err(Error::OrderRejected {
                    reason: "simulated rejection".into(),
                });
            }
        }

        let reference = order.reference_price;
        if !(reference.is_finite() && reference > 0.0) {
            return Err(Error::OrderRejected {
                reason: format!("no usable reference price for {}", order.pair),
            });
        }
        if !(order.sizing.amount() > 0.0) {
            return Err(Error::OrderRejected {
                reason: format!("order size must be positive, got {}", order.sizing),
            });
        }

        // Buys pay more, sells receive less
        let fill_price = match order.side {
            OrderSide::Buy => reference * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => reference * (1.0 - self.slippage_bps / 10_000.0),
        };
        let filled_amount = match order.sizing {
            OrderSizing::Quote(quote) => quote / fill_price,
            OrderSizing::Base(base) => base,
        };
        let fee = fill_price * filled_amount * self.fee_bps / 10_000.0;

        debug!(
            pair = %order.pair,
            side = %order.side,
            reference,
            fill = fill_price,
            filled_amount,
            fee,
            "Paper fill simulated"
        );

        let fill = Fill {
            order_id: order.id.clone(),
            pair: order.pair.clone(),
            side: order.side,
            fill_price,
            filled_amount,
            fee,
            timestamp: Utc::now(),
        };
        self.fills.write().await.push(fill.clone());
        Ok(fill)
    }

    fn mode(&self) -> TradingMode {
        TradingMode::Test
    }
}
