use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use common::{
    Fill, Order, OrderPort, PersistenceStore, Result, TradingMode, Transaction, TransactionStatus,
};

/// Result of one order submission, together with its audit-log row.
#[derive(Debug)]
pub struct Execution {
    pub outcome: Result<Fill>,
    /// `None` when the transaction log append itself failed.
    pub transaction_id: Option<i64>,
}

/// Submits orders to the exchange and records every attempt in the transaction log.
///
/// This is the ONLY component that calls `OrderPort::submit`.
#[derive(Clone)]
pub struct OrderExecutor {
    port: Arc<dyn OrderPort>,
    store: Arc<dyn PersistenceStore>,
}

impl OrderExecutor {
    pub fn new(port: Arc<dyn OrderPort>, store: Arc<dyn PersistenceStore>) -> Self {
        info!(mode = %port.mode(), "OrderExecutor ready");
        Self { port, store }
    }

    pub fn mode(&self) -> TradingMode {
        self.port.mode()
    }

    pub async fn execute(&self, asset_id: i64, order: &Order) -> Execution {
        let mode = self.port.mode();
        info!(
            asset_id,
            pair = %order.pair,
            side = %order.side,
            sizing = %order.sizing,
            reference = order.reference_price,
            %mode,
            "Executing order"
        );

        let outcome = self.port.submit(order).await;
        let tx = match &outcome {
            Ok(fill) => {
                info!(
                    asset_id,
                    pair = %fill.pair,
                    side = %fill.side,
                    price = fill.fill_price,
                    amount = fill.filled_amount,
                    fee = fill.fee,
                    "Order filled"
                );
                Transaction {
                    asset_id,
                    side: order.side,
                    sizing: order.sizing,
                    price: fill.fill_price,
                    filled_amount: fill.filled_amount,
                    fee: fill.fee,
                    mode,
                    status: match mode {
                        TradingMode::Live => TransactionStatus::Completed,
                        TradingMode::Test => TransactionStatus::Test,
                    },
                    order_id: Some(fill.order_id.clone()),
                    error: None,
                    timestamp: fill.timestamp,
                }
            }
            Err(e) => {
                warn!(asset_id, pair = %order.pair, side = %order.side, error = %e, "Order submission failed");
                Transaction {
                    asset_id,
                    side: order.side,
                    sizing: order.sizing,
                    price: order.reference_price,
                    filled_amount: 0.0,
                    fee: 0.0,
                    mode,
                    status: TransactionStatus::Failed,
                    order_id: None,
                    error: Some(e.to_string()),
                    timestamp: Utc::now(),
                }
            }
        };

        let transaction_id = match self.store.append_transaction(&tx).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(asset_id, error = %e, "Failed to log transaction");
                None
            }
        };

        Execution {
            outcome,
            transaction_id,
        }
    }
}
