pub mod bitvavo;
pub mod console;
pub mod executor;
pub mod market;
pub mod report;
pub mod scheduler;
pub mod signal;
pub mod store;

pub use bitvavo::{BitvavoClient, BitvavoPublic};
pub use console::spawn_console;
pub use executor::{Execution, OrderExecutor};
pub use market::{MarketFeed, PriceRead};
pub use scheduler::{seed_assets, CycleScheduler, SchedulerConfig, SchedulerHandle};
pub use signal::{AssetSignalEngine, SkipReason, TickContext, TickOutcome, TradeSettings};
pub use store::SqliteStore;
