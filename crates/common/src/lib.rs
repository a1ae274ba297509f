pub mod asset;
pub mod config;
pub mod error;
pub mod exchange;
pub mod store;
pub mod types;

pub use asset::{Asset, AssetParams, AssetState, ProceedsStrategy};
pub use config::Config;
pub use error::{Error, Result};
pub use exchange::{MarketDataPort, OrderPort};
pub use store::PersistenceStore;
pub use types::*;
