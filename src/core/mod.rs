//! Core refresh engine: data model, fetch stages, scheduling and caches

pub mod clock;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod fund;
pub mod intraday;
pub mod log;
pub mod merge;
pub mod portfolio;
pub mod scheduler;
pub mod store;

// Re-export main types for cleaner imports
pub use error::{FetchError, RetrievalError, StoreError};
pub use fetcher::{FundFetcher, FundProvider, FundSource, QuoteSource, Valuation};
pub use fund::{FundRecord, Holding, HistoryPoint, Position, Positions, Rate, SearchResult};
pub use scheduler::{AddReport, RefreshReport, RefreshScheduler};
