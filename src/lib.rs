pub mod adapters;
pub mod config;
pub mod db;
pub mod error;
pub mod geodesy;
pub mod models;
pub mod service;

pub use adapters::{JsonFeedAdapter, SourceAdapter, SourceBatch, SourceRecord};
pub use config::AppConfig;
pub use db::{create_pool, InMemoryStore, PgTollStore, TollStore};
pub use error::{Result, SyncError};
pub use service::{
    GeoBoundedMatcher, ImportService, MatchMode, PriceMatrix, RadiusAllocator, RadiusMaintenance,
};
