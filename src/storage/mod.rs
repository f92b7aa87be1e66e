//! Storage interfaces for the two loader collections.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::inventory::{HistoricalEvent, ProductRollup};

pub mod mongodb;

pub use mongodb::{MongoHistoryStore, MongoProductStore};

/// Collection names.
pub const HISTORY_COLLECTION: &str = "historicaldata";
pub const PRODUCTS_COLLECTION: &str = "products";

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("MongoDB error: {0}")]
    Mongo(#[from] ::mongodb::error::Error),

    #[error("Unexpected document shape: {0}")]
    UnexpectedDocument(String),
}

/// Result of one bulk insert attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Documents newly written by this attempt.
    pub inserted: usize,
    /// Documents rejected by the uniqueness constraint and ignored.
    pub duplicates: usize,
}

/// Append target for historical events.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Attempts an unordered insert of one chunk of events. A chunk whose
    /// only failures are duplicate-key rejections succeeds; the duplicates
    /// are counted, not surfaced as errors.
    async fn insert_batch(&self, events: &[HistoricalEvent]) -> Result<BatchOutcome>;

    async fn count(&self) -> Result<u64>;
}

/// Keyed upsert target for current product state.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Inserts or overwrites the record keyed on the uppercased
    /// (productId, storeId) pair.
    async fn upsert(&self, rollup: &ProductRollup, last_updated: DateTime<Utc>) -> Result<()>;

    async fn count(&self) -> Result<u64>;

    /// Distinct category values with per-category record counts.
    async fn category_distribution(&self) -> Result<Vec<(String, u64)>>;

    /// Distinct region values with per-region record counts.
    async fn region_distribution(&self) -> Result<Vec<(String, u64)>>;

    /// A small sample of product records for verification output.
    async fn sample(&self, limit: i64) -> Result<Vec<ProductRecord>>;
}

/// Product fields read back for the verification report.
#[derive(Debug, Clone)]
pub struct ProductRecord {
    pub product_id: String,
    pub store_id: String,
    pub category: String,
    pub region: String,
}

/// Connect to the document store.
pub async fn connect(uri: &str) -> Result<::mongodb::Client> {
    Ok(::mongodb::Client::with_uri_str(uri).await?)
}
