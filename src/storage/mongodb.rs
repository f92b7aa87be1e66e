//! MongoDB implementations of the storage interfaces.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Bson, DateTime as BsonDateTime, Document};
use mongodb::options::{FindOptions, IndexOptions, InsertManyOptions, UpdateOptions};
use mongodb::{Client, Collection, IndexModel};

use crate::inventory::{HistoricalEvent, ProductRollup};

use super::{
    BatchOutcome, HistoryStore, ProductRecord, ProductStore, Result, HISTORY_COLLECTION,
    PRODUCTS_COLLECTION,
};

/// MongoDB implementation of HistoryStore.
pub struct MongoHistoryStore {
    history: Collection<Document>,
}

impl MongoHistoryStore {
    /// Create a new MongoDB history store.
    pub async fn new(client: &Client, database_name: &str) -> Result<Self> {
        let history = client.database(database_name).collection(HISTORY_COLLECTION);

        let store = Self { history };
        store.init().await?;

        Ok(store)
    }

    /// Initialize indexes.
    async fn init(&self) -> Result<()> {
        // Unique index on (date, storeId, productId) - reruns of the same
        // file are rejected per document rather than appended twice
        let index = IndexModel::builder()
            .keys(doc! { "date": 1, "storeId": 1, "productId": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        self.history.create_index(index).await?;

        Ok(())
    }
}

#[async_trait]
impl HistoryStore for MongoHistoryStore {
    async fn insert_batch(&self, events: &[HistoricalEvent]) -> Result<BatchOutcome> {
        if events.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let uploaded_at = BsonDateTime::from_millis(Utc::now().timestamp_millis());
        let docs: Vec<Document> = events
            .iter()
            .map(|event| event_to_document(event, uploaded_at))
            .collect();

        let options = InsertManyOptions::builder().ordered(false).build();

        match self.history.insert_many(docs).with_options(options).await {
            Ok(result) => Ok(BatchOutcome {
                inserted: result.inserted_ids.len(),
                duplicates: 0,
            }),
            // With an unordered insert the non-conflicting documents have
            // already landed; duplicate-key rejections are not an error here
            Err(e) => match duplicate_write_errors(&e) {
                Some(duplicates) => Ok(BatchOutcome {
                    inserted: events.len() - duplicates,
                    duplicates,
                }),
                None => Err(e.into()),
            },
        }
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.history.count_documents(doc! {}).await?)
    }
}

fn event_to_document(event: &HistoricalEvent, uploaded_at: BsonDateTime) -> Document {
    let mut doc = doc! {
        "date": BsonDateTime::from_millis(event.date.timestamp_millis()),
        "storeId": &event.store_id,
        "productId": &event.product_id,
        "category": &event.category,
        "region": &event.region,
        "unitsSold": event.units_sold,
        "inventoryLevel": event.inventory_level,
        "price": event.price,
        "discount": event.discount,
        "weatherCondition": &event.weather_condition,
        "seasonality": &event.seasonality,
        "uploadedAt": uploaded_at,
    };

    // An absent forecast stays absent in the document; the field is never
    // written as zero
    if let Some(forecast) = event.demand_forecast {
        doc.insert("demandForecast", forecast);
    }

    doc
}

/// Returns the number of write errors when every failure in the batch is a
/// duplicate-key rejection (code 11000); None when anything else failed.
fn duplicate_write_errors(e: &mongodb::error::Error) -> Option<usize> {
    if let mongodb::error::ErrorKind::InsertMany(ref failure) = *e.kind {
        if let Some(ref write_errors) = failure.write_errors {
            if !write_errors.is_empty() && write_errors.iter().all(|we| we.code == 11000) {
                return Some(write_errors.len());
            }
        }
    }

    None
}

/// MongoDB implementation of ProductStore.
pub struct MongoProductStore {
    products: Collection<Document>,
}

impl MongoProductStore {
    /// Create a new MongoDB product store.
    pub async fn new(client: &Client, database_name: &str) -> Result<Self> {
        let products = client
            .database(database_name)
            .collection(PRODUCTS_COLLECTION);

        let store = Self { products };
        store.init().await?;

        Ok(store)
    }

    /// Initialize indexes.
    async fn init(&self) -> Result<()> {
        // Unique index on (productId, storeId) - only one record per pair
        let index = IndexModel::builder()
            .keys(doc! { "productId": 1, "storeId": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        self.products.create_index(index).await?;

        Ok(())
    }

    async fn distribution(&self, field: &str) -> Result<Vec<(String, u64)>> {
        let values = self.products.distinct(field, doc! {}).await?;

        let mut counts = Vec::new();
        for value in values {
            if let Bson::String(value) = value {
                let mut filter = Document::new();
                filter.insert(field, value.as_str());
                let count = self.products.count_documents(filter).await?;
                counts.push((value, count));
            }
        }

        Ok(counts)
    }
}

#[async_trait]
impl ProductStore for MongoProductStore {
    async fn upsert(&self, rollup: &ProductRollup, last_updated: DateTime<Utc>) -> Result<()> {
        let product_id = rollup.product_id.to_uppercase();
        let store_id = rollup.store_id.to_uppercase();

        let filter = doc! { "productId": &product_id, "storeId": &store_id };

        let update = doc! {
            "$set": {
                "productId": &product_id,
                "storeId": &store_id,
                "category": &rollup.category,
                "region": &rollup.region,
                "currentInventory": rollup.current_inventory,
                "price": rollup.price,
                "lastUpdated": BsonDateTime::from_millis(last_updated.timestamp_millis()),
            }
        };

        let options = UpdateOptions::builder().upsert(true).build();

        self.products
            .update_one(filter, update)
            .with_options(options)
            .await?;

        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.products.count_documents(doc! {}).await?)
    }

    async fn category_distribution(&self) -> Result<Vec<(String, u64)>> {
        self.distribution("category").await
    }

    async fn region_distribution(&self) -> Result<Vec<(String, u64)>> {
        self.distribution("region").await
    }

    async fn sample(&self, limit: i64) -> Result<Vec<ProductRecord>> {
        let options = FindOptions::builder().limit(limit).build();

        let mut cursor = self.products.find(doc! {}).with_options(options).await?;

        let mut records = Vec::new();
        while cursor.advance().await? {
            let doc = cursor.deserialize_current()?;
            records.push(ProductRecord {
                product_id: doc.get_str("productId").unwrap_or("").to_string(),
                store_id: doc.get_str("storeId").unwrap_or("").to_string(),
                category: doc.get_str("category").unwrap_or("").to_string(),
                region: doc.get_str("region").unwrap_or("").to_string(),
            });
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::parse_date;

    fn event() -> HistoricalEvent {
        HistoricalEvent {
            date: parse_date("2022-01-01").unwrap(),
            store_id: "S001".to_string(),
            product_id: "P0011".to_string(),
            category: "Toys".to_string(),
            region: "North".to_string(),
            units_sold: 5.0,
            inventory_level: 100.0,
            demand_forecast: None,
            price: 9.99,
            discount: 0.0,
            weather_condition: "Clear".to_string(),
            seasonality: "Regular".to_string(),
        }
    }

    #[test]
    fn test_collection_names() {
        assert_eq!(HISTORY_COLLECTION, "historicaldata");
        assert_eq!(PRODUCTS_COLLECTION, "products");
    }

    #[test]
    fn test_absent_forecast_is_omitted_from_document() {
        let uploaded_at = BsonDateTime::from_millis(0);

        let doc = event_to_document(&event(), uploaded_at);
        assert!(!doc.contains_key("demandForecast"));

        let mut with_forecast = event();
        with_forecast.demand_forecast = Some(6.5);
        let doc = event_to_document(&with_forecast, uploaded_at);
        assert_eq!(doc.get_f64("demandForecast").unwrap(), 6.5);
    }

    #[test]
    fn test_event_document_fields() {
        let uploaded_at = BsonDateTime::from_millis(42);

        let doc = event_to_document(&event(), uploaded_at);
        assert_eq!(doc.get_str("storeId").unwrap(), "S001");
        assert_eq!(doc.get_str("productId").unwrap(), "P0011");
        assert_eq!(doc.get_f64("unitsSold").unwrap(), 5.0);
        assert_eq!(doc.get_datetime("uploadedAt").unwrap(), &uploaded_at);
    }
}
