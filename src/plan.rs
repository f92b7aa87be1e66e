use serde::{Deserialize, Serialize};

/// Parameters for one load run, read from a YAML plan file.
///
/// Every field has a default, so a plan file only needs to name the values
/// it overrides. The defaults describe a local MongoDB and a CSV in the
/// working directory.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LoadPlan {
    /// Path to the inventory CSV (header row required).
    pub input: String,
    /// MongoDB connection string.
    pub uri: String,
    /// Database holding the `historicaldata` and `products` collections.
    pub database: String,
    /// Maximum number of historical events per bulk insert.
    pub batch_size: usize,
}

impl Default for LoadPlan {
    fn default() -> Self {
        Self {
            input: "retail_store_inventory.csv".to_string(),
            uri: "mongodb://localhost:27017".to_string(),
            database: "inventory_db".to_string(),
            batch_size: 1000,
        }
    }
}
