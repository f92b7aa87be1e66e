use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use csv::StringRecord;
use indexmap::map::Entry;
use indexmap::IndexMap;

use crate::data_loader::InventoryLoadProfile;

/// One immutable record of a product's sales and inventory state at a point
/// in time. Appended to the `historicaldata` collection, one per source row.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalEvent {
    pub date: DateTime<Utc>,
    pub store_id: String,
    pub product_id: String,
    pub category: String,
    pub region: String,
    pub units_sold: f64,
    pub inventory_level: f64,
    /// The only numeric field whose missing state is preserved rather than
    /// defaulted; an absent forecast must not become a spurious zero.
    pub demand_forecast: Option<f64>,
    pub price: f64,
    pub discount: f64,
    pub weather_condition: String,
    pub seasonality: String,
}

impl HistoricalEvent {
    /// Maps one source row to a historical event. Pure; per-field rules are
    /// independent of each other. Unparseable dates and numerics are fatal.
    pub fn from_row(record: &StringRecord, profile: &InventoryLoadProfile) -> Result<Self> {
        let date_raw = get_trimmed_value(record, Some(profile.date_column))
            .ok_or_else(|| anyhow::anyhow!("Missing value in 'Date' column"))?;
        let date =
            parse_date(&date_raw).with_context(|| format!("Unparseable date '{}'", date_raw))?;

        Ok(HistoricalEvent {
            date,
            store_id: get_trimmed_value(record, Some(profile.store_id_column))
                .ok_or_else(|| anyhow::anyhow!("Missing value in 'Store ID' column"))?
                .to_uppercase(),
            product_id: get_trimmed_value(record, Some(profile.product_id_column))
                .ok_or_else(|| anyhow::anyhow!("Missing value in 'Product ID' column"))?
                .to_uppercase(),
            category: get_trimmed_value(record, profile.category_column)
                .unwrap_or_else(|| "Other".to_string()),
            region: get_trimmed_value(record, profile.region_column)
                .unwrap_or_else(|| "Central".to_string()),
            units_sold: parse_numeric(record, profile.units_sold_column, "Units Sold")?
                .unwrap_or(0.0),
            inventory_level: parse_numeric(
                record,
                profile.inventory_level_column,
                "Inventory Level",
            )?
            .unwrap_or(0.0),
            demand_forecast: parse_numeric(
                record,
                profile.demand_forecast_column,
                "Demand Forecast",
            )?,
            price: parse_numeric(record, profile.price_column, "Price")?.unwrap_or(0.0),
            discount: parse_numeric(record, profile.discount_column, "Discount (%)")?
                .unwrap_or(0.0),
            weather_condition: get_trimmed_value(record, profile.weather_condition_column)
                .unwrap_or_else(|| "Clear".to_string()),
            seasonality: get_trimmed_value(record, profile.seasonality_column)
                .unwrap_or_else(|| "Regular".to_string()),
        })
    }
}

/// Group aggregate for one (product, store) pair: identity attributes from
/// the first source row of the group, inventory and price from the last.
/// Ids keep the casing of the source until the upsert builds its key.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRollup {
    pub product_id: String,
    pub store_id: String,
    pub category: String,
    pub region: String,
    pub current_inventory: f64,
    pub price: f64,
}

/// Groups rows by their raw (Product ID, Store ID) pair, reducing each group
/// to first(category, region) and last(inventory, price). First and last are
/// positional, determined by row order in the source table, not by date.
/// Output order is first-appearance order of the groups.
pub fn group_products(
    records: &[StringRecord],
    profile: &InventoryLoadProfile,
) -> Result<Vec<ProductRollup>> {
    let mut groups: IndexMap<(String, String), ProductRollup> = IndexMap::new();

    for record in records {
        let product_id = get_trimmed_value(record, Some(profile.product_id_column))
            .ok_or_else(|| anyhow::anyhow!("Missing value in 'Product ID' column"))?;
        let store_id = get_trimmed_value(record, Some(profile.store_id_column))
            .ok_or_else(|| anyhow::anyhow!("Missing value in 'Store ID' column"))?;
        let inventory = parse_numeric(record, profile.inventory_level_column, "Inventory Level")?
            .unwrap_or(0.0);
        let price = parse_numeric(record, profile.price_column, "Price")?.unwrap_or(0.0);

        match groups.entry((product_id.clone(), store_id.clone())) {
            Entry::Occupied(mut entry) => {
                let rollup = entry.get_mut();
                rollup.current_inventory = inventory;
                rollup.price = price;
            }
            Entry::Vacant(entry) => {
                entry.insert(ProductRollup {
                    product_id,
                    store_id,
                    category: get_trimmed_value(record, profile.category_column)
                        .unwrap_or_else(|| "Other".to_string()),
                    region: get_trimmed_value(record, profile.region_column)
                        .unwrap_or_else(|| "Central".to_string()),
                    current_inventory: inventory,
                    price,
                });
            }
        }
    }

    Ok(groups.into_values().collect())
}

/// Returns the trimmed cell value, treating absent columns and blank cells
/// as missing.
fn get_trimmed_value(record: &StringRecord, column: Option<usize>) -> Option<String> {
    column
        .and_then(|idx| record.get(idx))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_numeric(record: &StringRecord, column: Option<usize>, name: &str) -> Result<Option<f64>> {
    match get_trimmed_value(record, column) {
        Some(raw) => {
            let value = raw.parse::<f64>().with_context(|| {
                format!("Invalid numeric value '{}' in '{}' column", raw, name)
            })?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Parses the source's free-form date representation. Datetime forms are
/// taken as UTC; date-only forms resolve to midnight.
pub fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(dt.and_utc());
        }
    }

    for format in ["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Ok(date.and_time(NaiveTime::MIN).and_utc());
        }
    }

    anyhow::bail!("Unrecognized date format: '{}'", raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loader::create_inventory_load_profile;

    const FULL_HEADERS: [&str; 12] = [
        "Date",
        "Store ID",
        "Product ID",
        "Category",
        "Region",
        "Inventory Level",
        "Units Sold",
        "Demand Forecast",
        "Price",
        "Discount (%)",
        "Weather Condition",
        "Seasonality",
    ];

    fn full_profile() -> InventoryLoadProfile {
        let headers: Vec<String> = FULL_HEADERS.iter().map(|s| s.to_string()).collect();
        create_inventory_load_profile(&headers).unwrap()
    }

    fn record(fields: &[&str]) -> StringRecord {
        StringRecord::from(fields.to_vec())
    }

    #[test]
    fn test_ids_are_uppercased() {
        let profile = full_profile();
        let row = record(&[
            "2022-01-01", "s001", "p0011", "Toys", "North", "100", "5", "6.5", "9.99", "10",
            "Sunny", "Holiday",
        ]);

        let event = HistoricalEvent::from_row(&row, &profile).unwrap();
        assert_eq!(event.store_id, "S001");
        assert_eq!(event.product_id, "P0011");
        assert_eq!(event.category, "Toys");
        assert_eq!(event.units_sold, 5.0);
        assert_eq!(event.demand_forecast, Some(6.5));
        assert_eq!(event.discount, 10.0);
    }

    #[test]
    fn test_string_defaults_for_blank_cells() {
        let profile = full_profile();
        let row = record(&[
            "2022-01-01", "S001", "P0011", "", "  ", "100", "5", "6.5", "9.99", "0", "", "",
        ]);

        let event = HistoricalEvent::from_row(&row, &profile).unwrap();
        assert_eq!(event.category, "Other");
        assert_eq!(event.region, "Central");
        assert_eq!(event.weather_condition, "Clear");
        assert_eq!(event.seasonality, "Regular");
    }

    #[test]
    fn test_missing_forecast_stays_absent_while_other_numerics_default() {
        let profile = full_profile();
        let row = record(&[
            "2022-01-01", "S001", "P0011", "Toys", "North", "", "", "", "", "", "Sunny", "Holiday",
        ]);

        let event = HistoricalEvent::from_row(&row, &profile).unwrap();
        assert_eq!(event.demand_forecast, None);
        assert_eq!(event.units_sold, 0.0);
        assert_eq!(event.inventory_level, 0.0);
        assert_eq!(event.price, 0.0);
        assert_eq!(event.discount, 0.0);
    }

    #[test]
    fn test_absent_discount_column_defaults_to_zero() {
        let headers: Vec<String> = ["Date", "Store ID", "Product ID", "Price"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let profile = create_inventory_load_profile(&headers).unwrap();
        let row = record(&["2022-01-01", "S001", "P0011", "9.99"]);

        let event = HistoricalEvent::from_row(&row, &profile).unwrap();
        assert_eq!(event.discount, 0.0);
        assert_eq!(event.price, 9.99);
        assert_eq!(event.category, "Other");
        assert_eq!(event.seasonality, "Regular");
    }

    #[test]
    fn test_unparseable_date_is_fatal() {
        let profile = full_profile();
        let row = record(&[
            "soon", "S001", "P0011", "Toys", "North", "100", "5", "6.5", "9.99", "0", "Sunny",
            "Holiday",
        ]);

        assert!(HistoricalEvent::from_row(&row, &profile).is_err());
    }

    #[test]
    fn test_unparseable_numeric_is_fatal() {
        let profile = full_profile();
        let row = record(&[
            "2022-01-01", "S001", "P0011", "Toys", "North", "many", "5", "6.5", "9.99", "0",
            "Sunny", "Holiday",
        ]);

        let err = HistoricalEvent::from_row(&row, &profile).unwrap_err();
        assert!(err.to_string().contains("Inventory Level"));
    }

    #[test]
    fn test_date_formats() {
        assert_eq!(
            parse_date("2022-01-15").unwrap(),
            parse_date("01/15/2022").unwrap()
        );
        assert_eq!(
            parse_date("2022-01-15 00:00:00").unwrap(),
            parse_date("2022-01-15").unwrap()
        );
        assert!(parse_date("2022-01-15T08:30:00Z").is_ok());
        assert!(parse_date("15th of January").is_err());
    }

    #[test]
    fn test_group_takes_first_identity_and_last_levels() {
        let profile = full_profile();
        let rows = vec![
            record(&[
                "2022-01-02", "S1", "P1", "A", "North", "10", "1", "1", "9.99", "0", "Sunny",
                "Holiday",
            ]),
            record(&[
                "2022-01-01", "S1", "P1", "B", "South", "5", "1", "1", "7.99", "0", "Rainy",
                "Regular",
            ]),
        ];

        let rollups = group_products(&rows, &profile).unwrap();
        assert_eq!(rollups.len(), 1);
        assert_eq!(rollups[0].category, "A");
        assert_eq!(rollups[0].region, "North");
        assert_eq!(rollups[0].current_inventory, 5.0);
        assert_eq!(rollups[0].price, 7.99);
    }

    #[test]
    fn test_group_keys_keep_source_casing() {
        let profile = full_profile();
        let rows = vec![
            record(&[
                "2022-01-01", "S1", "p1", "A", "North", "10", "1", "1", "9.99", "0", "Sunny",
                "Holiday",
            ]),
            record(&[
                "2022-01-01", "S1", "P1", "B", "South", "5", "1", "1", "7.99", "0", "Rainy",
                "Regular",
            ]),
        ];

        let rollups = group_products(&rows, &profile).unwrap();
        assert_eq!(rollups.len(), 2);
        assert_eq!(rollups[0].product_id, "p1");
        assert_eq!(rollups[1].product_id, "P1");
    }

    #[test]
    fn test_group_order_is_first_appearance() {
        let profile = full_profile();
        let rows = vec![
            record(&[
                "2022-01-01", "S2", "P9", "A", "North", "1", "1", "1", "1", "0", "Sunny", "Regular",
            ]),
            record(&[
                "2022-01-01", "S1", "P1", "A", "North", "1", "1", "1", "1", "0", "Sunny", "Regular",
            ]),
            record(&[
                "2022-01-02", "S2", "P9", "A", "North", "2", "1", "1", "1", "0", "Sunny", "Regular",
            ]),
        ];

        let rollups = group_products(&rows, &profile).unwrap();
        assert_eq!(rollups.len(), 2);
        assert_eq!(rollups[0].product_id, "P9");
        assert_eq!(rollups[1].product_id, "P1");
    }

    #[test]
    fn test_group_of_empty_table_is_empty() {
        let profile = full_profile();
        let rollups = group_products(&[], &profile).unwrap();
        assert!(rollups.is_empty());
    }
}
