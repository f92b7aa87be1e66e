use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::Result;
use csv::StringRecord;

/// Column offsets for the retail inventory table, resolved once from the
/// header row. Required columns must be present; optional columns may be
/// missing from the file entirely, in which case their fields fall back to
/// the documented defaults.
#[derive(Debug)]
pub struct InventoryLoadProfile {
    pub date_column: usize,
    pub store_id_column: usize,
    pub product_id_column: usize,
    pub category_column: Option<usize>,
    pub region_column: Option<usize>,
    pub units_sold_column: Option<usize>,
    pub inventory_level_column: Option<usize>,
    pub demand_forecast_column: Option<usize>,
    pub price_column: Option<usize>,
    pub discount_column: Option<usize>,
    pub weather_condition_column: Option<usize>,
    pub seasonality_column: Option<usize>,
}

impl Display for InventoryLoadProfile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Inventory column offsets: date:{}, store:{}, product:{}, category:{}, region:{}, units_sold:{}, inventory:{}, forecast:{}, price:{}, discount:{}, weather:{}, seasonality:{}",
            self.date_column,
            self.store_id_column,
            self.product_id_column,
            fmt_optional(self.category_column),
            fmt_optional(self.region_column),
            fmt_optional(self.units_sold_column),
            fmt_optional(self.inventory_level_column),
            fmt_optional(self.demand_forecast_column),
            fmt_optional(self.price_column),
            fmt_optional(self.discount_column),
            fmt_optional(self.weather_condition_column),
            fmt_optional(self.seasonality_column),
        )
    }
}

fn fmt_optional(column: Option<usize>) -> String {
    match column {
        Some(i) => i.to_string(),
        None => "-".to_string(),
    }
}

/// Resolves header names to column offsets, failing when a required column
/// is missing so no row is processed against a malformed file.
pub fn create_inventory_load_profile(headers: &[String]) -> Result<InventoryLoadProfile> {
    let find = |name: &str| headers.iter().position(|h| h == name);
    let required = |name: &str| {
        find(name).ok_or_else(|| anyhow::anyhow!("Missing required column '{}'", name))
    };

    Ok(InventoryLoadProfile {
        date_column: required("Date")?,
        store_id_column: required("Store ID")?,
        product_id_column: required("Product ID")?,
        category_column: find("Category"),
        region_column: find("Region"),
        units_sold_column: find("Units Sold"),
        inventory_level_column: find("Inventory Level"),
        demand_forecast_column: find("Demand Forecast"),
        price_column: find("Price"),
        discount_column: find("Discount (%)"),
        weather_condition_column: find("Weather Condition"),
        seasonality_column: find("Seasonality"),
    })
}

pub fn get_headers_from_file(filename: &str, separator: u8) -> Result<Vec<String>> {
    let file = File::open(filename)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    if let Some(Ok(header)) = lines.next() {
        let headers: Vec<String> = header
            .split(separator as char)
            .map(|col_name| col_name.trim().to_string())
            .collect();

        Ok(headers)
    } else {
        Err(anyhow::anyhow!("Failed to read header from file"))
    }
}

pub fn load_csv(filename: &str) -> Result<Vec<StringRecord>> {
    let path = Path::new(filename);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(true)
        .from_path(path)?;

    let records: Vec<StringRecord> = reader.records().collect::<Result<_, _>>()?;

    Ok(records)
}

pub fn load_tsv(filename: &str) -> Result<Vec<StringRecord>> {
    let path = Path::new(filename);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)?;

    let records: Vec<StringRecord> = reader.records().collect::<Result<_, _>>()?;

    Ok(records)
}
