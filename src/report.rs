use anyhow::Result;

use crate::storage::{HistoryStore, ProductStore};

/// Prints the post-load verification summary read back from storage. The
/// summary is the program's output, so it goes to stdout rather than the
/// log.
pub async fn print_summary(
    history: &dyn HistoryStore,
    products: &dyn ProductStore,
) -> Result<()> {
    println!("Total historical records: {}", history.count().await?);
    println!("Total products: {}", products.count().await?);

    println!("\nCategory distribution:");
    for (category, count) in products.category_distribution().await? {
        println!("  {}: {}", category, count);
    }

    println!("\nRegion distribution:");
    for (region, count) in products.region_distribution().await? {
        println!("  {}: {}", region, count);
    }

    println!("\nSample products:");
    for product in products.sample(5).await? {
        println!(
            "  {}/{}: {} \u{2022} {}",
            product.product_id, product.store_id, product.category, product.region
        );
    }

    Ok(())
}
