//! Read-only listings: order history, products and categories.

use std::io;

use farm_market_client::ApiClient;
use farm_market_core::ProductFilter;
use tracing::info;

use super::{CommandResult, output};

/// List the buyer's orders, newest first.
///
/// # Errors
///
/// Returns an error if the request fails.
pub async fn orders(client: &ApiClient) -> CommandResult {
    let mut orders = client.list_orders().await?;
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    info!(count = orders.len(), "Fetched orders");

    output::write_orders(&mut io::stdout().lock(), &orders)?;
    Ok(())
}

/// List catalog products that pass `filter`.
///
/// # Errors
///
/// Returns an error if the request fails.
pub async fn products(client: &ApiClient, filter: &ProductFilter) -> CommandResult {
    let products = filter.apply(client.list_products().await?);
    info!(count = products.len(), "Fetched products");

    output::write_products(&mut io::stdout().lock(), &products)?;
    Ok(())
}

/// List product categories, with "All" first.
///
/// # Errors
///
/// Returns an error if the request fails.
pub async fn categories(client: &ApiClient) -> CommandResult {
    let categories = client.list_categories().await?;
    info!(count = categories.len(), "Fetched categories");

    output::write_categories(&mut io::stdout().lock(), &categories)?;
    Ok(())
}
