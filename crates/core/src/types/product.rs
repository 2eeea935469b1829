//! Catalog products and the buyer-side catalog filter.

use serde::{Deserialize, Serialize};

use super::id::{CategoryId, FarmId, ProductId};
use super::price::Price;

/// Category name that disables category filtering.
pub const ALL_CATEGORIES: &str = "All";

/// A product listed in the marketplace catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    #[serde(default)]
    pub description: Option<String>,
    /// Farm selling the product.
    #[serde(default)]
    pub farm: Option<Farm>,
    #[serde(default)]
    pub category: Option<Category>,
    /// Units left in stock.
    #[serde(default)]
    pub stock_quantity: Option<u32>,
}

impl Product {
    /// Name of the selling farm, if known.
    #[must_use]
    pub fn farm_name(&self) -> Option<&str> {
        self.farm.as_ref().map(|farm| farm.name.as_str())
    }

    /// Name of the product's category, if known.
    #[must_use]
    pub fn category_name(&self) -> Option<&str> {
        self.category.as_ref().map(|category| category.name.as_str())
    }
}

/// A farm as embedded in product listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Farm {
    pub id: FarmId,
    pub name: String,
}

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

/// Text search and category filter over the catalog.
///
/// The search text matches the product name or the farm name, ignoring
/// case. A category of [`ALL_CATEGORIES`] is the same as no category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    search: Option<String>,
    category: Option<String>,
}

impl ProductFilter {
    /// A filter that matches every product.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only products whose name or farm contains `text`.
    #[must_use]
    pub fn search(mut self, text: &str) -> Self {
        let text = text.trim();
        self.search = (!text.is_empty()).then(|| text.to_lowercase());
        self
    }

    /// Only products in the named category.
    #[must_use]
    pub fn category(mut self, name: &str) -> Self {
        let name = name.trim();
        self.category = (!name.is_empty() && !name.eq_ignore_ascii_case(ALL_CATEGORIES))
            .then(|| name.to_lowercase());
        self
    }

    /// Whether `product` passes the filter.
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        let search_ok = self.search.as_deref().is_none_or(|needle| {
            product.name.to_lowercase().contains(needle)
                || product
                    .farm_name()
                    .is_some_and(|farm| farm.to_lowercase().contains(needle))
        });
        let category_ok = self.category.as_deref().is_none_or(|wanted| {
            product
                .category_name()
                .is_some_and(|name| name.to_lowercase() == wanted)
        });
        search_ok && category_ok
    }

    /// Keep the matching products, preserving order.
    #[must_use]
    pub fn apply(&self, products: Vec<Product>) -> Vec<Product> {
        products
            .into_iter()
            .filter(|product| self.matches(product))
            .collect()
    }
}
