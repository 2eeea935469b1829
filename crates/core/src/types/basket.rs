//! Basket and basket line types.
//!
//! A [`Basket`] is the client's cached copy of the server-owned basket. Its
//! `total_price` is the server figure at fetch time; the cart controller
//! projects it forward between fetches.

use serde::{Deserialize, Serialize};

use super::id::{LineId, ProductId};
use super::price::Price;

/// One product entry in the basket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Server-issued basket entry ID.
    pub line_id: LineId,
    /// The product this line holds.
    pub product_id: ProductId,
    /// Product name at fetch time.
    pub title: String,
    /// Unit price at fetch time.
    pub unit_cost: Price,
    /// Number of units, always at least 1.
    pub quantity: u32,
}

impl CartLine {
    /// Price of the whole line.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_cost.times(self.quantity)
    }
}

/// The buyer's basket as last fetched from the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Basket {
    /// Lines in server order.
    pub items: Vec<CartLine>,
    /// Server-computed total.
    pub total_price: Price,
}

impl Basket {
    /// Look up a line by its ID.
    #[must_use]
    pub fn line(&self, line_id: LineId) -> Option<&CartLine> {
        self.items.iter().find(|line| line.line_id == line_id)
    }

    /// Look up the line holding a product.
    #[must_use]
    pub fn line_for_product(&self, product_id: ProductId) -> Option<&CartLine> {
        self.items.iter().find(|line| line.product_id == product_id)
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|line| line.quantity).sum()
    }

    /// Sum of `unit_cost * quantity` over all lines.
    #[must_use]
    pub fn computed_total(&self) -> Price {
        self.items.iter().map(CartLine::line_total).sum()
    }

    /// Whether the basket has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: i32, product: i32, cents: i64, quantity: u32) -> CartLine {
        CartLine {
            line_id: LineId::new(id),
            product_id: ProductId::new(product),
            title: format!("Product {product}"),
            unit_cost: Price::from_cents(cents),
            quantity,
        }
    }

    #[test]
    fn test_computed_total_sums_lines() {
        let basket = Basket {
            items: vec![line(1, 10, 500, 2), line(2, 20, 300, 1)],
            total_price: Price::from_cents(1300),
        };
        assert_eq!(basket.computed_total(), Price::from_cents(1300));
        assert_eq!(basket.item_count(), 3);
    }

    #[test]
    fn test_lookup_by_line_and_product() {
        let basket = Basket {
            items: vec![line(1, 10, 500, 2), line(2, 20, 300, 1)],
            total_price: Price::from_cents(1300),
        };
        assert_eq!(
            basket.line(LineId::new(2)).map(|l| l.product_id),
            Some(ProductId::new(20))
        );
        assert_eq!(
            basket.line_for_product(ProductId::new(10)).map(|l| l.line_id),
            Some(LineId::new(1))
        );
        assert!(basket.line(LineId::new(99)).is_none());
    }

    #[test]
    fn test_empty_basket() {
        let basket = Basket::default();
        assert!(basket.is_empty());
        assert_eq!(basket.computed_total(), Price::ZERO);
        assert_eq!(basket.item_count(), 0);
    }
}
