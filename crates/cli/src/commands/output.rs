//! Plain-text rendering for command output.

use std::io::{self, Write};

use farm_market_client::{Alert, CartSnapshot};
use farm_market_core::{ALL_CATEGORIES, CartLine, Category, Order, Product};

pub fn write_basket(out: &mut impl Write, snapshot: &CartSnapshot) -> io::Result<()> {
    if snapshot.is_empty() {
        writeln!(out, "Your cart is empty")?;
        return Ok(());
    }

    for line in &snapshot.lines {
        writeln!(
            out,
            "#{:<6} {:<30} {:>3} x {:>9} = {:>10}",
            line.line_id,
            line.title,
            line.quantity,
            line.unit_cost.to_string(),
            line.line_total().to_string(),
        )?;
    }
    writeln!(out, "Items: {}", snapshot.item_count())?;
    writeln!(out, "Total: {}", snapshot.total)?;
    if !snapshot.pending.is_empty() {
        writeln!(out, "Unsaved changes: {}", snapshot.pending.len())?;
    }
    Ok(())
}

pub fn write_added(out: &mut impl Write, line: &CartLine) -> io::Result<()> {
    writeln!(
        out,
        "Added {} to cart (line #{}, {})",
        line.title, line.line_id, line.unit_cost
    )
}

pub fn write_order(out: &mut impl Write, order: &Order) -> io::Result<()> {
    writeln!(
        out,
        "Order #{}  {}  {}  {}",
        order.id,
        order.status.label(),
        order.created_at.format("%Y-%m-%d"),
        order.total_price
    )?;
    for item in &order.items {
        writeln!(
            out,
            "    {} x {} ({})",
            item.quantity, item.product_name, item.price
        )?;
    }
    Ok(())
}

pub fn write_orders(out: &mut impl Write, orders: &[Order]) -> io::Result<()> {
    if orders.is_empty() {
        writeln!(out, "No orders yet")?;
        return Ok(());
    }
    orders.iter().try_for_each(|order| write_order(out, order))
}

pub fn write_products(out: &mut impl Write, products: &[Product]) -> io::Result<()> {
    if products.is_empty() {
        return writeln!(out, "No products found");
    }

    for product in products {
        let stock = match product.stock_quantity {
            Some(0) => "out of stock".to_string(),
            Some(units) => format!("{units} in stock"),
            None => String::new(),
        };
        let row = format!(
            "#{:<6} {:<30} {:<20} {:<14} {:>10}  {}",
            product.id,
            product.name,
            product.farm_name().unwrap_or("-"),
            product.category_name().unwrap_or("-"),
            product.price.to_string(),
            stock
        );
        writeln!(out, "{}", row.trim_end())?;
    }
    Ok(())
}

/// Category names for filtering, starting with [`ALL_CATEGORIES`].
pub fn write_categories(out: &mut impl Write, categories: &[Category]) -> io::Result<()> {
    writeln!(out, "{ALL_CATEGORIES}")?;
    categories
        .iter()
        .try_for_each(|category| writeln!(out, "{}", category.name))
}

pub fn write_alert(out: &mut impl Write, alert: &Alert) -> io::Result<()> {
    writeln!(out, "{}: {}", alert.title, alert.message)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use farm_market_client::PendingChangeSet;
    use farm_market_core::{
        CategoryId, Farm, FarmId, LineId, OrderId, OrderItem, OrderStatus, Price, ProductId,
    };

    use super::*;

    fn render(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_empty_basket() {
        let snapshot = CartSnapshot {
            lines: Vec::new(),
            total: Price::ZERO,
            pending: PendingChangeSet::new(),
            syncing: false,
        };
        assert_eq!(render(|out| write_basket(out, &snapshot)), "Your cart is empty\n");
    }

    #[test]
    fn test_basket_lines_and_unsaved_count() {
        let snapshot = CartSnapshot {
            lines: vec![CartLine {
                line_id: LineId::new(3),
                product_id: ProductId::new(30),
                title: "Honey".to_string(),
                unit_cost: Price::from_cents(850),
                quantity: 2,
            }],
            total: Price::from_cents(1700),
            pending: [(LineId::new(3), 2)].into_iter().collect(),
            syncing: false,
        };

        let text = render(|out| write_basket(out, &snapshot));

        assert!(text.contains("Honey"));
        assert!(text.contains("$17.00"));
        assert!(text.contains("Items: 2"));
        assert!(text.contains("Unsaved changes: 1"));
    }

    #[test]
    fn test_order_lines() {
        let order = Order {
            id: OrderId::new(42),
            status: OrderStatus::Completed,
            created_at: Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap(),
            total_price: Price::from_cents(1500),
            items: vec![OrderItem {
                product_id: ProductId::new(10),
                product_name: "Fresh Apples".to_string(),
                quantity: 3,
                price: Price::from_cents(1500),
            }],
        };

        let text = render(|out| write_orders(out, &[order]));

        assert!(text.starts_with("Order #42  Completed  2026-05-04  $15.00\n"));
        assert!(text.contains("3 x Fresh Apples ($15.00)"));
    }

    #[test]
    fn test_no_orders() {
        assert_eq!(render(|out| write_orders(out, &[])), "No orders yet\n");
    }

    #[test]
    fn test_alert() {
        let alert = Alert {
            title: "Already Added",
            message: "Product 3 is already in the cart.".to_string(),
            retryable: false,
        };
        assert_eq!(
            render(|out| write_alert(out, &alert)),
            "Already Added: Product 3 is already in the cart.\n"
        );
    }

    #[test]
    fn test_product_rows_show_farm_category_and_stock() {
        let honey = Product {
            id: ProductId::new(4),
            name: "Raw Honey".to_string(),
            price: Price::from_cents(850),
            description: None,
            farm: Some(Farm {
                id: FarmId::new(2),
                name: "Sunny Acres".to_string(),
            }),
            category: Some(Category {
                id: CategoryId::new(3),
                name: "Pantry".to_string(),
            }),
            stock_quantity: Some(0),
        };
        let bare = Product {
            id: ProductId::new(5),
            name: "Mystery Box".to_string(),
            price: Price::from_cents(100),
            description: None,
            farm: None,
            category: None,
            stock_quantity: None,
        };

        let text = render(|out| write_products(out, &[honey, bare]));
        let rows: Vec<&str> = text.lines().collect();

        assert_eq!(rows.len(), 2);
        assert!(rows.first().unwrap().contains("Sunny Acres"));
        assert!(rows.first().unwrap().contains("Pantry"));
        assert!(rows.first().unwrap().ends_with("$8.50  out of stock"));
        assert!(rows.last().unwrap().ends_with("$1.00"));
    }

    #[test]
    fn test_no_products() {
        assert_eq!(render(|out| write_products(out, &[])), "No products found\n");
    }

    #[test]
    fn test_categories_start_with_all() {
        let categories = vec![Category {
            id: CategoryId::new(1),
            name: "Fruit".to_string(),
        }];
        assert_eq!(render(|out| write_categories(out, &categories)), "All\nFruit\n");
    }
}
