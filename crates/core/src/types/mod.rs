//! Core types for Farm Market.
//!
//! This module provides type-safe wrappers for the marketplace domain.

pub mod basket;
pub mod id;
pub mod order;
pub mod price;
pub mod product;

pub use basket::{Basket, CartLine};
pub use id::*;
pub use order::{Order, OrderItem, OrderStatus};
pub use price::Price;
pub use product::{ALL_CATEGORIES, Category, Farm, Product, ProductFilter};
