//! JSON shapes of the marketplace API and their conversion to core types.

use chrono::{DateTime, Utc};
use farm_market_core::{
    Basket, CartLine, LineId, Order, OrderId, OrderItem, OrderStatus, Price, ProductId,
};
use serde::{Deserialize, Serialize};

/// `GET /basket/` body.
///
/// Some server versions return the basket wrapped in a list; the first entry
/// is the buyer's basket and an empty list means an empty basket.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum BasketPayload {
    List(Vec<BasketDto>),
    Single(BasketDto),
}

impl BasketPayload {
    pub(super) fn into_basket(self) -> Basket {
        match self {
            Self::List(baskets) => baskets
                .into_iter()
                .next()
                .map(Basket::from)
                .unwrap_or_default(),
            Self::Single(basket) => basket.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct BasketDto {
    #[serde(default)]
    items: Vec<BasketItemDto>,
    #[serde(default)]
    total_price: Price,
}

#[derive(Debug, Deserialize)]
pub(super) struct BasketItemDto {
    id: LineId,
    product: BasketProductDto,
    quantity: u32,
}

#[derive(Debug, Deserialize)]
struct BasketProductDto {
    id: ProductId,
    name: String,
    price: Price,
}

impl From<BasketDto> for Basket {
    fn from(dto: BasketDto) -> Self {
        Self {
            items: dto.items.into_iter().map(CartLine::from).collect(),
            total_price: dto.total_price,
        }
    }
}

impl From<BasketItemDto> for CartLine {
    fn from(dto: BasketItemDto) -> Self {
        Self {
            line_id: dto.id,
            product_id: dto.product.id,
            title: dto.product.name,
            unit_cost: dto.product.price,
            quantity: dto.quantity,
        }
    }
}

/// `PATCH /basket-items/` body.
#[derive(Debug, Serialize)]
pub(super) struct BatchUpdateRequest<'a> {
    pub updates: &'a [super::QuantityUpdate],
}

/// `POST /basket-items/` body.
#[derive(Debug, Serialize)]
pub(super) struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub(super) struct OrderDto {
    id: OrderId,
    #[serde(default)]
    status: OrderStatus,
    created_at: DateTime<Utc>,
    total_price: Price,
    #[serde(default)]
    items: Vec<OrderItemDto>,
}

#[derive(Debug, Deserialize)]
struct OrderItemDto {
    product: OrderProductDto,
    quantity: u32,
    price: Price,
}

#[derive(Debug, Deserialize)]
struct OrderProductDto {
    id: ProductId,
    name: String,
}

impl From<OrderDto> for Order {
    fn from(dto: OrderDto) -> Self {
        Self {
            id: dto.id,
            status: dto.status,
            created_at: dto.created_at,
            total_price: dto.total_price,
            items: dto
                .items
                .into_iter()
                .map(|item| OrderItem {
                    product_id: item.product.id,
                    product_name: item.product.name,
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
        }
    }
}
