//! Farm Market REST API client.
//!
//! # Architecture
//!
//! - Plain JSON over HTTPS via `reqwest`; the server owns all basket state
//! - Bearer token on every request, refreshed once and retried on a 401
//! - Wire shapes live in `wire` and are converted into `farm-market-core`
//!   types at the boundary
//!
//! # Endpoints
//!
//! | Method  | Path              | Purpose                          |
//! |---------|-------------------|----------------------------------|
//! | `GET`   | `/basket/`        | Fetch the buyer's basket         |
//! | `PATCH` | `/basket-items/`  | Batch-update line quantities     |
//! | `POST`  | `/basket-items/`  | Add a product to the basket      |
//! | `POST`  | `/orders/`        | Place an order from the basket   |
//! | `GET`   | `/orders/`        | List the buyer's orders          |
//! | `GET`   | `/products/`      | List catalog products            |
//! | `GET`   | `/categories/`    | List product categories          |
//! | `POST`  | `/token/`         | Obtain access and refresh tokens |
//! | `POST`  | `/token/refresh/` | Exchange refresh for access      |

pub mod auth;
mod client;
mod wire;

use std::future::Future;

use farm_market_core::{Basket, CartLine, LineId, Order, ProductId};
use serde::Serialize;
use thiserror::Error;

pub use auth::AuthTokens;
pub use client::ApiClient;

/// Errors that can occur when talking to the marketplace API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed or timed out.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Request was rejected as unauthenticated and could not be recovered
    /// by refreshing the access token.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// API returned a non-success status.
    #[error("API error: {status} - {message}")]
    Status { status: u16, message: String },

    /// Response body did not match the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl ApiError {
    /// Whether this error means the session is no longer authenticated.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// HTTP status code, if the server answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            Self::Unauthorized(_) | Self::Parse(_) => None,
        }
    }
}

/// One entry of a batched quantity update. A quantity of 0 deletes the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuantityUpdate {
    pub id: LineId,
    pub quantity: u32,
}

/// The basket operations the cart controller depends on.
///
/// [`ApiClient`] is the production implementation; tests substitute
/// in-memory doubles.
pub trait BasketApi: Send + Sync {
    /// Fetch the authoritative basket.
    fn fetch_basket(&self) -> impl Future<Output = Result<Basket, ApiError>> + Send;

    /// Apply every update in one request.
    fn update_quantities(
        &self,
        updates: Vec<QuantityUpdate>,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Add `quantity` units of a product as a new basket line.
    fn add_product(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<CartLine, ApiError>> + Send;

    /// Create an order from the server-side basket.
    fn place_order(&self) -> impl Future<Output = Result<Order, ApiError>> + Send;
}
