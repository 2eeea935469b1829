//! Cart errors and their user-facing alerts.
//!
//! Every failure that reaches the cart controller's caller is a
//! [`CartError`]. The UI shows [`CartError::alert`] instead of the raw
//! message; none of these errors is fatal to the view.

use std::fmt;

use farm_market_core::{LineId, ProductId};
use thiserror::Error;

use crate::api::ApiError;

/// Errors returned by the cart controller.
#[derive(Debug, Error)]
pub enum CartError {
    /// A request failed in transit or was refused.
    #[error("Network error while {action}: {source}")]
    Network {
        action: CartAction,
        #[source]
        source: ApiError,
    },

    /// The session expired and could not be refreshed.
    #[error("Auth error: {0}")]
    Auth(#[source] ApiError),

    /// The batched quantity update was not applied.
    #[error("Sync error: {0}")]
    Sync(#[source] ApiError),

    /// The server refused to create the order.
    #[error("Order rejected: {0}")]
    OrderRejected(#[source] ApiError),

    /// No line with this ID is in the local basket.
    #[error("Line not found: {0}")]
    LineNotFound(LineId),

    /// The product already has a line in the basket.
    #[error("Product already in basket: {0}")]
    AlreadyInBasket(ProductId),
}

impl CartError {
    /// Classify a failed fetch or add.
    pub(crate) fn network(action: CartAction, err: ApiError) -> Self {
        if err.is_unauthorized() {
            Self::Auth(err)
        } else {
            Self::Network {
                action,
                source: err,
            }
        }
    }

    /// Classify a failed batch update.
    pub(crate) fn sync(err: ApiError) -> Self {
        if err.is_unauthorized() {
            Self::Auth(err)
        } else {
            Self::Sync(err)
        }
    }

    /// Classify a failed order placement.
    pub(crate) fn order(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized(_) => Self::Auth(err),
            ApiError::Http(_) => Self::Network {
                action: CartAction::Checkout,
                source: err,
            },
            ApiError::Status { .. } | ApiError::Parse(_) => Self::OrderRejected(err),
        }
    }

    /// Whether repeating the same action may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Sync(_) | Self::OrderRejected(_)
        )
    }

    /// The alert to show the user for this error.
    #[must_use]
    pub fn alert(&self) -> Alert {
        let (title, message) = match self {
            Self::Network { action, .. } => {
                (action.alert_title(), action.alert_message().to_string())
            }
            Self::Auth(_) => (
                "Session expired",
                "Please log in again to continue.".to_string(),
            ),
            Self::Sync(_) => (
                "Cart not saved",
                "Your cart changes could not be saved. Please try again.".to_string(),
            ),
            Self::OrderRejected(_) => (
                "Checkout failed",
                "Your order could not be placed. Please try again.".to_string(),
            ),
            Self::LineNotFound(_) => (
                "Error",
                "That item is no longer in your cart.".to_string(),
            ),
            Self::AlreadyInBasket(product_id) => (
                "Already Added",
                format!("Product {product_id} is already in the cart."),
            ),
        };

        Alert {
            title,
            message,
            retryable: self.is_retryable(),
        }
    }
}

/// The cart operation a network failure interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartAction {
    Load,
    AddProduct,
    Checkout,
}

impl CartAction {
    const fn alert_title(self) -> &'static str {
        match self {
            Self::Load | Self::AddProduct => "Error",
            Self::Checkout => "Checkout failed",
        }
    }

    const fn alert_message(self) -> &'static str {
        match self {
            Self::Load => "Failed to fetch cart items. Pull to refresh to try again.",
            Self::AddProduct => "Failed to add product to cart. Please try again.",
            Self::Checkout => "Could not reach the server to place your order. Please try again.",
        }
    }
}

impl fmt::Display for CartAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Load => "loading the basket",
            Self::AddProduct => "adding a product",
            Self::Checkout => "placing the order",
        })
    }
}

/// A non-fatal, user-facing error notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: &'static str,
    pub message: String,
    /// Whether to offer a retry action.
    pub retryable: bool,
}
