//! Farm Market buyer client library.
//!
//! Talks to the marketplace REST API and keeps the buyer's basket in sync
//! with the server.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod config;

pub use api::{ApiClient, ApiError, BasketApi};
pub use cart::{
    Alert, CartAction, CartError, CartSnapshot, CartSyncController, PendingChangeSet, SyncOutcome,
};
pub use config::{ClientConfig, ConfigError};
