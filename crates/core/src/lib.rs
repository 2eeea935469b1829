//! Farm Market Core - Shared domain types.
//!
//! This crate provides the types shared by every Farm Market component:
//! - `client` - API client and basket synchronization
//! - `cli` - Command-line consumer of the client
//! - `integration-tests` - End-to-end tests against a fake marketplace
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O and no HTTP
//! clients. Wire formats live in the client crate and are converted into
//! these types at the boundary.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, decimal prices, basket lines, orders, products

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
