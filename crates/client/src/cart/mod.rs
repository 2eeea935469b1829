//! Buyer basket with optimistic edits and batched synchronization.
//!
//! [`CartSyncController`] applies quantity edits to the local basket at once
//! and collects them in a [`PendingChangeSet`]. The set is sent as a single
//! batch when the cart view loses focus or when the buyer checks out.

mod controller;
mod error;
mod pending;

pub use controller::{CartSnapshot, CartSyncController, SyncOutcome};
pub use error::{Alert, CartAction, CartError};
pub use pending::PendingChangeSet;
