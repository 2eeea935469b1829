//! Basket commands.
//!
//! Each edit loads the basket, applies the change locally, then syncs,
//! the same way a tap followed by leaving the cart screen would.

use std::io;

use farm_market_client::{BasketApi, CartError, CartSyncController};
use farm_market_core::{LineId, ProductId};
use tracing::info;

use super::{CommandResult, output};

/// A local basket edit.
#[derive(Debug, Clone, Copy)]
pub enum Edit {
    Increment(LineId),
    Decrement(LineId),
    Remove(LineId),
    /// Set the line to this quantity; 0 removes it.
    Set(LineId, u32),
}

/// Print the basket.
///
/// # Errors
///
/// Returns an error if the basket cannot be fetched.
pub async fn show<A: BasketApi>(cart: &CartSyncController<A>) -> CommandResult {
    let snapshot = cart.load().await.map_err(alerted)?;
    output::write_basket(&mut io::stdout().lock(), &snapshot)?;
    Ok(())
}

/// Apply one edit and save it.
///
/// # Errors
///
/// Returns an error if the basket cannot be fetched, the line does not
/// exist, or the change is not saved.
pub async fn edit<A: BasketApi>(cart: &CartSyncController<A>, edit: Edit) -> CommandResult {
    cart.load().await.map_err(alerted)?;
    apply(cart, edit).map_err(alerted)?;

    let outcome = cart.on_blur().await.map_err(alerted)?;
    info!(?outcome, "Basket saved");

    output::write_basket(&mut io::stdout().lock(), &cart.snapshot())?;
    Ok(())
}

/// Add a product to the basket.
///
/// # Errors
///
/// Returns an error if the product is already in the basket or the server
/// refuses it.
pub async fn add<A: BasketApi>(
    cart: &CartSyncController<A>,
    product_id: ProductId,
) -> CommandResult {
    cart.load().await.map_err(alerted)?;
    let line = cart.add_product(product_id).await.map_err(alerted)?;

    output::write_added(&mut io::stdout().lock(), &line)?;
    Ok(())
}

/// Place an order from the basket.
///
/// # Errors
///
/// Returns an error if the basket cannot be saved or the order is refused.
pub async fn checkout<A: BasketApi>(cart: &CartSyncController<A>) -> CommandResult {
    cart.load().await.map_err(alerted)?;
    let order = cart.checkout().await.map_err(alerted)?;

    output::write_order(&mut io::stdout().lock(), &order)?;
    Ok(())
}

fn apply<A: BasketApi>(cart: &CartSyncController<A>, edit: Edit) -> Result<(), CartError> {
    match edit {
        Edit::Increment(line_id) => cart.increment(line_id).map(|_| ()),
        Edit::Decrement(line_id) => cart.decrement(line_id).map(|_| ()),
        Edit::Remove(line_id) => cart.remove(line_id).map(|_| ()),
        Edit::Set(line_id, quantity) => cart.set_quantity(line_id, quantity).map(|_| ()),
    }
}

/// Show the user-facing alert, then hand the error back.
fn alerted(err: CartError) -> Box<dyn std::error::Error> {
    // Nothing more to do if stderr is gone.
    let _ = output::write_alert(&mut io::stderr().lock(), &err.alert());
    err.into()
}
