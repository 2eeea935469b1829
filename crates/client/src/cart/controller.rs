//! Optimistic cart state with batched server synchronization.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use farm_market_core::{CartLine, LineId, Order, Price, ProductId};
use tracing::{debug, info, instrument, warn};

use super::error::{CartAction, CartError};
use super::pending::PendingChangeSet;
use crate::api::BasketApi;

/// Owns the local view of the buyer's basket and reconciles it with the
/// server.
///
/// Quantity edits are applied locally at once and recorded in a
/// [`PendingChangeSet`]. Nothing is sent until a sync point: [`Self::on_blur`]
/// when the cart view loses focus, or the start of [`Self::checkout`]. At a
/// sync point the whole pending set goes to the server as one batch.
///
/// The controller is a handle; clones share the same cart. Create one per
/// cart session.
///
/// # Concurrency
///
/// Local mutations take a short lock on the cart state and never wait on the
/// network. Network operations (`load`, `sync`, `checkout`, `add_product`)
/// are serialized: an overlapping call waits for the one in flight, then
/// re-evaluates. A sync captures the pending set when it starts; edits made
/// while the request is in flight collect in a fresh set for the next sync.
pub struct CartSyncController<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for CartSyncController<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<A> {
    api: A,
    state: Mutex<CartState>,
    /// Serializes network operations.
    network: tokio::sync::Mutex<()>,
    syncing: AtomicBool,
}

#[derive(Default)]
struct CartState {
    lines: Vec<CartLine>,
    /// Server total at last load, adjusted by every local edit since.
    total: Price,
    pending: PendingChangeSet,
}

impl CartState {
    fn line_mut(&mut self, line_id: LineId) -> Result<&mut CartLine, CartError> {
        self.lines
            .iter_mut()
            .find(|line| line.line_id == line_id)
            .ok_or(CartError::LineNotFound(line_id))
    }

    fn increment(&mut self, line_id: LineId) -> Result<u32, CartError> {
        let line = self.line_mut(line_id)?;
        line.quantity = line.quantity.saturating_add(1);
        let (unit_cost, quantity) = (line.unit_cost, line.quantity);
        self.total += unit_cost;
        self.pending.record(line_id, quantity);
        Ok(quantity)
    }

    fn decrement(&mut self, line_id: LineId) -> Result<u32, CartError> {
        let line = self.line_mut(line_id)?;
        if line.quantity <= 1 {
            return Ok(line.quantity);
        }
        line.quantity -= 1;
        let (unit_cost, quantity) = (line.unit_cost, line.quantity);
        self.total -= unit_cost;
        self.pending.record(line_id, quantity);
        Ok(quantity)
    }

    fn set_quantity(&mut self, line_id: LineId, quantity: u32) -> Result<u32, CartError> {
        if quantity == 0 {
            self.remove(line_id)?;
            return Ok(0);
        }
        let line = self.line_mut(line_id)?;
        let previous = line.quantity;
        if previous == quantity {
            return Ok(quantity);
        }
        line.quantity = quantity;
        let unit_cost = line.unit_cost;
        if quantity > previous {
            self.total += unit_cost.times(quantity - previous);
        } else {
            self.total -= unit_cost.times(previous - quantity);
        }
        self.pending.record(line_id, quantity);
        Ok(quantity)
    }

    fn remove(&mut self, line_id: LineId) -> Result<CartLine, CartError> {
        let index = self
            .lines
            .iter()
            .position(|line| line.line_id == line_id)
            .ok_or(CartError::LineNotFound(line_id))?;
        let line = self.lines.remove(index);
        self.total -= line.line_total();
        self.pending.record(line_id, 0);
        Ok(line)
    }
}

/// Read-only copy of the cart for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSnapshot {
    pub lines: Vec<CartLine>,
    /// Locally projected total.
    pub total: Price,
    /// Changes not yet handed to the server.
    pub pending: PendingChangeSet,
    /// Whether a batch update is in flight.
    pub syncing: bool,
}

impl CartSnapshot {
    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Look up a line by its ID.
    #[must_use]
    pub fn line(&self, line_id: LineId) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.line_id == line_id)
    }
}

/// Result of a successful sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing was pending; no request was sent.
    Clean,
    /// One batch carrying this many line updates was accepted.
    Synced { lines: usize },
}

impl<A: BasketApi> CartSyncController<A> {
    /// Create an empty cart session over `api`. Call [`Self::load`] next.
    pub fn new(api: A) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                state: Mutex::new(CartState::default()),
                network: tokio::sync::Mutex::new(()),
                syncing: AtomicBool::new(false),
            }),
        }
    }

    /// The API this controller talks to.
    pub fn api(&self) -> &A {
        &self.inner.api
    }

    // =========================================================================
    // Network Operations
    // =========================================================================

    /// Fetch the basket and replace local state with it.
    ///
    /// The server's lines and total replace the local ones wholesale and any
    /// unsynced changes are dropped: the latest full fetch is authoritative.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Network` (or `Auth`) if the fetch fails; local
    /// state is left untouched.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<CartSnapshot, CartError> {
        let _network = self.inner.network.lock().await;

        let basket = self.inner.api.fetch_basket().await.map_err(|e| {
            warn!(error = %e, "Failed to fetch basket");
            CartError::network(CartAction::Load, e)
        })?;

        info!(
            lines = basket.items.len(),
            total = %basket.total_price,
            "Basket loaded"
        );
        Ok(self.replace(basket.items, basket.total_price))
    }

    /// Send all pending changes to the server as one batch.
    ///
    /// Does nothing, and makes no request, when nothing is pending.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Sync` (or `Auth`) if the batch is rejected. The
    /// pending changes are kept for the next attempt and the local cart is
    /// not rolled back.
    #[instrument(skip(self))]
    pub async fn sync(&self) -> Result<SyncOutcome, CartError> {
        let _network = self.inner.network.lock().await;
        self.flush().await
    }

    /// Sync point for the cart view losing focus.
    ///
    /// # Errors
    ///
    /// Same as [`Self::sync`].
    pub async fn on_blur(&self) -> Result<SyncOutcome, CartError> {
        debug!("Cart view lost focus");
        self.sync().await
    }

    /// Sync pending changes, then place the order.
    ///
    /// The order is never placed while local edits are unconfirmed. On
    /// success the local cart is emptied, matching the server basket.
    ///
    /// # Errors
    ///
    /// Returns the sync error if the changes could not be saved (no order is
    /// attempted), or `CartError::OrderRejected` (or `Network`/`Auth`) if the
    /// order itself fails.
    #[instrument(skip(self))]
    pub async fn checkout(&self) -> Result<Order, CartError> {
        let _network = self.inner.network.lock().await;

        if let Err(e) = self.flush().await {
            warn!(error = %e, "Checkout aborted, cart changes not saved");
            return Err(e);
        }

        let order = self.inner.api.place_order().await.map_err(|e| {
            warn!(error = %e, "Failed to place order");
            CartError::order(e)
        })?;

        self.replace(Vec::new(), Price::ZERO);
        info!(order_id = %order.id, total = %order.total_price, "Order placed");
        Ok(order)
    }

    /// Add one unit of a product as a new line.
    ///
    /// Pending changes are synced first, so a line removed locally is gone on
    /// the server before the product is added again.
    ///
    /// # Errors
    ///
    /// Returns the sync error if pending changes could not be saved (nothing
    /// is added), `CartError::AlreadyInBasket` if the product already has a
    /// line, or `CartError::Network` (or `Auth`) if the server refuses.
    #[instrument(skip(self))]
    pub async fn add_product(&self, product_id: ProductId) -> Result<CartLine, CartError> {
        let _network = self.inner.network.lock().await;

        if let Err(e) = self.flush().await {
            warn!(error = %e, "Add aborted, cart changes not saved");
            return Err(e);
        }

        if self.has_product(product_id) {
            return Err(CartError::AlreadyInBasket(product_id));
        }

        let line = self
            .inner
            .api
            .add_product(product_id, 1)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to add product");
                CartError::network(CartAction::AddProduct, e)
            })?;

        self.append(line.clone());
        info!(line_id = %line.line_id, "Product added to basket");
        Ok(line)
    }

    /// Send the pending set. Caller holds the network lock.
    async fn flush(&self) -> Result<SyncOutcome, CartError> {
        let batch = self.take_pending();
        if batch.is_empty() {
            debug!("Nothing to sync");
            return Ok(SyncOutcome::Clean);
        }

        let lines = batch.len();
        self.inner.syncing.store(true, Ordering::Release);
        let result = self.inner.api.update_quantities(batch.to_updates()).await;
        self.inner.syncing.store(false, Ordering::Release);

        match result {
            Ok(()) => {
                info!(lines, "Cart changes synced");
                Ok(SyncOutcome::Synced { lines })
            }
            Err(e) => {
                warn!(error = %e, lines, "Cart sync failed, keeping changes");
                self.restore_pending(batch);
                Err(CartError::sync(e))
            }
        }
    }

    // =========================================================================
    // Local Mutations
    // =========================================================================

    /// Add one unit to a line. Returns the new quantity.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` if the line is not in the cart.
    pub fn increment(&self, line_id: LineId) -> Result<u32, CartError> {
        let quantity = self.state().increment(line_id)?;
        debug!(%line_id, quantity, "Incremented line");
        Ok(quantity)
    }

    /// Remove one unit from a line, stopping at 1. Returns the new quantity.
    ///
    /// Use [`Self::remove`] to delete a line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` if the line is not in the cart.
    pub fn decrement(&self, line_id: LineId) -> Result<u32, CartError> {
        let quantity = self.state().decrement(line_id)?;
        debug!(%line_id, quantity, "Decremented line");
        Ok(quantity)
    }

    /// Set a line to `quantity` in one step. Returns the new quantity.
    ///
    /// A quantity of 0 deletes the line. Setting the current quantity is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` if the line is not in the cart.
    pub fn set_quantity(&self, line_id: LineId, quantity: u32) -> Result<u32, CartError> {
        let quantity = self.state().set_quantity(line_id, quantity)?;
        debug!(%line_id, quantity, "Set line quantity");
        Ok(quantity)
    }

    /// Delete a line. Returns the removed line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` if the line is not in the cart.
    pub fn remove(&self, line_id: LineId) -> Result<CartLine, CartError> {
        let line = self.state().remove(line_id)?;
        debug!(%line_id, "Removed line");
        Ok(line)
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Copy of the current cart for rendering.
    pub fn snapshot(&self) -> CartSnapshot {
        let state = self.state();
        CartSnapshot {
            lines: state.lines.clone(),
            total: state.total,
            pending: state.pending.clone(),
            syncing: self.is_syncing(),
        }
    }

    /// Changes not yet handed to the server.
    pub fn pending(&self) -> PendingChangeSet {
        self.state().pending.clone()
    }

    /// Locally projected total.
    pub fn total(&self) -> Price {
        self.state().total
    }

    /// Whether a batch update is in flight.
    pub fn is_syncing(&self) -> bool {
        self.inner.syncing.load(Ordering::Acquire)
    }

    // =========================================================================
    // State Helpers
    // =========================================================================

    fn state(&self) -> MutexGuard<'_, CartState> {
        // Every critical section leaves the state consistent, so a panic
        // elsewhere does not invalidate it.
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn replace(&self, lines: Vec<CartLine>, total: Price) -> CartSnapshot {
        let mut state = self.state();
        if !state.pending.is_empty() {
            warn!(
                discarded = state.pending.len(),
                "Discarding unsynced cart changes"
            );
        }
        state.lines = lines;
        state.total = total;
        state.pending.clear();
        CartSnapshot {
            lines: state.lines.clone(),
            total: state.total,
            pending: PendingChangeSet::new(),
            syncing: false,
        }
    }

    fn take_pending(&self) -> PendingChangeSet {
        self.state().pending.take()
    }

    fn restore_pending(&self, batch: PendingChangeSet) {
        self.state().pending.restore(batch);
    }

    fn has_product(&self, product_id: ProductId) -> bool {
        self.state()
            .lines
            .iter()
            .any(|line| line.product_id == product_id)
    }

    fn append(&self, line: CartLine) {
        let mut state = self.state();
        if state.lines.iter().any(|l| l.line_id == line.line_id) {
            return;
        }
        state.total += line.line_total();
        state.lines.push(line);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicI32, AtomicUsize};

    use farm_market_core::{Basket, OrderId, OrderStatus};
    use proptest::prelude::*;
    use tokio::sync::Notify;

    use super::*;
    use crate::api::{ApiError, QuantityUpdate};

    // =========================================================================
    // Test Double
    // =========================================================================

    /// Pauses `update_quantities` until released.
    #[derive(Default)]
    struct UpdateGate {
        started: Notify,
        release: Notify,
    }

    #[derive(Default)]
    struct MockBasketApi {
        basket: Mutex<Basket>,
        fail_fetch: AtomicBool,
        fail_update: AtomicBool,
        fail_order: AtomicBool,
        /// Every API call in order: "fetch", "update", "add" or "order".
        calls: Mutex<Vec<&'static str>>,
        order_calls: AtomicUsize,
        update_calls: Mutex<Vec<Vec<QuantityUpdate>>>,
        next_line_id: AtomicI32,
        gate: Option<UpdateGate>,
    }

    impl MockBasketApi {
        fn with_basket(basket: Basket) -> Self {
            Self {
                basket: Mutex::new(basket),
                next_line_id: AtomicI32::new(100),
                ..Self::default()
            }
        }

        fn gated(basket: Basket) -> Self {
            Self {
                gate: Some(UpdateGate::default()),
                ..Self::with_basket(basket)
            }
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn update_calls(&self) -> Vec<Vec<QuantityUpdate>> {
            self.update_calls.lock().unwrap().clone()
        }

        fn order_calls(&self) -> usize {
            self.order_calls.load(Ordering::SeqCst)
        }

        fn set_fail_update(&self, fail: bool) {
            self.fail_update.store(fail, Ordering::SeqCst);
        }

        async fn update_started(&self) {
            self.gate.as_ref().unwrap().started.notified().await;
        }

        fn release_update(&self) {
            self.gate.as_ref().unwrap().release.notify_one();
        }

        fn server_error() -> ApiError {
            ApiError::Status {
                status: 500,
                message: "server error".to_string(),
            }
        }
    }

    impl BasketApi for MockBasketApi {
        async fn fetch_basket(&self) -> Result<Basket, ApiError> {
            self.record("fetch");
            if self.fail_fetch.load(Ordering::SeqCst) {
                return Err(Self::server_error());
            }
            Ok(self.basket.lock().unwrap().clone())
        }

        async fn update_quantities(&self, updates: Vec<QuantityUpdate>) -> Result<(), ApiError> {
            self.record("update");
            self.update_calls.lock().unwrap().push(updates);
            if let Some(gate) = &self.gate {
                gate.started.notify_one();
                gate.release.notified().await;
            }
            if self.fail_update.load(Ordering::SeqCst) {
                return Err(Self::server_error());
            }
            Ok(())
        }

        async fn add_product(
            &self,
            product_id: ProductId,
            quantity: u32,
        ) -> Result<CartLine, ApiError> {
            self.record("add");
            let line_id = self.next_line_id.fetch_add(1, Ordering::SeqCst);
            Ok(CartLine {
                line_id: LineId::new(line_id),
                product_id,
                title: format!("Product {product_id}"),
                unit_cost: Price::from_cents(250),
                quantity,
            })
        }

        async fn place_order(&self) -> Result<Order, ApiError> {
            self.record("order");
            self.order_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_order.load(Ordering::SeqCst) {
                return Err(ApiError::Status {
                    status: 400,
                    message: "basket is empty".to_string(),
                });
            }
            Ok(Order {
                id: OrderId::new(1),
                status: OrderStatus::Pending,
                created_at: chrono::Utc::now(),
                total_price: Price::from_cents(300),
                items: Vec::new(),
            })
        }
    }

    // =========================================================================
    // Fixtures
    // =========================================================================

    fn line(id: i32) -> LineId {
        LineId::new(id)
    }

    fn cart_line(id: i32, quantity: u32, cents: i64) -> CartLine {
        CartLine {
            line_id: line(id),
            product_id: ProductId::new(id * 10),
            title: format!("Item {id}"),
            unit_cost: Price::from_cents(cents),
            quantity,
        }
    }

    /// Line 1: 2 x 5.00, line 2: 1 x 3.00, total 13.00.
    fn sample_basket() -> Basket {
        Basket {
            items: vec![cart_line(1, 2, 500), cart_line(2, 1, 300)],
            total_price: Price::from_cents(1300),
        }
    }

    async fn loaded_cart() -> CartSyncController<MockBasketApi> {
        let cart = CartSyncController::new(MockBasketApi::with_basket(sample_basket()));
        cart.load().await.unwrap();
        cart
    }

    fn pending_of(entries: &[(i32, u32)]) -> PendingChangeSet {
        entries.iter().map(|&(id, qty)| (line(id), qty)).collect()
    }

    fn resummed(snapshot: &CartSnapshot) -> Price {
        snapshot.lines.iter().map(CartLine::line_total).sum()
    }

    // =========================================================================
    // Load
    // =========================================================================

    #[tokio::test]
    async fn test_load_replaces_state_from_server() {
        let cart = CartSyncController::new(MockBasketApi::with_basket(sample_basket()));
        let snapshot = cart.load().await.unwrap();

        assert_eq!(snapshot.lines.len(), 2);
        assert_eq!(snapshot.total, Price::from_cents(1300));
        assert!(snapshot.pending.is_empty());
        assert_eq!(snapshot.item_count(), 3);
    }

    #[tokio::test]
    async fn test_load_discards_pending_and_resets_total() {
        let cart = loaded_cart().await;
        cart.increment(line(1)).unwrap();
        cart.remove(line(2)).unwrap();

        let snapshot = cart.load().await.unwrap();

        assert!(snapshot.pending.is_empty());
        assert_eq!(snapshot.total, Price::from_cents(1300));
        assert_eq!(snapshot.line(line(1)).unwrap().quantity, 2);
        assert!(snapshot.line(line(2)).is_some());
    }

    #[tokio::test]
    async fn test_load_takes_server_total_even_if_it_disagrees() {
        let mut basket = sample_basket();
        basket.total_price = Price::from_cents(1250);
        let cart = CartSyncController::new(MockBasketApi::with_basket(basket));

        let snapshot = cart.load().await.unwrap();
        assert_eq!(snapshot.total, Price::from_cents(1250));
    }

    #[tokio::test]
    async fn test_failed_load_leaves_state_untouched() {
        let cart = loaded_cart().await;
        cart.increment(line(1)).unwrap();
        let before = cart.snapshot();

        cart.api().fail_fetch.store(true, Ordering::SeqCst);
        let result = cart.load().await;

        assert!(matches!(
            result,
            Err(CartError::Network {
                action: CartAction::Load,
                ..
            })
        ));
        assert_eq!(cart.snapshot(), before);
    }

    // =========================================================================
    // Local Mutations
    // =========================================================================

    #[tokio::test]
    async fn test_checkout_scenario_from_fresh_load() {
        let cart = loaded_cart().await;

        assert_eq!(cart.increment(line(1)).unwrap(), 3);
        assert_eq!(cart.total(), Price::from_cents(1800));
        assert_eq!(cart.pending(), pending_of(&[(1, 3)]));

        assert_eq!(cart.decrement(line(2)).unwrap(), 1);
        assert_eq!(cart.total(), Price::from_cents(1800));
        assert_eq!(cart.pending(), pending_of(&[(1, 3)]));

        let removed = cart.remove(line(1)).unwrap();
        assert_eq!(removed.quantity, 3);
        assert!(cart.snapshot().line(line(1)).is_none());
        assert_eq!(cart.total(), Price::from_cents(300));
        assert_eq!(cart.pending(), pending_of(&[(1, 0)]));

        let outcome = cart.sync().await.unwrap();
        assert_eq!(outcome, SyncOutcome::Synced { lines: 1 });
        assert!(cart.pending().is_empty());
        assert_eq!(
            cart.api().update_calls(),
            vec![vec![QuantityUpdate {
                id: line(1),
                quantity: 0
            }]]
        );
    }

    #[tokio::test]
    async fn test_repeated_taps_collapse_to_latest_quantity() {
        let cart = loaded_cart().await;
        cart.increment(line(1)).unwrap();
        cart.increment(line(1)).unwrap();
        cart.increment(line(1)).unwrap();
        cart.decrement(line(1)).unwrap();
        cart.increment(line(2)).unwrap();

        assert_eq!(cart.pending(), pending_of(&[(1, 4), (2, 2)]));
    }

    #[tokio::test]
    async fn test_decrement_at_one_is_a_no_op() {
        let cart = loaded_cart().await;
        let before = cart.snapshot();

        assert_eq!(cart.decrement(line(2)).unwrap(), 1);
        assert_eq!(cart.snapshot(), before);
    }

    #[tokio::test]
    async fn test_decrement_back_to_server_value_stays_pending() {
        let cart = loaded_cart().await;
        cart.increment(line(1)).unwrap();
        cart.decrement(line(1)).unwrap();

        assert_eq!(cart.pending(), pending_of(&[(1, 2)]));
        assert_eq!(cart.total(), Price::from_cents(1300));
    }

    #[tokio::test]
    async fn test_unknown_line_is_rejected_without_changes() {
        let cart = loaded_cart().await;
        let before = cart.snapshot();

        assert!(matches!(
            cart.increment(line(9)),
            Err(CartError::LineNotFound(id)) if id == line(9)
        ));
        assert!(matches!(cart.decrement(line(9)), Err(CartError::LineNotFound(_))));
        assert!(matches!(cart.remove(line(9)), Err(CartError::LineNotFound(_))));
        assert_eq!(cart.snapshot(), before);
    }

    #[tokio::test]
    async fn test_removed_line_cannot_be_edited_again() {
        let cart = loaded_cart().await;
        cart.remove(line(2)).unwrap();

        assert!(matches!(cart.increment(line(2)), Err(CartError::LineNotFound(_))));
        assert_eq!(cart.pending(), pending_of(&[(2, 0)]));
    }

    #[tokio::test]
    async fn test_set_quantity_jumps_in_one_step() {
        let cart = loaded_cart().await;

        assert_eq!(cart.set_quantity(line(1), 4_000_000_000).unwrap(), 4_000_000_000);

        assert_eq!(cart.pending(), pending_of(&[(1, 4_000_000_000)]));
        assert_eq!(cart.total(), Price::from_cents(2_000_000_000_300));
    }

    #[tokio::test]
    async fn test_set_quantity_down_and_to_zero() {
        let cart = loaded_cart().await;

        assert_eq!(cart.set_quantity(line(1), 1).unwrap(), 1);
        assert_eq!(cart.total(), Price::from_cents(800));

        assert_eq!(cart.set_quantity(line(1), 0).unwrap(), 0);
        assert!(cart.snapshot().line(line(1)).is_none());
        assert_eq!(cart.total(), Price::from_cents(300));
        assert_eq!(cart.pending(), pending_of(&[(1, 0)]));
    }

    #[tokio::test]
    async fn test_set_quantity_to_current_value_is_a_no_op() {
        let cart = loaded_cart().await;
        let before = cart.snapshot();

        assert_eq!(cart.set_quantity(line(1), 2).unwrap(), 2);
        assert_eq!(cart.snapshot(), before);
        assert!(matches!(
            cart.set_quantity(line(9), 3),
            Err(CartError::LineNotFound(_))
        ));
    }

    // =========================================================================
    // Edit Sequences
    // =========================================================================

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Inc(i32),
        Dec(i32),
        Remove(i32),
        Set(i32, u32),
    }

    impl Op {
        const fn line_id(self) -> LineId {
            match self {
                Self::Inc(id) | Self::Dec(id) | Self::Remove(id) | Self::Set(id, _) => {
                    LineId::new(id)
                }
            }
        }
    }

    /// Line IDs 1..=4; basket fixtures hold at most 3 lines, so some ops
    /// target a missing line.
    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1..=4i32).prop_map(Op::Inc),
            (1..=4i32).prop_map(Op::Dec),
            (1..=4i32).prop_map(Op::Remove),
            (1..=4i32, 0..12u32).prop_map(|(id, quantity)| Op::Set(id, quantity)),
        ]
    }

    fn basket_strategy() -> impl Strategy<Value = Basket> {
        prop::collection::vec((1..6u32, 1..2_000i64), 1..=3).prop_map(|specs| {
            let items: Vec<CartLine> = specs
                .into_iter()
                .zip(1..)
                .map(|((quantity, cents), id)| cart_line(id, quantity, cents))
                .collect();
            let total_price = items.iter().map(CartLine::line_total).sum();
            Basket { items, total_price }
        })
    }

    fn loaded_blocking(basket: Basket) -> CartSyncController<MockBasketApi> {
        let cart = CartSyncController::new(MockBasketApi::with_basket(basket));
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(cart.load())
            .unwrap();
        cart
    }

    fn apply_op(cart: &CartSyncController<MockBasketApi>, op: Op) -> Result<(), CartError> {
        let line_id = op.line_id();
        match op {
            Op::Inc(_) => cart.increment(line_id).map(|_| ()),
            Op::Dec(_) => cart.decrement(line_id).map(|_| ()),
            Op::Remove(_) => cart.remove(line_id).map(|_| ()),
            Op::Set(_, quantity) => cart.set_quantity(line_id, quantity).map(|_| ()),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

        #[test]
        fn test_edit_sequences_keep_total_and_pending_exact(
            basket in basket_strategy(),
            ops in prop::collection::vec(op_strategy(), 0..40),
        ) {
            let cart = loaded_blocking(basket.clone());
            let mut quantities: BTreeMap<LineId, u32> = basket
                .items
                .iter()
                .map(|l| (l.line_id, l.quantity))
                .collect();
            let mut expected = PendingChangeSet::new();

            for op in ops {
                let line_id = op.line_id();
                let current = quantities.get(&line_id).copied();
                let result = apply_op(&cart, op);
                prop_assert_eq!(result.is_ok(), current.is_some());

                let next = match (op, current) {
                    (_, None) => None,
                    (Op::Inc(_), Some(q)) => Some(q + 1),
                    (Op::Dec(_), Some(q)) if q > 1 => Some(q - 1),
                    (Op::Remove(_) | Op::Set(_, 0), Some(_)) => Some(0),
                    (Op::Set(_, target), Some(q)) if target != q => Some(target),
                    (Op::Dec(_) | Op::Set(..), Some(_)) => None,
                };
                if let Some(quantity) = next {
                    expected.record(line_id, quantity);
                    if quantity == 0 {
                        quantities.remove(&line_id);
                    } else {
                        quantities.insert(line_id, quantity);
                    }
                }

                let snapshot = cart.snapshot();
                prop_assert_eq!(snapshot.total, resummed(&snapshot));
            }

            let snapshot = cart.snapshot();
            let local: BTreeMap<LineId, u32> = snapshot
                .lines
                .iter()
                .map(|l| (l.line_id, l.quantity))
                .collect();
            prop_assert_eq!(local, quantities);
            // Exactly the changed lines, each at its latest value.
            prop_assert_eq!(snapshot.pending, expected);
        }
    }

    // =========================================================================
    // Sync
    // =========================================================================

    #[tokio::test]
    async fn test_sync_with_nothing_pending_makes_no_request() {
        let cart = loaded_cart().await;

        assert_eq!(cart.sync().await.unwrap(), SyncOutcome::Clean);
        assert_eq!(cart.on_blur().await.unwrap(), SyncOutcome::Clean);
        assert!(cart.api().update_calls().is_empty());
    }

    #[tokio::test]
    async fn test_sync_sends_one_batch_and_clears_pending() {
        let cart = loaded_cart().await;
        cart.increment(line(1)).unwrap();
        cart.increment(line(1)).unwrap();
        cart.increment(line(2)).unwrap();

        let outcome = cart.on_blur().await.unwrap();

        assert_eq!(outcome, SyncOutcome::Synced { lines: 2 });
        assert!(cart.pending().is_empty());
        assert_eq!(
            cart.api().update_calls(),
            vec![vec![
                QuantityUpdate {
                    id: line(1),
                    quantity: 4
                },
                QuantityUpdate {
                    id: line(2),
                    quantity: 2
                },
            ]]
        );
    }

    #[tokio::test]
    async fn test_failed_sync_keeps_pending_and_local_state() {
        let cart = loaded_cart().await;
        cart.increment(line(1)).unwrap();
        cart.remove(line(2)).unwrap();
        let before = cart.snapshot();

        cart.api().set_fail_update(true);
        let result = cart.sync().await;

        assert!(matches!(result, Err(CartError::Sync(_))));
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(cart.snapshot(), before);

        // A retry sends the same net effect.
        cart.api().set_fail_update(false);
        cart.sync().await.unwrap();
        let calls = cart.api().update_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
        assert!(cart.pending().is_empty());
    }

    #[tokio::test]
    async fn test_edits_during_sync_go_to_next_batch() {
        let cart = CartSyncController::new(MockBasketApi::gated(sample_basket()));
        cart.load().await.unwrap();
        cart.increment(line(1)).unwrap();

        let background = tokio::spawn({
            let cart = cart.clone();
            async move { cart.sync().await }
        });
        cart.api().update_started().await;

        assert!(cart.is_syncing());
        cart.increment(line(2)).unwrap();
        assert_eq!(cart.pending(), pending_of(&[(2, 2)]));

        cart.api().release_update();
        let outcome = background.await.unwrap().unwrap();

        assert_eq!(outcome, SyncOutcome::Synced { lines: 1 });
        assert!(!cart.is_syncing());
        assert_eq!(cart.pending(), pending_of(&[(2, 2)]));
    }

    #[tokio::test]
    async fn test_failed_sync_merges_under_newer_edits() {
        let cart = CartSyncController::new(MockBasketApi::gated(sample_basket()));
        cart.load().await.unwrap();
        cart.increment(line(1)).unwrap();
        cart.increment(line(2)).unwrap();
        cart.api().set_fail_update(true);

        let background = tokio::spawn({
            let cart = cart.clone();
            async move { cart.sync().await }
        });
        cart.api().update_started().await;

        // Line 2 edited again while the failing batch is in flight.
        cart.increment(line(2)).unwrap();

        cart.api().release_update();
        assert!(background.await.unwrap().is_err());

        assert_eq!(cart.pending(), pending_of(&[(1, 3), (2, 3)]));
    }

    #[tokio::test]
    async fn test_overlapping_syncs_send_one_request() {
        let cart = CartSyncController::new(MockBasketApi::gated(sample_basket()));
        cart.load().await.unwrap();
        cart.increment(line(1)).unwrap();

        let first = tokio::spawn({
            let cart = cart.clone();
            async move { cart.sync().await }
        });
        cart.api().update_started().await;

        let second = tokio::spawn({
            let cart = cart.clone();
            async move { cart.sync().await }
        });
        tokio::task::yield_now().await;

        cart.api().release_update();
        assert_eq!(
            first.await.unwrap().unwrap(),
            SyncOutcome::Synced { lines: 1 }
        );
        assert_eq!(second.await.unwrap().unwrap(), SyncOutcome::Clean);
        assert_eq!(cart.api().update_calls().len(), 1);
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    #[tokio::test]
    async fn test_checkout_never_orders_when_sync_fails() {
        let cart = loaded_cart().await;
        cart.increment(line(1)).unwrap();
        cart.api().set_fail_update(true);

        let result = cart.checkout().await;

        assert!(matches!(result, Err(CartError::Sync(_))));
        assert_eq!(cart.api().order_calls(), 0);
        assert_eq!(cart.pending(), pending_of(&[(1, 3)]));
    }

    #[tokio::test]
    async fn test_checkout_syncs_then_orders_and_empties_cart() {
        let cart = loaded_cart().await;
        cart.increment(line(2)).unwrap();

        let order = cart.checkout().await.unwrap();

        assert_eq!(order.id, OrderId::new(1));
        assert_eq!(cart.api().update_calls().len(), 1);
        assert_eq!(cart.api().order_calls(), 1);
        let snapshot = cart.snapshot();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.total, Price::ZERO);
        assert!(snapshot.pending.is_empty());
    }

    #[tokio::test]
    async fn test_checkout_with_clean_cart_skips_update() {
        let cart = loaded_cart().await;

        cart.checkout().await.unwrap();

        assert!(cart.api().update_calls().is_empty());
        assert_eq!(cart.api().order_calls(), 1);
    }

    #[tokio::test]
    async fn test_rejected_order_keeps_cart() {
        let cart = loaded_cart().await;
        cart.api().fail_order.store(true, Ordering::SeqCst);

        let result = cart.checkout().await;

        assert!(matches!(result, Err(CartError::OrderRejected(_))));
        assert_eq!(cart.snapshot().lines.len(), 2);
    }

    // =========================================================================
    // Add Product
    // =========================================================================

    #[tokio::test]
    async fn test_add_product_appends_confirmed_line() {
        let cart = loaded_cart().await;

        let added = cart.add_product(ProductId::new(99)).await.unwrap();

        let snapshot = cart.snapshot();
        assert_eq!(snapshot.lines.len(), 3);
        assert_eq!(snapshot.line(added.line_id).unwrap().quantity, 1);
        assert_eq!(snapshot.total, Price::from_cents(1550));
        assert!(snapshot.pending.is_empty());
    }

    #[tokio::test]
    async fn test_add_product_refuses_duplicates() {
        let cart = loaded_cart().await;

        // Line 1 holds product 10.
        let result = cart.add_product(ProductId::new(10)).await;

        assert!(matches!(result, Err(CartError::AlreadyInBasket(_))));
        assert_eq!(cart.snapshot().lines.len(), 2);
    }

    #[tokio::test]
    async fn test_add_product_after_remove_saves_removal_first() {
        let cart = loaded_cart().await;
        cart.remove(line(1)).unwrap();

        // Line 1 held product 10; the server still has it until the removal lands.
        let added = cart.add_product(ProductId::new(10)).await.unwrap();

        assert_eq!(added.product_id, ProductId::new(10));
        assert_eq!(cart.api().calls(), vec!["fetch", "update", "add"]);
        assert_eq!(
            cart.api().update_calls(),
            vec![vec![QuantityUpdate {
                id: line(1),
                quantity: 0
            }]]
        );
        assert!(cart.pending().is_empty());
    }

    #[tokio::test]
    async fn test_add_product_stops_when_pending_save_fails() {
        let cart = loaded_cart().await;
        cart.remove(line(1)).unwrap();
        cart.api().set_fail_update(true);

        let result = cart.add_product(ProductId::new(10)).await;

        assert!(matches!(result, Err(CartError::Sync(_))));
        assert_eq!(cart.api().calls(), vec!["fetch", "update"]);
        assert_eq!(cart.pending(), pending_of(&[(1, 0)]));
        assert_eq!(cart.snapshot().lines.len(), 1);
    }
}
