//! Integration tests for the Farm Market buyer client.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p farm-market-integration-tests
//! ```
//!
//! Tests drive the real `ApiClient` and `CartSyncController` against
//! [`FakeMarket`], an in-process axum server that implements the marketplace
//! endpoints with in-memory state. No external services are needed.
//!
//! # Test Categories
//!
//! - `cart_sync` - Load, edit, batch sync and checkout over HTTP
//! - `auth_refresh` - Login, token refresh and retry-once behavior
//! - `catalog` - Product, category and order listings

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    routing::{get, patch, post},
};
use chrono::Utc;
use farm_market_client::{ApiClient, ClientConfig};
use farm_market_core::{LineId, OrderId, Price, ProductId};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Email accepted by the fake login endpoint.
pub const BUYER_EMAIL: &str = "buyer@example.com";

/// Password accepted by the fake login endpoint.
pub const BUYER_PASSWORD: &str = "harvest-moon";

const GREEN_VALLEY: (i32, &str) = (1, "Green Valley");
const SUNNY_ACRES: (i32, &str) = (2, "Sunny Acres");

/// Seeded categories, `(id, name)`.
const CATEGORIES: [(i32, &str); 4] = [
    (1, "Fruit"),
    (2, "Vegetables"),
    (3, "Dairy & Eggs"),
    (4, "Pantry"),
];

// =============================================================================
// Fake Server
// =============================================================================

/// In-process marketplace API.
///
/// Starts seeded with four products in four categories (Fresh Apples, Organic
/// Carrots, Free-range Eggs and Raw Honey, in that order; the eggs are out of
/// stock) and a basket of two lines:
/// line 1 holds 2 x Fresh Apples at $5.00 and line 2 holds 1 x Organic
/// Carrots at $3.00, for a total of $13.00.
///
/// The server stops when the value is dropped.
pub struct FakeMarket {
    addr: SocketAddr,
    state: Arc<MarketState>,
    server: JoinHandle<()>,
}

impl FakeMarket {
    /// Bind to an ephemeral port and start serving.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start() -> Self {
        let state = Arc::new(MarketState::seeded());
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake market listener");
        let addr = listener.local_addr().expect("fake market address");

        let app = router(Arc::clone(&state));
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            server,
        }
    }

    /// Base API URL, e.g. `http://127.0.0.1:54321/api/v1`.
    #[must_use]
    pub fn api_url(&self) -> String {
        format!("http://{}/api/v1", self.addr)
    }

    /// Client configuration pointing at this server with buyer credentials.
    ///
    /// # Panics
    ///
    /// Panics if the server URL does not parse.
    #[must_use]
    pub fn config(&self) -> ClientConfig {
        ClientConfig::for_url(&self.api_url())
            .expect("fake market URL")
            .with_credentials(BUYER_EMAIL, SecretString::from(BUYER_PASSWORD))
    }

    /// A client that has already logged in.
    ///
    /// # Panics
    ///
    /// Panics if the client cannot be built or login fails.
    pub async fn client(&self) -> ApiClient {
        let client = ApiClient::new(&self.config()).expect("build client");
        client.ensure_session().await.expect("log in to fake market");
        client
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Request counts so far.
    #[must_use]
    pub fn counters(&self) -> Counters {
        self.state.data().counters
    }

    /// Server-side quantity of a basket line.
    #[must_use]
    pub fn quantity(&self, line_id: LineId) -> Option<u32> {
        self.state
            .data()
            .lines
            .iter()
            .find(|line| line.id == line_id)
            .map(|line| line.quantity)
    }

    /// Number of lines in the server-side basket.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.state.data().lines.len()
    }

    /// Bodies of every accepted or rejected batch update, in order.
    #[must_use]
    pub fn batch_bodies(&self) -> Vec<Value> {
        self.state.data().batch_bodies.clone()
    }

    // =========================================================================
    // Behavior Toggles
    // =========================================================================

    /// Make batch updates fail with a 500.
    pub fn fail_batch_updates(&self, fail: bool) {
        self.state.data().fail_batch = fail;
    }

    /// Make order creation fail with a 400.
    pub fn fail_orders(&self, fail: bool) {
        self.state.data().fail_order = fail;
    }

    /// Return the basket wrapped in a one-element list.
    pub fn wrap_basket_in_list(&self, wrap: bool) {
        self.state.data().wrap_basket = wrap;
    }

    /// Rotate the access token so the one clients hold is rejected.
    pub fn expire_access_token(&self) {
        let mut data = self.state.data();
        data.token_generation += 1;
        data.access = format!("access-{}", data.token_generation);
    }

    /// Invalidate the refresh token so refreshing fails.
    pub fn revoke_refresh_token(&self) {
        self.state.data().refresh = "revoked".to_string();
    }

    /// Change a line's quantity behind the client's back.
    pub fn set_quantity(&self, line_id: LineId, quantity: u32) {
        let mut data = self.state.data();
        if let Some(line) = data.lines.iter_mut().find(|line| line.id == line_id) {
            line.quantity = quantity;
        }
    }
}

impl Drop for FakeMarket {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Requests handled by the fake server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub logins: usize,
    pub refreshes: usize,
    pub unauthorized: usize,
    pub basket_fetches: usize,
    pub batch_updates: usize,
    pub items_added: usize,
    pub orders_placed: usize,
}

// =============================================================================
// State
// =============================================================================

struct MarketState {
    data: Mutex<MarketData>,
}

impl MarketState {
    fn seeded() -> Self {
        let [fruit, vegetables, dairy, pantry] = CATEGORIES;
        let apples = FakeProduct::new(1, "Fresh Apples", 500, GREEN_VALLEY, fruit, 40);
        let carrots = FakeProduct::new(2, "Organic Carrots", 300, SUNNY_ACRES, vegetables, 25);
        let lines = vec![
            FakeLine {
                id: LineId::new(1),
                product: apples.clone(),
                quantity: 2,
            },
            FakeLine {
                id: LineId::new(2),
                product: carrots.clone(),
                quantity: 1,
            },
        ];
        let products = vec![
            apples,
            carrots,
            FakeProduct::new(3, "Free-range Eggs", 699, GREEN_VALLEY, dairy, 0),
            FakeProduct::new(4, "Raw Honey", 850, SUNNY_ACRES, pantry, 12),
        ];

        Self {
            data: Mutex::new(MarketData {
                products,
                lines,
                orders: Vec::new(),
                access: "access-0".to_string(),
                refresh: "refresh-0".to_string(),
                token_generation: 0,
                next_line_id: 3,
                next_order_id: 1,
                fail_batch: false,
                fail_order: false,
                wrap_basket: false,
                batch_bodies: Vec::new(),
                counters: Counters::default(),
            }),
        }
    }

    fn data(&self) -> MutexGuard<'_, MarketData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct MarketData {
    products: Vec<FakeProduct>,
    lines: Vec<FakeLine>,
    orders: Vec<Value>,
    access: String,
    refresh: String,
    token_generation: u32,
    next_line_id: i32,
    next_order_id: i32,
    fail_batch: bool,
    fail_order: bool,
    wrap_basket: bool,
    batch_bodies: Vec<Value>,
    counters: Counters,
}

impl MarketData {
    fn authorize(&mut self, headers: &HeaderMap) -> Result<(), ApiFailure> {
        let expected = format!("Bearer {}", self.access);
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        if presented == Some(expected.as_str()) {
            Ok(())
        } else {
            self.counters.unauthorized += 1;
            Err(failure(StatusCode::UNAUTHORIZED, "Token is invalid or expired"))
        }
    }

    fn total(&self) -> Price {
        self.lines
            .iter()
            .map(|line| line.product.price.times(line.quantity))
            .sum()
    }

    fn basket_json(&self) -> Value {
        json!({
            "items": self.lines.iter().map(FakeLine::to_json).collect::<Vec<_>>(),
            "total_price": self.total(),
        })
    }
}

#[derive(Clone)]
struct FakeProduct {
    id: ProductId,
    name: String,
    price: Price,
    farm: (i32, &'static str),
    category: (i32, &'static str),
    stock_quantity: u32,
}

impl FakeProduct {
    fn new(
        id: i32,
        name: &str,
        cents: i64,
        farm: (i32, &'static str),
        category: (i32, &'static str),
        stock_quantity: u32,
    ) -> Self {
        Self {
            id: ProductId::new(id),
            name: name.to_string(),
            price: Price::from_cents(cents),
            farm,
            category,
            stock_quantity,
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "price": self.price,
            "farm": { "id": self.farm.0, "name": self.farm.1 },
            "category": { "id": self.category.0, "name": self.category.1 },
            "stock_quantity": self.stock_quantity,
        })
    }
}

struct FakeLine {
    id: LineId,
    product: FakeProduct,
    quantity: u32,
}

impl FakeLine {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "product": self.product.to_json(),
            "quantity": self.quantity,
        })
    }
}

// =============================================================================
// Routes
// =============================================================================

type ApiFailure = (StatusCode, Json<Value>);
type ApiResult = Result<Json<Value>, ApiFailure>;

fn failure(status: StatusCode, detail: &str) -> ApiFailure {
    (status, Json(json!({ "detail": detail })))
}

fn router(state: Arc<MarketState>) -> Router {
    Router::new()
        .route("/api/v1/token/", post(login))
        .route("/api/v1/token/refresh/", post(refresh))
        .route("/api/v1/basket/", get(basket))
        .route("/api/v1/basket-items/", patch(update_items).post(add_item))
        .route("/api/v1/orders/", get(list_orders).post(create_order))
        .route("/api/v1/products/", get(list_products))
        .route("/api/v1/categories/", get(list_categories))
        .with_state(state)
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login(State(state): State<Arc<MarketState>>, Json(body): Json<LoginBody>) -> ApiResult {
    let mut data = state.data();
    data.counters.logins += 1;
    if body.email != BUYER_EMAIL || body.password != BUYER_PASSWORD {
        return Err(failure(
            StatusCode::UNAUTHORIZED,
            "No active account found with the given credentials",
        ));
    }
    Ok(Json(json!({ "access": data.access, "refresh": data.refresh })))
}

#[derive(Deserialize)]
struct RefreshBody {
    refresh: String,
}

async fn refresh(
    State(state): State<Arc<MarketState>>,
    Json(body): Json<RefreshBody>,
) -> ApiResult {
    let mut data = state.data();
    data.counters.refreshes += 1;
    if body.refresh != data.refresh {
        return Err(failure(StatusCode::UNAUTHORIZED, "Token is invalid or expired"));
    }
    Ok(Json(json!({ "access": data.access })))
}

async fn basket(State(state): State<Arc<MarketState>>, headers: HeaderMap) -> ApiResult {
    let mut data = state.data();
    data.authorize(&headers)?;
    data.counters.basket_fetches += 1;

    let basket = data.basket_json();
    if data.wrap_basket {
        Ok(Json(json!([basket])))
    } else {
        Ok(Json(basket))
    }
}

#[derive(Deserialize)]
struct BatchBody {
    updates: Vec<BatchEntry>,
}

#[derive(Deserialize)]
struct BatchEntry {
    id: LineId,
    quantity: u32,
}

async fn update_items(
    State(state): State<Arc<MarketState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult {
    let mut data = state.data();
    data.authorize(&headers)?;
    data.counters.batch_updates += 1;
    data.batch_bodies.push(body.clone());

    if data.fail_batch {
        return Err(failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"));
    }

    let batch: BatchBody = serde_json::from_value(body)
        .map_err(|_| failure(StatusCode::BAD_REQUEST, "Malformed batch"))?;

    // All or nothing.
    if let Some(unknown) = batch
        .updates
        .iter()
        .find(|entry| !data.lines.iter().any(|line| line.id == entry.id))
    {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            &format!("Basket item {} not found", unknown.id),
        ));
    }

    for entry in batch.updates {
        if entry.quantity == 0 {
            data.lines.retain(|line| line.id != entry.id);
        } else if let Some(line) = data.lines.iter_mut().find(|line| line.id == entry.id) {
            line.quantity = entry.quantity;
        }
    }

    Ok(Json(data.basket_json()))
}

#[derive(Deserialize)]
struct AddItemBody {
    product_id: ProductId,
    quantity: u32,
}

async fn add_item(
    State(state): State<Arc<MarketState>>,
    headers: HeaderMap,
    Json(body): Json<AddItemBody>,
) -> ApiResult {
    let mut data = state.data();
    data.authorize(&headers)?;

    let product = data
        .products
        .iter()
        .find(|product| product.id == body.product_id)
        .cloned()
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Product not found"))?;
    if data.lines.iter().any(|line| line.product.id == product.id) {
        return Err(failure(StatusCode::BAD_REQUEST, "Product already in basket"));
    }

    let line = FakeLine {
        id: LineId::new(data.next_line_id),
        product,
        quantity: body.quantity.max(1),
    };
    data.next_line_id += 1;
    data.counters.items_added += 1;

    let response = line.to_json();
    data.lines.push(line);
    Ok(Json(response))
}

async fn create_order(State(state): State<Arc<MarketState>>, headers: HeaderMap) -> ApiResult {
    let mut data = state.data();
    data.authorize(&headers)?;

    if data.fail_order {
        return Err(failure(StatusCode::BAD_REQUEST, "Unable to create order"));
    }
    if data.lines.is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "Basket is empty"));
    }

    let id = OrderId::new(data.next_order_id);
    data.next_order_id += 1;
    data.counters.orders_placed += 1;

    let items: Vec<Value> = data
        .lines
        .iter()
        .map(|line| {
            json!({
                "product": line.product.to_json(),
                "quantity": line.quantity,
                "price": line.product.price.times(line.quantity),
            })
        })
        .collect();
    let order = json!({
        "id": id,
        "status": "pending",
        "created_at": Utc::now().to_rfc3339(),
        "total_price": data.total(),
        "items": items,
    });

    data.lines.clear();
    data.orders.push(order.clone());
    Ok(Json(order))
}

async fn list_orders(State(state): State<Arc<MarketState>>, headers: HeaderMap) -> ApiResult {
    let mut data = state.data();
    data.authorize(&headers)?;
    Ok(Json(Value::Array(data.orders.clone())))
}

async fn list_products(State(state): State<Arc<MarketState>>, headers: HeaderMap) -> ApiResult {
    let mut data = state.data();
    data.authorize(&headers)?;
    let products = data.products.iter().map(FakeProduct::to_json).collect();
    Ok(Json(Value::Array(products)))
}

async fn list_categories(State(state): State<Arc<MarketState>>, headers: HeaderMap) -> ApiResult {
    state.data().authorize(&headers)?;
    let categories = CATEGORIES
        .iter()
        .map(|(id, name)| json!({ "id": id, "name": name }))
        .collect();
    Ok(Json(Value::Array(categories)))
}
