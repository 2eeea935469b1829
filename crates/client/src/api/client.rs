//! HTTP implementation of the marketplace API.

use std::sync::Arc;

use farm_market_core::{Basket, CartLine, Category, Order, Product, ProductId};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::auth::{self, AuthTokens};
use super::wire::{AddItemRequest, BasketItemDto, BasketPayload, BatchUpdateRequest, OrderDto};
use super::{ApiError, BasketApi, QuantityUpdate};
use crate::config::ClientConfig;

/// Marketplace API client.
///
/// Cheap to clone; clones share the HTTP connection pool and the token
/// cache.
///
/// # Authentication
///
/// Every request carries the cached access token as a bearer token. When the
/// server answers 401, the client refreshes the access token once and
/// retries the request once. A second 401 is returned as
/// [`ApiError::Unauthorized`].
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    http: reqwest::Client,
    config: ClientConfig,
    /// In-memory token cache
    tokens: RwLock<Option<AuthTokens>>,
}

impl ApiClient {
    /// Create a client from configuration.
    ///
    /// Pre-issued tokens in the configuration are cached immediately;
    /// credentials are only used by [`ApiClient::ensure_session`].
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        let tokens = config.access_token.clone().map(|access| AuthTokens {
            access,
            refresh: config.refresh_token.clone(),
        });

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                http,
                config: config.clone(),
                tokens: RwLock::new(tokens),
            }),
        })
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Log in with email and password and cache the returned tokens.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` if the credentials are rejected.
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<(), ApiError> {
        let url = self.inner.config.endpoint("/token/");
        let tokens = auth::login(&self.inner.http, &url, email, password).await?;
        *self.inner.tokens.write().await = Some(tokens);
        Ok(())
    }

    /// Log in with the configured credentials unless a token is already held.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` if there is neither a token nor
    /// credentials, or the credentials are rejected.
    pub async fn ensure_session(&self) -> Result<(), ApiError> {
        if self.has_token().await {
            return Ok(());
        }
        let Some(credentials) = self.inner.config.credentials.clone() else {
            return Err(ApiError::Unauthorized(
                "no access token or credentials configured".to_string(),
            ));
        };
        self.login(&credentials.email, &credentials.password).await
    }

    /// Replace the cached tokens.
    pub async fn set_tokens(&self, tokens: AuthTokens) {
        *self.inner.tokens.write().await = Some(tokens);
    }

    /// Get the cached tokens (if any).
    pub async fn tokens(&self) -> Option<AuthTokens> {
        self.inner.tokens.read().await.clone()
    }

    /// Whether an access token is cached.
    pub async fn has_token(&self) -> bool {
        self.inner.tokens.read().await.is_some()
    }

    /// Drop the cached tokens.
    pub async fn clear_tokens(&self) {
        *self.inner.tokens.write().await = None;
    }

    /// Refresh the access token using the cached refresh token.
    async fn refresh(&self) -> Result<(), ApiError> {
        let refresh_token = self
            .inner
            .tokens
            .read()
            .await
            .as_ref()
            .and_then(|tokens| tokens.refresh.clone())
            .ok_or_else(|| ApiError::Unauthorized("no refresh token available".to_string()))?;

        let url = self.inner.config.endpoint("/token/refresh/");
        let access = auth::refresh_access_token(&self.inner.http, &url, &refresh_token).await?;

        if let Some(tokens) = self.inner.tokens.write().await.as_mut() {
            tokens.access = access;
        }
        Ok(())
    }

    // =========================================================================
    // Request Execution
    // =========================================================================

    /// Send a request, refreshing the token and retrying once on a 401.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.inner.config.endpoint(path);

        let response = self.dispatch(method.clone(), &url, body.as_ref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::check(response).await;
        }

        debug!(%method, path, "Access token rejected, refreshing");
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Token refresh failed");
            return Err(match e {
                ApiError::Unauthorized(_) => e,
                other => ApiError::Unauthorized(format!("token refresh failed: {other}")),
            });
        }

        let retry = self.dispatch(method, &url, body.as_ref()).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized(
                "request rejected after token refresh".to_string(),
            ));
        }
        Self::check(retry).await
    }

    /// Build and send one attempt with the current access token.
    async fn dispatch(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let access = self
            .inner
            .tokens
            .read()
            .await
            .as_ref()
            .map(|tokens| tokens.access.clone());

        let mut request = self.inner.http.request(method, url);
        if let Some(access) = access {
            request = request.bearer_auth(access.expose_secret());
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Turn non-success statuses into `ApiError::Status`.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }

    /// Decode a JSON response body.
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    fn to_body<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ApiError> {
        serde_json::to_value(value).map_err(|e| ApiError::Parse(e.to_string()))
    }

    // =========================================================================
    // Endpoints
    // =========================================================================

    /// Fetch the buyer's basket.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failure, auth failure, or a malformed body.
    #[instrument(skip(self))]
    pub async fn get_basket(&self) -> Result<Basket, ApiError> {
        let response = self.send(Method::GET, "/basket/", None).await?;
        let payload: BasketPayload = Self::decode(response).await?;
        Ok(payload.into_basket())
    }

    /// Apply quantity updates in one request.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the server rejects the batch.
    #[instrument(skip(self, updates), fields(count = updates.len()))]
    pub async fn update_basket_items(&self, updates: &[QuantityUpdate]) -> Result<(), ApiError> {
        let body = Self::to_body(&BatchUpdateRequest { updates })?;
        self.send(Method::PATCH, "/basket-items/", Some(body)).await?;
        Ok(())
    }

    /// Add a product to the basket.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the server rejects the request.
    #[instrument(skip(self))]
    pub async fn add_basket_item(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine, ApiError> {
        let body = Self::to_body(&AddItemRequest {
            product_id,
            quantity,
        })?;
        let response = self.send(Method::POST, "/basket-items/", Some(body)).await?;
        let item: BasketItemDto = Self::decode(response).await?;
        Ok(item.into())
    }

    /// Create an order from the server-side basket.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the server refuses to create the order.
    #[instrument(skip(self))]
    pub async fn create_order(&self) -> Result<Order, ApiError> {
        let response = self.send(Method::POST, "/orders/", None).await?;
        let order: OrderDto = Self::decode(response).await?;
        Ok(order.into())
    }

    /// List the buyer's orders.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failure, auth failure, or a malformed body.
    #[instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<Order>, ApiError> {
        let response = self.send(Method::GET, "/orders/", None).await?;
        let orders: Vec<OrderDto> = Self::decode(response).await?;
        Ok(orders.into_iter().map(Order::from).collect())
    }

    /// List catalog products.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failure, auth failure, or a malformed body.
    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<Product>, ApiError> {
        let response = self.send(Method::GET, "/products/", None).await?;
        Self::decode(response).await
    }

    /// List product categories.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failure, auth failure, or a malformed body.
    #[instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<Category>, ApiError> {
        let response = self.send(Method::GET, "/categories/", None).await?;
        Self::decode(response).await
    }
}

impl BasketApi for ApiClient {
    async fn fetch_basket(&self) -> Result<Basket, ApiError> {
        self.get_basket().await
    }

    async fn update_quantities(&self, updates: Vec<QuantityUpdate>) -> Result<(), ApiError> {
        self.update_basket_items(&updates).await
    }

    async fn add_product(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine, ApiError> {
        self.add_basket_item(product_id, quantity).await
    }

    async fn place_order(&self) -> Result<Order, ApiError> {
        self.create_order().await
    }
}
