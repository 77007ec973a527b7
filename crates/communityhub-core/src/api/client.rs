//! HTTP client for the hosted database service.
//!
//! This module provides the `RestClient` struct, which speaks to the
//! service's auth endpoints (password and refresh grants, logout) and its
//! table endpoints (select, single-row lookup, insert, update, count).
//! It keeps the remote session tokens in a `TokenCache` and publishes
//! session changes to subscribers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::Session;

use super::data::{DataClient, SessionEvent, SessionSubscription, SESSION_EVENT_BUFFER};
use super::token::{StoredToken, TokenCache};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Accept header that asks the table endpoint for exactly one object.
const SINGLE_OBJECT_ACCEPT: &str = "application/vnd.pgrst.object+json";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: Session,
}

impl From<TokenResponse> for StoredToken {
    fn from(resp: TokenResponse) -> Self {
        StoredToken {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(resp.expires_in),
            user: resp.user,
        }
    }
}

/// Row selection for table reads.
#[derive(Debug, Clone, Default)]
pub struct Query {
    filters: Vec<(String, String)>,
    order: Option<(String, bool)>,
    limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.filters.push((column.to_string(), format!("eq.{}", value)));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some((column.to_string(), ascending));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(self.filters.iter().cloned());
        if let Some((ref column, ascending)) = self.order {
            let dir = if ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", column, dir)));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }
}

/// Client for the hosted database service.
/// Clone is cheap - the HTTP pool, token cache and event feed are shared.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    anon_key: String,
    tokens: Arc<RwLock<TokenCache>>,
    events: broadcast::Sender<SessionEvent>,
}

impl RestClient {
    /// Create a new client for `base_url` using the given token cache
    pub fn new(base_url: &str, anon_key: &str, tokens: TokenCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let (events, _) = broadcast::channel(SESSION_EVENT_BUFFER);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            tokens: Arc::new(RwLock::new(tokens)),
            events,
        })
    }

    /// Build a client from configuration, restoring any cached remote session.
    pub fn from_config(config: &Config) -> Result<Self> {
        let tokens = match config.cache_dir() {
            Ok(dir) => {
                let mut cache = TokenCache::new(dir);
                match cache.load() {
                    Ok(found) => debug!(found, "Token cache loaded"),
                    Err(e) => warn!(error = %e, "Failed to load token cache"),
                }
                cache
            }
            Err(e) => {
                warn!(error = %e, "No cache directory, keeping session in memory");
                TokenCache::in_memory()
            }
        };
        Self::new(config.service_url()?, config.anon_key()?, tokens)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Attach the anon key plus the session bearer token when signed in.
    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .tokens
            .read()
            .await
            .access_token()
            .map(str::to_string)
            .unwrap_or_else(|| self.anon_key.clone());
        request.header("apikey", &self.anon_key).bearer_auth(bearer)
    }

    /// Send a request, retrying rate-limited responses with exponential backoff.
    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let attempt = match request.try_clone() {
                Some(r) => r,
                None => return request.send().await.map_err(ApiError::from_transport),
            };
            let response = attempt.send().await.map_err(ApiError::from_transport)?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }
            if retries >= MAX_RATE_LIMIT_RETRIES {
                warn!(retries, "Rate limit retries exhausted");
                return Err(ApiError::RateLimited);
            }
            retries += 1;
            debug!(retries, backoff_ms, "Rate limited, backing off");
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2;
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let text = response.text().await.map_err(ApiError::from_transport)?;
        serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    // =========================================================================
    // Auth endpoints
    // =========================================================================

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<StoredToken, ApiError> {
        let request = self
            .client
            .post(self.auth_url("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(&body);
        let response = self.send(request).await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::from_auth_status(status, &text));
        }

        let token: TokenResponse = Self::parse_json(response).await?;
        Ok(token.into())
    }

    /// Replace the cached token and persist it.
    fn store_token(cache: &mut TokenCache, token: StoredToken) {
        cache.update(token);
        if let Err(e) = cache.save() {
            warn!(error = %e, "Failed to persist session token");
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Use the refresh token for a new access token.
    /// Caller holds the cache write lock so refreshes never interleave.
    async fn refresh_locked(&self, cache: &mut TokenCache) -> Result<Session, ApiError> {
        let refresh_token = cache
            .data
            .as_ref()
            .map(|t| t.refresh_token.clone())
            .ok_or(ApiError::NoSession)?;

        let token = self
            .token_grant(
                "refresh_token",
                serde_json::json!({ "refresh_token": refresh_token }),
            )
            .await?;
        let session = token.user.clone();
        let expires_in_minutes = token.minutes_until_expiry();
        Self::store_token(cache, token);
        debug!(user_id = %session.id, expires_in_minutes, "Session token refreshed");
        self.publish(SessionEvent::token_refreshed(session.clone()));
        Ok(session)
    }

    /// Drop the local token and tell subscribers the session is gone.
    async fn expire_session(&self) {
        if let Err(e) = self.tokens.write().await.clear() {
            warn!(error = %e, "Failed to clear session token");
        }
        self.publish(SessionEvent::signed_out());
    }

    /// Periodically validate and refresh the session in the background.
    /// The task stops when the returned guard is dropped.
    pub fn start_auto_refresh(&self, interval: Duration) -> AutoRefresh {
        let client = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = client.current_session().await {
                    debug!(error = %e, "Background session check failed");
                }
            }
        });
        AutoRefresh { handle }
    }

    // =========================================================================
    // Table endpoints
    // =========================================================================

    /// Read rows from `table`.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<Vec<T>, ApiError> {
        let request = self.client.get(self.table_url(table)).query(&query.params());
        let response = self.send(self.authorize(request).await).await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response).await
    }

    /// Typed form of `query_one`.
    pub async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<T, ApiError> {
        let row = self.query_one(table, column, value).await?;
        serde_json::from_value(row).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Insert rows and return them as stored.
    pub async fn insert<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        table: &str,
        rows: &T,
    ) -> Result<Vec<R>, ApiError> {
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(rows);
        let response = self.send(self.authorize(request).await).await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response).await
    }

    /// Patch the rows where `column == value` and return them as stored.
    pub async fn update<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        table: &str,
        column: &str,
        value: &str,
        patch: &T,
    ) -> Result<Vec<R>, ApiError> {
        let request = self
            .client
            .patch(self.table_url(table))
            .query(&[(column, format!("eq.{}", value))])
            .header("Prefer", "return=representation")
            .json(patch);
        let response = self.send(self.authorize(request).await).await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response).await
    }

    /// Exact row count for `table`, read from the `Content-Range` header.
    pub async fn count(&self, table: &str) -> Result<u64, ApiError> {
        let request = self
            .client
            .head(self.table_url(table))
            .query(&[("select", "*")])
            .header("Prefer", "count=exact");
        let response = self.send(self.authorize(request).await).await?;
        let response = Self::check_response(response).await?;

        let range = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::InvalidResponse("Missing Content-Range header".to_string()))?;
        Self::parse_content_range_total(range)
    }

    /// Row counts for several tables, fetched concurrently, in input order.
    pub async fn count_all(&self, tables: &[&str]) -> Vec<Result<u64, ApiError>> {
        futures::future::join_all(tables.iter().map(|table| self.count(table))).await
    }

    /// "0-24/3573" or "*/0" -> total
    fn parse_content_range_total(range: &str) -> Result<u64, ApiError> {
        range
            .rsplit('/')
            .next()
            .and_then(|total| total.trim().parse().ok())
            .ok_or_else(|| ApiError::InvalidResponse(format!("Bad Content-Range: {}", range)))
    }
}

#[async_trait::async_trait]
impl DataClient for RestClient {
    async fn password_sign_in(&self, identifier: &str, secret: &str) -> Result<Session, ApiError> {
        let token = self
            .token_grant(
                "password",
                serde_json::json!({ "email": identifier, "password": secret }),
            )
            .await?;
        let session = token.user.clone();

        Self::store_token(&mut *self.tokens.write().await, token);
        info!(user_id = %session.id, "Remote session established");
        self.publish(SessionEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ApiError> {
        let access_token = {
            let mut cache = self.tokens.write().await;
            let token = cache.access_token().map(str::to_string);
            if let Err(e) = cache.clear() {
                warn!(error = %e, "Failed to clear session token");
            }
            token
        };
        self.publish(SessionEvent::signed_out());

        let Some(access_token) = access_token else {
            debug!("No remote session to invalidate");
            return Ok(());
        };

        let request = self
            .client
            .post(self.auth_url("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token);
        let response = self.send(request).await?;
        // An already-invalid token means the session is gone, which is the goal
        if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND) {
            return Ok(());
        }
        Self::check_response(response).await.map(|_| ())
    }

    async fn current_session(&self) -> Result<Option<Session>, ApiError> {
        let snapshot = self.tokens.read().await.data.clone();
        let Some(token) = snapshot else {
            return Ok(None);
        };
        if !token.needs_refresh() {
            return Ok(Some(token.user));
        }

        let mut cache = self.tokens.write().await;
        // Another caller may have refreshed or signed out while we waited for the lock
        match cache.data.as_ref() {
            None => return Ok(None),
            Some(current) if !current.needs_refresh() => return Ok(Some(current.user.clone())),
            Some(_) => {}
        }

        match self.refresh_locked(&mut cache).await {
            Ok(session) => Ok(Some(session)),
            Err(e)
                if matches!(
                    e,
                    ApiError::InvalidCredentials(_) | ApiError::Unauthorized | ApiError::NoSession
                ) =>
            {
                warn!(error = %e, "Session could not be refreshed, signing out");
                drop(cache);
                self.expire_session().await;
                Ok(None)
            }
            Err(e) if token.is_expired() => Err(e),
            Err(e) => {
                debug!(error = %e, "Refresh failed, token still valid");
                Ok(Some(token.user))
            }
        }
    }

    fn subscribe(&self) -> SessionSubscription {
        SessionSubscription::new(self.events.subscribe())
    }

    async fn query_one(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<serde_json::Value, ApiError> {
        let request = self
            .client
            .get(self.table_url(table))
            .query(&Query::new().eq(column, value).params())
            .header(header::ACCEPT, SINGLE_OBJECT_ACCEPT);
        let response = self.send(self.authorize(request).await).await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response).await
    }
}

/// Guard for the background refresh task started by `start_auto_refresh`.
pub struct AutoRefresh {
    handle: JoinHandle<()>,
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
