//! Client facade
//!
//! `Bakalari` binds one school server to one account: it owns the request
//! executor, the current credential snapshot and the lock that keeps token
//! refreshes single-flight. Instances share nothing, so several accounts can
//! be driven side by side.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::auth::{self, CredentialRefresher};
use crate::client::{ApiClient, ApiResponse, RequestBody, RequestOptions};
use crate::constants::{CLIENT_ID, DEFAULT_MAX_RETRIES, REQUEST_TIMEOUT};
use crate::credentials::Credentials;
use crate::endpoint::{Endpoint, resolve_url};
use crate::error::{Error, Result};
use crate::telemetry;

/// Client for one school server and one account.
pub struct Bakalari {
    server: Option<String>,
    api: ApiClient,
    credentials: watch::Sender<Arc<Credentials>>,
    /// Held for the whole of a login or refresh round-trip
    refresh_lock: Mutex<()>,
    refreshes: AtomicUsize,
    max_retries: u32,
}

/// Builder for [`Bakalari`]. Every setting is optional.
#[derive(Debug, Default)]
pub struct BakalariBuilder {
    server: Option<String>,
    credentials: Option<Credentials>,
    timeout: Option<Duration>,
    client: Option<reqwest::Client>,
    max_retries: Option<u32>,
}

impl BakalariBuilder {
    /// Base URL of the school server, e.g. `https://bakalari.example.cz`.
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    /// Start from previously obtained credentials instead of an empty set.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Share a caller-owned HTTP client. `Bakalari::close` leaves it usable.
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Refresh-and-retry rounds per authorized request.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn build(self) -> Bakalari {
        let timeout = self.timeout.unwrap_or(REQUEST_TIMEOUT);
        let api = match self.client {
            Some(client) => ApiClient::with_client(client, timeout),
            None => ApiClient::new(timeout),
        };
        let (credentials, _) = watch::channel(Arc::new(self.credentials.unwrap_or_default()));

        Bakalari {
            server: self.server.map(|s| s.trim_end_matches('/').to_string()),
            api,
            credentials,
            refresh_lock: Mutex::new(()),
            refreshes: AtomicUsize::new(0),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        }
    }
}

impl Bakalari {
    /// Client for `server` with empty credentials and default settings.
    pub fn new(server: impl Into<String>) -> Self {
        Self::builder().server(server).build()
    }

    pub fn builder() -> BakalariBuilder {
        BakalariBuilder::default()
    }

    /// Current credential snapshot. Never waits on an in-flight refresh.
    pub fn credentials(&self) -> Arc<Credentials> {
        self.credentials.borrow().clone()
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Number of refresh round-trips this instance has sent.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Absolute URL of `endpoint` on this server.
    pub fn request_url(&self, endpoint: Endpoint, extend: Option<&str>) -> Result<String> {
        endpoint.resolve(self.server(), extend)
    }

    /// Call an endpoint without credentials.
    pub async fn send_unauth_request(
        &self,
        endpoint: Endpoint,
        extend: Option<&str>,
        headers: HeaderMap,
        options: &RequestOptions,
    ) -> Result<ApiResponse> {
        let url = self.request_url(endpoint, extend)?;
        self.api
            .request(&url, endpoint.method(), &headers, options, 0)
            .await
    }

    /// Call an endpoint with the bearer token, refreshing it when rejected.
    pub async fn send_auth_request(
        &self,
        endpoint: Endpoint,
        extend: Option<&str>,
        options: &RequestOptions,
    ) -> Result<ApiResponse> {
        let url = self.request_url(endpoint, extend)?;
        self.authorized(&url, endpoint.method(), options).await
    }

    /// Call an arbitrary path (relative to the server) or absolute URL.
    pub async fn send_raw_request(
        &self,
        url_or_path: &str,
        method: Method,
        options: &RequestOptions,
        authorized: bool,
    ) -> Result<ApiResponse> {
        let url = resolve_url(self.server(), url_or_path)?;
        if authorized {
            self.authorized(&url, method, options).await
        } else {
            self.api.request(&url, method, &HeaderMap::new(), options, 0).await
        }
    }

    async fn authorized(
        &self,
        url: &str,
        method: Method,
        options: &RequestOptions,
    ) -> Result<ApiResponse> {
        let mut headers = HeaderMap::new();
        // The server expects a form content type on authorized calls, bodiless or not
        if !matches!(options.body, RequestBody::Json(_)) {
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            );
        }

        auth::authorized_request(
            &self.api,
            url,
            method,
            self.credentials(),
            self,
            headers,
            options,
            self.max_retries,
        )
        .await
    }

    /// Password grant. Replaces the current credentials on success.
    pub async fn first_login(&self, username: &str, password: &str) -> Result<Arc<Credentials>> {
        let _guard = self.refresh_lock.lock().await;

        let body = self
            .token_request(RequestOptions::form([
                ("client_id", CLIENT_ID),
                ("grant_type", "password"),
                ("username", username),
                ("password", password),
            ]))
            .await
            .inspect_err(|e| warn!(username, error = %e, "login failed"))?;

        let fresh = Arc::new(Credentials::from_token_response(
            &body,
            Some(username.to_string()),
        )?);
        self.credentials.send_replace(fresh.clone());
        info!(username, user_id = fresh.user_id(), "logged in");
        Ok(fresh)
    }

    /// Redeem the refresh token for new credentials.
    ///
    /// If another refresh is already in flight, waits for it and returns its
    /// result instead of redeeming the (by then rotated) token again.
    pub async fn refresh_access_token(&self) -> Result<Arc<Credentials>> {
        let stale = self.credentials();
        self.refresh_from(stale).await
    }

    /// Refresh under the lock, unless the current credentials have already
    /// moved past `stale`.
    async fn refresh_from(&self, stale: Arc<Credentials>) -> Result<Arc<Credentials>> {
        let _guard = self.refresh_lock.lock().await;
        let current = self.credentials();

        if !Arc::ptr_eq(&stale, &current) {
            debug!("credentials already refreshed by another request");
            return Ok(current);
        }

        let Some(refresh_token) = current.refresh_token() else {
            telemetry::record_token_refresh("refresh_token_expired");
            return Err(Error::RefreshTokenExpired(
                "no refresh token available, log in again".into(),
            ));
        };

        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let body = match self
            .token_request(RequestOptions::form([
                ("client_id", CLIENT_ID),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ]))
            .await
        {
            Ok(body) => body,
            Err(e) => {
                telemetry::record_token_refresh(e.kind());
                warn!(error = %e, "token refresh failed");
                return Err(e);
            }
        };

        let fresh = Arc::new(Credentials::from_token_response(
            &body,
            current.username().map(str::to_owned),
        )?);
        self.credentials.send_replace(fresh.clone());
        telemetry::record_token_refresh("ok");
        info!(user_id = fresh.user_id(), "access token refreshed");
        Ok(fresh)
    }

    /// POST to the login endpoint and require a JSON body back.
    async fn token_request(&self, options: RequestOptions) -> Result<Value> {
        match self
            .send_unauth_request(Endpoint::Login, None, HeaderMap::new(), &options)
            .await?
        {
            ApiResponse::Json(body) => Ok(body),
            other => Err(Error::InvalidResponse(format!(
                "token endpoint returned no JSON body: {other:?}"
            ))),
        }
    }

    /// Close the HTTP session. The next request opens a fresh one.
    pub async fn close(&self) {
        self.api.close().await;
    }
}

impl CredentialRefresher for Bakalari {
    fn refresh(
        &self,
        stale: Arc<Credentials>,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<Credentials>>> + Send + '_>> {
        Box::pin(self.refresh_from(stale))
    }
}
