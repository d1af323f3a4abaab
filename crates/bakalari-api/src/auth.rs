//! Authorized requests with refresh-on-expiry
//!
//! Attaches the bearer token, and when the server reports the access token
//! as expired or invalid, asks a `CredentialRefresher` for new credentials
//! and retries, up to `max_retries` times. A refresh-token expiry is never
//! retried; the caller has to log in again.
//!
//! Single-flight refresh is the refresher's job: it receives the credentials
//! the failed attempt used, so it can tell whether someone else already
//! replaced them while it waited for its lock.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::warn;

use crate::client::{ApiClient, ApiResponse, RequestOptions};
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::telemetry;

/// Source of fresh credentials when the current access token is rejected.
///
/// Uses `Pin<Box<dyn Future>>` so it stays dyn-compatible (`&dyn CredentialRefresher`).
pub trait CredentialRefresher: Send + Sync {
    /// Return credentials newer than `stale`, refreshing if nobody has yet.
    fn refresh(
        &self,
        stale: Arc<Credentials>,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<Credentials>>> + Send + '_>>;
}

/// Execute a bearer-authenticated request, refreshing and retrying on
/// `AccessTokenExpired` / `InvalidToken`.
///
/// With `max_retries = n` the request is attempted at most `n + 1` times and
/// the refresher is called at most `n` times.
#[allow(clippy::too_many_arguments)]
pub async fn authorized_request(
    api: &ApiClient,
    url: &str,
    method: Method,
    credentials: Arc<Credentials>,
    refresher: &dyn CredentialRefresher,
    headers: HeaderMap,
    options: &RequestOptions,
    max_retries: u32,
) -> Result<ApiResponse> {
    if !credentials.has_token() {
        warn!(url, "authorized request without any token");
        return Err(Error::TokenMissing);
    }

    let mut headers = headers;
    let mut credentials = credentials;
    set_bearer(&mut headers, &credentials)?;

    let started = Instant::now();
    let mut retries = 0u32;

    loop {
        let error = match api
            .request(url, method.clone(), &headers, options, retries)
            .await
        {
            Ok(response) => {
                telemetry::authorized_request(url, method.as_str(), started.elapsed(), retries, None);
                return Ok(response);
            }
            Err(e) => e,
        };

        if !error.is_refreshable() || retries >= max_retries {
            telemetry::authorized_request(
                url,
                method.as_str(),
                started.elapsed(),
                retries,
                Some(error.kind()),
            );
            return Err(error);
        }

        retries += 1;
        warn!(
            event = "token_refresh",
            url,
            method = method.as_str(),
            retry = retries,
            reason = error.kind(),
            "access token rejected, refreshing"
        );

        credentials = match refresher.refresh(credentials).await {
            Ok(fresh) => fresh,
            Err(refresh_error) => {
                telemetry::authorized_request(
                    url,
                    method.as_str(),
                    started.elapsed(),
                    retries,
                    Some(refresh_error.kind()),
                );
                return Err(refresh_error);
            }
        };
        set_bearer(&mut headers, &credentials)?;
    }
}

/// Set `Authorization: Bearer <token>`, or remove it when there is no access token.
fn set_bearer(headers: &mut HeaderMap, credentials: &Credentials) -> Result<()> {
    match credentials.access_token() {
        Some(token) => {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::InvalidResponse(format!("access token is not a valid header value: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        None => {
            headers.remove(AUTHORIZATION);
        }
    }
    Ok(())
}
