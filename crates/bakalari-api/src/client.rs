//! Request executor
//!
//! Issues one HTTP call under a timeout and classifies the response into a
//! payload or a domain error. Credentials never pass through here; the
//! caller supplies whatever headers the call needs. Nothing is retried.

use std::time::{Duration, Instant};

use bytes::Bytes;
use percent_encoding::percent_decode_str;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap, WWW_AUTHENTICATE};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::warn;

use crate::constants::{ErrorCode, REQUEST_TIMEOUT};
use crate::error::{Error, Result};
use crate::session::SessionManager;
use crate::telemetry::{self, Outcome};

/// Downloaded file from an `application/octet-stream` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub data: Bytes,
}

/// Classified successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Json(Value),
    Attachment(Attachment),
    /// 204 No Content
    NoContent,
    /// Success with an empty or non-JSON body
    Empty,
}

impl ApiResponse {
    pub fn json(&self) -> Option<&Value> {
        match self {
            ApiResponse::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            ApiResponse::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_attachment(self) -> Option<Attachment> {
        match self {
            ApiResponse::Attachment(attachment) => Some(attachment),
            _ => None,
        }
    }

    /// Whether the call succeeded without a value.
    pub fn is_none(&self) -> bool {
        matches!(self, ApiResponse::NoContent | ApiResponse::Empty)
    }
}

/// Request body encodings the server accepts.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    None,
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
    Json(Value),
    Raw(Bytes),
}

/// Query string and body of one call.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl RequestOptions {
    pub fn form<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            query: Vec::new(),
            body: RequestBody::Form(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    pub fn query<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            query: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            body: RequestBody::None,
        }
    }
}

/// Thin wrapper around `reqwest` with response classification and telemetry.
pub struct ApiClient {
    session: SessionManager,
    timeout: Duration,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new(REQUEST_TIMEOUT)
    }
}

impl ApiClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            session: SessionManager::new(timeout),
            timeout,
        }
    }

    /// Use a caller-owned `reqwest::Client`; `close()` will not tear it down.
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            session: SessionManager::with_client(client, timeout),
            timeout,
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Close the underlying session. A later request opens a new one.
    pub async fn close(&self) {
        self.session.close().await;
    }

    /// Execute one HTTP call and classify the response.
    ///
    /// `retry` only labels the telemetry event; this method never retries.
    pub async fn request(
        &self,
        url: &str,
        method: Method,
        headers: &HeaderMap,
        options: &RequestOptions,
        retry: u32,
    ) -> Result<ApiResponse> {
        let client = self.session.acquire().await?;
        let target = with_query(url, &options.query)?;
        let started = Instant::now();

        let mut builder = client
            .request(method.clone(), target)
            .headers(headers.clone());
        builder = match &options.body {
            RequestBody::None => builder,
            RequestBody::Form(pairs) => builder.form(pairs),
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Raw(bytes) => builder.body(bytes.clone()),
        };

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, headers, body))
        };

        let (status, response_headers, body) =
            match tokio::time::timeout(self.timeout, exchange).await {
                Ok(Ok(parts)) => parts,
                Ok(Err(e)) if !e.is_timeout() => {
                    telemetry::api_request(
                        url,
                        method.as_str(),
                        started.elapsed(),
                        retry,
                        Outcome::Error("connection_error"),
                    );
                    warn!(url, error = %e, "connection error");
                    return Err(Error::BadRequest(format!("connection error: {url}: {e}")));
                }
                // Either our budget or reqwest's own timeout fired first
                Ok(Err(_)) | Err(_) => {
                    telemetry::api_request(
                        url,
                        method.as_str(),
                        started.elapsed(),
                        retry,
                        Outcome::Error("timeout"),
                    );
                    warn!(url, "request timed out");
                    return Err(Error::Timeout(format!(
                        "timeout occurred while connecting to server {url}"
                    )));
                }
            };

        telemetry::api_request(
            url,
            method.as_str(),
            started.elapsed(),
            retry,
            Outcome::Status(status.as_u16()),
        );

        classify(url, &method, status, &response_headers, body)
    }
}

/// Append query pairs to `url`. An unparseable URL is a `BadEndpointUrl`.
fn with_query(url: &str, query: &[(String, String)]) -> Result<reqwest::Url> {
    let mut parsed = reqwest::Url::parse(url)
        .map_err(|e| Error::BadEndpointUrl(format!("bad endpoint url ({url}): {e}")))?;
    if !query.is_empty() {
        parsed.query_pairs_mut().extend_pairs(query);
    }
    Ok(parsed)
}

/// Decoded body before the status decides what it means.
enum Payload {
    NoContent,
    Attachment(Attachment),
    Json(Value),
    Empty,
}

impl Payload {
    fn describe(&self) -> String {
        match self {
            Payload::Json(value) => value.to_string(),
            Payload::Attachment(a) => format!("<attachment {}>", a.filename),
            Payload::NoContent | Payload::Empty => "null".to_string(),
        }
    }
}

/// Map status, headers and body to a response or a domain error.
fn classify(
    url: &str,
    method: &Method,
    status: StatusCode,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<ApiResponse> {
    let payload = if status == StatusCode::NO_CONTENT {
        Payload::NoContent
    } else if is_octet_stream(headers) {
        let filename = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_disposition);
        match filename {
            Some(filename) => Payload::Attachment(Attachment {
                filename,
                data: body,
            }),
            None if status == StatusCode::OK => {
                let error = Error::InvalidResponse(format!("{url}: attachment without a filename"));
                warn!(url, kind = error.kind(), "attachment without a filename");
                return Err(error);
            }
            // Error statuses are classified below; the body carries nothing useful
            None => Payload::Empty,
        }
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Empty,
        }
    };

    let error = match status {
        StatusCode::OK => {
            return Ok(match payload {
                Payload::Json(value) => ApiResponse::Json(value),
                Payload::Attachment(a) => ApiResponse::Attachment(a),
                Payload::NoContent => ApiResponse::NoContent,
                Payload::Empty => ApiResponse::Empty,
            });
        }
        StatusCode::NO_CONTENT => return Ok(ApiResponse::NoContent),
        StatusCode::UNAUTHORIZED => {
            let challenge = headers
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if ErrorCode::AccessTokenExpired.found_in(challenge) {
                Error::AccessTokenExpired("access token expired".into())
            } else if ErrorCode::RefreshTokenExpired.found_in(challenge) {
                Error::RefreshTokenExpired("refresh token expired".into())
            } else if ErrorCode::InvalidToken.found_in(challenge) {
                Error::InvalidToken("invalid token provided".into())
            } else {
                Error::BadRequest(format!("{url} with message: {}", payload.describe()))
            }
        }
        StatusCode::BAD_REQUEST => {
            let error_uri = match &payload {
                Payload::Json(value) => value.get("error_uri").and_then(Value::as_str).unwrap_or(""),
                _ => "",
            };
            if ErrorCode::InvalidMethod.found_in(error_uri) {
                Error::InvalidHttpMethod(format!(
                    "method '{method}' is not supported for '{url}'"
                ))
            } else if ErrorCode::InvalidLogin.found_in(error_uri) {
                Error::InvalidLogin("invalid login".into())
            } else if ErrorCode::RefreshTokenRedeemed.found_in(error_uri) {
                Error::RefreshTokenRedeemed("refresh token already redeemed".into())
            } else if ErrorCode::InvalidRefreshToken.found_in(error_uri) {
                Error::InvalidRefreshToken("invalid refresh token".into())
            } else {
                Error::BadRequest(format!("{url} with message: {}", payload.describe()))
            }
        }
        StatusCode::NOT_FOUND => Error::BadRequest(format!("not found ({url})")),
        other => Error::BadRequest(format!(
            "{url} returned {other} with message: {}",
            payload.describe()
        )),
    };

    warn!(url, status = status.as_u16(), kind = error.kind(), error = %error, "request failed");
    Err(error)
}

fn is_octet_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/octet-stream"))
}

/// Extract the filename from a `Content-Disposition` header value.
///
/// Prefers the RFC 5987 `filename*=<charset>'<lang>'<percent-encoded>` form
/// and falls back to a plain `filename=`. Decoding is UTF-8, lossy.
pub fn parse_content_disposition(value: &str) -> Option<String> {
    if let Some(name) = extended_filename(value) {
        return Some(name);
    }

    value
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
}

/// `filename*=<charset>'<lang>'<value>`, or `None` if absent or malformed.
fn extended_filename(value: &str) -> Option<String> {
    let start = value.rfind("filename*=")?;
    let ext = value[start + "filename*=".len()..]
        .split(';')
        .next()?
        .trim()
        .trim_matches('"');
    let mut parts = ext.splitn(3, '\'');
    let _charset = parts.next()?;
    let _language = parts.next()?;
    let encoded = parts.next()?;
    Some(percent_decode_str(encoded).decode_utf8_lossy().into_owned())
}
