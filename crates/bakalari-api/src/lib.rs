//! Bakalari school-information API client
//!
//! Core of the client: session lifecycle, request execution with response
//! classification, and bearer-token refresh that stays single-flight under
//! concurrent use. Domain payloads (marks, timetable, messages) are returned
//! as decoded JSON and left to the caller.
//!
//! Request flow:
//! 1. `Bakalari::first_login()` redeems username/password for tokens
//! 2. `Bakalari::send_auth_request()` calls an `Endpoint` with the bearer token
//! 3. On `AccessTokenExpired`/`InvalidToken`, `auth::authorized_request()`
//!    asks the client to refresh and retries (bounded by `max_retries`)
//! 4. Concurrent refreshes collapse into one round-trip; the rest reuse it
//! 5. `RefreshTokenExpired` means the caller must log in again

pub mod auth;
pub mod bakalari;
pub mod client;
pub mod constants;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod session;
pub mod telemetry;

pub use auth::{CredentialRefresher, authorized_request};
pub use bakalari::{Bakalari, BakalariBuilder};
pub use client::{ApiClient, ApiResponse, Attachment, RequestBody, RequestOptions};
pub use constants::*;
pub use credentials::Credentials;
pub use endpoint::{Endpoint, resolve_url};
pub use error::{Error, Result};
pub use reqwest::Method;
pub use session::SessionManager;
