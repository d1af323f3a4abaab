//! Credential snapshot
//!
//! A `Credentials` value is never modified after construction. Login and
//! refresh build a fresh value and the client swaps its `Arc` wholesale, so
//! a request that captured the old snapshot keeps seeing consistent tokens.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{TOKEN_ACCESS, TOKEN_REFRESH, TOKEN_USER_ID};
use crate::error::{Error, Result};

/// Tokens and identity for one Bakalari account.
///
/// Serializes with plain field names (`username`, `access_token`,
/// `refresh_token`, `user_id`) so callers can cache it however they like.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

impl Credentials {
    pub fn new(
        username: Option<String>,
        access_token: Option<String>,
        refresh_token: Option<String>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            username,
            access_token,
            refresh_token,
            user_id,
        }
    }

    /// Build credentials from a login or refresh response body.
    ///
    /// The body must carry `bak:UserId`, `access_token` and `refresh_token`
    /// as strings; anything else is an `InvalidResponse`.
    pub fn from_token_response(body: &Value, username: Option<String>) -> Result<Self> {
        let field = |key: &str| -> Result<String> {
            body.get(key)
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| {
                    Error::InvalidResponse(format!("token response is missing `{key}`"))
                })
        };

        Ok(Self {
            username,
            access_token: Some(field(TOKEN_ACCESS)?),
            refresh_token: Some(field(TOKEN_REFRESH)?),
            user_id: Some(field(TOKEN_USER_ID)?),
        })
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Whether at least one token is held, i.e. an authorized call can be attempted.
    pub fn has_token(&self) -> bool {
        self.access_token.is_some() || self.refresh_token.is_some()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |token: &Option<String>| token.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("user_id", &self.user_id)
            .finish()
    }
}
