//! Bakalari API constants
//!
//! Public client identity and the opaque error codes the server embeds in
//! `WWW-Authenticate` headers (401) and `error_uri` body fields (400).

use std::time::Duration;

/// OAuth client ID the official Android app uses for password and refresh grants
pub const CLIENT_ID: &str = "ANDR";

/// Default total budget for one HTTP call
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of refresh-and-retry rounds for an authorized request
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// JSON key of the user identifier in login/refresh responses
pub const TOKEN_USER_ID: &str = "bak:UserId";

/// JSON key of the access token in login/refresh responses
pub const TOKEN_ACCESS: &str = "access_token";

/// JSON key of the refresh token in login/refresh responses
pub const TOKEN_REFRESH: &str = "refresh_token";

/// JSON key under which the username is kept alongside the tokens
pub const TOKEN_USERNAME: &str = "username";

/// Opaque error codes returned by the Bakalari server.
///
/// `ID2012` is shared: under 401 it means the refresh token expired, under
/// 400 that it was already redeemed. Classification order disambiguates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidMethod,
    InvalidLogin,
    MissingLogin,
    AccessTokenExpired,
    InvalidToken,
    RefreshTokenExpired,
    InvalidRefreshToken,
    RefreshTokenRedeemed,
}

impl ErrorCode {
    /// Wire representation of the code.
    pub const fn code(self) -> &'static str {
        match self {
            ErrorCode::InvalidMethod => "ID2084",
            ErrorCode::InvalidLogin => "ID2024",
            ErrorCode::MissingLogin => "ID2059",
            ErrorCode::AccessTokenExpired => "ID2019",
            ErrorCode::InvalidToken => "ID2004",
            ErrorCode::RefreshTokenExpired | ErrorCode::RefreshTokenRedeemed => "ID2012",
            ErrorCode::InvalidRefreshToken => "ID2003",
        }
    }

    /// Whether `haystack` carries this code.
    pub fn found_in(self, haystack: &str) -> bool {
        haystack.contains(self.code())
    }
}
