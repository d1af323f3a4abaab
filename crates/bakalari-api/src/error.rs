//! Error taxonomy for Bakalari API operations

/// Errors surfaced by the request executor, the token coordinator and the
/// client facade.
///
/// Only `AccessTokenExpired` and `InvalidToken` are ever retried, and only
/// inside `auth::authorized_request`. Everything else reaches the caller on
/// first occurrence.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("access token expired: {0}")]
    AccessTokenExpired(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("refresh token expired: {0}")]
    RefreshTokenExpired(String),

    #[error("refresh token already redeemed: {0}")]
    RefreshTokenRedeemed(String),

    #[error("invalid refresh token: {0}")]
    InvalidRefreshToken(String),

    #[error("invalid login: {0}")]
    InvalidLogin(String),

    #[error("invalid HTTP method: {0}")]
    InvalidHttpMethod(String),

    #[error("access token or refresh token is missing")]
    TokenMissing,

    #[error("bad endpoint url: {0}")]
    BadEndpointUrl(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Stable tag for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Timeout(_) => "timeout",
            Error::BadRequest(_) => "bad_request",
            Error::AccessTokenExpired(_) => "access_token_expired",
            Error::InvalidToken(_) => "invalid_token",
            Error::RefreshTokenExpired(_) => "refresh_token_expired",
            Error::RefreshTokenRedeemed(_) => "refresh_token_redeemed",
            Error::InvalidRefreshToken(_) => "invalid_refresh_token",
            Error::InvalidLogin(_) => "invalid_login",
            Error::InvalidHttpMethod(_) => "invalid_http_method",
            Error::TokenMissing => "token_missing",
            Error::BadEndpointUrl(_) => "bad_endpoint_url",
            Error::InvalidResponse(_) => "invalid_response",
        }
    }

    /// Errors that a refresh of the access token may cure.
    pub fn is_refreshable(&self) -> bool {
        matches!(self, Error::AccessTokenExpired(_) | Error::InvalidToken(_))
    }

    /// The refresh token is gone; only a username/password login helps.
    pub fn requires_login(&self) -> bool {
        matches!(self, Error::RefreshTokenExpired(_))
    }

    /// Network-layer failure, safe to report and retry at a higher level.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::BadRequest(_))
    }
}

/// Result alias for Bakalari API operations.
pub type Result<T> = std::result::Result<T, Error>;
