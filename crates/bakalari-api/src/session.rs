//! HTTP session lifecycle
//!
//! Tracks at most one `reqwest::Client` per manager. A client built here is
//! owned and dropped on `close()`; a client handed in by the caller is only
//! released from tracking, never torn down. Either way the next `acquire()`
//! produces a working handle again.

use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

/// Currently tracked handle.
enum Tracked {
    Idle,
    Owned(reqwest::Client),
    Borrowed(reqwest::Client),
}

pub struct SessionManager {
    timeout: Duration,
    external: Option<reqwest::Client>,
    tracked: Mutex<Tracked>,
}

impl SessionManager {
    /// Manager that builds its own client lazily.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            external: None,
            tracked: Mutex::new(Tracked::Idle),
        }
    }

    /// Manager that lends out a caller-supplied client.
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            timeout,
            external: Some(client.clone()),
            tracked: Mutex::new(Tracked::Borrowed(client)),
        }
    }

    /// Return the live client, creating or re-tracking one if needed.
    pub async fn acquire(&self) -> Result<reqwest::Client> {
        let mut tracked = self.tracked.lock().await;
        match &*tracked {
            Tracked::Owned(client) | Tracked::Borrowed(client) => return Ok(client.clone()),
            Tracked::Idle => {}
        }

        let client = match &self.external {
            Some(client) => {
                *tracked = Tracked::Borrowed(client.clone());
                client.clone()
            }
            None => {
                let client = reqwest::Client::builder()
                    .timeout(self.timeout)
                    .build()
                    .map_err(|e| Error::BadRequest(format!("building HTTP client: {e}")))?;
                debug!(timeout_secs = self.timeout.as_secs_f64(), "created HTTP session");
                *tracked = Tracked::Owned(client.clone());
                client
            }
        };
        Ok(client)
    }

    /// Stop tracking the current client; drop it only if this manager built it.
    ///
    /// Returns `true` when an owned session was closed.
    pub async fn close(&self) -> bool {
        let mut tracked = self.tracked.lock().await;
        match std::mem::replace(&mut *tracked, Tracked::Idle) {
            Tracked::Owned(client) => {
                drop(client);
                debug!("closed owned HTTP session");
                true
            }
            Tracked::Borrowed(_) => {
                debug!("released external HTTP session");
                false
            }
            Tracked::Idle => false,
        }
    }

    pub async fn is_open(&self) -> bool {
        !matches!(*self.tracked.lock().await, Tracked::Idle)
    }

    pub async fn is_owner(&self) -> bool {
        matches!(*self.tracked.lock().await, Tracked::Owned(_))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_creates_owned_session_lazily() {
        let manager = SessionManager::new(Duration::from_secs(5));
        assert!(!manager.is_open().await);

        manager.acquire().await.unwrap();
        assert!(manager.is_open().await);
        assert!(manager.is_owner().await);
    }

    #[tokio::test]
    async fn close_then_acquire_recreates_session() {
        let manager = SessionManager::new(Duration::from_secs(5));
        manager.acquire().await.unwrap();

        assert!(manager.close().await, "owned session must report closed");
        assert!(!manager.is_open().await);

        manager.acquire().await.unwrap();
        assert!(manager.is_open().await);
        assert!(manager.is_owner().await);
    }

    #[tokio::test]
    async fn external_client_is_released_not_owned() {
        let external = reqwest::Client::new();
        let manager = SessionManager::with_client(external, Duration::from_secs(5));
        assert!(manager.is_open().await);
        assert!(!manager.is_owner().await);

        assert!(!manager.close().await, "external session is never closed");
        assert!(!manager.is_open().await);

        // Re-acquire hands the same external client back out, still unowned
        manager.acquire().await.unwrap();
        assert!(manager.is_open().await);
        assert!(!manager.is_owner().await);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let manager = SessionManager::new(Duration::from_secs(5));
        manager.acquire().await.unwrap();
        assert!(manager.close().await);
        assert!(!manager.close().await);
    }
}
