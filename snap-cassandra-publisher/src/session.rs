//! Connection/session management
//!
//! Exactly one store session is opened per [`SessionManager`]. The first
//! caller connects and provisions the schema while concurrent callers wait on
//! the same initialization; every caller afterwards receives the cached
//! session, whatever options it passes.

use snap_cassandra_core::error::{PublishError, PublishResult};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::config::ClientOptions;
use crate::store::{SharedMetricStore, StoreConnector};

/// Owner of the single shared store session
pub struct SessionManager {
    connector: Arc<dyn StoreConnector>,
    session: OnceCell<SharedMetricStore>,
    closed: AtomicBool,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            connector,
            session: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Return the session, opening it on first use.
    ///
    /// A failed attempt leaves the manager empty so the error reaches every
    /// caller that raced into it; nothing is retried here.
    pub async fn get_session(&self, options: &ClientOptions) -> PublishResult<SharedMetricStore> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PublishError::Closed);
        }

        let session = self
            .session
            .get_or_try_init(|| async {
                info!("Opening Cassandra session to {}", options.contact_point());
                self.connector.connect(options).await.map_err(|e| {
                    error!(error = %e, "Failed to open Cassandra session");
                    e
                })
            })
            .await?;

        Ok(session.clone())
    }

    /// The session, when one has been opened
    pub fn current(&self) -> Option<SharedMetricStore> {
        self.session.get().cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.session.initialized()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Release the session if one is held. Safe to call repeatedly or before
    /// any session was opened.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Session manager already closed");
            return;
        }

        if let Some(session) = self.session.get() {
            session.close().await;
            info!("Cassandra session released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_client::MockConnector;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_session() {
        let connector =
            Arc::new(MockConnector::new().with_connect_delay(Duration::from_millis(50)));
        let manager = Arc::new(SessionManager::new(connector.clone()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.get_session(&ClientOptions::default()).await
            }));
        }

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(connector.connect_calls(), 1);
        assert!(sessions.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_later_options_are_ignored() {
        let connector = Arc::new(MockConnector::new());
        let manager = SessionManager::new(connector.clone());

        let first = manager.get_session(&ClientOptions::default()).await.unwrap();
        let other = ClientOptions {
            server: "10.1.1.1".to_string(),
            ..ClientOptions::default()
        };
        let second = manager.get_session(&other).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.connect_calls(), 1);
        assert_eq!(connector.last_options().unwrap().server, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_failed_connect_is_fatal_and_not_cached() {
        let connector = Arc::new(MockConnector::new().with_connect_failure());
        let manager = SessionManager::new(connector.clone());

        let err = manager
            .get_session(&ClientOptions::default())
            .await
            .err()
            .unwrap();
        assert!(err.is_fatal());
        assert!(!manager.is_initialized());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let connector = Arc::new(MockConnector::new());
        let manager = SessionManager::new(connector.clone());

        // closing before any session exists is a no-op
        let idle = SessionManager::new(Arc::new(MockConnector::new()));
        idle.close().await;
        idle.close().await;
        assert!(idle.is_closed());

        manager.get_session(&ClientOptions::default()).await.unwrap();
        manager.close().await;
        manager.close().await;

        assert!(connector.store().unwrap().is_closed());
        assert!(matches!(
            manager.get_session(&ClientOptions::default()).await,
            Err(PublishError::Closed)
        ));
    }
}
