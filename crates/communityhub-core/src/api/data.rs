//! The contract the auth core depends on, and the session change feed.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::models::Session;

use super::ApiError;

/// Buffer size for the session change broadcast.
/// Changes are rare (sign in, sign out, refresh); 16 leaves room for bursts.
pub const SESSION_EVENT_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// A session change pushed by the data service client.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub session: Option<Session>,
}

impl SessionEvent {
    pub fn signed_in(session: Session) -> Self {
        Self {
            kind: SessionEventKind::SignedIn,
            session: Some(session),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            kind: SessionEventKind::SignedOut,
            session: None,
        }
    }

    pub fn token_refreshed(session: Session) -> Self {
        Self {
            kind: SessionEventKind::TokenRefreshed,
            session: Some(session),
        }
    }
}

/// Outcome of waiting on a subscription.
#[derive(Debug)]
pub enum SubscriptionRecv {
    Event(SessionEvent),
    /// The listener fell behind and `skipped` events were dropped.
    Lagged(u64),
    Closed,
}

/// Registration on the session change feed.
///
/// Dropping the handle unregisters the listener.
pub struct SessionSubscription {
    rx: broadcast::Receiver<SessionEvent>,
}

impl SessionSubscription {
    pub fn new(rx: broadcast::Receiver<SessionEvent>) -> Self {
        Self { rx }
    }

    pub async fn recv(&mut self) -> SubscriptionRecv {
        match self.rx.recv().await {
            Ok(event) => SubscriptionRecv::Event(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => SubscriptionRecv::Lagged(skipped),
            Err(broadcast::error::RecvError::Closed) => SubscriptionRecv::Closed,
        }
    }
}

/// Remote data service operations used by the auth core.
#[async_trait]
pub trait DataClient: Send + Sync {
    /// Exchange an identifier/secret pair for a remote session.
    async fn password_sign_in(&self, identifier: &str, secret: &str) -> Result<Session, ApiError>;

    /// Invalidate the remote session, if any.
    async fn sign_out(&self) -> Result<(), ApiError>;

    /// Whatever session the service currently recognizes, if any.
    async fn current_session(&self) -> Result<Option<Session>, ApiError>;

    /// Register for session change events.
    fn subscribe(&self) -> SessionSubscription;

    /// Fetch exactly one row where `column == value`.
    /// No matching row yields `ApiError::RowNotFound`.
    async fn query_one(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<serde_json::Value, ApiError>;
}
