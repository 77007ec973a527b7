//! Keeps the session store in step with session changes the controller did
//! not initiate: expiry, refresh, or a sign-out made elsewhere.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{SessionSubscription, SubscriptionRecv};
use crate::models::Session;

use super::AuthController;

/// Running session listener. Dropping it (or calling `shutdown`) stops the
/// listener and releases the subscription.
pub struct SessionBridge {
    listener: Option<JoinHandle<()>>,
}

impl SessionBridge {
    /// Check the current session, publish it, then start listening.
    ///
    /// The subscription is taken before the check so changes that happen
    /// while it runs are applied afterwards rather than lost.
    pub async fn start(controller: Arc<AuthController>) -> Self {
        let subscription = controller.client().subscribe();

        let initial = check_session(&controller).await;
        let fetch_for = match initial {
            Some(session) => controller.replace_session(Some(session)),
            // Nothing to clear at startup; a sign-in racing the check wins
            None => None,
        };
        controller.store().finish_loading();
        debug!(has_session = fetch_for.is_some(), "Initial session check resolved");

        if let Some(id) = fetch_for {
            controller.fetch_profile(&id).await;
        }

        let listener = tokio::spawn(listen(controller, subscription));
        Self {
            listener: Some(listener),
        }
    }

    pub fn is_running(&self) -> bool {
        self.listener
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop listening and wait for the listener to wind down.
    pub async fn shutdown(mut self) {
        if let Some(handle) = self.listener.take() {
            handle.abort();
            let _ = handle.await;
            info!("Session listener stopped");
        }
    }
}

impl Drop for SessionBridge {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.take() {
            handle.abort();
        }
    }
}

/// Ask the data service for its current session. Failures count as none.
async fn check_session(controller: &AuthController) -> Option<Session> {
    match controller.bounded(controller.client().current_session()).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "Session check failed");
            None
        }
    }
}

async fn listen(controller: Arc<AuthController>, mut subscription: SessionSubscription) {
    loop {
        match subscription.recv().await {
            SubscriptionRecv::Event(event) => {
                debug!(kind = ?event.kind, has_session = event.session.is_some(), "Session change");
                controller.apply_session_change(event.session).await;
            }
            SubscriptionRecv::Lagged(skipped) => {
                // Missed changes cannot be replayed; ask for the current state
                warn!(skipped, "Session listener lagged, resyncing");
                let session = check_session(&controller).await;
                controller.apply_session_change(session).await;
            }
            SubscriptionRecv::Closed => {
                debug!("Session feed closed");
                break;
            }
        }
    }
}
