//! Sign-in / sign-out state machine.
//!
//! `AuthController` owns the `SessionStore` and is the only writer to it.
//! Remote calls go through the `DataClient` and are bounded by a timeout;
//! their failures come back as `AuthError` values, never panics.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, DataClient};
use crate::models::{Profile, Session};

use super::store::{AuthState, SessionStore};
use super::PrivilegedPrincipal;

/// Table holding one profile row per session id.
const PROFILES_TABLE: &str = "profiles";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Email and password required")]
    MissingCredentials,

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Unable to reach the server: {0}")]
    RemoteUnavailable(String),

    #[error("Connection timed out. Please try again.")]
    Timeout,
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::InvalidCredentials(msg) => AuthError::InvalidCredentials(msg),
            ApiError::Unauthorized => {
                AuthError::InvalidCredentials("Invalid email or password".to_string())
            }
            ApiError::Timeout => AuthError::Timeout,
            other => AuthError::RemoteUnavailable(other.to_string()),
        }
    }
}

pub struct AuthController {
    client: Arc<dyn DataClient>,
    store: SessionStore,
    principal: Option<PrivilegedPrincipal>,
    remote_timeout: Duration,
}

impl AuthController {
    pub fn new(
        client: Arc<dyn DataClient>,
        principal: Option<PrivilegedPrincipal>,
        remote_timeout: Duration,
    ) -> Self {
        Self {
            client,
            store: SessionStore::new(),
            principal,
            remote_timeout,
        }
    }

    /// Current read model.
    pub fn state(&self) -> AuthState {
        self.store.snapshot()
    }

    /// Receiver that observes every store write.
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.store.watch()
    }

    pub(crate) fn client(&self) -> &Arc<dyn DataClient> {
        &self.client
    }

    pub(crate) fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Run a remote call under the configured timeout.
    pub(crate) async fn bounded<T, F>(&self, call: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        match tokio::time::timeout(self.remote_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout),
        }
    }

    /// Sign in with an identifier/secret pair.
    ///
    /// The privileged principal is accepted locally with no remote call.
    /// Anything else is forwarded once to the data service; on failure the
    /// store is left as it was.
    pub async fn sign_in(&self, identifier: &str, secret: &str) -> Result<Session, AuthError> {
        if identifier.is_empty() || secret.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        if let Some(principal) = self.principal.as_ref() {
            if principal.matches(identifier, secret) {
                let (session, profile) = principal.synthesize();
                self.store.set_authenticated(session.clone(), profile);
                info!(user_id = %session.id, "Privileged sign-in");
                return Ok(session);
            }
        }

        let result = {
            // Released on every exit, including a dropped future
            let _signing_in = self.store.begin_sign_in();
            self.bounded(self.client.password_sign_in(identifier, secret))
                .await
        };

        match result {
            Ok(session) => {
                info!(user_id = %session.id, "Sign-in successful");
                self.store.set_session(session.clone());
                self.fetch_profile(&session.id).await;
                Ok(session)
            }
            Err(e) => {
                error!(error = %e, "Sign-in failed");
                Err(e.into())
            }
        }
    }

    /// Sign out. Local state is cleared before the remote call, so the
    /// front end sees the signed-out state whatever the remote outcome.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.store.clear();
        info!("Signed out locally");

        match self.bounded(self.client.sign_out()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Remote sign-out failed");
                Err(e.into())
            }
        }
    }

    /// Load the profile row for `session_id`.
    ///
    /// A missing row clears the profile. Any other failure is logged and the
    /// current profile is kept; the session stays valid either way.
    pub(crate) async fn fetch_profile(&self, session_id: &str) {
        let result = self
            .bounded(self.client.query_one(PROFILES_TABLE, "id", session_id))
            .await
            .and_then(|row| {
                serde_json::from_value::<Profile>(row)
                    .map_err(|e| ApiError::InvalidResponse(e.to_string()))
            });

        match result {
            Ok(profile) => {
                self.store.set_profile_for(session_id, Some(profile));
            }
            Err(ApiError::RowNotFound) => {
                debug!(session_id, "No profile row");
                self.store.set_profile_for(session_id, None);
            }
            Err(e) => {
                warn!(session_id, error = %e, "Error fetching profile");
            }
        }
    }

    /// Replace the session with one the controller did not initiate.
    /// Returns the id whose profile should be fetched next, if any. A session
    /// that is already active with its profile loaded needs no fetch.
    pub(crate) fn replace_session(&self, session: Option<Session>) -> Option<String> {
        match session {
            Some(session) => {
                let id = session.id.clone();
                if self.store.set_session(session) {
                    debug!(session_id = %id, "Profile already loaded");
                    return None;
                }
                Some(id)
            }
            None => {
                self.store.clear();
                None
            }
        }
    }

    /// Apply an externally driven session change, then refresh the profile.
    pub(crate) async fn apply_session_change(&self, session: Option<Session>) {
        if let Some(id) = self.replace_session(session) {
            self.fetch_profile(&id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::data::testing::{remote_session, ProfileReply, StubClient};
    use crate::auth::principal::PRIVILEGED_SESSION_ID;
    use crate::auth::AuthPhase;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    const ADMIN_EMAIL: &str = "januszjankra@gmail.com";
    const ADMIN_SECRET: &str = "?!jan369750KRA?!";

    fn controller(stub: Arc<StubClient>) -> AuthController {
        controller_with_timeout(stub, Duration::from_secs(5))
    }

    fn controller_with_timeout(stub: Arc<StubClient>, timeout: Duration) -> AuthController {
        let principal =
            PrivilegedPrincipal::new(ADMIN_EMAIL, ADMIN_SECRET, Some("Janusz Krawczak"));
        AuthController::new(stub, principal, timeout)
    }

    fn profile_row(id: &str, name: &str) -> ProfileReply {
        ProfileReply::Row(json!({ "id": id, "full_name": name, "role": "member" }))
    }

    #[tokio::test]
    async fn test_privileged_sign_in_makes_no_remote_calls() {
        let stub = Arc::new(StubClient::new());
        let auth = controller(stub.clone());

        let session = auth.sign_in(ADMIN_EMAIL, ADMIN_SECRET).await.expect("privileged sign-in");
        assert_eq!(session.id, PRIVILEGED_SESSION_ID);
        assert_eq!(session.role, "admin");
        assert_eq!(stub.remote_calls(), 0);

        let state = auth.state();
        assert_eq!(state.session.map(|s| s.id), Some(PRIVILEGED_SESSION_ID.to_string()));
        let profile = state.profile.expect("admin profile");
        assert_eq!(profile.role.as_deref(), Some("admin"));
        assert_eq!(profile.display_name(), "Janusz Krawczak");
    }

    #[tokio::test]
    async fn test_near_miss_is_forwarded_exactly_once() {
        let stub = Arc::new(StubClient::new());
        let auth = controller(stub.clone());

        let result = auth.sign_in(ADMIN_EMAIL, "?!jan369750KRA?").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials(_))));

        let calls = stub.sign_in_calls.lock().unwrap().clone();
        assert_eq!(calls, vec![(ADMIN_EMAIL.to_string(), "?!jan369750KRA?".to_string())]);
        assert!(auth.state().session.is_none());
    }

    #[tokio::test]
    async fn test_without_principal_everything_goes_remote() {
        let stub = Arc::new(StubClient::new());
        let auth = AuthController::new(stub.clone(), None, Duration::from_secs(5));

        assert!(auth.sign_in(ADMIN_EMAIL, ADMIN_SECRET).await.is_err());
        assert_eq!(stub.sign_in_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remote_sign_in_sets_session_then_profile() {
        let stub = Arc::new(
            StubClient::new()
                .accepting("user@x.com", "right", remote_session("u1", "user@x.com"))
                .with_profile("u1", profile_row("u1", "Jane Doe")),
        );
        let auth = controller(stub.clone());

        let session = auth.sign_in("user@x.com", "right").await.expect("sign in");
        assert_eq!(session.id, "u1");

        let state = auth.state();
        assert_eq!(state.session.map(|s| s.id), Some("u1".to_string()));
        assert_eq!(
            state.profile.map(|p| p.display_name().to_string()),
            Some("Jane Doe".to_string())
        );
        assert!(!state.signing_in);
        assert_eq!(stub.query_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_sign_in_leaves_state_unchanged() {
        let stub = Arc::new(StubClient::new());
        let auth = controller(stub.clone());

        let err = auth.sign_in("user@x.com", "wrong").await.unwrap_err();
        assert!(!err.to_string().is_empty());
        assert!(auth.state().session.is_none());
        assert!(auth.state().profile.is_none());
        assert_eq!(stub.query_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_fields_rejected_locally() {
        let stub = Arc::new(StubClient::new());
        let auth = controller(stub.clone());

        assert_eq!(auth.sign_in("", "secret").await, Err(AuthError::MissingCredentials));
        assert_eq!(auth.sign_in("user@x.com", "").await, Err(AuthError::MissingCredentials));
        assert_eq!(stub.remote_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_profile_is_not_an_error() {
        let stub = Arc::new(
            StubClient::new()
                .accepting("user@x.com", "right", remote_session("u1", "user@x.com"))
                .with_profile("u1", ProfileReply::NotFound),
        );
        let auth = controller(stub);

        assert!(auth.sign_in("user@x.com", "right").await.is_ok());
        let state = auth.state();
        assert!(state.session.is_some());
        assert!(state.profile.is_none());
    }

    #[tokio::test]
    async fn test_profile_never_carries_over_between_sessions() {
        let stub = Arc::new(
            StubClient::new()
                .accepting("a@x.com", "pw", remote_session("a", "a@x.com"))
                .accepting("b@x.com", "pw", remote_session("b", "b@x.com"))
                .with_profile("a", profile_row("a", "Alice"))
                .with_profile("b", ProfileReply::Fail),
        );
        let auth = controller(stub);

        auth.sign_in("a@x.com", "pw").await.expect("sign in a");
        assert!(auth.state().profile.is_some());

        auth.sign_in("b@x.com", "pw").await.expect("sign in b");
        let state = auth.state();
        assert_eq!(state.session.map(|s| s.id), Some("b".to_string()));
        assert!(state.profile.is_none());
    }

    #[tokio::test]
    async fn test_failed_profile_fetch_keeps_existing_profile() {
        let stub = Arc::new(
            StubClient::new()
                .accepting("user@x.com", "right", remote_session("u1", "user@x.com"))
                .with_profile("u1", profile_row("u1", "Jane Doe")),
        );
        let auth = controller(stub.clone());
        auth.sign_in("user@x.com", "right").await.expect("sign in");

        stub.profiles.lock().unwrap().insert("u1".to_string(), ProfileReply::Fail);
        auth.fetch_profile("u1").await;

        assert_eq!(auth.state().profile.map(|p| p.id), Some("u1".to_string()));
    }

    #[tokio::test]
    async fn test_undecodable_profile_row_keeps_existing_profile() {
        let stub = Arc::new(
            StubClient::new()
                .accepting("user@x.com", "right", remote_session("u1", "user@x.com"))
                .with_profile("u1", profile_row("u1", "Jane Doe")),
        );
        let auth = controller(stub.clone());
        auth.sign_in("user@x.com", "right").await.expect("sign in");

        stub.profiles
            .lock()
            .unwrap()
            .insert("u1".to_string(), ProfileReply::Row(json!({ "full_name": "no id" })));
        auth.fetch_profile("u1").await;

        assert_eq!(
            auth.state().profile.map(|p| p.display_name().to_string()),
            Some("Jane Doe".to_string())
        );
    }

    #[tokio::test]
    async fn test_sign_out_clears_state_when_remote_succeeds() {
        let stub = Arc::new(StubClient::new());
        let auth = controller(stub.clone());
        auth.sign_in(ADMIN_EMAIL, ADMIN_SECRET).await.expect("sign in");

        assert!(auth.sign_out().await.is_ok());
        let state = auth.state();
        assert!(state.session.is_none() && state.profile.is_none());
        assert_eq!(stub.sign_out_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sign_out_clears_state_when_remote_fails() {
        let mut stub = StubClient::new();
        stub.fail_sign_out = true;
        let stub = Arc::new(stub);
        let auth = controller(stub.clone());
        auth.sign_in(ADMIN_EMAIL, ADMIN_SECRET).await.expect("sign in");

        let result = auth.sign_out().await;
        assert!(matches!(result, Err(AuthError::RemoteUnavailable(_))));
        let state = auth.state();
        assert!(state.session.is_none() && state.profile.is_none());
    }

    #[tokio::test]
    async fn test_sign_out_local_clear_visible_before_remote_returns() {
        let mut stub = StubClient::new();
        stub.delay = Some(Duration::from_millis(200));
        let stub = Arc::new(stub);
        let auth = Arc::new(controller(stub));
        auth.sign_in(ADMIN_EMAIL, ADMIN_SECRET).await.expect("sign in");

        let mut rx = auth.watch();
        let task = tokio::spawn({
            let auth = auth.clone();
            async move { auth.sign_out().await }
        });
        let cleared = tokio::time::timeout(
            Duration::from_millis(150),
            rx.wait_for(|s| s.session.is_none()),
        )
        .await
        .is_ok();
        assert!(cleared, "local clear should precede the remote call");
        assert!(auth.state().profile.is_none());
        task.await.expect("join").expect("sign out");
    }

    #[tokio::test]
    async fn test_slow_remote_sign_in_times_out() {
        let mut stub = StubClient::new()
            .accepting("user@x.com", "right", remote_session("u1", "user@x.com"));
        stub.delay = Some(Duration::from_millis(500));
        let auth = controller_with_timeout(Arc::new(stub), Duration::from_millis(50));

        assert_eq!(auth.sign_in("user@x.com", "right").await, Err(AuthError::Timeout));
        let state = auth.state();
        assert!(state.session.is_none());
        assert!(!state.signing_in);
    }

    #[tokio::test]
    async fn test_cancelled_sign_in_does_not_stay_authenticating() {
        let mut stub = StubClient::new()
            .accepting("user@x.com", "right", remote_session("u1", "user@x.com"));
        stub.delay = Some(Duration::from_millis(500));
        let auth = controller(Arc::new(stub));

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), auth.sign_in("user@x.com", "right"))
                .await;
        assert!(cancelled.is_err());

        let state = auth.state();
        assert!(state.session.is_none());
        assert!(!state.signing_in);
        assert_eq!(state.phase(), AuthPhase::Unauthenticated);
    }

    #[tokio::test]
    async fn test_overlapping_sign_ins_stay_authenticating_until_last_finishes() {
        let mut stub = StubClient::new()
            .accepting("user@x.com", "right", remote_session("u1", "user@x.com"));
        stub.delay = Some(Duration::from_millis(200));
        let auth = Arc::new(controller(Arc::new(stub)));

        let first = tokio::spawn({
            let auth = auth.clone();
            async move { auth.sign_in("user@x.com", "wrong").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = tokio::spawn({
            let auth = auth.clone();
            async move { auth.sign_in("user@x.com", "right").await }
        });

        assert!(first.await.expect("join").is_err());
        let state = auth.state();
        assert!(state.session.is_none());
        assert_eq!(state.phase(), AuthPhase::Authenticating);

        second.await.expect("join").expect("second sign in");
        let state = auth.state();
        assert!(!state.signing_in);
        assert_eq!(state.phase(), AuthPhase::Authenticated);
    }

    #[test]
    fn test_replace_session_skips_fetch_when_profile_loaded() {
        let stub = Arc::new(StubClient::new());
        let auth = controller(stub);

        assert_eq!(
            auth.replace_session(Some(remote_session("u1", "user@x.com"))),
            Some("u1".to_string())
        );
        auth.store.set_profile_for(
            "u1",
            Some(Profile {
                id: "u1".to_string(),
                email: None,
                full_name: None,
                role: None,
                created_at: None,
            }),
        );
        assert_eq!(auth.replace_session(Some(remote_session("u1", "user@x.com"))), None);
        assert_eq!(
            auth.replace_session(Some(remote_session("u2", "other@x.com"))),
            Some("u2".to_string())
        );
        assert_eq!(auth.replace_session(None), None);
    }

    #[tokio::test]
    async fn test_privileged_path_ignores_unreachable_remote() {
        let mut stub = StubClient::new();
        stub.delay = Some(Duration::from_secs(60));
        let auth = controller_with_timeout(Arc::new(stub), Duration::from_millis(10));

        assert!(auth.sign_in(ADMIN_EMAIL, ADMIN_SECRET).await.is_ok());
    }

    #[test]
    fn test_api_error_mapping() {
        assert_eq!(
            AuthError::from(ApiError::InvalidCredentials("Invalid login credentials".to_string())),
            AuthError::InvalidCredentials("Invalid login credentials".to_string())
        );
        assert_eq!(AuthError::from(ApiError::Timeout), AuthError::Timeout);
        assert!(matches!(
            AuthError::from(ApiError::ServerError("down".to_string())),
            AuthError::RemoteUnavailable(_)
        ));
        assert!(matches!(
            AuthError::from(ApiError::Unauthorized),
            AuthError::InvalidCredentials(_)
        ));
    }
}
