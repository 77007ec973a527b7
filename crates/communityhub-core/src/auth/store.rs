//! The session store: the single shared, observable copy of who is signed in.

use tokio::sync::watch;
use tracing::debug;

use crate::models::{Profile, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

/// Read model handed to the front end.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub session: Option<Session>,
    pub profile: Option<Profile>,
    /// True until the first session check resolves.
    pub loading: bool,
    /// True while a remote sign-in is in flight.
    pub signing_in: bool,
    sign_ins_in_flight: usize,
}

impl AuthState {
    fn initial() -> Self {
        Self {
            session: None,
            profile: None,
            loading: true,
            signing_in: false,
            sign_ins_in_flight: 0,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn phase(&self) -> AuthPhase {
        if self.session.is_some() {
            AuthPhase::Authenticated
        } else if self.signing_in {
            AuthPhase::Authenticating
        } else {
            AuthPhase::Unauthenticated
        }
    }
}

/// Every write is a single `send_modify`, so session and profile always
/// change together and readers never see a profile without its session.
pub struct SessionStore {
    tx: watch::Sender<AuthState>,
}

impl SessionStore {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState::initial());
        Self { tx }
    }

    pub fn snapshot(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    /// Make `session` active. A profile belonging to another session is dropped.
    /// Returns whether a profile for this session was already present.
    pub(crate) fn set_session(&self, session: Session) -> bool {
        let mut kept = false;
        self.tx.send_modify(|state| {
            kept = state
                .profile
                .as_ref()
                .map(|p| p.id == session.id)
                .unwrap_or(false);
            if !kept {
                state.profile = None;
            }
            state.session = Some(session);
        });
        kept
    }

    pub(crate) fn set_authenticated(&self, session: Session, profile: Profile) {
        self.tx.send_modify(|state| {
            state.session = Some(session);
            state.profile = Some(profile);
        });
    }

    /// Set the profile only if `session_id` is still the active session.
    /// Returns whether the write was applied.
    pub(crate) fn set_profile_for(&self, session_id: &str, profile: Option<Profile>) -> bool {
        self.tx.send_if_modified(|state| {
            let active = state.session.as_ref().map(|s| s.id == session_id).unwrap_or(false);
            if !active {
                debug!(session_id, "Discarding profile for inactive session");
                return false;
            }
            state.profile = profile;
            true
        })
    }

    /// Clear session and profile together.
    pub(crate) fn clear(&self) {
        self.tx.send_modify(|state| {
            state.session = None;
            state.profile = None;
        });
    }

    /// Flip `loading` off. Only the first call has an effect.
    pub(crate) fn finish_loading(&self) -> bool {
        self.tx.send_if_modified(|state| std::mem::replace(&mut state.loading, false))
    }

    /// Mark a remote sign-in as in flight until the guard is dropped.
    ///
    /// Overlapping sign-ins are counted, so `signing_in` stays set until the
    /// last one finishes or is cancelled.
    pub(crate) fn begin_sign_in(&self) -> SignInGuard<'_> {
        self.tx.send_modify(|state| {
            state.sign_ins_in_flight += 1;
            state.signing_in = true;
        });
        SignInGuard { store: self }
    }

    fn end_sign_in(&self) {
        self.tx.send_modify(|state| {
            state.sign_ins_in_flight = state.sign_ins_in_flight.saturating_sub(1);
            state.signing_in = state.sign_ins_in_flight > 0;
        });
    }
}

/// Held for the duration of one remote sign-in.
pub(crate) struct SignInGuard<'a> {
    store: &'a SessionStore,
}

impl Drop for SignInGuard<'_> {
    fn drop(&mut self) {
        self.store.end_sign_in();
    }
}
