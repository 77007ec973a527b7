//! Authentication module for the admin console's session state.
//!
//! This module provides:
//! - `SessionStore` / `AuthState`: the observable session + profile read model
//! - `AuthController`: sign-in / sign-out, including the privileged local path
//! - `SessionBridge`: initial session check and external session changes
//! - `PrivilegedPrincipal`: the configured identity that signs in locally
//! - `CredentialStore`: OS keychain storage for the privileged secret

pub mod bridge;
pub mod controller;
pub mod credentials;
pub mod principal;
pub mod store;

pub use bridge::SessionBridge;
pub use controller::{AuthController, AuthError};
pub use credentials::CredentialStore;
pub use principal::{PrivilegedPrincipal, PRIVILEGED_SESSION_ID};
pub use store::{AuthPhase, AuthState, SessionStore};
