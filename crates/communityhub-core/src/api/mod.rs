//! Data-access client for the hosted database service.
//!
//! This module provides the `DataClient` contract the auth core depends on,
//! and `RestClient`, its HTTP implementation. The service exposes a
//! password/refresh token endpoint for sessions and table-scoped REST
//! endpoints for rows; requests carry the project's anon key plus the
//! session bearer token once signed in.

pub mod client;
pub mod data;
pub mod error;
pub mod token;

pub use client::{AutoRefresh, Query, RestClient};
pub use data::{DataClient, SessionEvent, SessionEventKind, SessionSubscription, SubscriptionRecv};
pub use error::ApiError;
pub use token::{StoredToken, TokenCache};
