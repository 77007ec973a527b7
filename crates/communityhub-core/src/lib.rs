//! CommunityHub core library.
//!
//! Shared logic for the communityhub admin console:
//!
//! - `api`: data-access client for the hosted database service (auth + tables)
//! - `auth`: session store, sign-in/sign-out controller, session change bridge
//! - `models`: account, community and reseller data structures
//! - `config`: application configuration
//! - `utils`: string formatting helpers

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod utils;
