//! # mastogate
//!
//! A serverless-style gateway that lets a web client run a
//! browser-redirect OAuth2 handshake against an arbitrary Mastodon
//! instance, mint a first-party signed session token, and use that
//! token to proxy a small set of read operations back to the
//! originating instance.
//!
//! ## Features
//!
//! - **Auth bridge**: login redirect + authorization-code callback
//!   against any Mastodon instance, with just-in-time app registration
//! - **Session tokens**: self-issued ES256 bearer credentials carrying
//!   the upstream access token; 7 day expiry, no server-side state
//! - **Instance allowlist**: optional comma-separated permit list
//! - **Pluggable storage**: one trait for config scalars, per-instance
//!   app credentials, and list snapshots
//! - **Pluggable upstream**: the Mastodon API surface is a trait, so a
//!   test double substitutes for a live instance
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mastogate::{Gateway, MastodonHttpClient, MemoryStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::default());
//! let upstream = Arc::new(MastodonHttpClient::new());
//! let gateway = Gateway::new(store, upstream);
//!
//! let app = gateway.router();
//! # Ok(())
//! # }
//! ```

pub mod allowlist;
pub mod appcreds;
pub mod error;
pub mod pages;
pub mod preflight;
pub mod server;
pub mod store;
pub mod token;
pub mod upstream;

pub use error::{Error, Result};
pub use preflight::Preflight;
pub use server::{Gateway, SessionToken};
pub use store::{AppCredentials, CredentialStore, ListMembers, ListRecord, MemoryStore};
pub use token::SessionClaims;
pub use upstream::{MastodonHttpClient, UpstreamClient};

#[cfg(test)]
pub(crate) mod testutil;
