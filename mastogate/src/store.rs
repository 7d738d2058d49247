//! Storage abstraction for the gateway.
//!
//! One trait covers the three record kinds the bridge touches: global
//! config scalars, per-instance OAuth app credentials, and list
//! snapshots. The server binary supplies a sqlite implementation; the
//! in-memory implementation here backs tests and small deployments.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Config scalar keys the bridge depends on. Set by an operator
/// out-of-band; read-only from the bridge's perspective.
pub mod config_keys {
    pub const APP_NAME: &str = "app_name";
    pub const WEBSITE: &str = "website";
    pub const REDIRECT_URI: &str = "redirect_uri";
    pub const PERMIT_INSTANCES: &str = "permit_instances";
    pub const SCOPES: &str = "scopes";
    pub const JWT_SIGNING_KEY: &str = "jwt_signing_key";
}

/// OAuth application credentials registered with one Mastodon
/// instance. At most one record per instance host; created lazily on
/// first login and never updated in place (a recreate overwrites).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCredentials {
    pub instance_host: String,
    pub app_id: String,
    pub name: String,
    pub website: String,
    /// Configured base redirect URI plus the echoed `instance_url`
    /// query parameter.
    pub redirect_uri: String,
    pub client_id: String,
    pub client_secret: String,
    /// Authorization URI returned by app registration.
    pub auth_uri: String,
}

/// Snapshot of a Mastodon list at save time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRecord {
    pub instance_host: String,
    pub list_id: String,
    pub title: String,
    pub owner_user_id: String,
    /// Pre-shared key allowing non-owners to access the snapshot.
    pub psk: String,
    pub public: bool,
}

/// Member account IDs of a saved list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMembers {
    pub list_id: String,
    pub account_ids: Vec<String>,
}

/// Durable key/value persistence for the gateway.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_config(&self, key: &str) -> Result<Option<String>>;

    async fn put_config(&self, key: &str, value: &str) -> Result<()>;

    async fn delete_config(&self, key: &str) -> Result<()>;

    /// Look up app credentials by instance host.
    async fn get_app_credentials(&self, instance_host: &str) -> Result<Option<AppCredentials>>;

    /// Persist app credentials, overwriting any existing record for
    /// the same host.
    async fn put_app_credentials(&self, creds: &AppCredentials) -> Result<()>;

    async fn put_list(&self, list: &ListRecord) -> Result<()>;

    async fn put_list_members(&self, members: &ListMembers) -> Result<()>;
}

/// Fetch a required config scalar, failing with an error that names
/// the missing key.
pub(crate) async fn require_config<S: CredentialStore + ?Sized>(
    store: &S,
    key: &'static str,
) -> Result<String> {
    store
        .get_config(key)
        .await?
        .ok_or(crate::error::Error::MissingConfig(key))
}

#[derive(Default)]
struct MemoryInner {
    config: HashMap<String, String>,
    app_credentials: HashMap<String, AppCredentials>,
    lists: HashMap<String, ListRecord>,
    list_members: HashMap<String, ListMembers>,
}

/// In-memory credential store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        // Lock poisoning only happens if a writer panicked; the data
        // is plain values, so keep going with it.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Saved list snapshot, if any. Mostly useful for tests and
    /// debugging endpoints.
    pub fn saved_list(&self, list_id: &str) -> Option<ListRecord> {
        self.lock().lists.get(list_id).cloned()
    }

    pub fn saved_list_members(&self, list_id: &str) -> Option<ListMembers> {
        self.lock().list_members.get(list_id).cloned()
    }

    pub fn saved_list_count(&self) -> usize {
        self.lock().lists.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_config(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().config.get(key).cloned())
    }

    async fn put_config(&self, key: &str, value: &str) -> Result<()> {
        self.lock().config.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_config(&self, key: &str) -> Result<()> {
        self.lock().config.remove(key);
        Ok(())
    }

    async fn get_app_credentials(&self, instance_host: &str) -> Result<Option<AppCredentials>> {
        Ok(self.lock().app_credentials.get(instance_host).cloned())
    }

    async fn put_app_credentials(&self, creds: &AppCredentials) -> Result<()> {
        self.lock()
            .app_credentials
            .insert(creds.instance_host.clone(), creds.clone());
        Ok(())
    }

    async fn put_list(&self, list: &ListRecord) -> Result<()> {
        self.lock().lists.insert(list.list_id.clone(), list.clone());
        Ok(())
    }

    async fn put_list_members(&self, members: &ListMembers) -> Result<()> {
        self.lock()
            .list_members
            .insert(members.list_id.clone(), members.clone());
        Ok(())
    }
}
