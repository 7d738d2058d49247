//! Shared doubles and fixtures for the crate's tests.

use crate::error::{Error, Result};
use crate::store::{AppCredentials, CredentialStore, ListMembers, ListRecord, MemoryStore};
use crate::token::SessionClaims;
use crate::upstream::{
    Account, ActivityWeek, InstanceInfo, InstanceStats, ListInfo, RegisterAppInput, RegisteredApp,
    Status, UpstreamClient,
};
use async_trait::async_trait;
use chrono::Utc;
use p256::ecdsa::SigningKey;
use std::sync::Mutex;
use url::Url;

pub(crate) fn test_signing_key() -> SigningKey {
    SigningKey::from(p256::SecretKey::random(&mut rand::rngs::OsRng))
}

/// Seed the config scalars app registration depends on.
pub(crate) async fn seed_config(store: &MemoryStore) {
    store.put_config("app_name", "mastogate").await.unwrap();
    store
        .put_config("website", "https://mastogate.example")
        .await
        .unwrap();
    store
        .put_config("redirect_uri", "https://gate.example/auth/callback")
        .await
        .unwrap();
    store.put_config("scopes", "read").await.unwrap();
}

/// Generate a signing key, store its PEM under `jwt_signing_key`, and
/// return it for minting tokens in tests.
pub(crate) async fn seed_signing_key(store: &MemoryStore) -> SigningKey {
    use p256::pkcs8::{EncodePrivateKey, LineEnding};

    let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
    let pem = secret.to_pkcs8_pem(LineEnding::LF).unwrap();
    store.put_config("jwt_signing_key", &pem).await.unwrap();
    SigningKey::from(secret)
}

pub(crate) async fn seed_app_credentials(store: &MemoryStore, instance_host: &str) {
    store
        .put_app_credentials(&AppCredentials {
            instance_host: instance_host.to_string(),
            app_id: "13".into(),
            name: "mastogate".into(),
            website: "https://mastogate.example".into(),
            redirect_uri: format!(
                "https://gate.example/auth/callback?instance_url=https%3A%2F%2F{instance_host}%2F"
            ),
            client_id: "mock-client-id".into(),
            client_secret: "mock-client-secret".into(),
            auth_uri: format!("https://{instance_host}/oauth/authorize?client_id=mock-client-id"),
        })
        .await
        .unwrap();
}

pub(crate) fn test_claims(subject_url: &str) -> SessionClaims {
    let now = Utc::now().timestamp();
    SessionClaims {
        iss: "mastogate".into(),
        sub: subject_url.into(),
        jti: "109384203".into(),
        iat: now,
        nbf: now,
        exp: now + 3600,
        access_token: "upstream-access-token".into(),
    }
}

pub(crate) fn test_account(id: &str, username: &str, host: &str) -> Account {
    Account {
        id: id.to_string(),
        username: username.to_string(),
        acct: username.to_string(),
        display_name: username.to_string(),
        url: format!("https://{host}/@{username}"),
        avatar: String::new(),
        note: String::new(),
        followers_count: 0,
        following_count: 0,
        statuses_count: 0,
    }
}

#[derive(Default)]
struct MockState {
    total_calls: usize,
    register_calls: usize,
    last_register_scopes: Vec<String>,
    exchange_calls: usize,
    status_pages: Vec<Vec<Status>>,
    status_calls: usize,
    status_cursors: Vec<Option<String>>,
    fail_statuses_after: Option<usize>,
    lists: Vec<ListInfo>,
    list_accounts: Vec<Account>,
    profile: Option<Account>,
}

/// Scriptable `UpstreamClient` double.
#[derive(Default)]
pub(crate) struct MockUpstream {
    state: Mutex<MockState>,
}

impl MockUpstream {
    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn register_calls(&self) -> usize {
        self.lock().register_calls
    }

    /// Upstream calls of any kind. Zero means the request never got
    /// past authentication.
    pub fn total_calls(&self) -> usize {
        self.lock().total_calls
    }

    pub fn last_register_scopes(&self) -> Vec<String> {
        self.lock().last_register_scopes.clone()
    }

    pub fn exchange_calls(&self) -> usize {
        self.lock().exchange_calls
    }

    pub fn set_profile(&self, account: Account) {
        self.lock().profile = Some(account);
    }

    pub fn set_lists(&self, lists: Vec<ListInfo>) {
        self.lock().lists = lists;
    }

    pub fn set_list_accounts(&self, accounts: Vec<Account>) {
        self.lock().list_accounts = accounts;
    }

    pub fn set_status_pages(&self, pages: Vec<Vec<Status>>) {
        self.lock().status_pages = pages;
    }

    /// Make `fetch_account_statuses` fail once `n` calls have
    /// succeeded.
    pub fn fail_statuses_after(&self, n: usize) {
        self.lock().fail_statuses_after = Some(n);
    }

    /// Cursor argument observed on each statuses call, in order.
    pub fn status_cursors(&self) -> Vec<Option<String>> {
        self.lock().status_cursors.clone()
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    async fn register_app(&self, input: &RegisterAppInput) -> Result<RegisteredApp> {
        let mut state = self.lock();
        state.total_calls += 1;
        state.register_calls += 1;
        state.last_register_scopes = input.scopes.clone();
        Ok(RegisteredApp {
            id: "13".into(),
            client_id: "mock-client-id".into(),
            client_secret: "mock-client-secret".into(),
            auth_uri: format!(
                "{}oauth/authorize?client_id=mock-client-id&redirect_uri={}&response_type=code&scope={}",
                input.instance_url,
                urlencoding::encode(&input.redirect_uri),
                urlencoding::encode(&input.scopes.join(" ")),
            ),
        })
    }

    async fn exchange_code(
        &self,
        _instance_url: &Url,
        _client_id: &str,
        _client_secret: &str,
        _redirect_uri: &str,
        code: &str,
    ) -> Result<String> {
        {
            let mut state = self.lock();
            state.total_calls += 1;
            state.exchange_calls += 1;
        }
        if code == "bad-code" {
            return Err(Error::Upstream("invalid_grant".into()));
        }
        Ok("upstream-access-token".into())
    }

    async fn fetch_profile(&self, instance_url: &Url, _access_token: &str) -> Result<Account> {
        let host = instance_url.host_str().unwrap_or("example.social");
        let mut state = self.lock();
        state.total_calls += 1;
        Ok(state
            .profile
            .clone()
            .unwrap_or_else(|| test_account("109384203", "alice", host)))
    }

    async fn fetch_lists(&self, _instance_url: &Url, _access_token: &str) -> Result<Vec<ListInfo>> {
        let mut state = self.lock();
        state.total_calls += 1;
        Ok(state.lists.clone())
    }

    async fn fetch_list(
        &self,
        _instance_url: &Url,
        _access_token: &str,
        list_id: &str,
    ) -> Result<Option<ListInfo>> {
        let mut state = self.lock();
        state.total_calls += 1;
        Ok(state.lists.iter().find(|l| l.id == list_id).cloned())
    }

    async fn fetch_list_accounts(
        &self,
        _instance_url: &Url,
        _access_token: &str,
        _list_id: &str,
    ) -> Result<Vec<Account>> {
        let mut state = self.lock();
        state.total_calls += 1;
        Ok(state.list_accounts.clone())
    }

    async fn fetch_instance_info(&self, instance_url: &Url) -> Result<InstanceInfo> {
        self.lock().total_calls += 1;
        Ok(InstanceInfo {
            uri: instance_url
                .host_str()
                .unwrap_or_default()
                .to_string(),
            title: "Example Social".into(),
            short_description: "a test instance".into(),
            version: "4.2.0".into(),
            stats: InstanceStats {
                user_count: 1200,
                status_count: 98000,
                domain_count: 4100,
            },
        })
    }

    async fn fetch_instance_activity(&self, _instance_url: &Url) -> Result<Vec<ActivityWeek>> {
        self.lock().total_calls += 1;
        Ok(vec![ActivityWeek {
            week: "1692576000".into(),
            statuses: "420".into(),
            logins: "77".into(),
            registrations: "3".into(),
        }])
    }

    async fn fetch_account_statuses(
        &self,
        _instance_url: &Url,
        _access_token: &str,
        _account_id: &str,
        _limit: u32,
        max_id: Option<&str>,
    ) -> Result<Vec<Status>> {
        let mut state = self.lock();
        state.total_calls += 1;
        state.status_cursors.push(max_id.map(String::from));
        if let Some(n) = state.fail_statuses_after {
            if state.status_calls >= n {
                return Err(Error::Upstream("simulated statuses failure".into()));
            }
        }
        let page = state
            .status_pages
            .get(state.status_calls)
            .cloned()
            .unwrap_or_default();
        state.status_calls += 1;
        Ok(page)
    }
}

/// Store double whose every operation fails, for exercising the
/// storage error path.
pub(crate) struct FailingStore;

#[async_trait]
impl CredentialStore for FailingStore {
    async fn get_config(&self, _key: &str) -> Result<Option<String>> {
        Err(Error::Storage("simulated storage failure".into()))
    }

    async fn put_config(&self, _key: &str, _value: &str) -> Result<()> {
        Err(Error::Storage("simulated storage failure".into()))
    }

    async fn delete_config(&self, _key: &str) -> Result<()> {
        Err(Error::Storage("simulated storage failure".into()))
    }

    async fn get_app_credentials(&self, _instance_host: &str) -> Result<Option<AppCredentials>> {
        Err(Error::Storage("simulated storage failure".into()))
    }

    async fn put_app_credentials(&self, _creds: &AppCredentials) -> Result<()> {
        Err(Error::Storage("simulated storage failure".into()))
    }

    async fn put_list(&self, _list: &ListRecord) -> Result<()> {
        Err(Error::Storage("simulated storage failure".into()))
    }

    async fn put_list_members(&self, _members: &ListMembers) -> Result<()> {
        Err(Error::Storage("simulated storage failure".into()))
    }
}
