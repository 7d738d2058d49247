//! Upstream Mastodon client.
//!
//! The gateway never validates upstream data; it forwards requests
//! with the caller's access token and relays what the instance
//! returns. The API surface is a trait so tests can substitute a
//! double for a live instance.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

/// A Mastodon account as returned by the instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub acct: String,
    #[serde(default)]
    pub display_name: String,
    /// Fully-qualified profile URL, e.g. `https://example.social/@alice`.
    /// Used as the session token subject.
    pub url: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub following_count: u64,
    #[serde(default)]
    pub statuses_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub replies_policy: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceStats {
    #[serde(default)]
    pub user_count: u64,
    #[serde(default)]
    pub status_count: u64,
    #[serde(default)]
    pub domain_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceInfo {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub stats: InstanceStats,
}

/// One week of instance activity. Mastodon serializes the counters as
/// strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityWeek {
    pub week: String,
    #[serde(default)]
    pub statuses: String,
    #[serde(default)]
    pub logins: String,
    #[serde(default)]
    pub registrations: String,
}

/// Inputs for just-in-time app registration on an instance.
#[derive(Debug, Clone)]
pub struct RegisterAppInput {
    pub client_name: String,
    pub instance_url: Url,
    pub redirect_uri: String,
    /// Scope names, already normalized; joined with a single space
    /// for the upstream call.
    pub scopes: Vec<String>,
    pub website: String,
}

/// App registration result, including the composed authorization URI.
#[derive(Debug, Clone)]
pub struct RegisteredApp {
    pub id: String,
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
}

/// Capability surface of the upstream Mastodon API.
///
/// All calls are synchronous single-shot network operations with no
/// retry or backoff; a failure aborts the whole request.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Register a new OAuth application on the instance.
    async fn register_app(&self, input: &RegisterAppInput) -> Result<RegisteredApp>;

    /// Exchange an authorization code for an access token.
    async fn exchange_code(
        &self,
        instance_url: &Url,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
        code: &str,
    ) -> Result<String>;

    /// Fetch the authenticated user's own profile.
    async fn fetch_profile(&self, instance_url: &Url, access_token: &str) -> Result<Account>;

    async fn fetch_lists(&self, instance_url: &Url, access_token: &str) -> Result<Vec<ListInfo>>;

    /// Fetch one list; `None` when the instance reports it missing.
    async fn fetch_list(
        &self,
        instance_url: &Url,
        access_token: &str,
        list_id: &str,
    ) -> Result<Option<ListInfo>>;

    async fn fetch_list_accounts(
        &self,
        instance_url: &Url,
        access_token: &str,
        list_id: &str,
    ) -> Result<Vec<Account>>;

    async fn fetch_instance_info(&self, instance_url: &Url) -> Result<InstanceInfo>;

    async fn fetch_instance_activity(&self, instance_url: &Url) -> Result<Vec<ActivityWeek>>;

    /// One page of an account's statuses, newest first. `max_id` is
    /// the pagination cursor: only statuses older than it are
    /// returned.
    async fn fetch_account_statuses(
        &self,
        instance_url: &Url,
        access_token: &str,
        account_id: &str,
        limit: u32,
        max_id: Option<&str>,
    ) -> Result<Vec<Status>>;
}

/// `UpstreamClient` implementation over plain HTTPS.
#[derive(Clone)]
pub struct MastodonHttpClient {
    http: reqwest::Client,
}

impl MastodonHttpClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: Option<&str>,
    ) -> Result<T> {
        let mut request = self.http.get(url);
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!("GET {url}: {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("GET {url}: invalid response body: {e}")))
    }
}

impl Default for MastodonHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn base(instance_url: &Url) -> String {
    instance_url.as_str().trim_end_matches('/').to_string()
}

#[derive(Debug, Deserialize)]
struct AppsResponse {
    id: String,
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[async_trait]
impl UpstreamClient for MastodonHttpClient {
    async fn register_app(&self, input: &RegisterAppInput) -> Result<RegisteredApp> {
        let base = base(&input.instance_url);
        let url = format!("{base}/api/v1/apps");
        let scopes = input.scopes.join(" ");

        let response = self
            .http
            .post(&url)
            .form(&[
                ("client_name", input.client_name.as_str()),
                ("redirect_uris", input.redirect_uri.as_str()),
                ("scopes", scopes.as_str()),
                ("website", input.website.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("POST {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!("POST {url}: {status}: {body}")));
        }

        let app: AppsResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("POST {url}: invalid response body: {e}")))?;

        // The instance does not return an authorization URI; compose
        // the standard one for this registration.
        let auth_uri = format!(
            "{base}/oauth/authorize?client_id={}&redirect_uri={}&response_type=code&scope={}",
            urlencoding::encode(&app.client_id),
            urlencoding::encode(&input.redirect_uri),
            urlencoding::encode(&scopes),
        );

        Ok(RegisteredApp {
            id: app.id,
            client_id: app.client_id,
            client_secret: app.client_secret,
            auth_uri,
        })
    }

    async fn exchange_code(
        &self,
        instance_url: &Url,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
        code: &str,
    ) -> Result<String> {
        let url = format!("{}/oauth/token", base(instance_url));

        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("redirect_uri", redirect_uri),
                ("code", code),
            ])
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("POST {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!("POST {url}: {status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("POST {url}: invalid response body: {e}")))?;

        if token.access_token.is_empty() {
            return Err(Error::Upstream(format!("POST {url}: empty access token")));
        }

        Ok(token.access_token)
    }

    async fn fetch_profile(&self, instance_url: &Url, access_token: &str) -> Result<Account> {
        let url = format!("{}/api/v1/accounts/verify_credentials", base(instance_url));
        self.get_json(&url, Some(access_token)).await
    }

    async fn fetch_lists(&self, instance_url: &Url, access_token: &str) -> Result<Vec<ListInfo>> {
        let url = format!("{}/api/v1/lists", base(instance_url));
        self.get_json(&url, Some(access_token)).await
    }

    async fn fetch_list(
        &self,
        instance_url: &Url,
        access_token: &str,
        list_id: &str,
    ) -> Result<Option<ListInfo>> {
        let url = format!("{}/api/v1/lists/{list_id}", base(instance_url));

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("GET {url}: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!("GET {url}: {status}: {body}")));
        }

        let list = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("GET {url}: invalid response body: {e}")))?;
        Ok(Some(list))
    }

    async fn fetch_list_accounts(
        &self,
        instance_url: &Url,
        access_token: &str,
        list_id: &str,
    ) -> Result<Vec<Account>> {
        // limit=0 asks the instance for all members in one response.
        let url = format!(
            "{}/api/v1/lists/{list_id}/accounts?limit=0",
            base(instance_url)
        );
        self.get_json(&url, Some(access_token)).await
    }

    async fn fetch_instance_info(&self, instance_url: &Url) -> Result<InstanceInfo> {
        let url = format!("{}/api/v1/instance", base(instance_url));
        self.get_json(&url, None).await
    }

    async fn fetch_instance_activity(&self, instance_url: &Url) -> Result<Vec<ActivityWeek>> {
        let url = format!("{}/api/v1/instance/activity", base(instance_url));
        self.get_json(&url, None).await
    }

    async fn fetch_account_statuses(
        &self,
        instance_url: &Url,
        access_token: &str,
        account_id: &str,
        limit: u32,
        max_id: Option<&str>,
    ) -> Result<Vec<Status>> {
        let mut url = format!(
            "{}/api/v1/accounts/{account_id}/statuses?limit={limit}",
            base(instance_url)
        );
        if let Some(max_id) = max_id {
            url.push_str("&max_id=");
            url.push_str(&urlencoding::encode(max_id));
        }
        self.get_json(&url, Some(access_token)).await
    }
}
