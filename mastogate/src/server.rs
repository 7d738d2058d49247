//! HTTP surface of the gateway.
//!
//! Two unauthenticated legs (`/auth/login`, `/auth/callback`) run the
//! OAuth handshake against the user's home instance; everything under
//! `/api` plus `/auth/verify` requires the bearer session token the
//! callback leg minted.

use crate::allowlist;
use crate::appcreds;
use crate::error::{Error, Result};
use crate::pages;
use crate::preflight::Preflight;
use crate::store::{CredentialStore, ListMembers, ListRecord, config_keys, require_config};
use crate::token::{self, SessionClaims};
use crate::upstream::{Account, ActivityWeek, InstanceInfo, ListInfo, Status, UpstreamClient};
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Shared state behind every route.
pub struct Gateway<S, U> {
    store: Arc<S>,
    upstream: Arc<U>,
}

// Derived Clone would require S: Clone and U: Clone.
impl<S, U> Clone for Gateway<S, U> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            upstream: self.upstream.clone(),
        }
    }
}

impl<S, U> Gateway<S, U>
where
    S: CredentialStore + 'static,
    U: UpstreamClient + 'static,
{
    pub fn new(store: Arc<S>, upstream: Arc<U>) -> Self {
        Self { store, upstream }
    }

    /// Build the router with all gateway endpoints.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(handle_root))
            .route("/auth/login", get(handle_login))
            .route("/auth/callback", get(handle_callback))
            .route("/auth/verify", get(handle_verify))
            .route("/api/myLists", get(handle_my_lists))
            .route("/api/accountsInList/{list_id}", get(handle_accounts_in_list))
            .route("/api/instanceInfo", get(handle_instance_info))
            .with_state(self.clone())
    }

    /// Collect every status of an account by draining the pagination
    /// stream. Exposed for callers that want the whole history rather
    /// than the HTTP page size.
    pub async fn collect_account_statuses(
        &self,
        instance_url: &Url,
        access_token: &str,
        account_id: &str,
        page_size: u32,
    ) -> Result<Vec<Status>> {
        let mut rx = pages::stream_account_statuses(
            self.upstream.clone(),
            instance_url.clone(),
            access_token.to_string(),
            account_id.to_string(),
            page_size,
        );

        let mut all = Vec::new();
        while let Some(page) = rx.recv().await {
            all.extend(page?);
        }
        Ok(all)
    }
}

/// Bearer session token, verified before the handler runs.
pub struct SessionToken(pub SessionClaims);

fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
}

impl<S, U> FromRequestParts<Gateway<S, U>> for SessionToken
where
    S: CredentialStore + 'static,
    U: UpstreamClient + 'static,
{
    type Rejection = Error;

    fn from_request_parts(
        parts: &mut Parts,
        state: &Gateway<S, U>,
    ) -> impl std::future::Future<Output = Result<Self>> + Send {
        let store = state.store.clone();
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(String::from);

        async move {
            let header = auth_header
                .ok_or_else(|| Error::Unauthorized("missing authorization header".to_string()))?;
            let bearer = extract_bearer_token(&header)
                .ok_or_else(|| Error::Unauthorized("not a bearer credential".to_string()))?;

            let pem = require_config(&*store, config_keys::JWT_SIGNING_KEY).await?;
            let signing_key = token::signing_key_from_pem(&pem)?;
            let claims = token::verify(bearer, &signing_key)?;

            Ok(SessionToken(claims))
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RootResponse {
    name: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct LoginQuery {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    instance_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub authuri: String,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    instance_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub token: String,
    #[serde(rename = "type")]
    pub token_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub account: Account,
    pub last_status: Option<Status>,
}

#[derive(Debug, Deserialize)]
struct AccountsInListQuery {
    #[serde(default)]
    save: Option<String>,
    #[serde(default)]
    public: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountsInListResponse {
    #[serde(rename = "listID")]
    pub list_id: String,
    #[serde(rename = "listName")]
    pub list_name: String,
    #[serde(rename = "ownerID")]
    pub owner_id: String,
    pub accounts: Vec<Account>,
    /// Present only when the snapshot was saved on this request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psk: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstanceInfoResponse {
    pub instance: InstanceInfo,
    pub activity: Vec<ActivityWeek>,
}

fn require_param(value: Option<String>, name: &'static str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::MissingParam(name)),
    }
}

fn parse_instance_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|_| Error::MalformedInstanceUrl(raw.to_string()))?;
    if url.host_str().is_none() {
        return Err(Error::MalformedInstanceUrl(raw.to_string()));
    }
    Ok(url)
}

async fn check_allowlist<S: CredentialStore + ?Sized>(store: &S, instance_url: &Url) -> Result<String> {
    let host = instance_url
        .host_str()
        .ok_or_else(|| Error::MalformedInstanceUrl(instance_url.to_string()))?
        .to_lowercase();
    if !allowlist::is_permitted(store, &host).await? {
        return Err(Error::InstanceNotPermitted(host));
    }
    Ok(host)
}

async fn handle_root() -> Json<RootResponse> {
    Json(RootResponse {
        name: "mastogate".to_string(),
        status: "ok".to_string(),
    })
}

/// Login leg: hand the browser the instance's authorization URI,
/// registering the gateway as an app on that instance first if this
/// is its first visitor.
async fn handle_login<S, U>(
    State(gateway): State<Gateway<S, U>>,
    Query(query): Query<LoginQuery>,
) -> Result<Json<LoginResponse>>
where
    S: CredentialStore + 'static,
    U: UpstreamClient + 'static,
{
    let username = require_param(query.username, "username")?;
    let raw_instance = require_param(query.instance_url, "instance_url")?;

    let instance_url = parse_instance_url(&raw_instance)?;
    let host = check_allowlist(&*gateway.store, &instance_url).await?;

    let creds = appcreds::get_or_create(&*gateway.store, &*gateway.upstream, &instance_url).await?;

    tracing::info!(username = %username, instance = %host, "login redirect issued");
    Ok(Json(LoginResponse {
        authuri: creds.auth_uri,
    }))
}

/// Callback leg: exchange the authorization code, verify the identity
/// it belongs to, and mint a session token.
async fn handle_callback<S, U>(
    State(gateway): State<Gateway<S, U>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<CallbackResponse>>
where
    S: CredentialStore + 'static,
    U: UpstreamClient + 'static,
{
    let code = require_param(query.code, "code")?;
    let raw_instance = require_param(query.instance_url, "instance_url")?;

    let instance_url = parse_instance_url(&raw_instance)?;
    let host = check_allowlist(&*gateway.store, &instance_url).await?;

    // Lookup only. A callback with no stored credentials means the
    // code cannot have come from a login this gateway initiated.
    let creds = appcreds::get_existing(&*gateway.store, &host).await?;

    let access_token = gateway
        .upstream
        .exchange_code(
            &instance_url,
            &creds.client_id,
            &creds.client_secret,
            &creds.redirect_uri,
            &code,
        )
        .await?;

    let account = gateway.upstream.fetch_profile(&instance_url, &access_token).await?;

    let issuer = require_config(&*gateway.store, config_keys::APP_NAME).await?;
    let pem = require_config(&*gateway.store, config_keys::JWT_SIGNING_KEY).await?;
    let signing_key = token::signing_key_from_pem(&pem)?;
    let session = token::issue(&issuer, &account.url, &account.id, &access_token, &signing_key)?;

    tracing::info!(subject = %account.url, instance = %host, "session token issued");
    Ok(Json(CallbackResponse {
        token: session,
        token_type: "Bearer".to_string(),
    }))
}

/// Echo the authenticated profile plus the user's most recent status.
async fn handle_verify<S, U>(
    State(gateway): State<Gateway<S, U>>,
    SessionToken(claims): SessionToken,
) -> Result<Json<VerifyResponse>>
where
    S: CredentialStore + 'static,
    U: UpstreamClient + 'static,
{
    let pf = Preflight::from_claims(&*gateway.store, &claims).await?;

    let account = gateway
        .upstream
        .fetch_profile(&pf.instance_url, &pf.access_token)
        .await?;
    let last_status = gateway
        .upstream
        .fetch_account_statuses(&pf.instance_url, &pf.access_token, &account.id, 1, None)
        .await?
        .into_iter()
        .next();

    Ok(Json(VerifyResponse {
        account,
        last_status,
    }))
}

async fn handle_my_lists<S, U>(
    State(gateway): State<Gateway<S, U>>,
    SessionToken(claims): SessionToken,
) -> Result<Json<Vec<ListInfo>>>
where
    S: CredentialStore + 'static,
    U: UpstreamClient + 'static,
{
    let pf = Preflight::from_claims(&*gateway.store, &claims).await?;
    let lists = gateway
        .upstream
        .fetch_lists(&pf.instance_url, &pf.access_token)
        .await?;
    Ok(Json(lists))
}

/// List detail plus member accounts, with an opt-in persisted
/// snapshot.
async fn handle_accounts_in_list<S, U>(
    State(gateway): State<Gateway<S, U>>,
    SessionToken(claims): SessionToken,
    Path(list_id): Path<String>,
    Query(query): Query<AccountsInListQuery>,
) -> Result<Json<AccountsInListResponse>>
where
    S: CredentialStore + 'static,
    U: UpstreamClient + 'static,
{
    let pf = Preflight::from_claims(&*gateway.store, &claims).await?;

    let list = gateway
        .upstream
        .fetch_list(&pf.instance_url, &pf.access_token, &list_id)
        .await?
        .ok_or_else(|| Error::ListNotFound(list_id.clone()))?;

    let accounts = gateway
        .upstream
        .fetch_list_accounts(&pf.instance_url, &pf.access_token, &list_id)
        .await?;

    let save = flag_set(query.save.as_deref());
    let psk = if save {
        let psk = new_psk();
        gateway
            .store
            .put_list(&ListRecord {
                instance_host: pf.instance_host.clone(),
                list_id: list.id.clone(),
                title: list.title.clone(),
                owner_user_id: pf.user_id.clone(),
                psk: psk.clone(),
                public: flag_set(query.public.as_deref()),
            })
            .await?;
        gateway
            .store
            .put_list_members(&ListMembers {
                list_id: list.id.clone(),
                account_ids: accounts.iter().map(|a| a.id.clone()).collect(),
            })
            .await?;
        tracing::info!(list = %list.id, owner = %pf.user_id, "list snapshot saved");
        Some(psk)
    } else {
        None
    };

    Ok(Json(AccountsInListResponse {
        list_id: list.id,
        list_name: list.title,
        owner_id: pf.user_id,
        accounts,
        psk,
    }))
}

async fn handle_instance_info<S, U>(
    State(gateway): State<Gateway<S, U>>,
    SessionToken(claims): SessionToken,
) -> Result<Json<InstanceInfoResponse>>
where
    S: CredentialStore + 'static,
    U: UpstreamClient + 'static,
{
    let pf = Preflight::from_claims(&*gateway.store, &claims).await?;

    let instance = gateway.upstream.fetch_instance_info(&pf.instance_url).await?;
    let activity = gateway
        .upstream
        .fetch_instance_activity(&pf.instance_url)
        .await?;

    Ok(Json(InstanceInfoResponse { instance, activity }))
}

fn flag_set(value: Option<&str>) -> bool {
    matches!(value, Some(v) if v.eq_ignore_ascii_case("true") || v == "1")
}

/// Pre-shared key for a saved list snapshot: 48 random bytes, base64
/// url-safe, truncated to 32 characters.
fn new_psk() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; 48];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut encoded = base64::engine::general_purpose::URL_SAFE.encode(bytes);
    encoded.truncate(32);
    encoded
}
