//! Per-instance OAuth app credential provisioning.
//!
//! The gateway registers itself as an OAuth application on each
//! Mastodon instance the first time a user from that instance logs
//! in, then reuses the stored credentials for every later handshake.

use crate::error::{Error, Result};
use crate::store::{AppCredentials, CredentialStore, config_keys, require_config};
use crate::upstream::{RegisterAppInput, UpstreamClient};
use url::Url;

/// Instance host key for credential lookup. Lowercased so lookups are
/// insensitive to how the caller spelled the host.
pub fn host_key(instance_url: &Url) -> Result<String> {
    instance_url
        .host_str()
        .map(|h| h.to_lowercase())
        .ok_or_else(|| Error::MalformedInstanceUrl(instance_url.to_string()))
}

/// Fetch stored app credentials for an instance, or register a new
/// OAuth application with it and persist the result.
///
/// Two concurrent first logins from the same instance can both reach
/// the register step; the instance hands out two app records and the
/// later write wins. Harmless, since the loser's credentials are never
/// read again.
pub async fn get_or_create<S, U>(
    store: &S,
    upstream: &U,
    instance_url: &Url,
) -> Result<AppCredentials>
where
    S: CredentialStore + ?Sized,
    U: UpstreamClient + ?Sized,
{
    let host = host_key(instance_url)?;

    if let Some(creds) = store.get_app_credentials(&host).await? {
        tracing::debug!(instance = %host, "reusing stored app credentials");
        return Ok(creds);
    }

    let app_name = require_config(store, config_keys::APP_NAME).await?;
    let website = require_config(store, config_keys::WEBSITE).await?;
    let base_redirect = require_config(store, config_keys::REDIRECT_URI).await?;
    let scopes_raw = require_config(store, config_keys::SCOPES).await?;

    let scopes: Vec<String> = scopes_raw
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    // The callback must learn which instance the code came from, so
    // the instance URL rides along as a query parameter of the
    // registered redirect.
    let redirect_uri = format!(
        "{base_redirect}?instance_url={}",
        urlencoding::encode(instance_url.as_str())
    );

    tracing::info!(instance = %host, "registering new oauth app");
    let registered = upstream
        .register_app(&RegisterAppInput {
            client_name: app_name.clone(),
            instance_url: instance_url.clone(),
            redirect_uri: redirect_uri.clone(),
            scopes,
            website: website.clone(),
        })
        .await?;

    let creds = AppCredentials {
        instance_host: host,
        app_id: registered.id,
        name: app_name,
        website,
        redirect_uri,
        client_id: registered.client_id,
        client_secret: registered.client_secret,
        auth_uri: registered.auth_uri,
    };

    store.put_app_credentials(&creds).await?;
    Ok(creds)
}

/// Fetch stored app credentials without registering. The callback leg
/// uses this: an instance with no stored credentials cannot have
/// issued the authorization code being presented.
pub async fn get_existing<S: CredentialStore + ?Sized>(
    store: &S,
    instance_host: &str,
) -> Result<AppCredentials> {
    store
        .get_app_credentials(&instance_host.to_lowercase())
        .await?
        .ok_or_else(|| Error::CredentialsNotFound(instance_host.to_string()))
}
