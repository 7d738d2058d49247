//! Per-request context derived from a verified session token.
//!
//! Every proxied API call starts the same way: unpack the claims,
//! recover the user's home instance from the subject URL, and load
//! the app credentials registered with that instance. The result is
//! everything a handler needs to talk upstream on the user's behalf.

use crate::appcreds;
use crate::error::{Error, Result};
use crate::store::{AppCredentials, CredentialStore};
use crate::token::SessionClaims;
use url::Url;

/// Request context assembled from session claims.
#[derive(Debug, Clone)]
pub struct Preflight {
    /// Numeric upstream user ID (the token's `jti`).
    pub user_id: String,
    /// Bare username, e.g. `alice`.
    pub username: String,
    /// Fully-qualified username, e.g. `alice@example.social`.
    pub fq_username: String,
    pub instance_url: Url,
    pub instance_host: String,
    /// Upstream access token carried in the session.
    pub access_token: String,
    pub app_credentials: AppCredentials,
}

impl Preflight {
    /// Build the context for one request.
    ///
    /// The claims were already signature- and expiry-checked, so a
    /// subject that fails to parse here means the gateway issued a
    /// defective token. That is an internal fault, not a client one.
    pub async fn from_claims<S: CredentialStore + ?Sized>(
        store: &S,
        claims: &SessionClaims,
    ) -> Result<Self> {
        let subject = Url::parse(&claims.sub)
            .map_err(|e| Error::Internal(format!("bad subject in issued token: {e}")))?;
        let instance_host = subject
            .host_str()
            .ok_or_else(|| Error::Internal("subject URL has no host".to_string()))?
            .to_lowercase();

        let path = subject.path();
        let username = path.strip_prefix("/@").unwrap_or(path).to_string();
        let fq_username = format!("{username}@{instance_host}");

        let instance_url = Url::parse(&format!("https://{instance_host}"))
            .map_err(|e| Error::Internal(format!("bad instance host in subject: {e}")))?;

        let app_credentials = appcreds::get_existing(store, &instance_host).await?;

        Ok(Self {
            user_id: claims.jti.clone(),
            username,
            fq_username,
            instance_url,
            instance_host,
            access_token: claims.access_token.clone(),
            app_credentials,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testutil::{seed_app_credentials, test_claims};

    #[tokio::test]
    async fn derives_identity_from_subject_url() {
        let store = MemoryStore::new();
        seed_app_credentials(&store, "example.social").await;

        let claims = test_claims("https://example.social/@alice");
        let pf = Preflight::from_claims(&store, &claims).await.unwrap();

        assert_eq!(pf.username, "alice");
        assert_eq!(pf.fq_username, "alice@example.social");
        assert_eq!(pf.instance_host, "example.social");
        assert_eq!(pf.instance_url.as_str(), "https://example.social/");
        assert_eq!(pf.user_id, claims.jti);
        assert_eq!(pf.access_token, claims.access_token);
        assert_eq!(pf.app_credentials.instance_host, "example.social");
    }

    #[tokio::test]
    async fn unparseable_subject_is_an_internal_fault() {
        let store = MemoryStore::new();
        let mut claims = test_claims("https://example.social/@alice");
        claims.sub = "not a url".to_string();

        let err = Preflight::from_claims(&store, &claims).await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn missing_credentials_surface_as_internal_class_error() {
        let store = MemoryStore::new();
        let claims = test_claims("https://example.social/@alice");

        let err = Preflight::from_claims(&store, &claims).await.unwrap_err();
        assert!(matches!(err, Error::CredentialsNotFound(_)));
    }
}
