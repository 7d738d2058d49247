//! Instance allowlist filter.
//!
//! An optional comma-separated `permit_instances` config scalar limits
//! which Mastodon instances may participate. No scalar (or an empty
//! one) means every instance is permitted.

use crate::error::Result;
use crate::store::{CredentialStore, config_keys};

/// Whether `instance_host` may participate in the auth bridge.
///
/// A storage read failure surfaces as an error so the caller can
/// distinguish a 5xx-class fault from a plain "not permitted".
pub async fn is_permitted<S: CredentialStore + ?Sized>(
    store: &S,
    instance_host: &str,
) -> Result<bool> {
    let permit_instances = store.get_config(config_keys::PERMIT_INSTANCES).await?;

    let Some(raw) = permit_instances else {
        // No permit list configured: default-open.
        return Ok(true);
    };

    if raw.trim().is_empty() {
        return Ok(true);
    }

    let host = instance_host.to_lowercase();
    let permitted = raw
        .split(',')
        .map(|entry| entry.trim().to_lowercase())
        .any(|entry| entry == host);

    if !permitted {
        tracing::debug!(instance = %instance_host, "instance not in permit list");
    }

    Ok(permitted)
}
