//! Session token issuance and verification.
//!
//! The session token is a self-contained ES256 JWT. It carries the
//! user's upstream access token as a custom claim, so the gateway
//! holds no per-user state between requests. Expiry is the only
//! termination mechanism; logout is client-side token discard.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Fixed session lifetime.
pub const SESSION_TTL_DAYS: i64 = 7;

/// Claims carried by a session token.
///
/// `sub` is the fully-qualified profile URL
/// (`https://{instance-host}/@{username}`) and doubles as the stable
/// identity key; `jti` is the numeric upstream user ID. The embedded
/// access token is opaque here and only ever forwarded upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub iss: String,
    pub sub: String,
    pub jti: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub access_token: String,
}

/// Parse the PEM-encoded signing key from the config store. Accepts
/// PKCS#8 (`PRIVATE KEY`) and SEC1 (`EC PRIVATE KEY`) encodings.
pub fn signing_key_from_pem(pem: &str) -> Result<SigningKey> {
    use p256::pkcs8::DecodePrivateKey;

    if let Ok(secret) = p256::SecretKey::from_pkcs8_pem(pem) {
        return Ok(SigningKey::from(secret));
    }

    let secret = p256::SecretKey::from_sec1_pem(pem)
        .map_err(|e| Error::SigningKey(format!("not a valid PKCS#8 or SEC1 P-256 key: {e}")))?;
    Ok(SigningKey::from(secret))
}

/// Issue a signed session token for a verified upstream identity.
pub fn issue(
    issuer: &str,
    subject_url: &str,
    user_id: &str,
    access_token: &str,
    signing_key: &SigningKey,
) -> Result<String> {
    let now = Utc::now();
    let claims = SessionClaims {
        iss: issuer.to_string(),
        sub: subject_url.to_string(),
        jti: user_id.to_string(),
        iat: now.timestamp(),
        nbf: now.timestamp(),
        exp: (now + Duration::days(SESSION_TTL_DAYS)).timestamp(),
        access_token: access_token.to_string(),
    };

    let payload = serde_json::to_value(&claims)
        .map_err(|e| Error::Internal(format!("failed to serialize claims: {e}")))?;
    sign_payload(&payload, signing_key)
}

/// Sign an arbitrary claims payload. Split out from [`issue`] so tests
/// can produce structurally defective tokens.
pub(crate) fn sign_payload(
    payload: &serde_json::Value,
    signing_key: &SigningKey,
) -> Result<String> {
    let header = json!({ "alg": "ES256", "typ": "JWT" });

    let header_json = serde_json::to_string(&header)
        .map_err(|e| Error::Internal(format!("failed to serialize header: {e}")))?;
    let payload_json = serde_json::to_string(payload)
        .map_err(|e| Error::Internal(format!("failed to serialize claims: {e}")))?;

    let header_b64 = URL_SAFE_NO_PAD.encode(&header_json);
    let payload_b64 = URL_SAFE_NO_PAD.encode(&payload_json);
    let signing_input = format!("{header_b64}.{payload_b64}");

    let signature: Signature = signing_key.sign(signing_input.as_bytes());
    let signature_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());

    Ok(format!("{header_b64}.{payload_b64}.{signature_b64}"))
}

/// Verify a session token and extract its claims.
///
/// Rejects tokens whose signature does not match, whose expiry has
/// passed, that are not yet valid, or that lack any of the required
/// claims.
pub fn verify(token: &str, signing_key: &SigningKey) -> Result<SessionClaims> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(Error::Unauthorized("invalid JWT format".to_string()));
    }

    let header_json = URL_SAFE_NO_PAD
        .decode(parts[0])
        .map_err(|e| Error::Unauthorized(format!("invalid header encoding: {e}")))?;
    let header: serde_json::Value = serde_json::from_slice(&header_json)
        .map_err(|e| Error::Unauthorized(format!("invalid header JSON: {e}")))?;

    let alg = header
        .get("alg")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Unauthorized("missing alg in header".to_string()))?;
    if alg != "ES256" {
        return Err(Error::Unauthorized(format!("unsupported algorithm: {alg}")));
    }

    let signature_bytes = URL_SAFE_NO_PAD
        .decode(parts[2])
        .map_err(|e| Error::Unauthorized(format!("invalid signature encoding: {e}")))?;
    let signature_bytes: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| Error::Unauthorized("invalid signature length".to_string()))?;
    let signature = Signature::from_bytes(&signature_bytes.into())
        .map_err(|e| Error::Unauthorized(format!("invalid signature format: {e}")))?;

    let signing_input = format!("{}.{}", parts[0], parts[1]);
    signing_key
        .verifying_key()
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| Error::Unauthorized("signature verification failed".to_string()))?;

    let payload_json = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| Error::Unauthorized(format!("invalid payload encoding: {e}")))?;
    let claims: SessionClaims = serde_json::from_slice(&payload_json)
        .map_err(|e| Error::Unauthorized(format!("invalid claims: {e}")))?;

    let now = Utc::now().timestamp();
    if claims.exp < now {
        return Err(Error::Unauthorized("token expired".to_string()));
    }
    if claims.nbf > now {
        return Err(Error::Unauthorized("token not yet valid".to_string()));
    }

    Ok(claims)
}
