use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

/// Message returned to clients for every 5xx-class failure. The real
/// cause is logged server-side under the error_instance_id.
const GENERIC_SERVER_FAILURE: &str =
    "server side failure. please report the error_instance_id to the admin";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Client input errors
    #[error("missing '{0}' query param")]
    MissingParam(&'static str),

    #[error("unable to parse instance_url")]
    MalformedInstanceUrl(String),

    #[error("instance not in permit list")]
    InstanceNotPermitted(String),

    #[error("no list found (or unable to access) with that id")]
    ListNotFound(String),

    #[error("invalid or expired session token")]
    Unauthorized(String),

    // Operator configuration errors
    #[error("config key '{0}' is not set")]
    MissingConfig(&'static str),

    #[error("unable to use configured signing key: {0}")]
    SigningKey(String),

    // Collaborator failures
    #[error("storage error: {0}")]
    Storage(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    // Internal consistency errors
    #[error("app credentials not found for instance '{0}'")]
    CredentialsNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON body for every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Opaque correlation ID, generated per failure and logged
    /// server-side with full context.
    pub error_instance_id: String,
    pub error_message: String,
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::MissingParam(_)
            | Error::MalformedInstanceUrl(_)
            | Error::InstanceNotPermitted(_)
            | Error::ListNotFound(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let error_ref = new_error_ref();
        let status = self.status();

        // 4xx messages are specific; 5xx messages are deliberately
        // generic and the detail stays in the log.
        let message = if status.is_server_error() {
            GENERIC_SERVER_FAILURE.to_string()
        } else {
            self.to_string()
        };

        match &self {
            Error::MissingConfig(_) | Error::SigningKey(_) => {
                tracing::error!(error_ref = %error_ref, error = ?self, "operator configuration error");
            }
            Error::CredentialsNotFound(_) | Error::Internal(_) => {
                tracing::error!(error_ref = %error_ref, error = ?self, "internal consistency error");
            }
            Error::Storage(_) | Error::Upstream(_) => {
                tracing::error!(error_ref = %error_ref, error = ?self, "collaborator failure");
            }
            Error::Unauthorized(detail) => {
                tracing::warn!(error_ref = %error_ref, detail = %detail, "rejected bearer credential");
            }
            _ => {
                tracing::warn!(error_ref = %error_ref, error = ?self, "rejected request");
            }
        }

        (
            status,
            Json(ErrorEnvelope {
                error_instance_id: error_ref,
                error_message: message,
            }),
        )
            .into_response()
    }
}

/// Correlation ID for one failure instance.
fn new_error_ref() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..20)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_4xx_with_specific_message() {
        let err = Error::MissingParam("instance_url");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "missing 'instance_url' query param");

        let err = Error::InstanceNotPermitted("evil.example".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "instance not in permit list");
    }

    #[test]
    fn server_errors_map_to_5xx() {
        assert_eq!(
            Error::MissingConfig("redirect_uri").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::Storage("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::CredentialsNotFound("mastodon.example".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unauthorized_is_401() {
        assert_eq!(
            Error::Unauthorized("token expired".into()).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn error_refs_are_unique_enough() {
        let a = new_error_ref();
        let b = new_error_ref();
        assert_eq!(a.len(), 20);
        assert_ne!(a, b);
    }
}
