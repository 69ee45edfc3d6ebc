// ── Core error types ──
//
// User-facing errors from heatlink-core. Consumers never see raw
// reqwest or serde failures -- the `From<heatlink_api::Error>` impl
// translates transport-layer errors into domain variants.

use thiserror::Error;
use uuid::Uuid;

use heatlink_api::DeviceFamily;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to cloud at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// The session expired and the one permitted re-authenticate-and-retry
    /// also came back unauthorized.
    #[error("Session expired and retry was rejected")]
    SessionExpired,

    #[error("Controller not connected")]
    ControllerDisconnected,

    #[error("Request timed out")]
    Timeout,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: Uuid },

    #[error("Device {device_id} is not an {expected} unit")]
    WrongFamily {
        device_id: Uuid,
        expected: DeviceFamily,
    },

    #[error("Unknown writable field '{field}' for {family} devices")]
    UnknownField { field: String, family: DeviceFamily },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        status: Option<u16>,
    },

    // ── Persistence ──────────────────────────────────────────────────
    #[error("Energy state persistence failed: {0}")]
    Persistence(#[from] crate::persist::PersistError),

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<heatlink_api::Error> for CoreError {
    fn from(err: heatlink_api::Error) -> Self {
        match err {
            heatlink_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            heatlink_api::Error::SessionExpired => CoreError::SessionExpired,
            heatlink_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(|u| u.to_string())
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            heatlink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            heatlink_api::Error::RateLimited { retry_after_secs } => CoreError::Api {
                message: format!("Rate limited -- retry after {retry_after_secs}s"),
                status: Some(429),
            },
            heatlink_api::Error::Api { message, status } => CoreError::Api {
                message,
                status: Some(status),
            },
            heatlink_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            heatlink_api::Error::UnknownField { field, family } => {
                CoreError::UnknownField { field, family }
            }
        }
    }
}
