use thiserror::Error;

/// Top-level error type for the `heatlink-api` crate.
///
/// Covers every failure mode of the vendor cloud surface: login,
/// session expiry, transport, and payload decoding. `heatlink-core`
/// maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected the credentials (wrong password, locked account).
    /// Fatal: retrying with the same credentials cannot succeed.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// An authorized call came back 401 -- the cached session token is
    /// no longer accepted. Recoverable: re-authenticate and retry once.
    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout).
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Rate limited by the cloud API. Includes retry-after in seconds.
    #[error("Rate limited -- retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    // ── API ─────────────────────────────────────────────────────────
    /// Non-success response that is not an auth failure (validation,
    /// 5xx, unexpected status).
    #[error("API error (HTTP {status}): {message}")]
    Api { message: String, status: u16 },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// A state patch was asked to carry a field the family's write
    /// schema does not define.
    #[error("Unknown writable field '{field}' for {family} devices")]
    UnknownField {
        field: String,
        family: crate::models::DeviceFamily,
    },
}

impl Error {
    /// Returns `true` if re-authenticating and retrying might resolve
    /// this error.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }

    /// Returns `true` if this is a transient error worth retrying on
    /// the next scheduled poll.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
