// Credential and session types.
//
// The session token is secret material and lives behind `SecretString`;
// it only leaves this crate as an Authorization header attached by
// `SessionManager::authorize`.

use chrono::{DateTime, Utc};
use secrecy::SecretString;

/// Account credentials for the vendor cloud.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

/// An authenticated session.
///
/// Created only by a successful login and owned exclusively by
/// `SessionManager` -- callers never hold a copy, they go through the
/// manager's accessors.
#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) access_token: SecretString,
    pub(crate) account_id: String,
    pub(crate) acquired_at: DateTime<Utc>,
}

impl Session {
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }
}
