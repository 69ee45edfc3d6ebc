// ── Session management ──
//
// Owns the one authenticated session the whole client shares. Login is
// single-flight: when several callers observe an invalid session at the
// same time, exactly one login hits the wire and the rest await it.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::auth::{Credentials, Session};
use crate::error::Error;

const LOGIN_PATH: &str = "/auth/login";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    account_id: String,
}

/// Manager for the shared authenticated session.
///
/// Cheaply cloneable; all clones share the same cached session and the
/// same single-flight login guard.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
    /// The cached session. `None` until login, and again after
    /// `invalidate()`. Never exposed by value.
    session: RwLock<Option<Session>>,
    /// Single-flight guard: at most one login in flight at a time.
    login_guard: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(http: reqwest::Client, base_url: Url, credentials: Credentials) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                http,
                base_url,
                credentials,
                session: RwLock::new(None),
                login_guard: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Whether a session is currently cached.
    pub fn is_authenticated(&self) -> bool {
        self.inner
            .session
            .read()
            .expect("session lock poisoned")
            .is_some()
    }

    /// The account id of the cached session, if any.
    pub fn account_id(&self) -> Option<String> {
        self.inner
            .session
            .read()
            .expect("session lock poisoned")
            .as_ref()
            .map(|s| s.account_id.clone())
    }

    /// Authenticate with the cloud, replacing any cached session.
    ///
    /// Credential rejection is fatal ([`Error::Authentication`]) and
    /// must not be retried with the same credentials; transport
    /// failures are left to the caller's retry policy.
    pub async fn login(&self) -> Result<(), Error> {
        let _guard = self.inner.login_guard.lock().await;
        self.login_locked().await
    }

    /// Make sure a session is cached, logging in if necessary.
    ///
    /// Fast path: a cached session is trusted as-is (expiry is detected
    /// by the 401 on a later call, not predicted here). Slow path:
    /// serialize on the login guard, then re-check -- a caller that
    /// waited on another's login finds the fresh session and returns
    /// without a second wire call.
    pub async fn ensure_valid(&self) -> Result<(), Error> {
        if self.is_authenticated() {
            return Ok(());
        }

        let _guard = self.inner.login_guard.lock().await;
        if self.is_authenticated() {
            debug!("session refreshed by concurrent login");
            return Ok(());
        }
        self.login_locked().await
    }

    /// Drop the cached session (explicit logout, or a caller detected
    /// an expired response).
    pub fn invalidate(&self) {
        let mut guard = self.inner.session.write().expect("session lock poisoned");
        if guard.take().is_some() {
            debug!("session invalidated");
        }
    }

    /// Attach the session token to an outbound request.
    ///
    /// With no cached session the builder is returned untouched -- the
    /// request will 401 and the caller's expiry handling takes over.
    pub fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let guard = self.inner.session.read().expect("session lock poisoned");
        match guard.as_ref() {
            Some(session) => builder.bearer_auth(session.access_token.expose_secret()),
            None => builder,
        }
    }

    /// Perform the wire login. Caller must hold `login_guard`.
    async fn login_locked(&self) -> Result<(), Error> {
        let url = crate::client::endpoint(&self.inner.base_url, LOGIN_PATH);
        debug!(url = %url, user = %self.inner.credentials.username, "logging in");

        let body = json!({
            "username": self.inner.credentials.username,
            "password": self.inner.credentials.password.expose_secret(),
        });

        let resp = self
            .inner
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "login rejected");
            return Err(Error::Authentication {
                message: format!("credentials rejected (HTTP {status}): {body}"),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                message: format!("login failed: {}", &body[..body.len().min(200)]),
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        let login: LoginResponse =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: format!("login response: {e}"),
                body,
            })?;

        let session = Session {
            access_token: SecretString::from(login.access_token),
            account_id: login.account_id,
            acquired_at: Utc::now(),
        };
        debug!(account = %session.account_id, "login successful");

        *self.inner.session.write().expect("session lock poisoned") = Some(session);
        Ok(())
    }
}
