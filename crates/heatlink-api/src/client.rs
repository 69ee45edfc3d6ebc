// ── Cloud HTTP client ──
//
// Wraps `reqwest::Client` with vendor URL construction, status→error
// mapping, and body decoding. One client serves both device families:
// the snapshot endpoint is combined by design and is never split into
// per-family calls.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;
use uuid::Uuid;

use crate::auth::Credentials;
use crate::error::Error;
use crate::models::{
    DeviceFamily, Measure, StatePatch, TelemetryResponse, TelemetrySeries, UserContext,
};
use crate::session::SessionManager;
use crate::transport::TransportConfig;

/// Build a full URL for an API path under the cloud base URL.
pub(crate) fn endpoint(base_url: &Url, path: &str) -> Url {
    let base = base_url.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Url::parse(&format!("{base}/{path}")).expect("invalid endpoint URL")
}

/// The unified client for the vendor cloud API.
///
/// Owns the HTTP transport and the [`SessionManager`]; every request
/// goes out with the shared session's token attached. Cheaply cloneable
/// (`reqwest::Client` is reference-counted internally).
#[derive(Clone)]
pub struct CloudClient {
    http: reqwest::Client,
    base_url: Url,
    session: SessionManager,
}

impl CloudClient {
    /// Create a client. Performs no I/O -- call
    /// [`SessionManager::ensure_valid`] (or just start issuing requests
    /// and handle [`Error::SessionExpired`]) to authenticate.
    pub fn new(
        base_url: Url,
        credentials: Credentials,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let session = SessionManager::new(http.clone(), base_url.clone(), credentials);
        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    /// The shared session manager.
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// The cloud base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Snapshot ─────────────────────────────────────────────────────

    /// Fetch the combined snapshot: every device of both families in
    /// one authenticated round trip.
    pub async fn fetch_user_context(&self) -> Result<UserContext, Error> {
        let url = endpoint(&self.base_url, "/user/context");
        debug!(url = %url, "fetching user context");

        let resp = self
            .session
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(Error::Transport)?;

        Self::decode(resp).await
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Send a full sparse-patch update for one device.
    ///
    /// The patch must carry every writable field of the family's schema
    /// ([`StatePatch`] guarantees this by construction); untouched
    /// fields go out as the explicit `null` sentinel.
    pub async fn send_update(
        &self,
        device_id: Uuid,
        family: DeviceFamily,
        patch: &StatePatch,
    ) -> Result<(), Error> {
        debug_assert_eq!(family, patch.family());

        let path = format!("/devices/{}/{device_id}/state", family.path_segment());
        let url = endpoint(&self.base_url, &path);
        debug!(url = %url, %family, "sending state update");

        let resp = self
            .session
            .authorize(self.http.put(url).json(patch))
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if status.is_success() {
            trace!(%device_id, "update accepted");
            return Ok(());
        }
        Err(Self::status_error(resp).await)
    }

    // ── Telemetry ────────────────────────────────────────────────────

    /// Fetch one telemetry measure over a time range.
    ///
    /// Returns [`TelemetrySeries::Unavailable`] when the device has no
    /// such series at all -- a structural answer the capability probe
    /// depends on, distinct from any transport error.
    pub async fn fetch_telemetry(
        &self,
        device_id: Uuid,
        measure: Measure,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<TelemetrySeries, Error> {
        let mut url = endpoint(&self.base_url, &format!("/devices/{device_id}/telemetry"));
        url.query_pairs_mut()
            .append_pair("measure", measure.query_value())
            .append_pair("from", &from.to_rfc3339_opts(SecondsFormat::Secs, true))
            .append_pair("to", &to.to_rfc3339_opts(SecondsFormat::Secs, true));
        trace!(url = %url, "fetching telemetry");

        let resp = self
            .session
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(Error::Transport)?;

        let raw: TelemetryResponse = Self::decode(resp).await?;
        Ok(TelemetrySeries::from(raw))
    }

    // ── Response handling ────────────────────────────────────────────

    /// Decode a JSON body, mapping non-success statuses first.
    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();
        if !status.is_success() {
            return Err(Self::status_error(resp).await);
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        serde_json::from_str(&body).map_err(|e| {
            let preview = &body[..body.len().min(200)];
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })
    }

    /// Map a non-success response to the error taxonomy.
    ///
    /// 401 is special-cased as [`Error::SessionExpired`] so the control
    /// layer can run its reauthenticate-and-retry-once path; everything
    /// else surfaces as-is.
    async fn status_error(resp: reqwest::Response) -> Error {
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Error::SessionExpired;
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            return Error::RateLimited { retry_after_secs };
        }

        let body = resp.text().await.unwrap_or_default();
        Error::Api {
            message: body[..body.len().min(200)].to_owned(),
            status: status.as_u16(),
        }
    }
}
