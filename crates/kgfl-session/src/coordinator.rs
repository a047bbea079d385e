//! Authenticated HTTP client with single-flight credential refresh.
//!
//! Every outbound call goes through [`TokenRefreshCoordinator::send`]. When a
//! request comes back `401`, the caller parks on the pending queue and at most
//! one refresh runs for the whole process:
//!
//! ```text
//!   request A ──401──┐
//!   request B ──401──┼──> pending queue ──> [ single refresh task ]
//!   request C ──401──┘                             │
//!                                   ok: new access │ err: clear credentials
//!                                                  ▼
//!                         every waiter released with the same outcome
//!                         (replayed once with the new token, or Unauthenticated)
//! ```
//!
//! The refresh runs in its own task so that a caller dropping its future
//! (timeout, cancellation) never strands the other waiters.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::{AuthEndpoints, SessionConfig};
use crate::credentials::Credentials;
use crate::error::{Result, SessionError};
use crate::http::{ApiRequest, ApiResponse, error_message};
use crate::session::{SessionCell, SessionExpiryHook, SessionState};
use crate::types::{CredentialPair, LoginRequest, LoginResponse, Principal, RefreshRequest, RefreshResponse};

/// Result of one refresh, handed to every waiter.
#[derive(Debug, Clone)]
enum RefreshOutcome {
    Refreshed(String),
    Expired,
}

struct Waiter {
    ticket: u64,
    tx: oneshot::Sender<RefreshOutcome>,
}

/// The "refresh in flight" flag and the queue of requests parked behind it.
///
/// Every credential mutation (refresh resolution, login, logout) happens
/// while this lock is held, so storage I/O runs under it. Critical sections
/// never contain an `.await`.
#[derive(Default)]
struct RefreshGate {
    refreshing: bool,
    next_ticket: u64,
    pending: VecDeque<Waiter>,
}

impl RefreshGate {
    fn enqueue(&mut self) -> (u64, oneshot::Receiver<RefreshOutcome>) {
        let (tx, rx) = oneshot::channel();
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.pending.push_back(Waiter { ticket, tx });
        (ticket, rx)
    }
}

/// Removes a waiter from the queue if its caller stops waiting before the
/// refresh resolves.
struct QueueSlot {
    gate: Arc<Mutex<RefreshGate>>,
    ticket: u64,
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        let mut gate = self.gate.lock();
        gate.pending.retain(|w| w.ticket != self.ticket);
    }
}

struct CoordinatorInner {
    http: reqwest::Client,
    base_url: String,
    endpoints: AuthEndpoints,
    refresh_wait_timeout: Duration,
    credentials: Credentials,
    session: SessionCell,
    expiry_hook: Arc<dyn SessionExpiryHook>,
    gate: Arc<Mutex<RefreshGate>>,
    refresh_count: AtomicU64,
}

/// Shared, cloneable handle; all clones coordinate through the same gate.
#[derive(Clone)]
pub struct TokenRefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl TokenRefreshCoordinator {
    pub(crate) fn new(
        config: &SessionConfig,
        credentials: Credentials,
        session: SessionCell,
        expiry_hook: Arc<dyn SessionExpiryHook>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.api.request_timeout())
            .user_agent(format!("kgfl-session/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SessionError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner: Arc::new(CoordinatorInner {
                http,
                base_url: config.api.base_url.trim_end_matches('/').to_string(),
                endpoints: config.endpoints.clone(),
                refresh_wait_timeout: config.api.refresh_wait_timeout(),
                credentials,
                session,
                expiry_hook,
                gate: Arc::new(Mutex::new(RefreshGate::default())),
                refresh_count: AtomicU64::new(0),
            }),
        })
    }

    /// Send a request, refreshing the access credential and replaying the
    /// request once if the backend answers `401`.
    ///
    /// Any response other than `401` is returned as-is, including error
    /// statuses; use [`ApiResponse::error_for_status`] to turn those into errors.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let inner = &self.inner;
        if !request.authenticated {
            return inner.execute(&request, None).await;
        }

        let sent_with = inner.credentials.access()?;
        let response = inner.execute(&request, sent_with.as_deref()).await?;
        if response.status != StatusCode::UNAUTHORIZED || inner.is_refresh_call(&request) {
            return Ok(response);
        }

        debug!(method = %request.method, path = %request.path, "Request unauthorized, waiting for refresh");
        let access = CoordinatorInner::await_refresh(inner, sent_with.as_deref()).await?;

        debug!(method = %request.method, path = %request.path, "Replaying request with refreshed credential");
        let replay = inner.execute(&request, Some(&access)).await?;
        if replay.status == StatusCode::UNAUTHORIZED {
            warn!(path = %request.path, "Request still unauthorized after refresh");
            return Err(SessionError::Unauthenticated);
        }
        Ok(replay)
    }

    /// Send and decode a successful JSON body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.send(request).await?.error_for_status()?.json()
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json(ApiRequest::get(path)).await
    }

    /// Exchange a username and password for a credential pair and principal.
    pub async fn exchange_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(CredentialPair, Principal)> {
        let inner = &self.inner;
        let body = serde_json::to_value(LoginRequest { username, password })
            .map_err(|e| SessionError::decode(&inner.endpoints.login, e.to_string()))?;
        let request = ApiRequest::post(inner.endpoints.login.clone())
            .json(body)
            .anonymous();
        let response = inner.execute(&request, None).await?;

        match response.status {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let message = error_message(&response.body)
                    .unwrap_or_else(|| "username or password is incorrect".to_string());
                Err(SessionError::invalid_credentials(message))
            }
            _ => Ok(response.error_for_status()?.json::<LoginResponse>()?.into_parts()),
        }
    }

    /// Number of refresh calls issued since construction.
    pub fn refresh_count(&self) -> u64 {
        self.inner.refresh_count.load(Ordering::SeqCst)
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.inner.gate.lock().refreshing
    }

    /// Requests currently parked behind the in-flight refresh.
    pub fn pending_len(&self) -> usize {
        self.inner.gate.lock().pending.len()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.inner.credentials
    }

    pub(crate) fn endpoints(&self) -> &AuthEndpoints {
        &self.inner.endpoints
    }

    /// Persist a new credential pair and publish the signed-in state.
    ///
    /// An in-flight refresh resolves either entirely before this or against
    /// the new pair, never in between.
    pub(crate) fn begin_session(&self, pair: &CredentialPair, principal: Principal) -> Result<()> {
        let _gate = self.inner.gate.lock();
        self.inner.credentials.store_pair(pair)?;
        self.inner.session.send_replace(SessionState::signed_in(principal));
        Ok(())
    }

    /// Clear credentials and publish the signed-out state.
    ///
    /// Returns whether the published state changed.
    pub(crate) fn end_session(&self) -> Result<bool> {
        let _gate = self.inner.gate.lock();
        self.inner.credentials.clear()?;
        Ok(self.inner.publish_signed_out())
    }
}

impl CoordinatorInner {
    fn publish_signed_out(&self) -> bool {
        self.session.send_if_modified(|state| {
            let next = SessionState::signed_out();
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn is_refresh_call(&self, request: &ApiRequest) -> bool {
        request.path == self.endpoints.refresh
    }

    async fn execute(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<ApiResponse> {
        let url = self.url(&request.path);
        let mut builder = self.http.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| SessionError::from_reqwest(&url, e))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| SessionError::from_reqwest(&url, e))?;
        debug!(method = %request.method, url = %url, status = status.as_u16(), "HTTP request completed");
        Ok(ApiResponse { status, url, body })
    }

    /// Join the pending queue, starting the refresh if none is in flight, and
    /// wait for its outcome.
    async fn await_refresh(this: &Arc<Self>, sent_with: Option<&str>) -> Result<String> {
        let (ticket, rx) = {
            let mut gate = this.gate.lock();
            if !gate.refreshing {
                let current = this.credentials.access()?;
                // A refresh completed while this request was on the wire.
                if let Some(current) = current
                    && Some(current.as_str()) != sent_with
                {
                    debug!("Access credential already refreshed, replaying without refresh");
                    return Ok(current);
                }
                let Some(refresh_token) = this.credentials.refresh()? else {
                    debug!("No refresh credential stored, request stays unauthorized");
                    return Err(SessionError::Unauthenticated);
                };
                gate.refreshing = true;
                tokio::spawn(Self::run_refresh(Arc::clone(this), refresh_token));
            }
            let (ticket, rx) = gate.enqueue();
            debug!(pending = gate.pending.len(), "Joined pending refresh queue");
            (ticket, rx)
        };

        let _slot = QueueSlot {
            gate: Arc::clone(&this.gate),
            ticket,
        };
        match tokio::time::timeout(this.refresh_wait_timeout, rx).await {
            Ok(Ok(RefreshOutcome::Refreshed(access))) => Ok(access),
            Ok(Ok(RefreshOutcome::Expired)) => Err(SessionError::Unauthenticated),
            // Refresh task dropped without resolving, only happens on runtime shutdown.
            Ok(Err(_)) => Err(SessionError::Unauthenticated),
            Err(_) => {
                warn!(
                    timeout_ms = this.refresh_wait_timeout.as_millis() as u64,
                    "Gave up waiting for credential refresh"
                );
                Err(SessionError::timeout(this.url(&this.endpoints.refresh)))
            }
        }
    }

    async fn run_refresh(this: Arc<Self>, refresh_token: String) {
        this.refresh_count.fetch_add(1, Ordering::SeqCst);
        info!("Refreshing access credential");
        let result = this.refresh_access(&refresh_token).await;

        let expired = {
            let mut gate = this.gate.lock();
            debug_assert!(gate.refreshing, "refresh resolved without the in-flight flag");

            let (outcome, expired) = if this.owns_session(&refresh_token) {
                this.apply_refresh(result, gate.pending.len())
            } else {
                // Login or logout happened while the refresh was on the wire.
                debug!(pending = gate.pending.len(), "Session changed during refresh, leaving credentials alone");
                let outcome = match this.credentials.access() {
                    Ok(Some(access)) => RefreshOutcome::Refreshed(access),
                    Ok(None) => RefreshOutcome::Expired,
                    Err(e) => {
                        error!(error = %e, "Failed to read stored access credential");
                        RefreshOutcome::Expired
                    }
                };
                (outcome, false)
            };

            for waiter in gate.pending.drain(..) {
                // The receiver is gone if the caller was cancelled.
                let _ = waiter.tx.send(outcome.clone());
            }
            gate.refreshing = false;
            expired
        };

        if expired {
            this.expiry_hook.on_session_expired();
        }
    }

    /// Whether the stored refresh credential is still the one a refresh used.
    /// Caller holds the gate lock.
    fn owns_session(&self, refresh_token: &str) -> bool {
        match self.credentials.refresh() {
            Ok(current) => current.as_deref() == Some(refresh_token),
            Err(e) => {
                error!(error = %e, "Failed to read stored refresh credential");
                false
            }
        }
    }

    /// Store the refreshed access credential, or end the session on failure.
    /// Caller holds the gate lock.
    fn apply_refresh(&self, result: Result<String>, pending: usize) -> (RefreshOutcome, bool) {
        let outcome = match result {
            Ok(access) => match self.credentials.store_access(&access) {
                Ok(()) => {
                    info!(pending, "Access credential refreshed");
                    RefreshOutcome::Refreshed(access)
                }
                Err(e) => {
                    error!(error = %e, "Failed to persist refreshed access credential");
                    RefreshOutcome::Expired
                }
            },
            Err(e) => {
                warn!(error = %e, pending, "Credential refresh failed, ending session");
                RefreshOutcome::Expired
            }
        };

        let expired = matches!(outcome, RefreshOutcome::Expired);
        if expired {
            if let Err(e) = self.credentials.clear() {
                error!(error = %e, "Failed to clear stored credentials");
            }
            self.publish_signed_out();
        }
        (outcome, expired)
    }

    async fn refresh_access(&self, refresh_token: &str) -> Result<String> {
        let body = serde_json::to_value(RefreshRequest {
            refresh: refresh_token,
        })
        .map_err(|e| SessionError::decode(&self.endpoints.refresh, e.to_string()))?;
        let request = ApiRequest::post(self.endpoints.refresh.clone())
            .json(body)
            .anonymous();
        let response = self.execute(&request, None).await?.error_for_status()?;
        Ok(response.json::<RefreshResponse>()?.access)
    }
}

impl std::fmt::Debug for TokenRefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRefreshCoordinator")
            .field("base_url", &self.inner.base_url)
            .field("refreshing", &self.is_refreshing())
            .field("pending", &self.pending_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_tickets_are_unique_and_fifo() {
        let mut gate = RefreshGate::default();
        let (a, _rx_a) = gate.enqueue();
        let (b, _rx_b) = gate.enqueue();
        assert_ne!(a, b);
        let order: Vec<u64> = gate.pending.iter().map(|w| w.ticket).collect();
        assert_eq!(order, vec![a, b]);
    }

    #[test]
    fn test_queue_slot_drop_removes_only_its_waiter() {
        let gate = Arc::new(Mutex::new(RefreshGate::default()));
        let (first, _rx1) = gate.lock().enqueue();
        let (second, _rx2) = gate.lock().enqueue();

        drop(QueueSlot {
            gate: Arc::clone(&gate),
            ticket: first,
        });

        let remaining: Vec<u64> = gate.lock().pending.iter().map(|w| w.ticket).collect();
        assert_eq!(remaining, vec![second]);
    }
}
