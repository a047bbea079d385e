//! Session state and the login / logout / restore lifecycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::coordinator::TokenRefreshCoordinator;
use crate::credentials::Credentials;
use crate::error::{Result, SessionError};
use crate::http::ApiRequest;
use crate::types::Principal;

/// Snapshot of the current session.
///
/// `authenticated` is derived from `principal`, so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    principal: Option<Principal>,
    initializing: bool,
}

impl SessionState {
    /// State before the startup restore has run.
    pub fn initializing() -> Self {
        Self {
            principal: None,
            initializing: true,
        }
    }

    pub fn signed_out() -> Self {
        Self {
            principal: None,
            initializing: false,
        }
    }

    pub fn signed_in(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
            initializing: false,
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn authenticated(&self) -> bool {
        self.principal.is_some()
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing
    }

    pub fn role(&self) -> Option<&str> {
        self.principal.as_ref().and_then(|p| p.role.as_deref())
    }
}

/// Write side of the session state, shared by the store and the coordinator.
pub(crate) type SessionCell = Arc<watch::Sender<SessionState>>;

/// Receives the "send the user to the login screen" side effect when the
/// session ends because a refresh failed.
pub trait SessionExpiryHook: Send + Sync {
    fn on_session_expired(&self);
}

/// Default hook: records the expiry and nothing else.
#[derive(Debug, Default)]
pub struct LogExpiryHook;

impl SessionExpiryHook for LogExpiryHook {
    fn on_session_expired(&self) {
        warn!("Session expired, login required");
    }
}

pub struct SessionStore {
    coordinator: TokenRefreshCoordinator,
    credentials: Credentials,
    state: SessionCell,
    restore_lock: Mutex<()>,
    restore_epoch: AtomicU64,
}

impl SessionStore {
    pub(crate) fn new(coordinator: TokenRefreshCoordinator, state: SessionCell) -> Self {
        let credentials = coordinator.credentials().clone();
        Self {
            coordinator,
            credentials,
            state,
            restore_lock: Mutex::new(()),
            restore_epoch: AtomicU64::new(0),
        }
    }

    /// Current session snapshot.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Read-only subscription to session changes.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn principal(&self) -> Option<Principal> {
        self.state.borrow().principal.clone()
    }

    /// Exchange credentials and start a session.
    ///
    /// Nothing is stored and the state is untouched unless the exchange
    /// succeeds and both credentials were persisted.
    pub async fn login(&self, username: &str, password: &str) -> Result<Principal> {
        info!(username = %username, "Logging in");
        let (pair, principal) = match self.coordinator.exchange_credentials(username, password).await {
            Ok(parts) => parts,
            Err(e) => {
                warn!(username = %username, error = %e, "Login failed");
                return Err(e);
            }
        };

        self.coordinator.begin_session(&pair, principal.clone())?;
        info!(username = %principal.username, role = ?principal.role, "Login succeeded");
        Ok(principal)
    }

    /// Clear stored credentials and reset to signed out. Safe to call repeatedly.
    pub fn logout(&self) -> Result<()> {
        if self.coordinator.end_session()? {
            info!("Logged out");
        }
        Ok(())
    }

    /// Rebuild the session from stored credentials at startup.
    ///
    /// Concurrent callers share one restore: whoever arrives while a restore
    /// is running waits for it and returns its result instead of issuing a
    /// second principal lookup.
    pub async fn restore_session(&self) -> Result<SessionState> {
        let epoch = self.restore_epoch.load(Ordering::SeqCst);
        let _guard = self.restore_lock.lock().await;
        if self.restore_epoch.load(Ordering::SeqCst) != epoch {
            debug!("Session restore already completed by a concurrent caller");
            return Ok(self.state());
        }

        let outcome = self.restore_inner().await;
        self.restore_epoch.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    async fn restore_inner(&self) -> Result<SessionState> {
        if self.credentials.access()?.is_none() {
            debug!("No stored access credential, session starts signed out");
            self.state.send_replace(SessionState::signed_out());
            return Ok(self.state());
        }

        let me = self.coordinator.endpoints().me.clone();
        match self
            .coordinator
            .send_json::<Principal>(ApiRequest::get(me))
            .await
        {
            Ok(principal) => {
                info!(username = %principal.username, "Session restored");
                self.state.send_replace(SessionState::signed_in(principal));
            }
            Err(e) => {
                warn!(error = %e, "Session restore failed, logging out");
                self.logout()?;
                // logout() leaves an already signed-out state untouched.
                self.state.send_if_modified(|state| {
                    let was_initializing = state.initializing;
                    state.initializing = false;
                    was_initializing
                });
                if !matches!(e, SessionError::Unauthenticated) && !e.is_transient() {
                    return Err(e);
                }
            }
        }
        Ok(self.state())
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}
