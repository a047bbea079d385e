//! Process-scoped owner of the session layer.
//!
//! Everything that would otherwise be a global (credentials, refresh gate,
//! session state, invalidation bus) hangs off one [`SessionContext`], built at
//! startup and shut down explicitly. Components receive handles from it
//! instead of reaching for singletons, so tests can build as many isolated
//! contexts as they like.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::info;

use crate::config::SessionConfig;
use crate::consumer::DataConsumer;
use crate::coordinator::TokenRefreshCoordinator;
use crate::credentials::{CredentialStore, Credentials, MemoryCredentialStore};
use crate::endpoints::ConsumerQuery;
use crate::error::{Result, SessionError};
use crate::guard::RouteGuard;
use crate::invalidation::{InvalidationBus, Mutator};
use crate::session::{LogExpiryHook, SessionExpiryHook, SessionState, SessionStore};

pub struct SessionContext {
    config: SessionConfig,
    coordinator: TokenRefreshCoordinator,
    session: Arc<SessionStore>,
    bus: InvalidationBus,
}

impl SessionContext {
    pub fn builder(config: SessionConfig) -> SessionContextBuilder {
        SessionContextBuilder::new(config)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &TokenRefreshCoordinator {
        &self.coordinator
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn bus(&self) -> &InvalidationBus {
        &self.bus
    }

    pub fn mutator(&self) -> Mutator {
        Mutator::new(self.coordinator.clone(), self.bus.clone())
    }

    pub fn route_guard(&self) -> RouteGuard {
        RouteGuard::new(self.session.watch())
    }

    /// Consumer decoding the body straight into `T`.
    pub fn consumer<T>(&self, query: ConsumerQuery) -> Arc<DataConsumer<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        Arc::new(
            DataConsumer::new(self.coordinator.clone(), query)
                .cache_bust(self.config.consumer.cache_bust),
        )
    }

    /// Consumer for a (possibly paginated) list endpoint.
    pub fn list_consumer<U>(&self, query: ConsumerQuery) -> Arc<DataConsumer<Vec<U>>>
    where
        U: DeserializeOwned + Send + Sync + 'static,
    {
        Arc::new(
            DataConsumer::list(self.coordinator.clone(), query)
                .cache_bust(self.config.consumer.cache_bust),
        )
    }

    /// Tear down: drop every bus subscription. Stored credentials are kept so
    /// the next process can restore the session.
    pub fn shutdown(&self) {
        self.bus.clear();
        info!("Session context shut down");
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("base_url", &self.config.api.base_url)
            .field("coordinator", &self.coordinator)
            .field("session", &self.session)
            .field("bus", &self.bus)
            .finish()
    }
}

pub struct SessionContextBuilder {
    config: SessionConfig,
    store: Option<Arc<dyn CredentialStore>>,
    expiry_hook: Option<Arc<dyn SessionExpiryHook>>,
}

impl SessionContextBuilder {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            store: None,
            expiry_hook: None,
        }
    }

    /// Credential backend; defaults to an in-memory store.
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Receiver of the "go to login" side effect; defaults to [`LogExpiryHook`].
    pub fn expiry_hook(mut self, hook: Arc<dyn SessionExpiryHook>) -> Self {
        self.expiry_hook = Some(hook);
        self
    }

    pub fn build(self) -> Result<SessionContext> {
        self.config.validate().map_err(SessionError::config)?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let hook = self
            .expiry_hook
            .unwrap_or_else(|| Arc::new(LogExpiryHook));
        let (state_tx, _) = watch::channel(SessionState::initializing());
        let state = Arc::new(state_tx);

        let coordinator = TokenRefreshCoordinator::new(
            &self.config,
            Credentials::new(store),
            Arc::clone(&state),
            hook,
        )?;
        let session = Arc::new(SessionStore::new(coordinator.clone(), state));

        info!(base_url = %self.config.api.base_url, "Session context ready");
        Ok(SessionContext {
            config: self.config,
            coordinator,
            session,
            bus: InvalidationBus::new(),
        })
    }
}
