//! Client-side session and cache-coherence layer for the KGFL league site.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  reads   ┌──────────────────────────┐  HTTP  ┌─────────┐
//! │ DataConsumer ├─────────>│ TokenRefreshCoordinator  ├───────>│ backend │
//! └──────▲───────┘          │ (single-flight refresh)  │        └─────────┘
//!        │ refresh()        └────────────▲─────────────┘
//!        │                               │ writes
//! ┌──────┴──────────┐  publish  ┌────────┴──┐
//! │ InvalidationBus │<──────────┤  Mutator  │
//! └─────────────────┘           └───────────┘
//! ```
//!
//! - [`coordinator`]: bearer auth, refresh-on-401 with one refresh in flight
//! - [`session`]: login, logout, startup restore, observable session state
//! - [`invalidation`]: entity-kind tagged publish/subscribe and the write helper
//! - [`consumer`]: cached reads that re-fetch on invalidation
//! - [`context`]: the process-scoped owner wiring it all together

pub mod config;
pub mod consumer;
pub mod context;
pub mod coordinator;
pub mod credentials;
pub mod endpoints;
pub mod error;
pub mod guard;
pub mod http;
pub mod invalidation;
pub mod session;
pub mod types;

pub use config::SessionConfig;
pub use consumer::{ConsumerState, DataConsumer, FetchOutcome, MountedConsumer};
pub use context::{SessionContext, SessionContextBuilder};
pub use coordinator::TokenRefreshCoordinator;
pub use credentials::{CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore};
pub use error::{Result, SessionError, StorageError};
pub use guard::{GuardDecision, RouteGuard};
pub use http::{ApiRequest, ApiResponse};
pub use invalidation::{EntityKind, InvalidationBus, InvalidationEvent, Mutator, Subscription};
pub use session::{LogExpiryHook, SessionExpiryHook, SessionState, SessionStore};
pub use types::{CredentialPair, Paginated, Principal};
