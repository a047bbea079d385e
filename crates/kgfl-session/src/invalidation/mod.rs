//! Cross-component cache invalidation.
//!
//! ```text
//!   Mutator ──write──> backend
//!      │ ok
//!      ▼
//!   InvalidationBus::publish("match")
//!      │
//!      ├──> DataConsumer (match, player_stats) ──> refresh()
//!      ├──> DataConsumer (match)               ──> refresh()
//!      └─x  DataConsumer (club)                    not notified
//! ```
//!
//! Producers and consumers never know about each other; the only shared
//! contract is the [`EntityKind`] tag.

pub mod bus;
pub mod mutation;
pub mod types;

pub use bus::{InvalidationBus, InvalidationHandler, Subscription};
pub use mutation::Mutator;
pub use types::{EntityKind, InvalidationEvent};
