//! Writes that announce what they changed.

use serde_json::Value;
use time::OffsetDateTime;
use tracing::debug;

use super::bus::InvalidationBus;
use super::types::EntityKind;
use crate::coordinator::TokenRefreshCoordinator;
use crate::error::Result;
use crate::http::{ApiRequest, ApiResponse};

/// Sends write requests through the coordinator and, once the backend has
/// accepted them, publishes invalidations for the affected kinds.
#[derive(Debug, Clone)]
pub struct Mutator {
    coordinator: TokenRefreshCoordinator,
    bus: InvalidationBus,
}

impl Mutator {
    pub fn new(coordinator: TokenRefreshCoordinator, bus: InvalidationBus) -> Self {
        Self { coordinator, bus }
    }

    /// Execute `request` and publish `kinds`, plus the kind inferred from the
    /// request path, each exactly once.
    ///
    /// Nothing is published when the request fails.
    pub async fn execute<I, K>(&self, request: ApiRequest, kinds: I) -> Result<ApiResponse>
    where
        I: IntoIterator<Item = K>,
        K: Into<EntityKind>,
    {
        let mut affected: Vec<EntityKind> = Vec::new();
        for kind in kinds.into_iter().map(Into::into) {
            if !affected.contains(&kind) {
                affected.push(kind);
            }
        }
        if let Some(inferred) = EntityKind::from_path(request.path())
            && !affected.contains(&inferred)
        {
            affected.push(inferred);
        }

        let path = request.path().to_string();
        let response = self.coordinator.send(request).await?.error_for_status()?;

        let occurred_at = OffsetDateTime::now_utc();
        for kind in affected {
            let delivered = self.bus.publish(kind.clone(), occurred_at);
            debug!(path = %path, kind = %kind, delivered, "Published invalidation after write");
        }
        Ok(response)
    }

    pub async fn post<I, K>(&self, path: &str, body: Value, kinds: I) -> Result<ApiResponse>
    where
        I: IntoIterator<Item = K>,
        K: Into<EntityKind>,
    {
        self.execute(ApiRequest::post(path).json(body), kinds).await
    }

    pub async fn put<I, K>(&self, path: &str, body: Value, kinds: I) -> Result<ApiResponse>
    where
        I: IntoIterator<Item = K>,
        K: Into<EntityKind>,
    {
        self.execute(ApiRequest::put(path).json(body), kinds).await
    }

    pub async fn patch<I, K>(&self, path: &str, body: Value, kinds: I) -> Result<ApiResponse>
    where
        I: IntoIterator<Item = K>,
        K: Into<EntityKind>,
    {
        self.execute(ApiRequest::patch(path).json(body), kinds).await
    }

    pub async fn delete<I, K>(&self, path: &str, kinds: I) -> Result<ApiResponse>
    where
        I: IntoIterator<Item = K>,
        K: Into<EntityKind>,
    {
        self.execute(ApiRequest::delete(path), kinds).await
    }
}
