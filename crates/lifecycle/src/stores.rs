//! Store resolution collaborator.

use async_trait::async_trait;
use common::StoreId;
use domain::DeliveryDetails;

/// Resolves which store serves a delivery target.
///
/// An external collaborator treated as a pure function: given coordinates or
/// an address it returns one store, or `None` when no store is within
/// service radius. Resolution preference (explicit coordinates, then the
/// supplied address, then the caller's saved primary address) is the
/// implementation's concern.
#[async_trait]
pub trait StoreResolver: Send + Sync {
    /// Returns the serving store, or `None` if the target is out of radius.
    async fn resolve(&self, delivery: &DeliveryDetails) -> Option<StoreId>;
}

/// Resolver with a fixed answer, for tests and local development.
#[derive(Debug, Clone)]
pub struct FixedStoreResolver {
    store_id: Option<StoreId>,
}

impl FixedStoreResolver {
    /// Always resolves to the given store.
    pub fn serving(store_id: StoreId) -> Self {
        Self {
            store_id: Some(store_id),
        }
    }

    /// Never resolves (everything is out of radius).
    pub fn out_of_radius() -> Self {
        Self { store_id: None }
    }
}

#[async_trait]
impl StoreResolver for FixedStoreResolver {
    async fn resolve(&self, _delivery: &DeliveryDetails) -> Option<StoreId> {
        self.store_id
    }
}
