use crate::domain::catalog::CatalogSnapshot;
use crate::domain::component::PayComponent;
use crate::error::{PayrollError, Result};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Shared handle to the current catalog version.
///
/// Readers take an `Arc` to the snapshot and keep it for as long as they
/// need; writers build the next version off to the side and swap it in.
#[derive(Clone, Default)]
pub struct PayComponentCatalog {
    current: Arc<RwLock<Arc<CatalogSnapshot>>>,
}

impl PayComponentCatalog {
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    pub async fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current.read().await.clone()
    }

    /// Adds or replaces a component and publishes the next version.
    pub async fn upsert(&self, component: PayComponent) -> Result<u64> {
        let mut current = self.current.write().await;
        let next = current.with_component(component)?;
        let version = next.version();
        *current = Arc::new(next);
        info!(version, "catalog updated");
        Ok(version)
    }

    pub async fn deactivate(&self, component_id: &str) -> Result<u64> {
        let mut current = self.current.write().await;
        let mut component = current
            .get(component_id)
            .map(|c| c.as_ref().clone())
            .ok_or_else(|| PayrollError::NotFoundError(format!("component {component_id}")))?;
        component.is_active = false;
        let next = current.with_component(component)?;
        let version = next.version();
        *current = Arc::new(next);
        info!(version, component_id, "component deactivated");
        Ok(version)
    }
}
