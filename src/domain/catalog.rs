use crate::domain::component::{Category, PayComponent};
use crate::error::PayrollError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// An immutable, versioned view of every pay component.
///
/// Calculations hold an `Arc<CatalogSnapshot>` for their whole run, so edits
/// published while they execute are invisible to them. Components are keyed
/// by id in a `BTreeMap` to give every calculation the same iteration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogSnapshot {
    version: u64,
    components: BTreeMap<String, Arc<PayComponent>>,
}

impl CatalogSnapshot {
    pub fn new(components: Vec<PayComponent>) -> Result<Self, PayrollError> {
        let mut map = BTreeMap::new();
        for component in components {
            component.validate()?;
            let id = component.id.clone();
            if map.insert(id.clone(), Arc::new(component)).is_some() {
                return Err(PayrollError::ValidationError(format!(
                    "duplicate component id {id}"
                )));
            }
        }
        Ok(Self {
            version: 1,
            components: map,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, id: &str) -> Option<&Arc<PayComponent>> {
        self.components.get(id)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Components of one category in id order, active or not.
    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &Arc<PayComponent>> {
        self.components
            .values()
            .filter(move |c| c.category == category)
    }

    /// Copy-on-write edit: returns the next version with `component` in place.
    pub fn with_component(&self, component: PayComponent) -> Result<Self, PayrollError> {
        component.validate()?;
        let mut components = self.components.clone();
        components.insert(component.id.clone(), Arc::new(component));
        Ok(Self {
            version: self.version + 1,
            components,
        })
    }
}

/// The on-disk catalog document.
#[derive(Debug, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub components: Vec<PayComponent>,
}

impl TryFrom<CatalogDocument> for CatalogSnapshot {
    type Error = PayrollError;

    fn try_from(doc: CatalogDocument) -> Result<Self, Self::Error> {
        Self::new(doc.components)
    }
}
