use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::info;

use crate::model::Facility;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
    #[error("catalog io: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read-only view of facility metadata. The engine never writes through it.
#[async_trait]
pub trait FacilityCatalog: Send + Sync {
    async fn get_facility(
        &self,
        community_id: &str,
        facility_id: &str,
    ) -> Result<Option<Facility>, CatalogError>;
}

/// Catalog held in memory, keyed by (community, facility).
#[derive(Default)]
pub struct InMemoryCatalog {
    facilities: DashMap<(String, String), Facility>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a document of the form `{ "<community>": [<facility>, ...] }`.
    pub fn from_json(doc: &str) -> Result<Self, CatalogError> {
        let parsed: HashMap<String, Vec<Facility>> = serde_json::from_str(doc)?;
        let catalog = Self::new();
        for (community, facilities) in parsed {
            for facility in facilities {
                catalog.upsert(&community, facility);
            }
        }
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let doc = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&doc)?;
        info!("loaded {} facilities from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Admin-side write: insert or replace a facility.
    pub fn upsert(&self, community_id: &str, facility: Facility) {
        self.facilities
            .insert((community_id.to_string(), facility.id.clone()), facility);
    }

    pub fn remove(&self, community_id: &str, facility_id: &str) -> Option<Facility> {
        self.facilities
            .remove(&(community_id.to_string(), facility_id.to_string()))
            .map(|(_, f)| f)
    }

    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }
}

#[async_trait]
impl FacilityCatalog for InMemoryCatalog {
    async fn get_facility(
        &self,
        community_id: &str,
        facility_id: &str,
    ) -> Result<Option<Facility>, CatalogError> {
        Ok(self
            .facilities
            .get(&(community_id.to_string(), facility_id.to_string()))
            .map(|e| e.value().clone()))
    }
}
