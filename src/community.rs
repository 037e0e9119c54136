use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::info;

use crate::catalog::{CatalogError, FacilityCatalog, InMemoryCatalog};
use crate::clock::{Clock, SystemClock};
use crate::compactor;
use crate::config::{Config, EngineSettings};
use crate::engine::Engine;
use crate::limits::*;
use crate::notify::NotifyHub;

/// One engine per community, created on first use. Each gets its own booking
/// log (`<community>.wal` under the data directory) and compactor task.
pub struct CommunityManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    settings: EngineSettings,
    compact_threshold: u64,
    compact_interval: Duration,
    catalog: Arc<dyn FacilityCatalog>,
    clock: Arc<dyn Clock>,
}

impl CommunityManager {
    pub fn new(config: &Config, catalog: Arc<dyn FacilityCatalog>) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir: config.data_dir.clone(),
            settings: config.engine_settings(),
            compact_threshold: config.compact_threshold,
            compact_interval: config.compact_interval,
            catalog,
            clock: Arc::new(SystemClock),
        }
    }

    /// Build from configuration alone: creates the data directory and seeds an
    /// in-memory catalog from `catalog_path` when set.
    pub fn from_config(config: &Config) -> Result<Self, CatalogError> {
        std::fs::create_dir_all(&config.data_dir)?;
        let catalog = match &config.catalog_path {
            Some(path) => InMemoryCatalog::load(path)?,
            None => InMemoryCatalog::new(),
        };
        Ok(Self::new(config, Arc::new(catalog)))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get or lazily load the engine for a community.
    pub fn get_or_create(&self, community: &str) -> io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(community) {
            return Ok(engine.value().clone());
        }
        if community.len() > MAX_COMMUNITY_NAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "community name too long",
            ));
        }
        if self.engines.len() >= MAX_COMMUNITIES {
            return Err(io::Error::other("too many communities"));
        }

        // The name is the log's file stem verbatim, so it is never rewritten:
        // two names that cleaned up to one stem would share a log. Lowercase
        // only, so case-insensitive filesystems cannot merge them either.
        if community.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty community name",
            ));
        }
        if !community
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "community name must be lowercase ascii letters, digits, '_' or '-'",
            ));
        }

        // Two callers may race to load the same community; the entry lock
        // makes exactly one of them open the log.
        let entry = self.engines.entry(community.to_string());
        if let dashmap::mapref::entry::Entry::Occupied(existing) = &entry {
            return Ok(existing.get().clone());
        }

        let wal_path = self.data_dir.join(format!("{community}.wal"));
        let engine = Arc::new(
            Engine::new(
                community,
                wal_path,
                self.catalog.clone(),
                Arc::new(NotifyHub::new()),
                self.settings,
            )?
            .with_clock(self.clock.clone()),
        );

        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        let every = self.compact_interval;
        tokio::spawn(async move {
            compactor::run_compactor(compactor_engine, threshold, every).await;
        });

        entry.or_insert(engine.clone());
        metrics::gauge!(crate::observability::COMMUNITIES_ACTIVE).set(self.engines.len() as f64);
        info!(community, "loaded community engine");
        Ok(engine)
    }

    pub fn loaded(&self) -> usize {
        self.engines.len()
    }
}
