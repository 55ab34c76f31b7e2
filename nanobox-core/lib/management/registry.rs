//! The authoritative table of box records.
//!
//! The registry owns every [`BoxRecord`]; handles reference records by id
//! only and resolve them on each call. Lookup accepts a full id, a name,
//! or an unambiguous id prefix; an ambiguous prefix is rejected, never
//! silently resolved.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use getset::Getters;
use serde::{Deserialize, Serialize};

use crate::config::BoxConfig;
use crate::engine::IsolationUnit;
use crate::metrics::BoxMetricsStorage;
use crate::{NanoboxError, NanoboxResult};

use super::id::{BoxId, IdGenerator};
use super::state::BoxStatus;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One box's authoritative record.
///
/// The isolation unit is present exactly while the box is running.
pub(crate) struct BoxRecord {
    pub(crate) id: BoxId,
    pub(crate) name: Option<String>,
    pub(crate) status: BoxStatus,
    pub(crate) config: BoxConfig,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) unit: Option<Arc<dyn IsolationUnit>>,
    pub(crate) metrics: Arc<BoxMetricsStorage>,
    /// Serializes exec calls against this box.
    pub(crate) exec_lock: Arc<tokio::sync::Mutex<()>>,
}

/// Current state of a box as reported in info records.
#[derive(Debug, Clone, Serialize, Deserialize, Getters)]
#[getset(get = "pub with_prefix")]
pub struct BoxStateInfo {
    /// Lifecycle status
    status: BoxStatus,

    /// Whether the box is running
    running: bool,

    /// Native process id of the isolation unit when running
    pid: Option<u32>,
}

/// Public metadata about a box (returned by get/list operations).
#[derive(Debug, Clone, Serialize, Deserialize, Getters)]
#[getset(get = "pub with_prefix")]
pub struct BoxInfo {
    /// Unique box identifier
    id: BoxId,

    /// User-defined name, if any
    name: Option<String>,

    /// Current state
    state: BoxStateInfo,

    /// Creation timestamp (UTC)
    created_at: DateTime<Utc>,

    /// Image reference the box was created from
    image: String,

    /// Number of virtual CPUs
    cpus: u32,

    /// Memory limit in MiB
    memory_mib: u32,
}

/// Insertion-ordered registry of box records.
///
/// Not synchronized itself; the runtime coordinator guards it with a
/// single lock so every mutation is one visible step.
pub(crate) struct BoxRegistry {
    boxes: HashMap<BoxId, BoxRecord>,
    order: Vec<BoxId>,
    ids: IdGenerator,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BoxRecord {
    pub(crate) fn new(id: BoxId, config: BoxConfig) -> Self {
        Self {
            id,
            name: config.get_name().clone(),
            status: BoxStatus::Created,
            config,
            created_at: Utc::now(),
            unit: None,
            metrics: Arc::new(BoxMetricsStorage::default()),
            exec_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Native process id of the isolation unit, if running.
    pub(crate) fn pid(&self) -> Option<u32> {
        self.unit.as_ref().and_then(|unit| unit.pid())
    }

    pub(crate) fn to_info(&self) -> BoxInfo {
        BoxInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            state: BoxStateInfo {
                status: self.status,
                running: self.status.is_running(),
                pid: self.pid(),
            },
            created_at: self.created_at,
            image: self.config.get_image().clone(),
            cpus: self.config.effective_cpus(),
            memory_mib: self.config.effective_memory_mib(),
        }
    }
}

impl BoxRegistry {
    /// Create an empty registry.
    pub(crate) fn new() -> Self {
        Self {
            boxes: HashMap::new(),
            order: Vec::new(),
            ids: IdGenerator::new(),
        }
    }

    /// Allocate a fresh, never-reused box id.
    pub(crate) fn allocate_id(&self) -> BoxId {
        self.ids.allocate()
    }

    /// Whether a box with the given name exists.
    pub(crate) fn contains_name(&self, name: &str) -> bool {
        self.iter().any(|record| record.name.as_deref() == Some(name))
    }

    /// Insert a new record.
    pub(crate) fn insert(&mut self, record: BoxRecord) -> NanoboxResult<()> {
        if self.boxes.contains_key(&record.id) {
            return Err(NanoboxError::AlreadyExists(format!(
                "box {} is already registered",
                record.id
            )));
        }
        if let Some(name) = record.name.as_deref() {
            if self.contains_name(name) {
                return Err(NanoboxError::AlreadyExists(format!(
                    "box name '{}' is already in use",
                    name
                )));
            }
        }

        tracing::debug!(box_id = %record.id, status = %record.status, "registering box");
        self.order.push(record.id.clone());
        self.boxes.insert(record.id.clone(), record);
        Ok(())
    }

    /// Get a record by exact id.
    pub(crate) fn get(&self, id: &BoxId) -> Option<&BoxRecord> {
        self.boxes.get(id)
    }

    /// Get a mutable record by exact id.
    pub(crate) fn get_mut(&mut self, id: &BoxId) -> Option<&mut BoxRecord> {
        self.boxes.get_mut(id)
    }

    /// Resolve a lookup key to the id of the record it denotes.
    ///
    /// Resolution order: exact id, exact name, unique id prefix.
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument` for an empty key or a prefix matching two or
    ///   more boxes
    /// - `NotFound` when nothing matches
    pub(crate) fn resolve_id(&self, key: &str) -> NanoboxResult<BoxId> {
        if key.is_empty() {
            return Err(NanoboxError::InvalidArgument(
                "lookup key must not be empty".to_string(),
            ));
        }

        if let Some(id) = BoxId::parse(key) {
            if self.boxes.contains_key(&id) {
                return Ok(id);
            }
        }

        if let Some(record) = self
            .iter()
            .find(|record| record.name.as_deref() == Some(key))
        {
            return Ok(record.id.clone());
        }

        let mut matches = self.order.iter().filter(|id| id.matches_prefix(key));
        match (matches.next(), matches.next()) {
            (Some(id), None) => Ok(id.clone()),
            (Some(_), Some(_)) => Err(NanoboxError::InvalidArgument(format!(
                "id prefix '{}' is ambiguous",
                key
            ))),
            _ => Err(NanoboxError::NotFound(format!("no box matches '{}'", key))),
        }
    }

    /// Resolve a lookup key to its record.
    pub(crate) fn resolve(&self, key: &str) -> NanoboxResult<&BoxRecord> {
        let id = self.resolve_id(key)?;
        self.boxes
            .get(&id)
            .ok_or_else(|| NanoboxError::Internal(format!("resolved id {} has no record", id)))
    }

    /// Remove a record. The id is never handed out again.
    pub(crate) fn remove(&mut self, id: &BoxId) -> Option<BoxRecord> {
        self.order.retain(|known| known != id);
        self.boxes.remove(id)
    }

    /// Iterate records in insertion order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &BoxRecord> {
        self.order.iter().filter_map(|id| self.boxes.get(id))
    }

    /// Iterate records mutably (arbitrary order).
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut BoxRecord> {
        self.boxes.values_mut()
    }

    /// Number of records currently tracked.
    pub(crate) fn len(&self) -> usize {
        self.boxes.len()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record(registry: &BoxRegistry, name: Option<&str>) -> BoxRecord {
        let config = match name {
            Some(name) => BoxConfig::builder().image("alpine:3.19").name(name).build(),
            None => BoxConfig::builder().image("alpine:3.19").build(),
        };
        BoxRecord::new(registry.allocate_id(), config)
    }

    #[test]
    fn test_insert_and_exact_id_lookup() {
        let mut registry = BoxRegistry::new();
        let rec = record(&registry, None);
        let id = rec.id.clone();
        registry.insert(rec).unwrap();

        let resolved = registry.resolve_id(id.as_str()).unwrap();
        assert_eq!(resolved, id);
    }

    #[test]
    fn test_name_lookup_and_uniqueness() {
        let mut registry = BoxRegistry::new();
        let rec = record(&registry, Some("worker"));
        let id = rec.id.clone();
        registry.insert(rec).unwrap();

        assert_eq!(registry.resolve_id("worker").unwrap(), id);

        let duplicate = record(&registry, Some("worker"));
        assert!(matches!(
            registry.insert(duplicate),
            Err(NanoboxError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_unique_prefix_resolves() {
        let mut registry = BoxRegistry::new();
        let rec = record(&registry, None);
        let id = rec.id.clone();
        registry.insert(rec).unwrap();

        assert_eq!(registry.resolve_id(id.short()).unwrap(), id);
    }

    #[test]
    fn test_ambiguous_prefix_is_rejected() {
        let mut registry = BoxRegistry::new();
        let first = record(&registry, None);
        let second = record(&registry, None);
        registry.insert(first).unwrap();
        registry.insert(second).unwrap();

        // Ids allocated in the same process share their leading characters
        // (ULID timestamps move slowly at the top), so a 4-char prefix
        // matches both.
        let result = registry.resolve_id(&registry.iter().next().unwrap().id.as_str()[..4]);
        assert!(matches!(result, Err(NanoboxError::InvalidArgument(_))));
    }

    #[test]
    fn test_empty_key_is_invalid_argument() {
        let registry = BoxRegistry::new();
        assert!(matches!(
            registry.resolve_id(""),
            Err(NanoboxError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unknown_key_is_not_found() {
        let registry = BoxRegistry::new();
        assert!(matches!(
            registry.resolve_id("nothing-here"),
            Err(NanoboxError::NotFound(_))
        ));
    }

    #[test]
    fn test_removed_id_is_not_resolvable() {
        let mut registry = BoxRegistry::new();
        let rec = record(&registry, None);
        let id = rec.id.clone();
        registry.insert(rec).unwrap();

        registry.remove(&id).unwrap();
        assert!(matches!(
            registry.resolve_id(id.as_str()),
            Err(NanoboxError::NotFound(_))
        ));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_iter_preserves_insertion_order() {
        let mut registry = BoxRegistry::new();
        let mut ids = Vec::new();
        for _ in 0..4 {
            let rec = record(&registry, None);
            ids.push(rec.id.clone());
            registry.insert(rec).unwrap();
        }

        let listed: Vec<BoxId> = registry.iter().map(|r| r.id.clone()).collect();
        assert_eq!(listed, ids);
    }
}
