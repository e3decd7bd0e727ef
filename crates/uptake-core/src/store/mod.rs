//! Artifact storage with pluggable backends
//!
//! Stages persist their output tables through an [`ArtifactStore`] and
//! receive their input as a [`TableInput`]: a durable handle, an in-memory
//! row set, or both. Resolution tries the store first and falls back to the
//! rows, so a stage always gets a table.
//!
//! # Backends
//!
//! - `NullStore` keeps nothing; `save` hands back a symbolic id
//! - `MemoryStore` keeps tables in process memory
//! - `LocalStore` writes gzip-compressed JSON files to a directory

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::table::Table;

mod local;

pub use local::LocalStore;

/// Handle to a stored table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id handed out when nothing was actually stored
    pub fn symbolic(name: &str) -> Self {
        Self(format!("table:{}", name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_symbolic(&self) -> bool {
        self.0.starts_with("table:")
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trait for table storage backends
pub trait ArtifactStore: Send + Sync {
    /// Human-readable name for this store
    fn name(&self) -> &str;

    /// Store a table under a logical name, returning its handle
    fn save(&self, table: &Table, name: &str) -> Result<ArtifactId>;

    /// Load a previously stored table
    fn load(&self, id: &ArtifactId) -> Result<Table>;
}

/// Store for environments without durable storage
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl ArtifactStore for NullStore {
    fn name(&self) -> &str {
        "null"
    }

    fn save(&self, _table: &Table, name: &str) -> Result<ArtifactId> {
        Ok(ArtifactId::symbolic(name))
    }

    fn load(&self, _id: &ArtifactId) -> Result<Table> {
        Ok(Table::new())
    }
}

/// Process-local table store
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<ArtifactId, Table>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tables
    pub fn len(&self) -> usize {
        self.tables.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn save(&self, table: &Table, name: &str) -> Result<ArtifactId> {
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = ArtifactId::new(format!("mem:{}:{}", name, seq));
        self.tables
            .lock()
            .map_err(|_| Error::Store("memory store lock poisoned".into()))?
            .insert(id.clone(), table.clone());
        debug!(id = %id, rows = table.len(), "Stored table in memory");
        Ok(id)
    }

    fn load(&self, id: &ArtifactId) -> Result<Table> {
        self.tables
            .lock()
            .map_err(|_| Error::Store("memory store lock poisoned".into()))?
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("artifact {}", id)))
    }
}

/// Stage input: a stored table handle, an in-memory row set, or both
#[derive(Debug, Clone, Default)]
pub struct TableInput {
    pub handle: Option<ArtifactId>,
    pub rows: Option<Table>,
}

impl TableInput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_handle(handle: ArtifactId) -> Self {
        Self {
            handle: Some(handle),
            rows: None,
        }
    }

    pub fn from_rows(rows: Table) -> Self {
        Self {
            handle: None,
            rows: Some(rows),
        }
    }

    /// Attach an in-memory fallback
    pub fn with_rows(mut self, rows: Table) -> Self {
        self.rows = Some(rows);
        self
    }

    /// Resolve to a table: stored copy first, then in-memory rows, else empty
    ///
    /// Load failures are logged and recorded in `notes`; they never propagate.
    pub fn resolve(&self, store: &dyn ArtifactStore, label: &str, notes: &mut Vec<String>) -> Table {
        if let Some(handle) = &self.handle {
            match store.load(handle) {
                Ok(table) if !table.is_empty() => {
                    debug!(label, id = %handle, rows = table.len(), "Loaded table from store");
                    return table;
                }
                Ok(_) => {
                    debug!(label, id = %handle, store = store.name(), "Stored table is empty");
                }
                Err(e) => {
                    warn!(label, id = %handle, error = %e, "Failed to load table from store");
                    notes.push(format!("{}: load of {} failed: {}", label, handle, e));
                }
            }
        }

        match &self.rows {
            Some(rows) if !rows.is_empty() => {
                info!(label, rows = rows.len(), "Using in-memory rows");
                rows.clone()
            }
            _ => Table::new(),
        }
    }
}

/// Save a table, falling back to a symbolic id if the store fails
pub fn save_or_symbolic(
    store: &dyn ArtifactStore,
    table: &Table,
    name: &str,
    notes: &mut Vec<String>,
) -> ArtifactId {
    match store.save(table, name) {
        Ok(id) => id,
        Err(e) => {
            warn!(name, store = store.name(), error = %e, "Failed to save table");
            notes.push(format!("{}: save failed: {}", name, e));
            ArtifactId::symbolic(name)
        }
    }
}
