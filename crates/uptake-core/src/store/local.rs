//! Local filesystem artifact store

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::{ArtifactId, ArtifactStore};
use crate::error::{Error, Result};
use crate::table::Table;

/// Directory-backed store writing `<name>-<hash>.json.gz` files
pub struct LocalStore {
    /// Directory where tables are stored
    dir: PathBuf,
}

impl LocalStore {
    /// Create a new local store
    ///
    /// Creates the directory if it doesn't exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();

        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| {
                Error::Store(format!(
                    "Failed to create artifact directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            info!("Created artifact directory: {}", dir.display());
        }

        Ok(Self { dir })
    }

    /// Get the store directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve an id to a file inside the store directory
    fn artifact_path(&self, id: &ArtifactId) -> Result<PathBuf> {
        let name = id.as_str();
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(Error::Store(format!("Invalid artifact id: {}", name)));
        }
        Ok(self.dir.join(name))
    }
}

/// Keep logical names file-system safe
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "table".to_string()
    } else {
        cleaned
    }
}

impl ArtifactStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    fn save(&self, table: &Table, name: &str) -> Result<ArtifactId> {
        let body = serde_json::to_vec(table)?;
        let digest = hex::encode(Sha256::digest(&body));
        let id = ArtifactId::new(format!("{}-{}.json.gz", sanitize_name(name), &digest[..16]));
        let path = self.artifact_path(&id)?;

        // Content-addressed: identical tables share one file
        if path.exists() {
            debug!("Artifact already stored: {}", path.display());
            return Ok(id);
        }

        let file = File::create(&path)?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        encoder.write_all(&body)?;
        encoder.finish()?.flush()?;

        info!(rows = table.len(), "Stored artifact: {}", path.display());
        Ok(id)
    }

    fn load(&self, id: &ArtifactId) -> Result<Table> {
        let path = self.artifact_path(id)?;

        if !path.exists() {
            return Err(Error::NotFound(format!("artifact {}", path.display())));
        }

        let decoder = GzDecoder::new(BufReader::new(File::open(&path)?));
        let table: Table = serde_json::from_reader(decoder)?;
        debug!(rows = table.len(), "Loaded artifact: {}", path.display());
        Ok(table)
    }
}
