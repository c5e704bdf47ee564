//! Builds a `MigrationSet` from the migration and stands YAML files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::atomic::Atomicity;
use crate::error::{Error, Result};
use crate::migration::MigrationSet;
use crate::plugin::PluginController;
use crate::stage::Stage;
use crate::stands::{Stand, StandsFile};
use crate::utils::io;

#[derive(Debug, Default, Deserialize)]
struct MigrationDocument {
    #[serde(default, alias = "msVersion")]
    version: String,
    #[serde(default)]
    atomic: Atomicity,
    /// Path of the stands file, relative to the migration file.
    #[serde(default)]
    stands: String,
    #[serde(default)]
    from_release: String,
    #[serde(default)]
    to_release: String,
    #[serde(default, alias = "stage")]
    stages: Vec<Stage>,
}

/// Accepts both a `stands:` list and a single `stand:` record.
#[derive(Debug, Default, Deserialize)]
struct StandsDocument {
    #[serde(default, alias = "msVersion")]
    version: String,
    #[serde(default)]
    release: String,
    #[serde(default)]
    stands: Vec<Stand>,
    #[serde(default)]
    stand: Option<Stand>,
}

impl From<StandsDocument> for StandsFile {
    fn from(doc: StandsDocument) -> Self {
        let mut stands = doc.stands;
        if let Some(single) = doc.stand {
            stands.insert(0, single);
        }
        StandsFile {
            version: doc.version,
            release: doc.release,
            stands,
        }
    }
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = io::read_file(path, &format!("read {}", path.display()))?;
    serde_yml::from_str(&content)
        .map_err(|e| Error::config_invalid_yaml(path.display().to_string(), e.to_string()))
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Relative paths resolve against the directory holding the migration file.
fn resolve_stands_path(migration: &Path, stands: &str) -> PathBuf {
    let expanded = expand(stands);
    if expanded.is_absolute() {
        return expanded;
    }
    migration
        .parent()
        .map(|dir| dir.join(&expanded))
        .unwrap_or(expanded)
}

pub fn load_stands(path: &Path) -> Result<StandsFile> {
    let doc: StandsDocument = read_yaml(path)?;
    let file = StandsFile::from(doc);
    debug!(path = %path.display(), stands = file.stands.len(), "stands file loaded");
    Ok(file)
}

pub fn load_migration_set(path: &Path, plugins: Arc<PluginController>) -> Result<MigrationSet> {
    let path = expand(&path.to_string_lossy());
    info!(path = %path.display(), "loading migration set");
    let doc: MigrationDocument = read_yaml(&path)?;

    if doc.stands.trim().is_empty() {
        return Err(Error::missing_field("stands", format!("migration file {}", path.display())));
    }
    let stands = load_stands(&resolve_stands_path(&path, &doc.stands))?;

    Ok(MigrationSet {
        version: doc.version,
        from_release: doc.from_release,
        to_release: doc.to_release,
        atomic: doc.atomic,
        stages: doc.stages,
        stands,
        plugins,
    })
}
