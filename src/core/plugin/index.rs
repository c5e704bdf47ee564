//! Installs plugins from a remote `index.json`.
//!
//! The index is cached under the repository directory for a few minutes so a
//! validation pass touching several missing plugins fetches it once.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::process::ProcessExecutor;
use super::PluginInstaller;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::utils::io;

pub const DEFAULT_INDEX_URL: &str = "https://github.com/Ilya-Guyduk/RoLLeRHub/raw/main/index.json";

const VERSION: &str = env!("CARGO_PKG_VERSION");
const CACHE_FILENAME: &str = "index.json";
const CACHE_TTL_SECS: u64 = 300;
const HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginIndex {
    #[serde(default)]
    pub plugins: Vec<IndexEntry>,
}

impl PluginIndex {
    pub fn find(&self, name: &str) -> Option<&IndexEntry> {
        self.plugins.iter().find(|entry| entry.name == name)
    }

    /// Case-insensitive match on name or description.
    pub fn search(&self, query: &str) -> Vec<IndexEntry> {
        let needle = query.to_lowercase();
        self.plugins
            .iter()
            .filter(|entry| {
                entry.name.to_lowercase().contains(&needle)
                    || entry.description.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexCache {
    repo: String,
    fetched_at: u64,
    index: PluginIndex,
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn is_cache_fresh(cache: &IndexCache, repo: &str) -> bool {
    cache.repo == repo && now_unix().saturating_sub(cache.fetched_at) < CACHE_TTL_SECS
}

fn verify_sha256(bytes: &[u8], expected: &str) -> bool {
    let digest = Sha256::digest(bytes);
    let actual: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    actual.eq_ignore_ascii_case(expected.trim())
}

pub struct IndexInstaller {
    repo_url: String,
    plugin_path: PathBuf,
    repo_path: PathBuf,
}

impl IndexInstaller {
    pub fn new(repo_url: impl Into<String>, plugin_path: PathBuf, repo_path: PathBuf) -> Self {
        Self {
            repo_url: repo_url.into(),
            plugin_path,
            repo_path,
        }
    }

    fn client(&self) -> Result<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .user_agent(format!("roller/{}", VERSION))
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::internal_unexpected(format!("Failed to create HTTP client: {}", e)))
    }

    fn cache_path(&self) -> PathBuf {
        self.repo_path.join(CACHE_FILENAME)
    }

    fn read_cache(&self) -> Option<IndexCache> {
        let content = std::fs::read_to_string(self.cache_path()).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn write_cache(&self, index: &PluginIndex) {
        let cache = IndexCache {
            repo: self.repo_url.clone(),
            fetched_at: now_unix(),
            index: index.clone(),
        };
        let Ok(content) = serde_json::to_string_pretty(&cache) else {
            return;
        };
        if std::fs::create_dir_all(&self.repo_path).is_err() {
            return;
        }
        if let Err(err) = io::write_file_atomic(&self.cache_path(), &content, "write index cache") {
            debug!(error = %err, "plugin index cache not written");
        }
    }

    /// The plugin index, from cache when it is fresh.
    pub fn fetch_index(&self) -> Result<PluginIndex> {
        if let Some(cache) = self.read_cache() {
            if is_cache_fresh(&cache, &self.repo_url) {
                debug!(repo = %self.repo_url, "using cached plugin index");
                return Ok(cache.index);
            }
        }

        debug!(repo = %self.repo_url, "fetching plugin index");
        let response = self
            .client()?
            .get(&self.repo_url)
            .send()
            .map_err(|e| Error::plugin_install_failed("index", format!("fetch {}: {}", self.repo_url, e)))?;

        if !response.status().is_success() {
            return Err(Error::plugin_install_failed(
                "index",
                format!("{} returned {}", self.repo_url, response.status()),
            ));
        }

        let index: PluginIndex = response
            .json()
            .map_err(|e| Error::internal_json(e.to_string(), Some("parse plugin index".to_string())))?;
        self.write_cache(&index);
        Ok(index)
    }

    pub fn search(&self, query: &str) -> Result<Vec<IndexEntry>> {
        Ok(self.fetch_index()?.search(query))
    }

    /// Downloads the plugin binary into the plugin directory and returns its path.
    pub fn download(&self, entry: &IndexEntry) -> Result<PathBuf> {
        info!(plugin = %entry.name, version = %entry.version, url = %entry.url, "downloading plugin");
        let response = self
            .client()?
            .get(&entry.url)
            .send()
            .map_err(|e| Error::plugin_install_failed(&entry.name, format!("download: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::plugin_install_failed(
                &entry.name,
                format!("{} returned {}", entry.url, response.status()),
            ));
        }

        let bytes = response
            .bytes()
            .map_err(|e| Error::plugin_install_failed(&entry.name, format!("download: {}", e)))?;
        if bytes.is_empty() {
            return Err(Error::plugin_install_failed(
                &entry.name,
                "downloaded plugin is empty",
            ));
        }
        if let Some(expected) = &entry.sha256 {
            if !verify_sha256(&bytes, expected) {
                return Err(Error::plugin_install_failed(
                    &entry.name,
                    "checksum mismatch",
                ));
            }
        }

        std::fs::create_dir_all(&self.plugin_path).map_err(|e| {
            Error::internal_io(e.to_string(), Some("create plugin directory".to_string()))
        })?;
        let target = self.plugin_path.join(&entry.name);
        std::fs::write(&target, &bytes)
            .map_err(|e| Error::internal_io(e.to_string(), Some("write plugin".to_string())))?;
        mark_executable(&target)?;

        Ok(target)
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| Error::internal_io(e.to_string(), Some("chmod plugin".to_string())))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}

impl PluginInstaller for IndexInstaller {
    fn install(&self, plugin: &str) -> Result<Arc<dyn Executor>> {
        let index = self.fetch_index()?;
        let entry = index.find(plugin).ok_or_else(|| {
            Error::plugin_install_failed(plugin, format!("not listed in {}", self.repo_url))
        })?;

        let path = self.download(entry)?;
        let executor = ProcessExecutor::open(&path)?;
        if executor.info().name != plugin {
            return Err(Error::plugin_install_failed(
                plugin,
                format!("installed binary reports name '{}'", executor.info().name),
            ));
        }

        crate::log_status!("plugin", "Installed {} {}", entry.name, entry.version);
        Ok(Arc::new(executor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn index() -> PluginIndex {
        serde_json::from_str(
            r#"{"plugins":[
                {"name":"ssh","version":"0.2.0","description":"Remote shell commands","url":"https://example.invalid/ssh"},
                {"name":"k8s","version":"0.1.0","description":"Kubernetes rollouts over SSH tunnels","url":"https://example.invalid/k8s","dependencies":["ssh"]}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn search_matches_name_and_description() {
        let hits = index().search("SSH");
        assert_eq!(hits.len(), 2);

        let hits = index().search("kube");
        assert_eq!(hits[0].name, "k8s");
        assert_eq!(hits[0].dependencies, vec!["ssh".to_string()]);
    }

    #[test]
    fn cache_is_fresh_only_for_same_repo_within_ttl() {
        let cache = IndexCache {
            repo: DEFAULT_INDEX_URL.to_string(),
            fetched_at: now_unix() - 10,
            index: index(),
        };
        assert!(is_cache_fresh(&cache, DEFAULT_INDEX_URL));
        assert!(!is_cache_fresh(&cache, "https://mirror.invalid/index.json"));

        let stale = IndexCache {
            fetched_at: now_unix() - CACHE_TTL_SECS - 1,
            ..cache
        };
        assert!(!is_cache_fresh(&stale, DEFAULT_INDEX_URL));
    }

    #[test]
    fn fresh_cache_avoids_network() {
        let repo = TempDir::new().unwrap();
        let installer = IndexInstaller::new(
            "https://unreachable.invalid/index.json",
            repo.path().join("plugins"),
            repo.path().to_path_buf(),
        );
        installer.write_cache(&index());

        let fetched = installer.fetch_index().unwrap();
        assert!(fetched.find("ssh").is_some());
    }

    #[test]
    fn sha256_verification() {
        let expected = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
        assert!(verify_sha256(b"hello", expected));
        assert!(verify_sha256(b"hello", &expected.to_uppercase()));
        assert!(!verify_sha256(b"hello!", expected));
    }
}
