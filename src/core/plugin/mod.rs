//! Registry of executors keyed by plugin type, with on-demand install.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::executor::{Executor, PluginInfo};

pub mod index;
pub mod process;

pub use index::{IndexEntry, IndexInstaller, PluginIndex};
pub use process::{load_plugin_dir, ProcessExecutor};

/// Fetches and builds an executor for a plugin type that is not registered.
pub trait PluginInstaller: Send + Sync {
    fn install(&self, plugin: &str) -> Result<Arc<dyn Executor>>;
}

/// Installer for runs that must only use what is already registered.
pub struct NoInstaller;

impl PluginInstaller for NoInstaller {
    fn install(&self, plugin: &str) -> Result<Arc<dyn Executor>> {
        Err(Error::plugin_install_failed(
            plugin,
            "on-demand install is not available",
        ))
    }
}

pub struct PluginController {
    registry: RwLock<HashMap<String, Arc<dyn Executor>>>,
    installer: Box<dyn PluginInstaller>,
    /// Serializes installs and remembers failures so a missing plugin is
    /// fetched at most once per controller.
    installs: Mutex<HashMap<String, Error>>,
}

impl PluginController {
    pub fn new(installer: Box<dyn PluginInstaller>) -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            installer,
            installs: Mutex::new(HashMap::new()),
        }
    }

    pub fn without_installer() -> Self {
        Self::new(Box::new(NoInstaller))
    }

    /// Adds an executor. An existing entry is never replaced; returns whether
    /// the executor was inserted.
    pub fn register(&self, plugin: &str, executor: Arc<dyn Executor>) -> bool {
        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if registry.contains_key(plugin) {
            debug!(plugin, "plugin already registered, keeping existing executor");
            return false;
        }
        registry.insert(plugin.to_string(), executor);
        true
    }

    pub fn lookup(&self, plugin: &str) -> Option<Arc<dyn Executor>> {
        self.registry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(plugin)
            .cloned()
    }

    /// Lookup, then a single on-demand install, then lookup again.
    pub fn resolve(&self, plugin: &str) -> Result<Arc<dyn Executor>> {
        if let Some(executor) = self.lookup(plugin) {
            return Ok(executor);
        }

        let mut installs = self
            .installs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(executor) = self.lookup(plugin) {
            return Ok(executor);
        }
        if let Some(previous) = installs.get(plugin) {
            return Err(Error::plugin_not_found(plugin, Some(previous)));
        }

        info!(plugin, "plugin not registered, requesting install");
        match self.installer.install(plugin) {
            Ok(executor) => {
                self.register(plugin, executor);
            }
            Err(err) => {
                warn!(plugin, error = %err, "plugin install failed");
                let not_found = Error::plugin_not_found(plugin, Some(&err));
                installs.insert(plugin.to_string(), err);
                return Err(not_found);
            }
        }

        self.lookup(plugin)
            .ok_or_else(|| Error::plugin_not_found(plugin, None))
    }

    /// Info for every registered plugin, sorted by registry key.
    pub fn infos(&self) -> Vec<(String, PluginInfo)> {
        let registry = self
            .registry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut infos: Vec<(String, PluginInfo)> = registry
            .iter()
            .map(|(key, executor)| (key.clone(), executor.info()))
            .collect();
        infos.sort_by(|a, b| a.0.cmp(&b.0));
        infos
    }
}

impl Default for PluginController {
    fn default() -> Self {
        Self::without_installer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::testing::RecordingExecutor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingInstaller {
        calls: Arc<AtomicUsize>,
        succeed: bool,
    }

    impl PluginInstaller for CountingInstaller {
        fn install(&self, plugin: &str) -> Result<Arc<dyn Executor>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(Arc::new(RecordingExecutor::new(plugin)))
            } else {
                Err(Error::plugin_install_failed(plugin, "index unreachable"))
            }
        }
    }

    fn controller(succeed: bool) -> (PluginController, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let installer = CountingInstaller {
            calls: Arc::clone(&calls),
            succeed,
        };
        (PluginController::new(Box::new(installer)), calls)
    }

    #[test]
    fn register_never_replaces_existing_entry() {
        let pc = PluginController::without_installer();
        let first = Arc::new(RecordingExecutor::new("http"));

        assert!(pc.register("http", first));
        assert!(!pc.register("http", Arc::new(RecordingExecutor::new("other"))));
        assert_eq!(pc.lookup("http").unwrap().info().name, "http");
    }

    #[test]
    fn resolve_installs_missing_plugin_once() {
        let (pc, calls) = controller(true);

        pc.resolve("ssh").unwrap();
        pc.resolve("ssh").unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(pc.lookup("ssh").is_some());
    }

    #[test]
    fn failed_install_is_plugin_not_found_and_not_retried() {
        let (pc, calls) = controller(false);

        let err = pc.resolve("helm").err().unwrap();
        assert_eq!(err.code, ErrorCode::PluginNotFound);
        assert!(err.details["installError"]
            .as_str()
            .unwrap()
            .contains("index unreachable"));

        assert!(pc.resolve("helm").is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_resolves_install_at_most_once() {
        let (pc, calls) = controller(true);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| pc.resolve("k8s").unwrap());
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
