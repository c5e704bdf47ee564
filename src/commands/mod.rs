use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use roller::config::{RollerConfig, DEFAULT_MIGRATION_FILE};
use roller::loader;
use roller::plugin::{load_plugin_dir, IndexInstaller, PluginController};
use roller::MigrationSet;

pub type CmdResult<T> = roller::Result<(T, i32)>;

pub(crate) struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub plugins_path: Option<PathBuf>,
}

/// Migration manifest selection shared by `run` and `validate`.
#[derive(Args, Debug)]
pub struct MigrationArgs {
    /// Migration manifest (YAML)
    #[arg(long, short = 'm', default_value = DEFAULT_MIGRATION_FILE)]
    pub migration: PathBuf,
}

/// Loads the configuration and installs the log subscriber.
pub(crate) fn configure(global: &GlobalArgs) -> roller::Result<RollerConfig> {
    let config = RollerConfig::load(global.config.as_deref())?;
    roller::logging::init(&config.global.logging);
    Ok(config)
}

/// Configuration plus a plugin registry seeded from the plugin directory.
pub(crate) struct Session {
    pub config: RollerConfig,
    pub plugin_dir: PathBuf,
    pub plugins: Arc<PluginController>,
}

impl Session {
    pub fn open(global: &GlobalArgs) -> roller::Result<Self> {
        let config = configure(global)?;
        let plugin_dir = global
            .plugins_path
            .clone()
            .unwrap_or_else(|| config.global.plugin.plugin_dir());

        let installer = Self::index_installer(&config, &plugin_dir);
        let plugins = Arc::new(PluginController::new(Box::new(installer)));
        let loaded = load_plugin_dir(&plugins, &plugin_dir)?;
        tracing::debug!(path = %plugin_dir.display(), plugins = loaded.len(), "plugin directory scanned");

        Ok(Self {
            config,
            plugin_dir,
            plugins,
        })
    }

    fn index_installer(config: &RollerConfig, plugin_dir: &std::path::Path) -> IndexInstaller {
        IndexInstaller::new(
            config.global.plugin.default_repo.clone(),
            plugin_dir.to_path_buf(),
            config.global.plugin.repo_dir(),
        )
    }

    pub fn installer(&self) -> IndexInstaller {
        Self::index_installer(&self.config, &self.plugin_dir)
    }

    pub fn load_migration(&self, args: &MigrationArgs) -> roller::Result<MigrationSet> {
        loader::load_migration_set(&args.migration, self.plugins.clone())
    }
}

pub mod init;
pub mod plugin;
pub mod run;
pub mod validate;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (roller::Result<serde_json::Value>, i32) {
    crate::tty::status("roller is working...");

    match command {
        crate::Commands::Run(args) => dispatch!(args, global, run),
        crate::Commands::Validate(args) => dispatch!(args, global, validate),
        crate::Commands::Plugin(args) => dispatch!(args, global, plugin),
        crate::Commands::Init(args) => dispatch!(args, global, init),
    }
}
