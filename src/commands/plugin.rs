use clap::{Args, Subcommand};
use serde::Serialize;

use roller::input;
use roller::plugin::IndexEntry;

use super::{CmdResult, GlobalArgs, Session};

#[derive(Args, Debug)]
pub struct PluginArgs {
    #[command(subcommand)]
    command: PluginCommand,
}

#[derive(Subcommand, Debug)]
enum PluginCommand {
    /// List plugins found in the plugin directory
    List,
    /// Search the plugin index by name or description
    Search {
        /// Search query
        query: String,
    },
    /// Install plugins from the index into the plugin directory
    Install {
        /// Plugin names
        names: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
pub struct PluginEntry {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
}

impl From<IndexEntry> for PluginEntry {
    fn from(entry: IndexEntry) -> Self {
        Self {
            name: entry.name,
            version: entry.version,
            description: entry.description,
            status: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PluginOutput {
    pub command: String,
    pub plugin_path: String,
    pub plugins: Vec<PluginEntry>,
}

pub fn run(args: PluginArgs, global: &GlobalArgs) -> CmdResult<PluginOutput> {
    let session = Session::open(global)?;

    let (command, plugins) = match args.command {
        PluginCommand::List => ("plugin.list", list(&session)),
        PluginCommand::Search { query } => ("plugin.search", search(&session, &query)?),
        PluginCommand::Install { names } => ("plugin.install", install(&session, &names)?),
    };

    Ok((
        PluginOutput {
            command: command.to_string(),
            plugin_path: session.plugin_dir.display().to_string(),
            plugins,
        },
        0,
    ))
}

fn list(session: &Session) -> Vec<PluginEntry> {
    session
        .plugins
        .infos()
        .into_iter()
        .map(|(_, info)| PluginEntry {
            name: info.name,
            version: info.version,
            description: info.description,
            status: None,
        })
        .collect()
}

fn search(session: &Session, query: &str) -> roller::Result<Vec<PluginEntry>> {
    let query = input::require_non_empty(query, "query", "Search query cannot be empty")?;
    let entries = session.installer().search(query)?;
    Ok(entries.into_iter().map(PluginEntry::from).collect())
}

fn install(session: &Session, names: &[String]) -> roller::Result<Vec<PluginEntry>> {
    input::require_non_empty_vec(names, "names", "Name at least one plugin to install")?;

    let mut installed = Vec::new();
    for name in names {
        let name = input::require_non_empty(name, "names", "Plugin name cannot be empty")?;
        let present = session.plugins.lookup(name).is_some();
        let info = session.plugins.resolve(name)?.info();
        installed.push(PluginEntry {
            name: info.name,
            version: info.version,
            description: info.description,
            status: Some(if present { "present" } else { "installed" }),
        });
    }
    Ok(installed)
}
