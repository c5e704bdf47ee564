use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::{init, plugin, run, validate};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "roller")]
#[command(version = VERSION)]
#[command(about = "Staged release rollouts driven by pluggable executors")]
struct Cli {
    /// Configuration file (defaults to ./config.yml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Plugin directory, overriding global.plugin.plugin_path
    #[arg(long, global = true, value_name = "DIR")]
    plugins_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the migration set, then execute it
    Run(run::RunArgs),
    /// Validate the migration set without executing anything
    Validate(validate::ValidateArgs),
    /// Inspect, search and install plugins
    Plugin(plugin::PluginArgs),
    /// Scaffold stands, release and config templates
    Init(init::InitArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let global = GlobalArgs {
        config: cli.config,
        plugins_path: cli.plugins_path,
    };

    let (json_result, exit_code) = commands::run_json(cli.command, &global);

    if let Err(err) = output::print_json_result(json_result) {
        output::print_result::<serde_json::Value>(Err(err)).ok();
        return std::process::ExitCode::from(exit_code_to_u8(1));
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
