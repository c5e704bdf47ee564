use clap::Args;
use std::path::PathBuf;

use roller::init::{self, InitOutput, DEFAULT_BASE};

use super::{CmdResult, GlobalArgs};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to scaffold
    #[arg(default_value = DEFAULT_BASE)]
    pub path: PathBuf,
}

pub fn run(args: InitArgs, global: &GlobalArgs) -> CmdResult<InitOutput> {
    super::configure(global)?;
    let output = init::scaffold(&args.path)?;
    for path in &output.created {
        crate::tty::status(&format!("created {}", path));
    }
    Ok((output, 0))
}
