use clap::Args;
use serde::Serialize;

use roller::ExecContext;

use super::{CmdResult, GlobalArgs, MigrationArgs, Session};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub migration: MigrationArgs,
}

#[derive(Debug, Serialize)]
pub struct ValidateOutput {
    pub command: &'static str,
    pub migration: String,
    pub from_release: String,
    pub to_release: String,
    pub stages: usize,
    pub components: usize,
    pub plugins: Vec<String>,
}

pub fn run(args: ValidateArgs, global: &GlobalArgs) -> CmdResult<ValidateOutput> {
    let session = Session::open(global)?;
    let ms = session.load_migration(&args.migration)?;

    ms.cascade_validation(&ExecContext::new(false))?;

    let plugins = ms.plugins.infos().into_iter().map(|(key, _)| key).collect();

    Ok((
        ValidateOutput {
            command: "validate",
            migration: args.migration.migration.display().to_string(),
            from_release: ms.from_release.clone(),
            to_release: ms.to_release.clone(),
            stages: ms.stages.len(),
            components: ms.stands.components().count(),
            plugins,
        },
        0,
    ))
}
