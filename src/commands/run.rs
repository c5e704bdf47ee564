use clap::Args;
use serde::Serialize;

use roller::report::{RunReport, RunStatus, RunSummary};
use roller::ExecContext;

use super::{CmdResult, GlobalArgs, MigrationArgs, Session};
use crate::output::exit_code_for_error;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub migration: MigrationArgs,

    /// Validate and walk every stage without executing actions or checks
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct RunError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub command: &'static str,
    pub status: RunStatus,
    pub summary: RunSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    pub report: RunReport,
}

pub fn run(args: RunArgs, global: &GlobalArgs) -> CmdResult<RunOutput> {
    let session = Session::open(global)?;
    let ms = session.load_migration(&args.migration)?;
    let ctx = ExecContext::new(args.dry_run);

    crate::tty::status(&format!(
        "Rolling {} -> {}{}",
        ms.from_release,
        ms.to_release,
        if args.dry_run { " (dry run)" } else { "" }
    ));

    // Validation failures never produce a report; they surface as the error envelope.
    let run = ms.rollout(&ctx)?;
    let status = run.report.status();
    let summary = run.report.summary();

    let (error, exit_code) = match run.result {
        Err(err) => {
            tracing::error!(code = err.code.as_str(), chain = ?err.chain(), "release failed");
            let code = exit_code_for_error(err.code);
            let error = RunError {
                code: err.code.as_str().to_string(),
                causes: err.chain().into_iter().skip(1).collect(),
                message: err.message,
            };
            (Some(error), code)
        }
        Ok(()) if status == RunStatus::Failed => (None, 20),
        Ok(()) => (None, 0),
    };

    Ok((
        RunOutput {
            command: "run",
            status,
            summary,
            error,
            report: run.report,
        },
        exit_code,
    ))
}
