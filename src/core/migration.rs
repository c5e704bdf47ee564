//! Root object binding a release transition to a stage tree, a catalog and
//! the plugin registry.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::atomic::{self, Atomicity};
use crate::error::{Error, ErrorCode, Result};
use crate::executor::ExecContext;
use crate::leaf::BindingEnv;
use crate::plugin::PluginController;
use crate::report::RunReport;
use crate::stage::{Stage, StageRunner};
use crate::stands::StandsFile;
use crate::validation::{self, ValidationTask};

pub struct MigrationSet {
    pub version: String,
    pub from_release: String,
    pub to_release: String,
    pub atomic: Atomicity,
    pub stages: Vec<Stage>,
    pub stands: StandsFile,
    pub plugins: Arc<PluginController>,
}

/// Outcome of `update_release`: the report is kept even when the run failed.
#[derive(Debug, Serialize)]
pub struct ReleaseRun {
    pub report: RunReport,
    #[serde(skip)]
    pub result: Result<()>,
}

impl ReleaseRun {
    pub fn into_result(self) -> Result<RunReport> {
        self.result.map(|_| self.report)
    }
}

impl MigrationSet {
    fn env(&self) -> BindingEnv<'_> {
        BindingEnv {
            stands: &self.stands,
            plugins: &self.plugins,
        }
    }

    fn check_required(&self) -> Result<()> {
        for (field, value) in [
            ("version", &self.version),
            ("from_release", &self.from_release),
            ("to_release", &self.to_release),
        ] {
            if value.trim().is_empty() {
                return Err(Error::missing_field(field, "migration set"));
            }
        }
        if self.stages.is_empty() {
            return Err(Error::missing_field("stages", "migration set"));
        }
        Ok(())
    }

    /// Whole-tree preflight. Nothing executes unless this returns `Ok`.
    pub fn cascade_validation(&self, ctx: &ExecContext) -> Result<()> {
        self.check_required()?;
        validation::ensure_unique(self.stages.iter().map(|s| s.name.as_str()), "stage", "")?;

        let mut tasks = vec![ValidationTask::Stands(&self.stands)];
        tasks.extend(self.stages.iter().map(ValidationTask::Stage));

        info!(
            from = %self.from_release,
            to = %self.to_release,
            tasks = tasks.len(),
            "starting cascade validation"
        );
        validation::run_tasks(&tasks, ctx, self.env())?;
        info!("cascade validation finished");
        Ok(())
    }

    /// Walks root stages sequentially. A failing root stage stops the release
    /// only when the set itself is atomic.
    pub fn update_release(&self, ctx: &ExecContext) -> ReleaseRun {
        let report = RunReport::new(&self.from_release, &self.to_release, ctx.dry_run);
        let mut runner = StageRunner::new(self.env(), ctx.clone(), report);
        let abort_on_failure = atomic::resolve(self.atomic, Atomicity::Unset);

        info!(
            from = %self.from_release,
            to = %self.to_release,
            dry_run = ctx.dry_run,
            "starting release update"
        );

        let mut result = Ok(());
        for stage in &self.stages {
            if let Err(err) = runner.execute(stage, self.atomic, "") {
                if abort_on_failure || err.code == ErrorCode::ExecutionCancelled {
                    result = Err(err);
                    break;
                }
                warn!(stage = %stage.name, error = %err, "root stage failed, continuing");
            }
        }

        ReleaseRun {
            report: runner.into_report(),
            result,
        }
    }

    /// Preflight, then execution.
    pub fn rollout(&self, ctx: &ExecContext) -> Result<ReleaseRun> {
        self.cascade_validation(ctx)?;
        Ok(self.update_release(ctx))
    }
}
