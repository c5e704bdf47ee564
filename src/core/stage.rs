//! The recursive stage tree and its execution order.
//!
//! A stage runs its phases strictly as `Phase::ORDER` lists them. Sub-stages
//! run depth-first in declaration order, inheriting the resolved abort policy
//! of their parent.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::atomic::{self, Atomicity};
use crate::error::{Error, ErrorCode, Result};
use crate::executor::ExecContext;
use crate::leaf::{BindingEnv, LeafAction, LeafOutcome, Verb};
use crate::report::{LeafRecord, LeafStatus, RunReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PreCheck,
    PreScript,
    SubStages,
    Task,
    PostScript,
    PostCheck,
}

impl Phase {
    pub const ORDER: [Phase; 6] = [
        Phase::PreCheck,
        Phase::PreScript,
        Phase::SubStages,
        Phase::Task,
        Phase::PostScript,
        Phase::PostCheck,
    ];

    /// Phases holding leaf actions.
    pub const LEAF_PHASES: [Phase; 5] = [
        Phase::PreCheck,
        Phase::PreScript,
        Phase::Task,
        Phase::PostScript,
        Phase::PostCheck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::PreCheck => "pre_check",
            Phase::PreScript => "pre_script",
            Phase::SubStages => "stage",
            Phase::Task => "task",
            Phase::PostScript => "post_script",
            Phase::PostCheck => "post_check",
        }
    }

    pub fn verb(&self) -> Verb {
        match self {
            Phase::PreCheck | Phase::PostCheck => Verb::Check,
            _ => Verb::Mutate,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stage {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default, skip_serializing_if = "Atomicity::is_unset")]
    pub atomic: Atomicity,
    /// Parsed and carried; no rollback algorithm consumes it.
    #[serde(default)]
    pub rollback: bool,
    #[serde(default)]
    pub pre_check: Vec<LeafAction>,
    #[serde(default)]
    pub pre_script: Vec<LeafAction>,
    #[serde(default)]
    pub task: Vec<LeafAction>,
    #[serde(default)]
    pub post_check: Vec<LeafAction>,
    #[serde(default, alias = "post_scriprt")]
    pub post_script: Vec<LeafAction>,
    #[serde(default, rename = "stage", alias = "stages")]
    pub stages: Vec<Stage>,
}

impl Stage {
    pub fn leaves(&self, phase: Phase) -> &[LeafAction] {
        match phase {
            Phase::PreCheck => &self.pre_check,
            Phase::PreScript => &self.pre_script,
            Phase::SubStages => &[],
            Phase::Task => &self.task,
            Phase::PostScript => &self.post_script,
            Phase::PostCheck => &self.post_check,
        }
    }
}

pub fn qualified_name(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

/// Per-run execution state: walks stages sequentially and records every
/// executed item.
pub struct StageRunner<'a> {
    env: BindingEnv<'a>,
    ctx: ExecContext,
    report: RunReport,
}

impl<'a> StageRunner<'a> {
    pub fn new(env: BindingEnv<'a>, ctx: ExecContext, report: RunReport) -> Self {
        Self { env, ctx, report }
    }

    pub fn into_report(self) -> RunReport {
        self.report
    }

    /// Runs one stage. `Ok` means every phase completed or every failure was
    /// tolerated.
    pub fn execute(&mut self, stage: &Stage, parent: Atomicity, parent_name: &str) -> Result<()> {
        let path = qualified_name(parent_name, &stage.name);
        let atomic = atomic::resolve(stage.atomic, parent);
        let ctx = self.ctx.for_stage(&path);

        info!(stage = %path, atomic, "stage started");
        if !stage.desc.is_empty() {
            info!(stage = %path, "{}", stage.desc);
        }

        for phase in Phase::ORDER {
            match phase {
                Phase::SubStages => {
                    for child in &stage.stages {
                        self.ensure_not_cancelled(&ctx)?;
                        if let Err(err) = self.execute(child, Atomicity::from_flag(atomic), &path) {
                            self.handle_sub_stage_failure(&ctx, &child.name, err, atomic)?;
                        }
                    }
                }
                _ => {
                    for leaf in stage.leaves(phase) {
                        self.ensure_not_cancelled(&ctx)?;
                        self.run_leaf(&ctx, phase, leaf, atomic)?;
                    }
                }
            }
        }

        info!(stage = %path, "stage finished");
        Ok(())
    }

    fn ensure_not_cancelled(&self, ctx: &ExecContext) -> Result<()> {
        if ctx.is_cancelled() {
            warn!(stage = %ctx.stage, "cancellation requested");
            return Err(Error::execution_cancelled(&ctx.stage));
        }
        Ok(())
    }

    fn run_leaf(&mut self, ctx: &ExecContext, phase: Phase, leaf: &LeafAction, atomic: bool) -> Result<()> {
        let result = leaf
            .exec(phase.verb(), ctx, self.env)
            .and_then(|outcome| match outcome {
                LeafOutcome::CheckFailed => Err(Error::check_failed(leaf.location(ctx))),
                other => Ok(other),
            });

        match result {
            Ok(outcome) => {
                let status = if outcome == LeafOutcome::Skipped {
                    LeafStatus::Skipped
                } else {
                    LeafStatus::Succeeded
                };
                self.record(ctx, phase, &leaf.name, Some(&leaf.plugin), status, None);
                Ok(())
            }
            Err(err) => self.handle_failure(ctx, phase, &leaf.name, Some(&leaf.plugin), err, atomic),
        }
    }

    /// Pre-checks are always fatal; everything else only under an atomic
    /// policy. Cancellation always propagates.
    fn handle_failure(
        &mut self,
        ctx: &ExecContext,
        phase: Phase,
        name: &str,
        plugin: Option<&str>,
        err: Error,
        atomic: bool,
    ) -> Result<()> {
        if err.code == ErrorCode::ExecutionCancelled {
            return Err(err);
        }

        let fatal = phase == Phase::PreCheck || atomic;
        let status = match (fatal, err.code) {
            (false, _) => LeafStatus::Tolerated,
            (true, ErrorCode::ExecutionCheckFailed) => LeafStatus::CheckFailed,
            (true, _) => LeafStatus::Failed,
        };
        self.record(ctx, phase, name, plugin, status, Some(err.message.clone()));

        if fatal {
            error!(stage = %ctx.stage, phase = phase.as_str(), item = name, error = %err, "aborting stage");
            Err(err)
        } else {
            warn!(stage = %ctx.stage, phase = phase.as_str(), item = name, error = %err, "failure tolerated, continuing");
            Ok(())
        }
    }

    /// The failing leaf was already recorded inside the child, so a sub-stage
    /// failure adds no record of its own.
    fn handle_sub_stage_failure(
        &self,
        ctx: &ExecContext,
        name: &str,
        err: Error,
        atomic: bool,
    ) -> Result<()> {
        if err.code == ErrorCode::ExecutionCancelled || atomic {
            error!(stage = %ctx.stage, phase = Phase::SubStages.as_str(), item = name, error = %err, "aborting stage");
            return Err(err);
        }
        warn!(stage = %ctx.stage, phase = Phase::SubStages.as_str(), item = name, error = %err, "failure tolerated, continuing");
        Ok(())
    }

    fn record(
        &mut self,
        ctx: &ExecContext,
        phase: Phase,
        name: &str,
        plugin: Option<&str>,
        status: LeafStatus,
        error: Option<String>,
    ) {
        self.report.push(LeafRecord {
            stage: ctx.stage.clone(),
            phase,
            name: name.to_string(),
            plugin: plugin.map(str::to_string),
            status,
            error,
        });
    }
}
