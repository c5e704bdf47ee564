//! Whole-tree preflight.
//!
//! One task per stands file and per top-level stage, each on its own scoped
//! thread. Results come back over a channel sized to the task count. The
//! first error raises a shared abort flag; tasks still running stop at their
//! next leaf boundary. A panicking task counts as a failed one.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::executor::ExecContext;
use crate::leaf::{BindingEnv, LeafAction};
use crate::stage::{qualified_name, Phase, Stage};
use crate::stands::StandsFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Complete,
    /// Stopped early because another task failed.
    Aborted,
}

pub enum ValidationTask<'a> {
    Stands(&'a StandsFile),
    Stage(&'a Stage),
}

impl ValidationTask<'_> {
    pub fn label(&self) -> String {
        match self {
            ValidationTask::Stands(file) => format!("stands '{}'", file.release),
            ValidationTask::Stage(stage) => format!("stage '{}'", stage.name),
        }
    }

    fn run(&self, ctx: &ExecContext, env: BindingEnv<'_>, abort: &AtomicBool) -> Result<Progress> {
        match self {
            ValidationTask::Stands(file) => validate_stands(file, env, abort),
            ValidationTask::Stage(stage) => validate_stage(stage, "", ctx, env, abort),
        }
    }
}

/// Names must be non-empty and unique among siblings of one collection.
pub fn ensure_unique<'n>(
    names: impl IntoIterator<Item = &'n str>,
    scope: &str,
    stage: &str,
) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            let owner = if stage.is_empty() {
                format!("{} entry", scope)
            } else {
                format!("{} entry of stage '{}'", scope, stage)
            };
            return Err(Error::missing_field("name", owner));
        }
        if !seen.insert(name) {
            return Err(Error::duplicate_name(name, scope, stage));
        }
    }
    Ok(())
}

fn leaf_names(leaves: &[LeafAction]) -> impl Iterator<Item = &str> {
    leaves.iter().map(|leaf| leaf.name.as_str())
}

/// Recursive validation of one stage subtree: sibling names at every level,
/// then every leaf's binding. Never executes anything.
pub fn validate_stage(
    stage: &Stage,
    parent_name: &str,
    ctx: &ExecContext,
    env: BindingEnv<'_>,
    abort: &AtomicBool,
) -> Result<Progress> {
    let path = qualified_name(parent_name, &stage.name);
    let ctx = ctx.for_stage(&path);
    debug!(stage = %path, "validating stage");

    for phase in Phase::LEAF_PHASES {
        ensure_unique(leaf_names(stage.leaves(phase)), phase.as_str(), &path)?;
    }
    ensure_unique(
        stage.stages.iter().map(|child| child.name.as_str()),
        Phase::SubStages.as_str(),
        &path,
    )?;

    for phase in Phase::ORDER {
        if phase == Phase::SubStages {
            for child in &stage.stages {
                if validate_stage(child, &path, &ctx, env, abort)? == Progress::Aborted {
                    return Ok(Progress::Aborted);
                }
            }
            continue;
        }
        for leaf in stage.leaves(phase) {
            if abort.load(Ordering::SeqCst) {
                debug!(stage = %path, "validation aborted");
                return Ok(Progress::Aborted);
            }
            leaf.cascade_validation(phase.verb(), &ctx, env)?;
        }
    }

    Ok(Progress::Complete)
}

/// Structure of the catalog, then each component through its plugin.
pub fn validate_stands(
    file: &StandsFile,
    env: BindingEnv<'_>,
    abort: &AtomicBool,
) -> Result<Progress> {
    file.check_structure()?;

    for stand in &file.stands {
        for component in &stand.components {
            if abort.load(Ordering::SeqCst) {
                return Ok(Progress::Aborted);
            }
            let executor = env.plugins.resolve(&component.plugin)?;
            executor
                .get_component(&component.raw_config())
                .and_then(|c| executor.validate_component(&c))
                .map_err(|e| {
                    Error::component_invalid(&stand.name, &component.name, &component.plugin, e)
                })?;
        }
    }

    Ok(Progress::Complete)
}

/// Runs every task concurrently and waits for all of them. Returns the first
/// error received; later errors are logged, never dropped silently.
pub fn run_tasks(tasks: &[ValidationTask<'_>], ctx: &ExecContext, env: BindingEnv<'_>) -> Result<()> {
    if tasks.is_empty() {
        return Ok(());
    }

    let abort = AtomicBool::new(false);
    let (tx, rx) = mpsc::sync_channel::<(String, Result<Progress>)>(tasks.len());

    thread::scope(|scope| {
        let abort = &abort;
        for task in tasks {
            let tx = tx.clone();
            scope.spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run(ctx, env, abort)))
                    .unwrap_or_else(|payload| {
                        Err(Error::internal_unexpected(format!(
                            "validation task {} panicked: {}",
                            task.label(),
                            panic_message(payload.as_ref())
                        )))
                    });
                if outcome.is_err() {
                    abort.store(true, Ordering::SeqCst);
                }
                let _ = tx.send((task.label(), outcome));
            });
        }
        drop(tx);

        let mut first: Option<Error> = None;
        for (label, outcome) in rx {
            match outcome {
                Ok(Progress::Complete) => debug!(task = %label, "validation task passed"),
                Ok(Progress::Aborted) => info!(task = %label, "validation task stopped early"),
                Err(err) => {
                    error!(task = %label, error = %err, "validation task failed");
                    if first.is_none() {
                        first = Some(err);
                    }
                }
            }
        }

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
