//! Leaf actions: checks, scripts and tasks bound to a plugin and a component.
//!
//! All three share one record shape. What differs is the verb: checks are
//! read-only and report pass/fail, scripts and tasks mutate.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{Error, LeafLocation, Result};
use crate::executor::{
    ConfigMap, ExecContext, Executor, PluginAction, PluginCheck, PluginComponent,
};
use crate::plugin::PluginController;
use crate::stands::StandsFile;

/// How a leaf names its target component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComponentRef {
    /// Name or group of a component in the stands file.
    Lookup(String),
    /// Config given directly on the leaf.
    Inline(ConfigMap),
}

impl ComponentRef {
    pub fn label(&self) -> &str {
        match self {
            ComponentRef::Lookup(key) => key,
            ComponentRef::Inline(_) => "inline",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeafAction {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub plugin: String,
    #[serde(default)]
    pub action: Option<ConfigMap>,
    #[serde(default)]
    pub component: Option<ComponentRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    Check,
    Mutate,
}

#[derive(Debug, Clone)]
pub enum BoundPayload {
    Check(PluginCheck),
    Action(PluginAction),
}

/// A leaf whose payload and component both passed plugin validation.
pub struct ValidatedLeaf {
    pub executor: Arc<dyn Executor>,
    pub payload: BoundPayload,
    pub component: PluginComponent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafOutcome {
    Passed,
    /// A check ran and answered `false`.
    CheckFailed,
    /// Dry run: bound and validated but not executed.
    Skipped,
}

/// What leaves are bound against.
#[derive(Clone, Copy)]
pub struct BindingEnv<'a> {
    pub stands: &'a StandsFile,
    pub plugins: &'a PluginController,
}

impl LeafAction {
    pub fn location<'a>(&'a self, ctx: &'a ExecContext) -> LeafLocation<'a> {
        LeafLocation {
            stage: &ctx.stage,
            leaf: &self.name,
            plugin: &self.plugin,
            component: self.component.as_ref().map(ComponentRef::label),
        }
    }

    fn owner(&self, ctx: &ExecContext) -> String {
        format!("'{}' in stage '{}'", self.name, ctx.stage)
    }

    fn check_structure(&self, ctx: &ExecContext) -> Result<(&ConfigMap, &ComponentRef)> {
        if self.plugin.trim().is_empty() {
            return Err(Error::missing_field("plugin", self.owner(ctx)));
        }
        let component = match &self.component {
            Some(ComponentRef::Lookup(key)) if key.trim().is_empty() => None,
            other => other.as_ref(),
        }
        .ok_or_else(|| Error::missing_field("component", self.owner(ctx)))?;
        let action = self
            .action
            .as_ref()
            .ok_or_else(|| Error::missing_field("action", self.owner(ctx)))?;
        Ok((action, component))
    }

    /// Full preflight of one leaf. Installs the plugin on demand.
    pub fn cascade_validation(
        &self,
        verb: Verb,
        ctx: &ExecContext,
        env: BindingEnv<'_>,
    ) -> Result<ValidatedLeaf> {
        self.check_structure(ctx)?;
        let executor = env.plugins.resolve(&self.plugin)?;
        self.bind(verb, ctx, env, executor)
    }

    fn bind(
        &self,
        verb: Verb,
        ctx: &ExecContext,
        env: BindingEnv<'_>,
        executor: Arc<dyn Executor>,
    ) -> Result<ValidatedLeaf> {
        let (action, component_ref) = self.check_structure(ctx)?;
        let at = self.location(ctx);

        let payload = match verb {
            Verb::Check => executor
                .get_check(action)
                .and_then(|check| executor.validate_check(ctx, &check).map(|_| check))
                .map(BoundPayload::Check),
            Verb::Mutate => executor
                .get_action(action)
                .and_then(|act| executor.validate_action(ctx, &act).map(|_| act))
                .map(BoundPayload::Action),
        }
        .map_err(|e| Error::validation_failed(at, e))?;

        let raw = match component_ref {
            ComponentRef::Lookup(key) => env
                .stands
                .find_component(key)
                .map(|component| component.raw_config())
                .ok_or_else(|| Error::component_not_found(key, &ctx.stage, &self.name))?,
            ComponentRef::Inline(map) => map.clone(),
        };

        let component = executor
            .get_component(&raw)
            .and_then(|c| executor.validate_component(&c).map(|_| c))
            .map_err(|e| Error::validation_failed(at, e))?;

        debug!(stage = %ctx.stage, leaf = %self.name, plugin = %self.plugin, "leaf validated");
        Ok(ValidatedLeaf {
            executor,
            payload,
            component,
        })
    }

    /// Re-validates against the already registered executor, then runs it.
    pub fn exec(&self, verb: Verb, ctx: &ExecContext, env: BindingEnv<'_>) -> Result<LeafOutcome> {
        let executor = env
            .plugins
            .lookup(&self.plugin)
            .ok_or_else(|| Error::plugin_not_found(&self.plugin, None))?;
        let bound = self.bind(verb, ctx, env, executor)?;
        let at = self.location(ctx);

        if ctx.dry_run {
            info!(
                stage = %ctx.stage,
                leaf = %self.name,
                plugin = %self.plugin,
                component = at.component.unwrap_or_default(),
                action = ?self.action,
                "dry run, not executing"
            );
            return Ok(LeafOutcome::Skipped);
        }

        match &bound.payload {
            BoundPayload::Check(check) => {
                let passed = bound
                    .executor
                    .execute_check(ctx, &bound.component, check)
                    .map_err(|e| Error::execution_failed(at, e))?;
                if passed {
                    Ok(LeafOutcome::Passed)
                } else {
                    error!(stage = %ctx.stage, leaf = %self.name, plugin = %self.plugin, "check reported failure");
                    Ok(LeafOutcome::CheckFailed)
                }
            }
            BoundPayload::Action(action) => {
                bound
                    .executor
                    .execute_action(ctx, &bound.component, action)
                    .map_err(|e| Error::execution_failed(at, e))?;
                Ok(LeafOutcome::Passed)
            }
        }
    }
}
