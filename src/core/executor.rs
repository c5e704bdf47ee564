//! The contract every plugin satisfies.
//!
//! The engine only consumes `Executor`; implementations live in plugin
//! processes (see `plugin::process`) or in statically linked providers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Free-form key/value map as authored in YAML.
pub type ConfigMap = HashMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
}

macro_rules! plugin_payload {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Value);

        impl $name {
            pub fn new(value: Value) -> Self {
                Self(value)
            }

            pub fn from_map(raw: &ConfigMap) -> Self {
                Self(Value::Object(raw.clone().into_iter().collect()))
            }

            /// Decode into the plugin's own typed structure.
            pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
                serde_json::from_value(self.0.clone()).map_err(|e| {
                    Error::config_invalid_value(
                        stringify!($name),
                        Some(self.0.to_string()),
                        e.to_string(),
                    )
                })
            }

            pub fn as_value(&self) -> &Value {
                &self.0
            }
        }
    };
}

plugin_payload!(
    /// A plugin-typed component, produced by `Executor::get_component`.
    PluginComponent
);
plugin_payload!(
    /// A plugin-typed mutating action payload.
    PluginAction
);
plugin_payload!(
    /// A plugin-typed read-only check payload.
    PluginCheck
);

/// Shared cooperative cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Context threaded through every validate/execute call.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    /// Qualified path of the stage being processed (`release.deploy.db`).
    pub stage: String,
    pub dry_run: bool,
    pub cancel: CancellationFlag,
}

impl ExecContext {
    pub fn new(dry_run: bool) -> Self {
        Self {
            stage: String::new(),
            dry_run,
            cancel: CancellationFlag::new(),
        }
    }

    pub fn for_stage(&self, stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            dry_run: self.dry_run,
            cancel: self.cancel.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub trait Executor: Send + Sync {
    fn info(&self) -> PluginInfo;

    /// Convert catalog config into the plugin's component type. Missing or
    /// mistyped keys fail here.
    fn get_component(&self, raw: &ConfigMap) -> Result<PluginComponent>;
    fn validate_component(&self, component: &PluginComponent) -> Result<()>;

    fn get_action(&self, raw: &ConfigMap) -> Result<PluginAction>;
    fn get_check(&self, raw: &ConfigMap) -> Result<PluginCheck>;

    fn validate_action(&self, ctx: &ExecContext, action: &PluginAction) -> Result<()>;
    fn validate_check(&self, ctx: &ExecContext, check: &PluginCheck) -> Result<()>;

    fn execute_action(
        &self,
        ctx: &ExecContext,
        component: &PluginComponent,
        action: &PluginAction,
    ) -> Result<()>;

    /// `Ok(false)` is a logical failure; `Err` means the check could not run.
    fn execute_check(
        &self,
        ctx: &ExecContext,
        component: &PluginComponent,
        check: &PluginCheck,
    ) -> Result<bool>;
}
