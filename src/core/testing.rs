//! In-process executor that records every call, for unit tests.

use std::collections::HashSet;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::executor::{
    ConfigMap, ExecContext, Executor, PluginAction, PluginCheck, PluginComponent, PluginInfo,
};
use crate::leaf::{ComponentRef, LeafAction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetComponent(String),
    ValidateComponent(String),
    GetAction(String),
    GetCheck(String),
    ValidateAction(String),
    ValidateCheck(String),
    ExecuteAction(String),
    ExecuteCheck(String),
}

impl Call {
    pub fn is_execute(&self) -> bool {
        matches!(self, Call::ExecuteAction(_) | Call::ExecuteCheck(_))
    }
}

/// Leaf whose action payload carries its own name, so the recorder can tell
/// calls apart.
pub fn leaf(name: &str, plugin: &str, component: &str) -> LeafAction {
    let mut action = ConfigMap::new();
    action.insert("name".to_string(), Value::from(name));
    LeafAction {
        name: name.to_string(),
        plugin: plugin.to_string(),
        action: Some(action),
        component: Some(ComponentRef::Lookup(component.to_string())),
    }
}

fn label(value: &Value) -> String {
    value
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("inline")
        .to_string()
}

#[derive(Default)]
pub struct RecordingExecutor {
    name: String,
    calls: Mutex<Vec<Call>>,
    false_checks: Mutex<HashSet<String>>,
    broken: Mutex<HashSet<String>>,
    rejected: Mutex<HashSet<String>>,
    rejected_components: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
}

impl RecordingExecutor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Names of executed leaves, in order.
    pub fn executed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::ExecuteAction(name) | Call::ExecuteCheck(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// `execute_check` answers `false` for this leaf.
    pub fn fail_check(&self, leaf: &str) {
        self.false_checks.lock().unwrap().insert(leaf.to_string());
    }

    /// `execute_*` returns an error for this leaf.
    pub fn break_leaf(&self, leaf: &str) {
        self.broken.lock().unwrap().insert(leaf.to_string());
    }

    /// `validate_action`/`validate_check` reject this leaf.
    pub fn reject(&self, leaf: &str) {
        self.rejected.lock().unwrap().insert(leaf.to_string());
    }

    /// `validate_action`/`validate_check` panic for this leaf.
    pub fn panic_on(&self, leaf: &str) {
        self.panicking.lock().unwrap().insert(leaf.to_string());
    }

    pub fn reject_component(&self, component: &str) {
        self.rejected_components
            .lock()
            .unwrap()
            .insert(component.to_string());
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn validate(&self, leaf: String) -> Result<()> {
        let panics = self.panicking.lock().unwrap().contains(&leaf);
        if panics {
            panic!("{} blew up during validation", leaf);
        }
        if self.rejected.lock().unwrap().contains(&leaf) {
            return Err(Error::plugin_error(&self.name, "validate", format!("{} is invalid", leaf)));
        }
        Ok(())
    }

    fn execute(&self, leaf: &str) -> Result<()> {
        if self.broken.lock().unwrap().contains(leaf) {
            return Err(Error::plugin_error(&self.name, "execute", format!("{} exploded", leaf)));
        }
        Ok(())
    }
}

impl Executor for RecordingExecutor {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: self.name.clone(),
            version: "0.0.0".to_string(),
            description: "recording test executor".to_string(),
        }
    }

    fn get_component(&self, raw: &ConfigMap) -> Result<PluginComponent> {
        let component = PluginComponent::from_map(raw);
        self.record(Call::GetComponent(label(component.as_value())));
        Ok(component)
    }

    fn validate_component(&self, component: &PluginComponent) -> Result<()> {
        let name = label(component.as_value());
        self.record(Call::ValidateComponent(name.clone()));
        if self.rejected_components.lock().unwrap().contains(&name) {
            return Err(Error::plugin_error(&self.name, "validate_component", "host is required"));
        }
        Ok(())
    }

    fn get_action(&self, raw: &ConfigMap) -> Result<PluginAction> {
        let action = PluginAction::from_map(raw);
        self.record(Call::GetAction(label(action.as_value())));
        Ok(action)
    }

    fn get_check(&self, raw: &ConfigMap) -> Result<PluginCheck> {
        let check = PluginCheck::from_map(raw);
        self.record(Call::GetCheck(label(check.as_value())));
        Ok(check)
    }

    fn validate_action(&self, _ctx: &ExecContext, action: &PluginAction) -> Result<()> {
        let name = label(action.as_value());
        self.record(Call::ValidateAction(name.clone()));
        self.validate(name)
    }

    fn validate_check(&self, _ctx: &ExecContext, check: &PluginCheck) -> Result<()> {
        let name = label(check.as_value());
        self.record(Call::ValidateCheck(name.clone()));
        self.validate(name)
    }

    fn execute_action(
        &self,
        _ctx: &ExecContext,
        _component: &PluginComponent,
        action: &PluginAction,
    ) -> Result<()> {
        let name = label(action.as_value());
        self.record(Call::ExecuteAction(name.clone()));
        self.execute(&name)
    }

    fn execute_check(
        &self,
        _ctx: &ExecContext,
        _component: &PluginComponent,
        check: &PluginCheck,
    ) -> Result<bool> {
        let name = label(check.as_value());
        self.record(Call::ExecuteCheck(name.clone()));
        self.execute(&name)?;
        Ok(!self.false_checks.lock().unwrap().contains(&name))
    }
}
