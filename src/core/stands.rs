//! Static catalog of target infrastructure.
//!
//! A `StandsFile` is loaded once per run and never mutated afterwards. Leaf
//! actions reference its components by name or group.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::executor::ConfigMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Component {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub plugin: String,
    #[serde(default)]
    pub config: ConfigMap,
}

impl Component {
    /// The raw map handed to a plugin's `get_component`: the authored config
    /// plus the catalog identity keys, which never override config entries.
    pub fn raw_config(&self) -> ConfigMap {
        let mut raw = self.config.clone();
        for (key, value) in [
            ("name", &self.name),
            ("version", &self.version),
            ("group", &self.group),
        ] {
            raw.entry(key.to_string())
                .or_insert_with(|| Value::String(value.clone()));
        }
        raw
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stand {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandsFile {
    #[serde(default, alias = "msVersion")]
    pub version: String,
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub stands: Vec<Stand>,
}

impl StandsFile {
    /// Exact name match across every stand first, then exact group match.
    /// First hit in declaration order wins.
    pub fn find_component(&self, key: &str) -> Option<&Component> {
        self.components()
            .find(|component| component.name == key)
            .or_else(|| self.components().find(|component| component.group == key))
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.stands.iter().flat_map(|stand| stand.components.iter())
    }

    /// Structural checks on the catalog. Plugin-level validation of each
    /// component's config happens in the validation pass.
    pub fn check_structure(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(Error::missing_field("version", "stands file"));
        }
        if self.release.trim().is_empty() {
            return Err(Error::missing_field("release", "stands file"));
        }

        let mut stand_names = HashSet::new();
        for stand in &self.stands {
            if stand.name.trim().is_empty() {
                return Err(Error::missing_field("name", "stand"));
            }
            if stand.group.trim().is_empty() {
                return Err(Error::missing_field("group", format!("stand '{}'", stand.name)));
            }
            if !stand_names.insert(stand.name.as_str()) {
                return Err(Error::duplicate_name(&stand.name, "stand", ""));
            }
            stand.check_components()?;
        }

        Ok(())
    }
}

impl Stand {
    fn check_components(&self) -> Result<()> {
        let mut names = HashSet::new();
        for component in &self.components {
            let owner = format!("component '{}' of stand '{}'", component.name, self.name);
            for (field, value) in [
                ("name", &component.name),
                ("version", &component.version),
                ("plugin", &component.plugin),
                ("group", &component.group),
            ] {
                if value.trim().is_empty() {
                    return Err(Error::missing_field(field, owner));
                }
            }
            if !names.insert(component.name.as_str()) {
                return Err(Error::duplicate_name(&component.name, "component", &self.name));
            }
        }
        Ok(())
    }
}
