//! Scaffolds a release workspace: `stands/stands.yml`,
//! `release/release.yml` and a `config.yml`. Existing files are left alone.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::RollerConfig;
use crate::error::{Error, Result};
use crate::utils::io;

pub const DEFAULT_BASE: &str = "roller";

const STANDS_TEMPLATE: &str = r#"msVersion: "1"
release: "1.0.0"
stand:
  name: PROD
  desc: "Production stand"
  group: prod
  components:
    - name: api
      version: "1.0.0"
      group: backend
      plugin: http
      config:
        url: http://api.internal
"#;

const RELEASE_TEMPLATE: &str = r#"msVersion: "1"
# Failure of any root stage stops the whole release.
atomic: true
stands: ../stands/stands.yml
from_release: "0.9.0"
to_release: "1.0.0"
stages:
  # Unique among siblings; referenced in logs as parent.child.
  - name: deploy
    desc: "Roll out the backend"
    atomic: true
    pre_check:
      - name: health
        plugin: http
        component: api
        action:
          path: /health
    task:
      - name: upgrade
        plugin: http
        component: backend
        action:
          path: /admin/upgrade
          method: POST
    post_check:
      - name: version
        plugin: http
        component: api
        action:
          path: /version
"#;

#[derive(Debug, Clone, Serialize)]
pub struct InitOutput {
    pub base: String,
    pub created: Vec<String>,
    pub skipped: Vec<String>,
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("create {}", path.display())))
    })
}

fn write_new(path: PathBuf, content: &str, output: &mut InitOutput) -> Result<()> {
    let display = path.display().to_string();
    if path.exists() {
        output.skipped.push(display);
        return Ok(());
    }
    io::write_file(&path, content, &format!("write {}", display))?;
    output.created.push(display);
    Ok(())
}

pub fn scaffold(base: &Path) -> Result<InitOutput> {
    let mut output = InitOutput {
        base: base.display().to_string(),
        created: Vec::new(),
        skipped: Vec::new(),
    };

    create_dir(&base.join("stands"))?;
    create_dir(&base.join("release"))?;

    write_new(base.join("stands").join("stands.yml"), STANDS_TEMPLATE, &mut output)?;
    write_new(base.join("release").join("release.yml"), RELEASE_TEMPLATE, &mut output)?;
    let config = RollerConfig::default().to_yaml()?;
    write_new(base.join("config.yml"), &config, &mut output)?;

    info!(
        base = %output.base,
        created = output.created.len(),
        skipped = output.skipped.len(),
        "workspace scaffolded"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_migration_set;
    use crate::plugin::PluginController;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn creates_loadable_templates() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("roller");

        let output = scaffold(&base).unwrap();
        assert_eq!(output.created.len(), 3);

        let ms = load_migration_set(
            &base.join("release/release.yml"),
            Arc::new(PluginController::without_installer()),
        )
        .unwrap();
        assert_eq!(ms.stages[0].name, "deploy");
        assert!(ms.stands.find_component("backend").is_some());

        RollerConfig::load(Some(&base.join("config.yml"))).unwrap();
    }

    #[test]
    fn existing_files_are_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().to_path_buf();
        fs::create_dir_all(base.join("stands")).unwrap();
        fs::write(base.join("stands/stands.yml"), "custom").unwrap();

        let output = scaffold(&base).unwrap();

        assert_eq!(output.skipped.len(), 1);
        assert_eq!(fs::read_to_string(base.join("stands/stands.yml")).unwrap(), "custom");
    }
}
