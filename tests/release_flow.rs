use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tempfile::TempDir;

use roller::executor::{ConfigMap, PluginAction, PluginCheck, PluginComponent, PluginInfo};
use roller::loader::load_migration_set;
use roller::report::{LeafStatus, RunStatus};
use roller::{Error, ErrorCode, ExecContext, Executor, MigrationSet, PluginController, Result};

/// Appends `component:line` entries to an in-memory journal; checks search it.
#[derive(Default)]
struct JournalExecutor {
    journal: Mutex<Vec<String>>,
}

#[derive(Deserialize)]
struct Target {
    name: String,
}

#[derive(Deserialize)]
struct Append {
    append: String,
}

#[derive(Deserialize)]
struct Contains {
    contains: String,
    #[serde(default)]
    absent: bool,
}

impl JournalExecutor {
    fn lines(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}

impl Executor for JournalExecutor {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: "journal".to_string(),
            version: "0.1.0".to_string(),
            description: "in-memory journal".to_string(),
        }
    }

    fn get_component(&self, raw: &ConfigMap) -> Result<PluginComponent> {
        let component = PluginComponent::from_map(raw);
        component.decode::<Target>()?;
        Ok(component)
    }

    fn validate_component(&self, component: &PluginComponent) -> Result<()> {
        let target: Target = component.decode()?;
        if target.name.is_empty() {
            return Err(Error::missing_field("name", "journal component"));
        }
        Ok(())
    }

    fn get_action(&self, raw: &ConfigMap) -> Result<PluginAction> {
        let action = PluginAction::from_map(raw);
        action.decode::<Append>()?;
        Ok(action)
    }

    fn get_check(&self, raw: &ConfigMap) -> Result<PluginCheck> {
        let check = PluginCheck::from_map(raw);
        check.decode::<Contains>()?;
        Ok(check)
    }

    fn validate_action(&self, _ctx: &ExecContext, _action: &PluginAction) -> Result<()> {
        Ok(())
    }

    fn validate_check(&self, _ctx: &ExecContext, _check: &PluginCheck) -> Result<()> {
        Ok(())
    }

    fn execute_action(
        &self,
        _ctx: &ExecContext,
        component: &PluginComponent,
        action: &PluginAction,
    ) -> Result<()> {
        let target: Target = component.decode()?;
        let append: Append = action.decode()?;
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:{}", target.name, append.append));
        Ok(())
    }

    fn execute_check(
        &self,
        _ctx: &ExecContext,
        _component: &PluginComponent,
        check: &PluginCheck,
    ) -> Result<bool> {
        let contains: Contains = check.decode()?;
        let found = self
            .journal
            .lock()
            .unwrap()
            .iter()
            .any(|line| line.contains(&contains.contains));
        Ok(found != contains.absent)
    }
}

const STANDS: &str = r#"
msVersion: "1"
release: "1.1"
stands:
  - name: PROD
    group: prod
    components:
      - name: svc-a
        version: "1.1"
        group: api
        plugin: journal
"#;

fn migration_yaml(post_check: &str, upgrade: &str) -> String {
    format!(
        r#"
msVersion: "1"
atomic: true
stands: stands.yml
from_release: "1.0"
to_release: "1.1"
stages:
  - name: deploy
    atomic: true
    pre_check:
      - name: not-upgraded
        plugin: journal
        component: svc-a
        action: {{ contains: "svc-a:1.1", absent: true }}
    stage:
      - name: db
        task:
          - name: migrate
            plugin: journal
            component: {{ name: db }}
            action: {{ append: "schema-1.1" }}
    task:
      - name: upgrade
        plugin: journal
        component: api
        action: {{ {upgrade} }}
    post_check:
      - name: verify
        plugin: journal
        component: svc-a
        action: {{ contains: "{post_check}" }}
  - name: notify
    task:
      - name: announce
        plugin: journal
        component: svc-a
        action: {{ append: "released" }}
"#
    )
}

fn workspace(migration: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("stands.yml"), STANDS).unwrap();
    let path = dir.path().join("migration.yml");
    std::fs::write(&path, migration).unwrap();
    (dir, path)
}

fn load(path: &Path) -> (MigrationSet, Arc<JournalExecutor>) {
    let plugins = Arc::new(PluginController::without_installer());
    let executor = Arc::new(JournalExecutor::default());
    plugins.register("journal", executor.clone());
    (load_migration_set(path, plugins).unwrap(), executor)
}

#[test]
fn rollout_runs_phases_in_order() {
    let (_dir, path) = workspace(&migration_yaml("svc-a:1.1", "append: \"1.1\""));
    let (ms, journal) = load(&path);

    let run = ms.rollout(&ExecContext::new(false)).unwrap();
    let report = run.into_result().unwrap();

    assert_eq!(
        journal.lines(),
        vec!["db:schema-1.1", "svc-a:1.1", "svc-a:released"]
    );
    assert_eq!(report.status(), RunStatus::Success);
    assert_eq!(report.summary().succeeded, 5);
    assert_eq!(report.for_stage("deploy.db").count(), 1);
}

#[test]
fn failed_post_check_stops_atomic_release() {
    let (_dir, path) = workspace(&migration_yaml("svc-a:2.0", "append: \"1.1\""));
    let (ms, journal) = load(&path);

    let run = ms.rollout(&ExecContext::new(false)).unwrap();

    assert_eq!(run.report.status(), RunStatus::Failed);
    let verify = run
        .report
        .records
        .iter()
        .find(|record| record.name == "verify")
        .unwrap();
    assert_eq!(verify.status, LeafStatus::CheckFailed);
    assert!(!journal.lines().contains(&"svc-a:released".to_string()));
    assert_eq!(run.result.unwrap_err().code, ErrorCode::ExecutionCheckFailed);
}

#[test]
fn malformed_action_fails_validation_before_anything_runs() {
    let (_dir, path) = workspace(&migration_yaml("svc-a:1.1", "write: \"1.1\""));
    let (ms, journal) = load(&path);

    let err = ms.rollout(&ExecContext::new(false)).err().unwrap();

    assert_eq!(err.code, ErrorCode::ValidationFailed);
    assert_eq!(err.details["leaf"], "upgrade");
    assert!(journal.lines().is_empty());
}

#[test]
fn dry_run_validates_and_skips_execution() {
    let (_dir, path) = workspace(&migration_yaml("svc-a:1.1", "append: \"1.1\""));
    let (ms, journal) = load(&path);

    let report = ms
        .rollout(&ExecContext::new(true))
        .unwrap()
        .into_result()
        .unwrap();

    assert!(journal.lines().is_empty());
    assert_eq!(report.status(), RunStatus::DryRun);
    assert_eq!(report.summary().skipped, 5);
}

#[test]
fn unknown_plugin_is_reported_during_validation() {
    let yaml = migration_yaml("svc-a:1.1", "append: \"1.1\"").replace(
        "name: announce\n        plugin: journal",
        "name: announce\n        plugin: pager",
    );
    let (_dir, path) = workspace(&yaml);
    let (ms, journal) = load(&path);

    let err = ms.cascade_validation(&ExecContext::new(false)).unwrap_err();

    assert_eq!(err.code, ErrorCode::PluginNotFound);
    assert!(journal.lines().is_empty());
}
