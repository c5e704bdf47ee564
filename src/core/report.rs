use serde::{Deserialize, Serialize};

use crate::stage::Phase;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeafStatus {
    Succeeded,
    /// Dry run.
    Skipped,
    /// Failure that aborted its stage.
    Failed,
    /// A check answered `false` and aborted its stage.
    CheckFailed,
    /// Failure absorbed under a non-atomic policy.
    Tolerated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafRecord {
    /// Qualified path of the stage owning this item.
    pub stage: String,
    pub phase: Phase,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    pub status: LeafStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub tolerated: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    /// Finished, but some failures were tolerated.
    PartialSuccess,
    Failed,
    DryRun,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub from_release: String,
    pub to_release: String,
    pub dry_run: bool,
    pub records: Vec<LeafRecord>,
}

impl RunReport {
    pub fn new(from_release: &str, to_release: &str, dry_run: bool) -> Self {
        Self {
            from_release: from_release.to_string(),
            to_release: to_release.to_string(),
            dry_run,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: LeafRecord) {
        self.records.push(record);
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.records.len(),
            ..RunSummary::default()
        };
        for record in &self.records {
            match record.status {
                LeafStatus::Succeeded => summary.succeeded += 1,
                LeafStatus::Skipped => summary.skipped += 1,
                LeafStatus::Failed | LeafStatus::CheckFailed => summary.failed += 1,
                LeafStatus::Tolerated => summary.tolerated += 1,
            }
        }
        summary
    }

    pub fn status(&self) -> RunStatus {
        let summary = self.summary();
        if summary.failed > 0 {
            RunStatus::Failed
        } else if summary.tolerated > 0 {
            RunStatus::PartialSuccess
        } else if self.dry_run {
            RunStatus::DryRun
        } else {
            RunStatus::Success
        }
    }

    /// Records for one stage path, in execution order.
    pub fn for_stage<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a LeafRecord> + 'a {
        self.records.iter().filter(move |record| record.stage == stage)
    }
}
