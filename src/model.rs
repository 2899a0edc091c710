//! Documents handed from one phase to the next.
//!
//! Every document is grouped by the same top-level office key as the input
//! tables, so each phase can be re-run against the previous phase's artifact.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ranking::best_rank;

pub type Grouped<T> = BTreeMap<String, Vec<T>>;

pub type PreflightDocument = Grouped<WorkItem>;
pub type TakeoffDocument = Grouped<SubmittedItem>;
pub type LandingDocument = Grouped<LandingItem>;

/// One (office, location, service) tracking unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub location: String,
    pub service: String,
    #[serde(default)]
    pub intended_url: String,
    pub geo_coordinate: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Submitted,
    Error,
}

/// A work item after Takeoff; one task per keyword, in keyword order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedItem {
    pub location: String,
    pub service: String,
    #[serde(default)]
    pub intended_url: String,
    pub geo_coordinate: Option<String>,
    pub tasks: Vec<SubmittedTask>,
}

impl SubmittedItem {
    pub fn from_work_item(item: &WorkItem, tasks: Vec<SubmittedTask>) -> Self {
        Self {
            location: item.location.clone(),
            service: item.service.clone(),
            intended_url: item.intended_url.clone(),
            geo_coordinate: item.geo_coordinate.clone(),
            tasks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedTask {
    pub keyword: String,
    pub task_id: Option<String>,
    pub status: SubmissionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl SubmittedTask {
    pub fn submitted(keyword: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            task_id: Some(task_id.into()),
            status: SubmissionStatus::Submitted,
            error_description: None,
        }
    }

    pub fn failed(keyword: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            task_id: None,
            status: SubmissionStatus::Error,
            error_description: Some(description.into()),
        }
    }

    /// The task id, only when the submission actually succeeded.
    pub fn live_task_id(&self) -> Option<&str> {
        match self.status {
            SubmissionStatus::Submitted => self
                .task_id
                .as_deref()
                .filter(|task_id| !task_id.trim().is_empty()),
            SubmissionStatus::Error => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub rank: u32,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LandingStatus {
    Pending,
    Completed,
    Error,
    Skipped,
}

impl LandingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LandingStatus::Pending => "pending",
            LandingStatus::Completed => "completed",
            LandingStatus::Error => "error",
            LandingStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandingResult {
    pub keyword: String,
    pub task_id: Option<String>,
    pub status: LandingStatus,
    #[serde(default)]
    pub rankings: Vec<RankingEntry>,
    #[serde(default)]
    pub best: Option<RankingEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl LandingResult {
    pub fn pending(task: &SubmittedTask) -> Self {
        Self {
            keyword: task.keyword.clone(),
            task_id: task.task_id.clone(),
            status: LandingStatus::Pending,
            rankings: Vec::new(),
            best: None,
            error_description: None,
        }
    }

    pub fn skipped(task: &SubmittedTask) -> Self {
        Self {
            status: LandingStatus::Skipped,
            error_description: task.error_description.clone(),
            ..Self::pending(task)
        }
    }

    pub fn completed(task: &SubmittedTask, rankings: Vec<RankingEntry>) -> Self {
        let best = best_rank(&rankings).cloned();
        Self {
            status: LandingStatus::Completed,
            rankings,
            best,
            ..Self::pending(task)
        }
    }

    pub fn failed(task: &SubmittedTask, description: impl Into<String>) -> Self {
        Self {
            status: LandingStatus::Error,
            error_description: Some(description.into()),
            ..Self::pending(task)
        }
    }
}

/// Per-(location, service) container of keyword results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandingItem {
    pub location: String,
    pub service: String,
    #[serde(default)]
    pub intended_url: String,
    pub geo_coordinate: Option<String>,
    #[serde(default)]
    pub results: Vec<LandingResult>,
}

impl LandingItem {
    pub fn seeded(item: &SubmittedItem) -> Self {
        Self {
            location: item.location.clone(),
            service: item.service.clone(),
            intended_url: item.intended_url.clone(),
            geo_coordinate: item.geo_coordinate.clone(),
            results: item.tasks.iter().map(LandingResult::pending).collect(),
        }
    }

    pub fn is_for(&self, item: &SubmittedItem) -> bool {
        self.location == item.location && self.service == item.service
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub saved_at: DateTime<Utc>,
    pub processed: usize,
    pub total: usize,
    pub progress: String,
    pub results: LandingDocument,
}
