use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::audit::AuditLog;
use crate::config::RequestProfile;
use crate::errors::AppResult;
use crate::model::{PreflightDocument, SubmittedItem, SubmittedTask, TakeoffDocument, WorkItem};
use crate::serp::{RateLimiter, SerpApi, TaskRequest};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TakeoffStats {
    pub submitted: usize,
    pub failed: usize,
}

impl TakeoffStats {
    pub fn of(document: &TakeoffDocument) -> Self {
        let mut stats = Self::default();
        for task in document.values().flatten().flat_map(|item| &item.tasks) {
            match task.live_task_id() {
                Some(_) => stats.submitted += 1,
                None => stats.failed += 1,
            }
        }
        stats
    }
}

/// Submits one provider task per keyword, strictly in order.
pub struct JobSubmitter {
    serp: Arc<dyn SerpApi>,
    audit: AuditLog,
    profile: RequestProfile,
    rate_limiter: RateLimiter,
}

impl JobSubmitter {
    pub fn new(
        serp: Arc<dyn SerpApi>,
        audit: AuditLog,
        profile: RequestProfile,
        rate_limiter: RateLimiter,
    ) -> Self {
        Self {
            serp,
            audit,
            profile,
            rate_limiter,
        }
    }

    /// A failed keyword is recorded as data and never stops the batch.
    pub async fn submit_all(&self, preflight: &PreflightDocument) -> TakeoffDocument {
        let mut document = TakeoffDocument::new();
        for (office, items) in preflight {
            let mut submitted = Vec::with_capacity(items.len());
            for item in items {
                submitted.push(self.submit_item(office, item).await);
            }
            document.insert(office.clone(), submitted);
        }

        let stats = TakeoffStats::of(&document);
        info!(
            submitted = stats.submitted,
            failed = stats.failed,
            "takeoff finished"
        );
        document
    }

    async fn submit_item(&self, office: &str, item: &WorkItem) -> SubmittedItem {
        let mut tasks = Vec::with_capacity(item.keywords.len());
        for keyword in &item.keywords {
            let task = match self.submit_keyword(item, keyword).await {
                Ok(task_id) => SubmittedTask::submitted(keyword.as_str(), task_id),
                Err(err) => {
                    warn!(
                        %office,
                        location = %item.location,
                        %keyword,
                        error = %err,
                        "task submission failed"
                    );
                    SubmittedTask::failed(keyword.as_str(), err.to_string())
                }
            };
            tasks.push(task);
        }
        SubmittedItem::from_work_item(item, tasks)
    }

    async fn submit_keyword(&self, item: &WorkItem, keyword: &str) -> AppResult<String> {
        let request = TaskRequest::new(keyword, item.geo_coordinate.as_deref(), &self.profile);
        self.audit.record(&self.serp.task_post_url(), &[&request])?;
        self.rate_limiter.wait().await;
        self.serp.post_task(&request).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::fs;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::tempdir;

    use super::*;
    use crate::errors::AppError;
    use crate::model::SubmissionStatus;
    use crate::serp::ResultPage;

    struct ScriptedSubmitter {
        responses: Mutex<VecDeque<AppResult<String>>>,
        seen: Mutex<Vec<TaskRequest>>,
    }

    impl ScriptedSubmitter {
        fn new(responses: Vec<AppResult<String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SerpApi for ScriptedSubmitter {
        fn task_post_url(&self) -> String {
            "https://serp.test/v3/serp/google/organic/task_post".into()
        }

        async fn post_task(&self, request: &TaskRequest) -> AppResult<String> {
            self.seen.lock().push(request.clone());
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(AppError::Api("no scripted response".into())))
        }

        async fn get_task(&self, _task_id: &str) -> AppResult<Option<Vec<ResultPage>>> {
            Ok(None)
        }
    }

    fn preflight(keywords: &[&str]) -> PreflightDocument {
        let mut document = PreflightDocument::new();
        document.insert(
            "Dallas".into(),
            vec![WorkItem {
                location: "Garland".into(),
                service: "wildlife removal".into(),
                intended_url: String::new(),
                geo_coordinate: Some("32.91,-96.63".into()),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
            }],
        );
        document
    }

    #[tokio::test]
    async fn failed_submission_does_not_stop_batch() {
        let dir = tempdir().unwrap();
        let serp = Arc::new(ScriptedSubmitter::new(vec![
            Ok("T1".into()),
            Err(AppError::Api("connection reset".into())),
            Ok("T3".into()),
        ]));
        let submitter = JobSubmitter::new(
            serp.clone(),
            AuditLog::new(dir.path(), 1024 * 1024).unwrap(),
            RequestProfile::desktop(),
            RateLimiter::unlimited(),
        );

        let document = submitter.submit_all(&preflight(&["k1", "k2", "k3"])).await;
        let tasks = &document["Dallas"][0].tasks;
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].live_task_id(), Some("T1"));
        assert_eq!(tasks[1].status, SubmissionStatus::Error);
        assert!(tasks[1].task_id.is_none());
        assert!(tasks[1]
            .error_description
            .as_deref()
            .unwrap()
            .contains("connection reset"));
        assert_eq!(tasks[2].live_task_id(), Some("T3"));
        assert_eq!(
            TakeoffStats::of(&document),
            TakeoffStats {
                submitted: 2,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn audits_every_attempt_before_calling() {
        let dir = tempdir().unwrap();
        let serp = Arc::new(ScriptedSubmitter::new(vec![
            Err(AppError::Api("rejected".into())),
            Ok("T2".into()),
        ]));
        let audit = AuditLog::new(dir.path(), 1024 * 1024).unwrap();
        let submitter = JobSubmitter::new(
            serp.clone(),
            audit.clone(),
            RequestProfile::mobile(),
            RateLimiter::unlimited(),
        );

        submitter.submit_all(&preflight(&["k1", "k2"])).await;

        let log = fs::read_to_string(audit.log_path()).unwrap();
        let records: Vec<serde_json::Value> = log
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["payload"][0]["keyword"], "k1");
        assert_eq!(records[0]["payload"][0]["device"], "mobile");
        assert_eq!(records[0]["payload"][0]["os"], "android");
        assert_eq!(
            records[1]["url"],
            "https://serp.test/v3/serp/google/organic/task_post"
        );

        let seen = serp.seen.lock();
        assert_eq!(seen[1].location_coordinate.as_deref(), Some("32.91,-96.63"));
        assert_eq!(seen[1].language_code, "en");
    }

    #[tokio::test]
    async fn audit_failure_marks_keyword_without_calling() {
        let dir = tempdir().unwrap();
        let serp = Arc::new(ScriptedSubmitter::new(vec![Ok("T2".into())]));
        let mut audit = AuditLog::new(dir.path(), 1024 * 1024).unwrap();
        let hooks = audit.enable_test_hooks();
        hooks.fail_next_disk_full();
        let submitter = JobSubmitter::new(
            serp.clone(),
            audit,
            RequestProfile::desktop(),
            RateLimiter::unlimited(),
        );

        let document = submitter.submit_all(&preflight(&["k1", "k2"])).await;
        let tasks = &document["Dallas"][0].tasks;
        assert_eq!(tasks[0].status, SubmissionStatus::Error);
        assert_eq!(tasks[1].live_task_id(), Some("T2"));
        assert_eq!(serp.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn items_without_keywords_carry_no_tasks() {
        let dir = tempdir().unwrap();
        let serp = Arc::new(ScriptedSubmitter::new(vec![]));
        let submitter = JobSubmitter::new(
            serp.clone(),
            AuditLog::new(dir.path(), 1024).unwrap(),
            RequestProfile::desktop(),
            RateLimiter::unlimited(),
        );

        let document = submitter.submit_all(&preflight(&[])).await;
        let item = &document["Dallas"][0];
        assert!(item.tasks.is_empty());
        assert_eq!(item.geo_coordinate.as_deref(), Some("32.91,-96.63"));
        assert!(serp.seen.lock().is_empty());
    }
}
