use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

use crate::config::PollPolicy;
use crate::errors::{AppError, AppResult};
use crate::model::{
    Checkpoint, LandingDocument, LandingItem, LandingResult, LandingStatus, SubmittedItem,
    SubmittedTask, TakeoffDocument,
};
use crate::ranking::{extract_rankings, MatchRule};
use crate::serp::{ResultPage, SerpApi};
use crate::store::{load_checkpoint, save_document, Artifact, ArtifactStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LandingStats {
    pub completed: usize,
    pub errors: usize,
    pub skipped: usize,
    pub resumed: usize,
}

impl LandingStats {
    fn tally(&mut self, status: LandingStatus) {
        match status {
            LandingStatus::Completed => self.completed += 1,
            LandingStatus::Error => self.errors += 1,
            LandingStatus::Skipped => self.skipped += 1,
            LandingStatus::Pending => {}
        }
    }
}

/// Polls every submitted task to a terminal state, checkpointing as it goes.
pub struct ResultPoller {
    serp: Arc<dyn SerpApi>,
    store: Arc<dyn ArtifactStore>,
    match_rule: MatchRule,
    poll: PollPolicy,
    checkpoint_every: usize,
}

impl ResultPoller {
    pub fn new(
        serp: Arc<dyn SerpApi>,
        store: Arc<dyn ArtifactStore>,
        match_rule: MatchRule,
        poll: PollPolicy,
        checkpoint_every: usize,
    ) -> Self {
        Self {
            serp,
            store,
            match_rule,
            poll,
            checkpoint_every: checkpoint_every.max(1),
        }
    }

    pub async fn land_all(
        &self,
        takeoff: &TakeoffDocument,
    ) -> AppResult<(LandingDocument, LandingStats)> {
        let mut results = self.initial_results(takeoff);
        let total: usize = takeoff.values().flatten().map(|item| item.tasks.len()).sum();
        let mut stats = LandingStats::default();
        let mut processed = 0_usize;

        for (office, items) in takeoff {
            for (item_idx, item) in items.iter().enumerate() {
                for (idx, task) in item.tasks.iter().enumerate() {
                    let already_completed = slot_mut(&mut results, office, item_idx, idx)
                        .map(|result| result.status == LandingStatus::Completed)
                        .unwrap_or(false);
                    if already_completed {
                        trace!(%office, keyword = %task.keyword, "already completed; skipping");
                        stats.resumed += 1;
                        continue;
                    }

                    let landed = match task.live_task_id() {
                        Some(task_id) => self.land_task(office, item, task, task_id).await,
                        None => LandingResult::skipped(task),
                    };
                    stats.tally(landed.status);
                    if let Some(slot) = slot_mut(&mut results, office, item_idx, idx) {
                        *slot = landed;
                    }

                    processed += 1;
                    if processed % self.checkpoint_every == 0 {
                        if let Err(err) =
                            self.save_checkpoint(&results, stats.resumed + processed, total)
                        {
                            warn!(target: "checkpoint", error = %err, "checkpoint save failed");
                        }
                    }
                }
            }
        }

        self.save_checkpoint(&results, stats.resumed + processed, total)?;
        info!(
            completed = stats.completed,
            errors = stats.errors,
            skipped = stats.skipped,
            resumed = stats.resumed,
            "landing finished"
        );
        Ok((results, stats))
    }

    /// Retries until a result page arrives or the attempt budget is spent.
    pub async fn poll_until_ready(&self, task_id: &str) -> AppResult<Vec<ResultPage>> {
        let attempts = self.poll.max_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.serp.get_task(task_id).await {
                Ok(Some(pages)) if !pages.is_empty() => {
                    debug!(task_id, attempt, "result ready");
                    return Ok(pages);
                }
                Ok(_) => trace!(task_id, attempt, "result not ready"),
                Err(err) => {
                    debug!(task_id, attempt, error = %err, "poll attempt failed");
                    last_error = Some(err);
                }
            }
            if attempt < attempts {
                sleep(self.poll.interval).await;
            }
        }

        if let Some(err) = &last_error {
            warn!(task_id, error = %err, "last poll attempt error");
        }
        Err(AppError::PollTimeout {
            task_id: task_id.to_string(),
            attempts,
            last_error: last_error.map(|err| err.to_string()),
        })
    }

    async fn land_task(
        &self,
        office: &str,
        item: &SubmittedItem,
        task: &SubmittedTask,
        task_id: &str,
    ) -> LandingResult {
        match self.poll_until_ready(task_id).await {
            Ok(pages) => {
                let rankings = extract_rankings(&pages, &self.match_rule, &item.intended_url);
                debug!(
                    %office,
                    keyword = %task.keyword,
                    matches = rankings.len(),
                    "task landed"
                );
                LandingResult::completed(task, rankings)
            }
            Err(err) => {
                warn!(%office, keyword = %task.keyword, error = %err, "task failed to land");
                LandingResult::failed(task, err.to_string())
            }
        }
    }

    /// One slot per task of `takeoff`, in takeoff order. A checkpoint result is
    /// carried over only when it was landed for the same task id.
    fn initial_results(&self, takeoff: &TakeoffDocument) -> LandingDocument {
        let previous = match load_checkpoint(self.store.as_ref()) {
            Some(checkpoint) => {
                info!(
                    target: "checkpoint",
                    saved_at = %checkpoint.saved_at,
                    progress = %checkpoint.progress,
                    "resuming from checkpoint"
                );
                checkpoint.results
            }
            None => LandingDocument::new(),
        };

        let mut carried = 0_usize;
        let mut results = LandingDocument::new();
        for (office, items) in takeoff {
            let mut landed = Vec::with_capacity(items.len());
            for item in items {
                let mut seeded = LandingItem::seeded(item);
                for (idx, task) in item.tasks.iter().enumerate() {
                    let occurrence = occurrence_of(&item.tasks, idx);
                    if let Some(result) = find_result(&previous, office, item, task, occurrence)
                        .filter(|result| result.task_id == task.task_id)
                    {
                        seeded.results[idx] = result.clone();
                        carried += 1;
                    }
                }
                landed.push(seeded);
            }
            results.insert(office.clone(), landed);
        }

        if !previous.is_empty() {
            debug!(target: "checkpoint", carried, "checkpoint entries matched current takeoff");
        }
        results
    }

    fn save_checkpoint(&self, results: &LandingDocument, done: usize, total: usize) -> AppResult<()> {
        let checkpoint = Checkpoint {
            saved_at: Utc::now(),
            processed: done,
            total,
            progress: progress_label(done, total),
            results: results.clone(),
        };
        save_document(self.store.as_ref(), Artifact::Checkpoint, &checkpoint)?;
        info!(
            target: "checkpoint",
            processed = done,
            total,
            progress = %checkpoint.progress,
            "checkpoint saved"
        );
        Ok(())
    }
}

fn progress_label(done: usize, total: usize) -> String {
    if total == 0 {
        return "100.00%".to_string();
    }
    format!("{:.2}%", done as f64 * 100.0 / total as f64)
}

/// How many earlier tasks of the item share this task's keyword.
fn occurrence_of(tasks: &[SubmittedTask], idx: usize) -> usize {
    tasks[..idx]
        .iter()
        .filter(|task| task.keyword == tasks[idx].keyword)
        .count()
}

fn nth_result<'a>(
    results: &'a [LandingResult],
    keyword: &str,
    occurrence: usize,
) -> Option<&'a LandingResult> {
    results
        .iter()
        .filter(|result| result.keyword == keyword)
        .nth(occurrence)
}

fn find_result<'a>(
    results: &'a LandingDocument,
    office: &str,
    item: &SubmittedItem,
    task: &SubmittedTask,
    occurrence: usize,
) -> Option<&'a LandingResult> {
    let landed = results.get(office)?.iter().find(|landed| landed.is_for(item))?;
    nth_result(&landed.results, &task.keyword, occurrence)
}

fn slot_mut<'a>(
    results: &'a mut LandingDocument,
    office: &str,
    item_idx: usize,
    idx: usize,
) -> Option<&'a mut LandingResult> {
    results
        .get_mut(office)?
        .get_mut(item_idx)?
        .results
        .get_mut(idx)
}
