use std::sync::Arc;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info};

use crate::audit::AuditLog;
use crate::config::PipelineSettings;
use crate::errors::{AppError, AppResult};
use crate::landing::{LandingStats, ResultPoller};
use crate::model::{PreflightDocument, TakeoffDocument};
use crate::preflight::{build_preflight, PreflightInputs, PreflightStats};
use crate::serp::{RateLimiter, SerpApi};
use crate::store::{load_document, save_document, Artifact, ArtifactStore};
use crate::takeoff::{JobSubmitter, TakeoffStats};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub preflight: PreflightStats,
    pub takeoff: TakeoffStats,
    pub landing: LandingStats,
}

struct Provider {
    serp: Arc<dyn SerpApi>,
    audit: AuditLog,
}

/// Sequences the phases through persisted artifacts only, so each phase can
/// be re-run on its own against whatever its predecessor left behind.
pub struct Governor {
    store: Arc<dyn ArtifactStore>,
    settings: PipelineSettings,
    provider: Option<Provider>,
}

impl Governor {
    pub fn new(store: Arc<dyn ArtifactStore>, settings: PipelineSettings) -> Self {
        Self {
            store,
            settings,
            provider: None,
        }
    }

    pub fn with_provider(mut self, serp: Arc<dyn SerpApi>, audit: AuditLog) -> Self {
        self.provider = Some(Provider { serp, audit });
        self
    }

    pub fn preflight(&self, inputs: &PreflightInputs) -> AppResult<PreflightStats> {
        info!(phase = "preflight", "phase started");
        let (document, stats) = build_preflight(inputs);
        save_document(self.store.as_ref(), Artifact::Preflight, &document)?;
        info!(phase = "preflight", work_items = stats.work_items, "phase finished");
        Ok(stats)
    }

    pub async fn takeoff(&self) -> AppResult<TakeoffStats> {
        let preflight: PreflightDocument = self.require(Artifact::Preflight, "takeoff")?;
        let provider = self.provider()?;
        info!(phase = "takeoff", "phase started");

        let submitter = JobSubmitter::new(
            provider.serp.clone(),
            provider.audit.clone(),
            self.settings.request.clone(),
            RateLimiter::new(self.settings.submit_rate_limit_qps),
        );
        let document = submitter.submit_all(&preflight).await;
        save_document(self.store.as_ref(), Artifact::Takeoff, &document)?;

        let stats = TakeoffStats::of(&document);
        info!(
            phase = "takeoff",
            submitted = stats.submitted,
            failed = stats.failed,
            "phase finished"
        );
        Ok(stats)
    }

    pub async fn landing(&self) -> AppResult<LandingStats> {
        let takeoff: TakeoffDocument = self.require(Artifact::Takeoff, "landing")?;
        let match_rule = self.settings.require_match_rule()?.clone();
        let provider = self.provider()?;
        info!(phase = "landing", rule = ?match_rule, "phase started");

        let poller = ResultPoller::new(
            provider.serp.clone(),
            self.store.clone(),
            match_rule,
            self.settings.poll,
            self.settings.checkpoint_every,
        );
        let (document, stats) = poller.land_all(&takeoff).await?;
        save_document(self.store.as_ref(), Artifact::Landing, &document)?;
        info!(
            phase = "landing",
            completed = stats.completed,
            errors = stats.errors,
            skipped = stats.skipped,
            resumed = stats.resumed,
            "phase finished"
        );
        Ok(stats)
    }

    /// All three phases, with a settle wait before results are collected.
    pub async fn run_all(&self, inputs: &PreflightInputs) -> AppResult<RunSummary> {
        let preflight = self.preflight(inputs)?;
        let takeoff = self.takeoff().await?;
        if !self.settings.settle.is_zero() {
            info!(
                settle_secs = self.settings.settle.as_secs(),
                "waiting for the provider to process tasks"
            );
            sleep(self.settings.settle).await;
        }
        let landing = self.landing().await?;
        Ok(RunSummary {
            preflight,
            takeoff,
            landing,
        })
    }

    fn require<T: serde::de::DeserializeOwned>(
        &self,
        artifact: Artifact,
        phase: &'static str,
    ) -> AppResult<T> {
        match load_document(self.store.as_ref(), artifact)? {
            Some(document) => Ok(document),
            None => {
                error!(
                    phase,
                    artifact = artifact.as_str(),
                    "predecessor artifact missing; run the previous phase first"
                );
                Err(AppError::MissingArtifact {
                    phase,
                    artifact: artifact.as_str(),
                })
            }
        }
    }

    fn provider(&self) -> AppResult<&Provider> {
        self.provider
            .as_ref()
            .ok_or_else(|| AppError::Config("no SERP provider configured".into()))
    }
}
