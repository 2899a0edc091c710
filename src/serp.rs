use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::config::{Device, RequestProfile};
use crate::errors::{AppError, AppResult};

const TASK_POST_PATH: &str = "v3/serp/google/organic/task_post";
const TASK_GET_PATH: &str = "v3/serp/google/organic/task_get/regular";
const FIRST_ERROR_STATUS: u32 = 40000;

/// One task-creation request, sent as a single-element array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRequest {
    pub keyword: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_coordinate: Option<String>,
    pub language_code: String,
    pub device: Device,
    pub os: String,
}

impl TaskRequest {
    pub fn new(keyword: &str, location_coordinate: Option<&str>, profile: &RequestProfile) -> Self {
        Self {
            keyword: keyword.to_string(),
            location_coordinate: location_coordinate.map(str::to_string),
            language_code: profile.language_code.clone(),
            device: profile.device,
            os: profile.os.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ResultPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<ResultItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultItem {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub item_type: String,
    #[serde(default)]
    pub rank_group: Option<u32>,
    #[serde(default)]
    pub rank_absolute: Option<u32>,
    #[serde(default)]
    pub url: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The ranking-check provider: task creation and task retrieval.
#[async_trait]
pub trait SerpApi: Send + Sync {
    /// Destination of task submissions, recorded in the audit log.
    fn task_post_url(&self) -> String;

    /// Creates one task and returns its identifier.
    async fn post_task(&self, request: &TaskRequest) -> AppResult<String>;

    /// `Ok(None)` while the task is not ready yet.
    async fn get_task(&self, task_id: &str) -> AppResult<Option<Vec<ResultPage>>>;
}

#[derive(Clone, Debug)]
pub struct SerpCredentials {
    pub login: String,
    pub password: SecretString,
}

pub struct HttpSerpClient {
    http: Client,
    base: Url,
    credentials: SerpCredentials,
}

impl HttpSerpClient {
    pub fn new(base: &str, credentials: SerpCredentials, timeout: Duration) -> AppResult<Self> {
        let mut base = Url::parse(base)
            .map_err(|err| AppError::Config(format!("invalid SERP API base URL: {err}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = Client::builder()
            .user_agent(concat!("serp-rank-tracker/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base,
            credentials,
        })
    }

    fn endpoint(&self, path: &str) -> AppResult<Url> {
        self.base
            .join(path)
            .map_err(|err| AppError::Config(format!("invalid SERP endpoint {path}: {err}")))
    }
}

#[derive(Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    tasks: Option<Vec<ProviderTask>>,
    #[serde(default)]
    status_message: Option<String>,
}

#[derive(Deserialize)]
struct ProviderTask {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status_code: Option<u32>,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    result: Option<Vec<ResultPage>>,
}

impl ProviderResponse {
    fn first_task(self) -> AppResult<ProviderTask> {
        let fallback = self.status_message;
        self.tasks
            .and_then(|tasks| tasks.into_iter().next())
            .ok_or_else(|| {
                AppError::Api(
                    fallback.unwrap_or_else(|| "response contained no tasks".to_string()),
                )
            })
    }
}

#[async_trait]
impl SerpApi for HttpSerpClient {
    fn task_post_url(&self) -> String {
        self.endpoint(TASK_POST_PATH)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| format!("{}{}", self.base, TASK_POST_PATH))
    }

    async fn post_task(&self, request: &TaskRequest) -> AppResult<String> {
        let response = self
            .http
            .post(self.endpoint(TASK_POST_PATH)?)
            .basic_auth(
                &self.credentials.login,
                Some(self.credentials.password.expose_secret()),
            )
            .json(&[request])
            .send()
            .await?
            .error_for_status()?;

        let task = response.json::<ProviderResponse>().await?.first_task()?;
        if let Some(code) = task.status_code.filter(|code| *code >= FIRST_ERROR_STATUS) {
            return Err(AppError::Api(format!(
                "task rejected ({code}): {}",
                task.status_message.unwrap_or_default()
            )));
        }
        let task_id = task
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| AppError::Api("task response missing id".into()))?;
        trace!(%task_id, keyword = %request.keyword, "task created");
        Ok(task_id)
    }

    async fn get_task(&self, task_id: &str) -> AppResult<Option<Vec<ResultPage>>> {
        let mut url = self.endpoint(TASK_GET_PATH)?;
        url.path_segments_mut()
            .map_err(|_| AppError::Config("invalid SERP API base".into()))?
            .push(task_id);

        let response = self
            .http
            .get(url)
            .basic_auth(
                &self.credentials.login,
                Some(self.credentials.password.expose_secret()),
            )
            .send()
            .await?
            .error_for_status()?;

        let task = response.json::<ProviderResponse>().await?.first_task()?;
        Ok(task.result.filter(|pages| !pages.is_empty()))
    }
}

/// Spaces out sequential calls to at most `qps` per second.
pub struct RateLimiter {
    min_interval: Duration,
    last_tick: AsyncMutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(qps: u32) -> Self {
        let interval_ms = (1000_f64 / qps.max(1) as f64).ceil() as u64;
        Self {
            min_interval: Duration::from_millis(interval_ms),
            last_tick: AsyncMutex::new(None),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            min_interval: Duration::ZERO,
            last_tick: AsyncMutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let mut guard = self.last_tick.lock().await;
        if let Some(prev) = *guard {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }
}
