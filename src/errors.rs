use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Keychain(#[from] keyring::Error),
    #[error("{0}")]
    Config(String),
    #[error("provider error: {0}")]
    Api(String),
    #[error("{phase} cannot start: {artifact} artifact is missing")]
    MissingArtifact {
        phase: &'static str,
        artifact: &'static str,
    },
    #[error(
        "task {task_id} had no result after {attempts} poll attempts{}",
        last_error_suffix(.last_error)
    )]
    PollTimeout {
        task_id: String,
        attempts: u32,
        last_error: Option<String>,
    },
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_deref()
        .map(|err| format!(" (last error: {err})"))
        .unwrap_or_default()
}
