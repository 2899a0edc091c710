pub mod audit;
pub mod cli;
pub mod config;
pub mod errors;
pub mod governor;
pub mod landing;
pub mod model;
pub mod preflight;
pub mod ranking;
pub mod report;
pub mod secrets;
pub mod serp;
pub mod store;
pub mod takeoff;
pub mod templates;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use config::{AppConfig, PipelineSettings};
pub use errors::{AppError, AppResult};
pub use governor::{Governor, RunSummary};
pub use ranking::MatchRule;
pub use serp::{HttpSerpClient, SerpApi};
pub use store::{ArtifactStore, FileStore, MemoryStore};

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,serp_rank_tracker=debug"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init();
    });
}
