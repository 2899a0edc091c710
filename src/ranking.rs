use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::model::RankingEntry;
use crate::serp::ResultPage;

pub const ORGANIC_TYPE: &str = "organic";

/// Which result URLs count as "ours" for a deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "target", rename_all = "lowercase")]
pub enum MatchRule {
    /// Exact equality against one configured prime URL.
    Exact(String),
    /// Substring containment of a configured domain.
    Domain(String),
    /// Exact equality against each work item's own intended URL.
    Intended,
}

impl MatchRule {
    pub fn from_parts(mode: &str, target: &str) -> AppResult<Self> {
        let target = target.trim();
        match mode.trim().to_ascii_lowercase().as_str() {
            "intended" => Ok(MatchRule::Intended),
            "exact" | "domain" if target.is_empty() => Err(AppError::Config(format!(
                "match mode {mode} requires a non-empty target"
            ))),
            "exact" => Ok(MatchRule::Exact(target.to_string())),
            "domain" => Ok(MatchRule::Domain(target.to_string())),
            other => Err(AppError::Config(format!("invalid match mode: {other}"))),
        }
    }

    pub fn matches(&self, url: &str, intended_url: &str) -> bool {
        match self {
            MatchRule::Exact(prime) => url == prime,
            MatchRule::Domain(domain) => url.contains(domain.as_str()),
            MatchRule::Intended => !intended_url.is_empty() && url == intended_url,
        }
    }
}

/// Flattens every page and keeps organic entries whose URL satisfies `rule`.
pub fn extract_rankings(
    pages: &[ResultPage],
    rule: &MatchRule,
    intended_url: &str,
) -> Vec<RankingEntry> {
    pages
        .iter()
        .flat_map(|page| page.items.iter())
        .filter(|item| item.item_type == ORGANIC_TYPE)
        .filter_map(|item| {
            let url = item.url.as_deref()?;
            let rank = item.rank_group.filter(|rank| *rank > 0)?;
            rule.matches(url, intended_url).then(|| RankingEntry {
                rank,
                url: url.to_string(),
            })
        })
        .collect()
}

/// Lowest rank wins; the first entry is kept on ties.
pub fn best_rank(entries: &[RankingEntry]) -> Option<&RankingEntry> {
    entries.iter().min_by_key(|entry| entry.rank)
}
