use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::errors::AppResult;
use crate::model::LandingDocument;

pub const REPORT_FILE: &str = "rankings.csv";

/// One keyword per row, ready for a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankingRow {
    pub office: String,
    pub location: String,
    pub service: String,
    pub keyword: String,
    pub status: &'static str,
    pub best_rank: Option<u32>,
    pub best_url: Option<String>,
    pub intended_url: String,
}

pub fn ranking_rows(document: &LandingDocument) -> Vec<RankingRow> {
    let mut rows = Vec::new();
    for (office, items) in document {
        for item in items {
            for result in &item.results {
                rows.push(RankingRow {
                    office: office.clone(),
                    location: item.location.clone(),
                    service: item.service.clone(),
                    keyword: result.keyword.clone(),
                    status: result.status.as_str(),
                    best_rank: result.best.as_ref().map(|best| best.rank),
                    best_url: result.best.as_ref().map(|best| best.url.clone()),
                    intended_url: item.intended_url.clone(),
                });
            }
        }
    }
    rows
}

pub fn write_report(document: &LandingDocument, path: &Path) -> AppResult<usize> {
    let rows = ranking_rows(document);
    let mut writer = csv::Writer::from_path(path)?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(rows = rows.len(), path = %path.display(), "rankings report written");
    Ok(rows.len())
}
