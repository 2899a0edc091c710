use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};
use crate::model::{PreflightDocument, WorkItem};
use crate::templates::expand_keywords;

pub const LOCATION_TARGETS_FILE: &str = "location_targets.json";
pub const SERVICE_LOCATION_DATA_FILE: &str = "service_location_data.json";
pub const PLACEHOLDERS_FILE: &str = "placeholders.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
    pub location: String,
    pub service: String,
    #[serde(default)]
    pub intended_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownLocation {
    pub name: String,
    #[serde(default)]
    pub geo_coordinate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    pub name: String,
    #[serde(default, alias = "keywordList")]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationProfile {
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub locations: Vec<KnownLocation>,
    #[serde(default)]
    pub services: Vec<ServiceDefinition>,
}

impl LocationProfile {
    fn geo_coordinate(&self, location: &str) -> Option<String> {
        self.locations
            .iter()
            .find(|known| known.name == location)
            .and_then(|known| known.geo_coordinate.clone())
            .filter(|coordinate| !coordinate.trim().is_empty())
    }

    fn service(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|service| service.name == name)
    }
}

pub type LocationTargets = BTreeMap<String, Vec<TargetDescriptor>>;
pub type ServiceLocationData = BTreeMap<String, LocationProfile>;

/// The three tables Preflight joins. Read once per run, never written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreflightInputs {
    pub location_targets: LocationTargets,
    pub service_location_data: ServiceLocationData,
    pub placeholders: Vec<String>,
}

impl PreflightInputs {
    pub fn load(dir: &Path) -> AppResult<Self> {
        Ok(Self {
            location_targets: read_table(dir, LOCATION_TARGETS_FILE)?,
            service_location_data: read_table(dir, SERVICE_LOCATION_DATA_FILE)?,
            placeholders: read_table(dir, PLACEHOLDERS_FILE)?,
        })
    }
}

fn read_table<T: DeserializeOwned>(dir: &Path, file_name: &str) -> AppResult<T> {
    let path = dir.join(file_name);
    let contents = fs::read_to_string(&path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => {
            AppError::Config(format!("input table {} not found", path.display()))
        }
        _ => AppError::Io(err),
    })?;
    Ok(serde_json::from_str(&contents)?)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PreflightStats {
    pub work_items: usize,
    pub keywords: usize,
    pub missing_geo: usize,
    pub missing_service: usize,
    pub skipped_groups: usize,
}

/// Joins the input tables into work items grouped by office.
///
/// Absent lookups degrade the affected field to null or empty; the item is
/// still emitted so the gap stays visible downstream.
pub fn build_preflight(inputs: &PreflightInputs) -> (PreflightDocument, PreflightStats) {
    let mut document = PreflightDocument::new();
    let mut stats = PreflightStats::default();

    for (office, targets) in &inputs.location_targets {
        let Some(profile) = inputs.service_location_data.get(office) else {
            warn!(%office, "no service/location data for office; skipping group");
            stats.skipped_groups += 1;
            continue;
        };

        let items = document.entry(office.clone()).or_default();
        for target in targets {
            let geo_coordinate = profile.geo_coordinate(&target.location);
            if geo_coordinate.is_none() {
                warn!(%office, location = %target.location, "no geo coordinate for location");
                stats.missing_geo += 1;
            }

            let service = profile.service(&target.service);
            let keywords = match service {
                Some(definition) => expand_keywords(
                    &definition.keywords,
                    &inputs.placeholders,
                    &target.location,
                    &profile.brand,
                ),
                None => {
                    warn!(%office, service = %target.service, "no service definition found");
                    stats.missing_service += 1;
                    Vec::new()
                }
            };

            let intended_url = target
                .intended_url
                .clone()
                .or_else(|| service.and_then(|definition| definition.url.clone()))
                .unwrap_or_default();

            stats.keywords += keywords.len();
            stats.work_items += 1;
            items.push(WorkItem {
                location: target.location.clone(),
                service: target.service.clone(),
                intended_url,
                geo_coordinate,
                keywords,
            });
        }
    }

    info!(
        work_items = stats.work_items,
        keywords = stats.keywords,
        missing_geo = stats.missing_geo,
        missing_service = stats.missing_service,
        "preflight built"
    );
    (document, stats)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn sample_inputs() -> PreflightInputs {
        let mut location_targets = LocationTargets::new();
        location_targets.insert(
            "Dallas".into(),
            vec![
                TargetDescriptor {
                    location: "Garland".into(),
                    service: "wildlife removal".into(),
                    intended_url: None,
                },
                TargetDescriptor {
                    location: "Mesquite".into(),
                    service: "wildlife removal".into(),
                    intended_url: Some("https://dallas.example.com/mesquite/".into()),
                },
                TargetDescriptor {
                    location: "Garland".into(),
                    service: "pool cleaning".into(),
                    intended_url: None,
                },
            ],
        );

        let mut service_location_data = ServiceLocationData::new();
        service_location_data.insert(
            "Dallas".into(),
            LocationProfile {
                brand: "AAAC".into(),
                locations: vec![KnownLocation {
                    name: "Garland".into(),
                    geo_coordinate: Some("32.91,-96.63".into()),
                }],
                services: vec![ServiceDefinition {
                    name: "wildlife removal".into(),
                    keywords: vec!["wildlife removal".into(), "animal control".into()],
                    url: Some("https://dallas.example.com/".into()),
                }],
            },
        );

        PreflightInputs {
            location_targets,
            service_location_data,
            placeholders: vec!["{keyword} near {location}".into(), "{brand} {keyword}".into()],
        }
    }

    #[test]
    fn expands_keywords_for_known_service() {
        let (document, stats) = build_preflight(&sample_inputs());
        let items = &document["Dallas"];
        assert_eq!(items.len(), 3);

        let garland = &items[0];
        assert_eq!(garland.geo_coordinate.as_deref(), Some("32.91,-96.63"));
        assert_eq!(garland.intended_url, "https://dallas.example.com/");
        assert_eq!(
            garland.keywords,
            vec![
                "wildlife removal near garland",
                "animal control near garland",
                "AAAC wildlife removal",
                "AAAC animal control",
            ]
        );
        assert_eq!(stats.work_items, 3);
    }

    #[test]
    fn keeps_items_without_geo_coordinate() {
        let (document, stats) = build_preflight(&sample_inputs());
        let mesquite = &document["Dallas"][1];
        assert_eq!(mesquite.location, "Mesquite");
        assert_eq!(mesquite.geo_coordinate, None);
        assert_eq!(mesquite.intended_url, "https://dallas.example.com/mesquite/");
        assert_eq!(mesquite.keywords.len(), 4);
        assert_eq!(stats.missing_geo, 1);
    }

    #[test]
    fn unknown_service_yields_empty_keywords() {
        let (document, stats) = build_preflight(&sample_inputs());
        let pool = &document["Dallas"][2];
        assert!(pool.keywords.is_empty());
        assert_eq!(pool.intended_url, "");
        assert_eq!(stats.missing_service, 1);
    }

    #[test]
    fn no_placeholders_yields_empty_keywords() {
        let mut inputs = sample_inputs();
        inputs.placeholders.clear();
        let (document, _) = build_preflight(&inputs);
        assert!(document["Dallas"].iter().all(|item| item.keywords.is_empty()));
    }

    #[test]
    fn skips_offices_without_service_data() {
        let mut inputs = sample_inputs();
        inputs.location_targets.insert(
            "Austin".into(),
            vec![TargetDescriptor {
                location: "Round Rock".into(),
                service: "wildlife removal".into(),
                intended_url: None,
            }],
        );
        let (document, stats) = build_preflight(&inputs);
        assert!(!document.contains_key("Austin"));
        assert_eq!(stats.skipped_groups, 1);
    }

    #[test]
    fn loads_tables_from_directory() {
        let dir = tempdir().unwrap();
        let inputs = sample_inputs();
        fs::write(
            dir.path().join(LOCATION_TARGETS_FILE),
            serde_json::to_string(&inputs.location_targets).unwrap(),
        )
        .unwrap();
        fs::write(
            dir.path().join(SERVICE_LOCATION_DATA_FILE),
            r#"{"Dallas": {"brand": "AAAC", "locations": [{"name": "Garland", "geoCoordinate": "32.91,-96.63"}],
                "services": [{"name": "wildlife removal", "keywordList": ["wildlife removal"]}]}}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join(PLACEHOLDERS_FILE),
            r#"["{keyword} near {location}"]"#,
        )
        .unwrap();

        let loaded = PreflightInputs::load(dir.path()).unwrap();
        assert_eq!(loaded.location_targets, inputs.location_targets);
        assert_eq!(
            loaded.service_location_data["Dallas"].services[0].keywords,
            vec!["wildlife removal"]
        );
        assert_eq!(loaded.placeholders.len(), 1);
    }

    #[test]
    fn missing_table_is_a_config_error() {
        let dir = tempdir().unwrap();
        let err = PreflightInputs::load(dir.path()).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
