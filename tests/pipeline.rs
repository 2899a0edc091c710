use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use httptest::matchers::{all_of, request};
use httptest::responders::{json_encoded, status_code};
use httptest::{Expectation, Server};
use secrecy::SecretString;
use serde_json::json;
use tempfile::tempdir;

use serp_rank_tracker::audit::{AuditLog, AUDIT_LOG_FILE};
use serp_rank_tracker::config::{PollPolicy, RequestProfile};
use serp_rank_tracker::model::{LandingDocument, LandingStatus, SubmissionStatus, TakeoffDocument};
use serp_rank_tracker::preflight::{
    PreflightInputs, LOCATION_TARGETS_FILE, PLACEHOLDERS_FILE, SERVICE_LOCATION_DATA_FILE,
};
use serp_rank_tracker::report::write_report;
use serp_rank_tracker::serp::SerpCredentials;
use serp_rank_tracker::store::{load_document, Artifact};
use serp_rank_tracker::{FileStore, Governor, HttpSerpClient, MatchRule, PipelineSettings};

fn write_inputs(dir: &Path) {
    fs::write(
        dir.join(LOCATION_TARGETS_FILE),
        json!({
            "Dallas": [{ "location": "Garland", "service": "wildlife removal" }]
        })
        .to_string(),
    )
    .unwrap();
    fs::write(
        dir.join(SERVICE_LOCATION_DATA_FILE),
        json!({
            "Dallas": {
                "brand": "AAAC Wildlife Removal",
                "locations": [{ "name": "Garland", "geoCoordinate": "32.91,-96.63" }],
                "services": [{
                    "name": "wildlife removal",
                    "keywordList": ["wildlife removal"],
                    "url": "https://dallas.aaacwildliferemoval.com/service-area/garland/"
                }]
            }
        })
        .to_string(),
    )
    .unwrap();
    fs::write(
        dir.join(PLACEHOLDERS_FILE),
        json!(["{keyword} near {location}"]).to_string(),
    )
    .unwrap();
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        request: RequestProfile::desktop(),
        match_rule: Some(MatchRule::Domain("aaacwildliferemoval.com".into())),
        poll: PollPolicy {
            interval: Duration::ZERO,
            max_attempts: 3,
        },
        checkpoint_every: 20,
        settle: Duration::ZERO,
        submit_rate_limit_qps: 100,
    }
}

fn governor(server: &Server, data_dir: &Path) -> Governor {
    let serp = HttpSerpClient::new(
        &server.url_str("/"),
        SerpCredentials {
            login: "ops@example.com".into(),
            password: SecretString::from("pw".to_string()),
        },
        Duration::from_secs(5),
    )
    .unwrap();
    Governor::new(Arc::new(FileStore::new(data_dir).unwrap()), settings()).with_provider(
        Arc::new(serp),
        AuditLog::new(data_dir, 1024 * 1024).unwrap(),
    )
}

#[tokio::test]
async fn garland_keyword_lands_with_rank_three() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of!(
            request::method("POST"),
            request::path("/v3/serp/google/organic/task_post")
        ))
        .respond_with(json_encoded(json!({
            "status_code": 20000,
            "tasks": [{ "id": "T1", "status_code": 20100, "status_message": "Task Created." }]
        }))),
    );
    server.expect(
        Expectation::matching(all_of!(
            request::method("GET"),
            request::path("/v3/serp/google/organic/task_get/regular/T1")
        ))
        .respond_with(json_encoded(json!({
            "status_code": 20000,
            "tasks": [{
                "id": "T1",
                "status_code": 20000,
                "result": [{
                    "items": [
                        {
                            "type": "organic",
                            "rank_group": 3,
                            "rank_absolute": 4,
                            "url": "https://dallas.aaacwildliferemoval.com/service-area/garland/"
                        },
                        { "type": "organic", "rank_group": 1, "rank_absolute": 1, "url": "https://example.com" },
                        { "type": "paid", "rank_group": 1, "url": "https://ads.aaacwildliferemoval.com/" }
                    ]
                }]
            }]
        }))),
    );

    let input_dir = tempdir().unwrap();
    let data_dir = tempdir().unwrap();
    write_inputs(input_dir.path());
    let inputs = PreflightInputs::load(input_dir.path()).unwrap();

    let summary = governor(&server, data_dir.path())
        .run_all(&inputs)
        .await
        .unwrap();
    assert_eq!(summary.takeoff.submitted, 1);
    assert_eq!(summary.landing.completed, 1);

    let store = FileStore::new(data_dir.path()).unwrap();
    let landing: LandingDocument = load_document(&store, Artifact::Landing)
        .unwrap()
        .unwrap();
    let result = &landing["Dallas"][0].results[0];
    assert_eq!(result.keyword, "wildlife removal near garland");
    assert_eq!(result.status, LandingStatus::Completed);
    assert_eq!(result.rankings.len(), 1);
    assert_eq!(result.rankings[0].rank, 3);
    assert_eq!(
        result.rankings[0].url,
        "https://dallas.aaacwildliferemoval.com/service-area/garland/"
    );

    let audit = fs::read_to_string(data_dir.path().join(AUDIT_LOG_FILE)).unwrap();
    assert_eq!(audit.lines().count(), 1);
    assert!(audit.contains("\"location_coordinate\":\"32.91,-96.63\""));

    let report = data_dir.path().join("rankings.csv");
    assert_eq!(write_report(&landing, &report).unwrap(), 1);
    assert!(fs::read_to_string(&report).unwrap().contains(",completed,3,"));
}

#[tokio::test]
async fn failed_submissions_are_skipped_at_landing() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path(
            "POST",
            "/v3/serp/google/organic/task_post",
        ))
        .respond_with(status_code(500)),
    );

    let input_dir = tempdir().unwrap();
    let data_dir = tempdir().unwrap();
    write_inputs(input_dir.path());
    let inputs = PreflightInputs::load(input_dir.path()).unwrap();

    let summary = governor(&server, data_dir.path())
        .run_all(&inputs)
        .await
        .unwrap();
    assert_eq!(summary.takeoff.failed, 1);
    assert_eq!(summary.landing.skipped, 1);

    let store = FileStore::new(data_dir.path()).unwrap();
    let takeoff: TakeoffDocument = load_document(&store, Artifact::Takeoff)
        .unwrap()
        .unwrap();
    let task = &takeoff["Dallas"][0].tasks[0];
    assert_eq!(task.status, SubmissionStatus::Error);
    assert!(task.error_description.is_some());

    let landing: LandingDocument = load_document(&store, Artifact::Landing)
        .unwrap()
        .unwrap();
    assert_eq!(landing["Dallas"][0].results[0].status, LandingStatus::Skipped);
}
