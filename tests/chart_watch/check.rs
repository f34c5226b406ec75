use crate::helpers::{GRAFANA_INDEX, chart_repository, manifest_file};
use chart_watch::chart_version::{CandidateSelection, FreshnessChecker, FreshnessCheckerConfig, VersionComparisonResult};
use chart_watch::helm::ChartRequest;
use chart_watch::io_models::manifest::ReleaseManifest;
use futures::future::join_all;

fn load(manifest: &str) -> Vec<ChartRequest> {
    let file = manifest_file(manifest);
    ReleaseManifest::from_file(file.path())
        .and_then(|manifest| manifest.to_chart_requests())
        .expect("cannot load manifest")
}

fn manifest(repository: &str) -> String {
    format!(
        r#"
releases:
  - name: grafana
    chart: grafana
    namespace: monitoring
    version: "6.48"
    repository: {repository}
  - name: loki
    chart: loki
    namespace: logging
    version: 5.8.x
    repository: {repository}/
  - name: tempo
    chart: tempo
    namespace: tracing
    version: 1.0.0
"#
    )
}

#[tokio::test]
async fn test_every_release_of_a_manifest_is_checked() {
    // setup:
    let repository = chart_repository(GRAFANA_INDEX, 2).await;
    let requests = load(&manifest(&repository.uri()));
    let checker = FreshnessChecker::new(FreshnessCheckerConfig::default()).expect("cannot build checker");

    // execute:
    let results = join_all(requests.iter().map(|request| checker.check_release(request))).await;

    // verify:
    assert_eq!(
        results,
        vec![
            Some(VersionComparisonResult::Stale {
                requested: "6.48".to_string(),
                latest: "6.50.0".to_string(),
            }),
            Some(VersionComparisonResult::Satisfied {
                latest: "5.8.9".to_string(),
            }),
            None,
        ]
    );
}

#[tokio::test]
async fn test_highest_version_selection_ignores_publisher_order() {
    // setup:
    let repository = chart_repository(GRAFANA_INDEX, 2).await;
    let requests = load(&manifest(&repository.uri()));
    let checker = FreshnessChecker::new(FreshnessCheckerConfig {
        candidate_selection: CandidateSelection::HighestVersion,
        ..FreshnessCheckerConfig::default()
    })
    .expect("cannot build checker");

    // execute:
    let loki = checker.check_release(&requests[1]).await;
    let grafana = checker.check_release(&requests[0]).await;

    // verify:
    assert_eq!(
        loki,
        Some(VersionComparisonResult::Stale {
            requested: "5.8.x".to_string(),
            latest: "5.10.0".to_string(),
        })
    );
    assert!(matches!(grafana, Some(VersionComparisonResult::Stale { .. })));
}

#[tokio::test]
async fn test_unreachable_repository_is_unknown() {
    // setup: nothing listens on port 1
    let requests = load(&manifest("http://127.0.0.1:1"));
    let checker = FreshnessChecker::new(FreshnessCheckerConfig::default()).expect("cannot build checker");

    // execute:
    let result = checker.check_release(&requests[0]).await;

    // verify:
    assert!(matches!(result, Some(VersionComparisonResult::Unknown { .. })));
}
