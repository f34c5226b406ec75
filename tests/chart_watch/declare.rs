use crate::helpers::{GRAFANA_INDEX, chart_repository};
use chart_watch::chart_version::{FreshnessChecker, FreshnessCheckerConfig};
use chart_watch::cmd::helm::{Helm, HelmConfig};
use chart_watch::declarator::{DeclareError, DeclaredRelease, ReleaseDeclarator, WatchedDeclarator};
use chart_watch::helm::ChartRequest;
use chart_watch::io_models::manifest::ReleaseManifest;
use chart_watch::runtime::TaskSupervisor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

fn requests(repository: &str) -> Vec<ChartRequest> {
    ReleaseManifest::from_yaml(&format!(
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
    version: 5.8.0
    repository: {repository}
"#
    ))
    .and_then(|manifest| manifest.to_chart_requests())
    .expect("cannot load manifest")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_releases_are_declared_with_helm_while_checks_run() {
    // setup: `echo` stands for helm
    let repository = chart_repository(GRAFANA_INDEX, 2).await;
    let checker = Arc::new(FreshnessChecker::new(FreshnessCheckerConfig::default()).expect("cannot build checker"));
    let supervisor = Arc::new(TaskSupervisor::new(Handle::current()));
    let helm = Helm::new(HelmConfig {
        binary: PathBuf::from("echo"),
        dry_run: true,
        ..HelmConfig::default()
    });
    let declarator = WatchedDeclarator::new(helm, checker, supervisor.clone());

    // execute:
    let declared = requests(&repository.uri())
        .iter()
        .map(|request| declarator.declare(request))
        .collect::<Result<Vec<DeclaredRelease>, DeclareError>>()
        .expect("releases should be declared");

    // verify:
    assert_eq!(
        declared,
        vec![
            DeclaredRelease {
                release_name: "grafana".to_string(),
                chart: "grafana".to_string(),
                namespace: "monitoring".to_string(),
                version: Some("6.48".to_string()),
            },
            DeclaredRelease {
                release_name: "loki".to_string(),
                chart: "loki".to_string(),
                namespace: "logging".to_string(),
                version: Some("5.8.0".to_string()),
            },
        ]
    );
    assert!(supervisor.shutdown(Duration::from_secs(10)).await);
    assert_eq!(supervisor.running(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_helm_is_reported_and_checks_still_complete() {
    // setup: `false` stands for a failing helm
    let repository = chart_repository(GRAFANA_INDEX, 1).await;
    let supervisor = Arc::new(TaskSupervisor::new(Handle::current()));
    let declarator = WatchedDeclarator::new(
        Helm::new(HelmConfig {
            binary: PathBuf::from("false"),
            ..HelmConfig::default()
        }),
        Arc::new(FreshnessChecker::new(FreshnessCheckerConfig::default()).expect("cannot build checker")),
        supervisor.clone(),
    );

    // execute:
    let result = declarator.declare(&requests(&repository.uri())[0]);

    // verify:
    assert!(matches!(result, Err(DeclareError::Helm(_))));
    assert!(supervisor.shutdown(Duration::from_secs(10)).await);
}
