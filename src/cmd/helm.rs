use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::cmd::command::{CommandError, CommandKiller, ExternalCommand};
use crate::declarator::{DeclareError, DeclaredRelease, ReleaseDeclarator};
use crate::helm::ChartRequest;
use crate::infrastructure::helm_charts::ChartValuesError;

pub const HELM_DEFAULT_TIMEOUT_IN_SECONDS: u64 = 300;

// helm gets the chance to report its own timeout before being killed
const HELM_KILL_MARGIN: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum HelmError {
    #[error("cannot render values of release `{release_name}`: {source}")]
    Values {
        release_name: String,
        source: ChartValuesError,
    },

    #[error("cannot write values file of release `{release_name}`: {source}")]
    ValuesFile {
        release_name: String,
        source: std::io::Error,
    },

    #[error("helm upgrade of release `{release_name}` failed: {source}")]
    CommandFailed {
        release_name: String,
        source: CommandError,
    },
}

#[derive(Clone, Debug)]
pub struct HelmConfig {
    pub binary: PathBuf,
    pub kubeconfig: Option<PathBuf>,
    pub dry_run: bool,
    /// `None` keeps helm default.
    pub timeout: Option<Duration>,
    pub envs: Vec<(String, String)>,
}

impl Default for HelmConfig {
    fn default() -> Self {
        HelmConfig {
            binary: PathBuf::from("helm"),
            kubeconfig: None,
            dry_run: false,
            timeout: None,
            envs: vec![],
        }
    }
}

/// Declares releases with the helm CLI.
pub struct Helm {
    config: HelmConfig,
}

impl Helm {
    pub fn new(config: HelmConfig) -> Helm {
        Helm { config }
    }

    /// `helm upgrade --install` arguments for `request`, its values being in `values_file`.
    pub fn upgrade_args(&self, request: &ChartRequest, values_file: &Path) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            request.release_name().to_string(),
            request.chart().to_string(),
        ];

        if let Some(repository) = request.repository() {
            // OCI charts are referenced directly, helm doesn't take them with `--repo`
            if repository.serves_index() {
                args.extend(["--repo".to_string(), repository.to_string()]);
            } else {
                args[3] = format!("{}/{}", repository, request.chart());
            }
        }
        if let Some(version) = request.version() {
            args.extend(["--version".to_string(), version.to_string()]);
        }

        args.extend([
            "--namespace".to_string(),
            request.namespace().to_string(),
            "--create-namespace".to_string(),
            "--values".to_string(),
            values_file.to_string_lossy().to_string(),
        ]);

        if let Some(kubeconfig) = &self.config.kubeconfig {
            args.extend(["--kubeconfig".to_string(), kubeconfig.to_string_lossy().to_string()]);
        }
        if let Some(timeout) = self.config.timeout {
            args.extend(["--timeout".to_string(), format!("{}s", timeout.as_secs())]);
        }
        if self.config.dry_run {
            args.push("--dry-run".to_string());
        }

        args
    }

    pub fn upgrade(&self, request: &ChartRequest) -> Result<DeclaredRelease, HelmError> {
        let release_name = request.release_name().to_string();

        let values = request.values().to_yaml().map_err(|source| HelmError::Values {
            release_name: release_name.clone(),
            source,
        })?;

        // removed once dropped, after the command returns
        let values_file = write_values_file(request.release_name(), &values).map_err(|source| {
            HelmError::ValuesFile {
                release_name: release_name.clone(),
                source,
            }
        })?;

        let args = self.upgrade_args(request, values_file.path());
        let envs = self
            .config
            .envs
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect::<Vec<_>>();

        info!(
            "Declaring release '{}' of chart '{}' in namespace '{}'{}",
            request.release_name(),
            request.chart(),
            request.namespace(),
            if self.config.dry_run { " (dry run)" } else { "" }
        );

        let killer = CommandKiller::from_timeout(
            self.config
                .timeout
                .unwrap_or(Duration::from_secs(HELM_DEFAULT_TIMEOUT_IN_SECONDS))
                + HELM_KILL_MARGIN,
        );
        let mut cmd = ExternalCommand::new(
            &self.config.binary,
            &args.iter().map(String::as_str).collect::<Vec<_>>(),
            &envs,
        );
        cmd.exec_with_abort(
            &mut |line| info!("{}", line),
            &mut |line| warn!("{}", line),
            &killer,
        )
        .map_err(|source| HelmError::CommandFailed { release_name, source })?;

        Ok(DeclaredRelease::from(request))
    }
}

impl ReleaseDeclarator for Helm {
    fn declare(&self, request: &ChartRequest) -> Result<DeclaredRelease, DeclareError> {
        Ok(self.upgrade(request)?)
    }
}

fn write_values_file(release_name: &str, values: &str) -> std::io::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(&format!("{release_name}-values-"))
        .suffix(".yaml")
        .tempfile()?;
    file.write_all(values.as_bytes())?;
    file.flush()?;

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::helm_charts::ChartValues;
    use crate::infrastructure::helm_charts::grafana_chart::GrafanaValues;
    use serde_yaml::Mapping;
    use tracing_test::traced_test;

    fn grafana_request() -> ChartRequest {
        ChartRequest::new("grafana", "grafana", "monitoring", GrafanaValues::default().into())
            .and_then(|r| r.with_version("6.48"))
            .and_then(|r| r.with_repository("https://grafana.github.io/helm-charts/"))
            .expect("invalid test request")
    }

    #[test]
    fn test_upgrade_args() {
        // setup:
        struct TestCase<'a> {
            description: &'a str,
            config: HelmConfig,
            request: ChartRequest,
            expected: Vec<&'a str>,
        }

        let test_cases = vec![
            TestCase {
                description: "http repository with defaults",
                config: HelmConfig::default(),
                request: grafana_request(),
                expected: vec![
                    "upgrade",
                    "--install",
                    "grafana",
                    "grafana",
                    "--repo",
                    "https://grafana.github.io/helm-charts",
                    "--version",
                    "6.48",
                    "--namespace",
                    "monitoring",
                    "--create-namespace",
                    "--values",
                    "/tmp/values.yaml",
                ],
            },
            TestCase {
                description: "oci chart with every option",
                config: HelmConfig {
                    kubeconfig: Some(PathBuf::from("/etc/kube/config")),
                    dry_run: true,
                    timeout: Some(Duration::from_secs(600)),
                    ..Default::default()
                },
                request: ChartRequest::new("tempo", "tempo", "tracing", ChartValues::custom("tempo", Mapping::new()))
                    .and_then(|r| r.with_repository("oci://registry.example.com/charts"))
                    .expect("invalid test request"),
                expected: vec![
                    "upgrade",
                    "--install",
                    "tempo",
                    "oci://registry.example.com/charts/tempo",
                    "--namespace",
                    "tracing",
                    "--create-namespace",
                    "--values",
                    "/tmp/values.yaml",
                    "--kubeconfig",
                    "/etc/kube/config",
                    "--timeout",
                    "600s",
                    "--dry-run",
                ],
            },
        ];

        for tc in test_cases {
            // execute:
            let args = Helm::new(tc.config).upgrade_args(&tc.request, Path::new("/tmp/values.yaml"));

            // verify:
            assert_eq!(tc.expected, args, "{}", tc.description);
        }
    }

    #[test]
    #[traced_test]
    fn test_upgrade_runs_helm_and_streams_its_output() {
        // setup: echo stands for helm and prints the arguments it gets
        let helm = Helm::new(HelmConfig {
            binary: PathBuf::from("echo"),
            ..Default::default()
        });

        // execute:
        let declared = helm.upgrade(&grafana_request()).expect("release should be declared");

        // verify:
        assert_eq!(declared.release_name, "grafana");
        assert_eq!(declared.version.as_deref(), Some("6.48"));
        assert!(logs_contain("upgrade --install grafana grafana --repo https://grafana.github.io/helm-charts"));
    }

    #[test]
    fn test_values_file_is_removed_once_dropped() {
        // setup:
        let values = grafana_request().values().to_yaml().expect("cannot render values");

        // execute:
        let values_file = write_values_file("grafana", &values).expect("cannot write values file");
        let path = values_file.path().to_path_buf();
        let content = std::fs::read_to_string(&path).expect("cannot read values file");
        drop(values_file);

        // verify:
        assert_eq!(content, values);
        assert!(content.contains("ingressClassName: nginx-internal"));
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("grafana-values-"));
        assert!(!path.exists());
    }

    #[test]
    fn test_failing_helm_is_a_declaration_error() {
        let helm = Helm::new(HelmConfig {
            binary: PathBuf::from("false"),
            ..Default::default()
        });

        let result = helm.declare(&grafana_request());

        assert!(matches!(
            result,
            Err(DeclareError::Helm(HelmError::CommandFailed { release_name, .. })) if release_name == "grafana"
        ));
    }
}
