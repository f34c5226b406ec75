use crate::chart_version::constraint::ChartVersionConstraint;
use crate::chart_version::index::{CandidateSelection, RepositoryIndex, index_url};
use crate::helm::ChartRequest;
use reqwest::StatusCode;
use semver::Version;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_USER_AGENT: &str = concat!("chart-watch/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum HelmIndexError {
    #[error("cannot build http client: {0}")]
    ClientBuild(reqwest::Error),

    #[error("cannot build index url from `{repository}`: {source}")]
    InvalidUrl {
        repository: Url,
        source: url::ParseError,
    },

    #[error("`{0}` does not serve a repository index, only http(s) repositories do")]
    UnsupportedScheme(Url),

    #[error("cannot fetch `{url}`: {source}")]
    Transport { url: Url, source: reqwest::Error },

    #[error("`{url}` answered with status {status}")]
    Status { url: Url, status: StatusCode },

    #[error("cannot parse index from `{url}`: {source}")]
    Parse { url: Url, source: serde_yaml::Error },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VersionComparisonResult {
    /// Latest published version satisfies the requested constraint.
    Satisfied { latest: String },
    /// A newer version than the requested one has been published.
    Stale { requested: String, latest: String },
    /// Latest version could not be determined.
    Unknown { reason: String },
}

impl Display for VersionComparisonResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionComparisonResult::Satisfied { latest } => write!(f, "up to date (latest {latest})"),
            VersionComparisonResult::Stale { requested, latest } => write!(f, "stale ('{requested}' => '{latest}')"),
            VersionComparisonResult::Unknown { reason } => write!(f, "unknown ({reason})"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FreshnessCheckerConfig {
    pub candidate_selection: CandidateSelection,
    pub user_agent: String,
    /// `None` keeps the transport default.
    pub request_timeout: Option<Duration>,
}

impl Default for FreshnessCheckerConfig {
    fn default() -> Self {
        FreshnessCheckerConfig {
            candidate_selection: CandidateSelection::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: None,
        }
    }
}

/// Compares requested chart versions with the latest ones published in chart repositories.
///
/// Indexes are fetched on every check, nothing is cached. Failures are only logged.
pub struct FreshnessChecker {
    client: reqwest::Client,
    config: FreshnessCheckerConfig,
}

impl FreshnessChecker {
    pub fn new(config: FreshnessCheckerConfig) -> Result<FreshnessChecker, HelmIndexError> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.as_str());
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(FreshnessChecker {
            client: builder.build().map_err(HelmIndexError::ClientBuild)?,
            config,
        })
    }

    pub async fn fetch_index(&self, repository: &Url) -> Result<RepositoryIndex, HelmIndexError> {
        if !matches!(repository.scheme(), "http" | "https") {
            return Err(HelmIndexError::UnsupportedScheme(repository.clone()));
        }

        let url = index_url(repository).map_err(|source| HelmIndexError::InvalidUrl {
            repository: repository.clone(),
            source,
        })?;

        debug!("Fetching chart repository index {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| HelmIndexError::Transport {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(HelmIndexError::Status {
                url,
                status: response.status(),
            });
        }

        let body = response.text().await.map_err(|source| HelmIndexError::Transport {
            url: url.clone(),
            source,
        })?;

        RepositoryIndex::from_yaml(&body).map_err(|source| HelmIndexError::Parse { url, source })
    }

    /// Compares `constraint` with the latest version of `chart` published in `repository`.
    ///
    /// Logs a warning when a newer version exists and an error when it can't be determined.
    pub async fn check(
        &self,
        chart: &str,
        constraint: &ChartVersionConstraint,
        repository: &Url,
    ) -> VersionComparisonResult {
        let result = match self.fetch_index(repository).await {
            Ok(index) => evaluate(&index, chart, constraint, self.config.candidate_selection),
            Err(err) => VersionComparisonResult::Unknown { reason: err.to_string() },
        };

        match &result {
            VersionComparisonResult::Satisfied { latest } => {
                debug!("Chart {} '{}' is up to date (latest '{}').", chart, constraint, latest)
            }
            VersionComparisonResult::Stale { requested, latest } => {
                warn!("New chart version available: {} '{}' => '{}'.", chart, requested, latest)
            }
            VersionComparisonResult::Unknown { reason } => {
                error!(reason = reason.as_str(), "Could not fetch latest version of '{}' !", chart)
            }
        }

        result
    }

    /// `None` when the request doesn't pin both a repository and a version.
    pub async fn check_release(&self, request: &ChartRequest) -> Option<VersionComparisonResult> {
        let target = request.freshness_target()?;
        Some(self.check(target.chart, target.constraint, target.repository).await)
    }
}

/// Pure comparison of `constraint` against the candidate found in `index`.
pub fn evaluate(
    index: &RepositoryIndex,
    chart: &str,
    constraint: &ChartVersionConstraint,
    selection: CandidateSelection,
) -> VersionComparisonResult {
    if !index.entries.contains_key(chart) {
        return VersionComparisonResult::Unknown {
            reason: format!("chart `{chart}` is not present in the repository index"),
        };
    }

    let latest: Version = match index.latest_candidate(chart, constraint.is_prerelease(), selection) {
        Some(latest) => latest,
        None => {
            return VersionComparisonResult::Unknown {
                reason: format!("no release of chart `{chart}` has a usable version"),
            };
        }
    };

    if constraint.matches(&latest) {
        VersionComparisonResult::Satisfied {
            latest: latest.to_string(),
        }
    } else {
        VersionComparisonResult::Stale {
            requested: constraint.to_string(),
            latest: latest.to_string(),
        }
    }
}
