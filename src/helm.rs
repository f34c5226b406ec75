use crate::chart_version::{ChartVersionConstraint, ConstraintError};
use crate::infrastructure::helm_charts::{ChartValues, ChartValuesError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use url::Url;

pub const RELEASE_NAME_MAX_LENGTH: usize = 53;
pub const NAMESPACE_MAX_LENGTH: usize = 63;

static RELEASE_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("release name regex is valid")
});

static NAMESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("namespace regex is valid"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChartRequestError {
    #[error("invalid release name `{release_name}`: {msg}")]
    InvalidReleaseName { release_name: String, msg: String },

    #[error("invalid namespace `{namespace}`: {msg}")]
    InvalidNamespace { namespace: String, msg: String },

    #[error("chart name can't be empty")]
    EmptyChartName,

    #[error("invalid version of chart `{chart}`: {source}")]
    InvalidVersion { chart: String, source: ConstraintError },

    #[error("invalid repository `{repository}`: {msg}")]
    InvalidRepository { repository: String, msg: String },

    #[error(transparent)]
    InvalidValues(#[from] ChartValuesError),
}

/// Location of a chart repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartRepository(Url);

impl ChartRepository {
    pub fn url(&self) -> &Url {
        &self.0
    }

    /// Only http(s) repositories publish an `index.yaml`, OCI registries don't.
    pub fn serves_index(&self) -> bool {
        matches!(self.0.scheme(), "http" | "https")
    }
}

impl FromStr for ChartRepository {
    type Err = ChartRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |msg: String| ChartRequestError::InvalidRepository {
            repository: s.to_string(),
            msg,
        };

        let url = Url::parse(s.trim()).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" | "oci" => {}
            scheme => return Err(invalid(format!("unsupported scheme `{scheme}`, use http, https or oci"))),
        }
        if url.host_str().unwrap_or_default().is_empty() {
            return Err(invalid("missing host".to_string()));
        }

        Ok(ChartRepository(url))
    }
}

impl Display for ChartRepository {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // no trailing slash, helm and operators write repositories without it
        f.write_str(self.0.as_str().trim_end_matches('/'))
    }
}

/// What a freshness check needs from a request.
#[derive(Clone, Copy, Debug)]
pub struct FreshnessTarget<'a> {
    pub chart: &'a str,
    pub constraint: &'a ChartVersionConstraint,
    pub repository: &'a Url,
}

/// A chart release to declare, validated at construction and immutable afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct ChartRequest {
    release_name: String,
    chart: String,
    namespace: String,
    version: Option<ChartVersionConstraint>,
    repository: Option<ChartRepository>,
    values: ChartValues,
}

impl ChartRequest {
    pub fn new(
        release_name: &str,
        chart: &str,
        namespace: &str,
        values: ChartValues,
    ) -> Result<ChartRequest, ChartRequestError> {
        validate_release_name(release_name)?;
        validate_namespace(namespace)?;

        let chart = chart.trim();
        if chart.is_empty() {
            return Err(ChartRequestError::EmptyChartName);
        }

        if values.chart_name() != chart {
            return Err(ChartValuesError::ChartMismatch {
                chart: chart.to_string(),
                values_chart: values.chart_name(),
            }
            .into());
        }
        values.validate()?;

        Ok(ChartRequest {
            release_name: release_name.to_string(),
            chart: chart.to_string(),
            namespace: namespace.to_string(),
            version: None,
            repository: None,
            values,
        })
    }

    pub fn with_version(self, version: &str) -> Result<ChartRequest, ChartRequestError> {
        let version = ChartVersionConstraint::parse(version).map_err(|source| ChartRequestError::InvalidVersion {
            chart: self.chart.to_string(),
            source,
        })?;

        Ok(ChartRequest {
            version: Some(version),
            ..self
        })
    }

    pub fn with_repository(self, repository: &str) -> Result<ChartRequest, ChartRequestError> {
        Ok(ChartRequest {
            repository: Some(repository.parse()?),
            ..self
        })
    }

    pub fn release_name(&self) -> &str {
        &self.release_name
    }

    pub fn chart(&self) -> &str {
        &self.chart
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn version(&self) -> Option<&ChartVersionConstraint> {
        self.version.as_ref()
    }

    pub fn repository(&self) -> Option<&ChartRepository> {
        self.repository.as_ref()
    }

    pub fn values(&self) -> &ChartValues {
        &self.values
    }

    /// `Some` only when both a version and a repository serving an index are set.
    pub fn freshness_target(&self) -> Option<FreshnessTarget<'_>> {
        let repository = self.repository.as_ref().filter(|r| r.serves_index())?;

        Some(FreshnessTarget {
            chart: &self.chart,
            constraint: self.version.as_ref()?,
            repository: repository.url(),
        })
    }
}

fn validate_release_name(release_name: &str) -> Result<(), ChartRequestError> {
    let invalid = |msg: &str| ChartRequestError::InvalidReleaseName {
        release_name: release_name.to_string(),
        msg: msg.to_string(),
    };

    if release_name.is_empty() {
        return Err(invalid("release name can't be empty"));
    }
    if release_name.len() > RELEASE_NAME_MAX_LENGTH {
        return Err(invalid("release name is limited to 53 characters"));
    }
    if !RELEASE_NAME_REGEX.is_match(release_name) {
        return Err(invalid(
            "only lowercase alphanumeric characters, `-` and `.` are allowed, starting and ending with an alphanumeric character",
        ));
    }

    Ok(())
}

fn validate_namespace(namespace: &str) -> Result<(), ChartRequestError> {
    let invalid = |msg: &str| ChartRequestError::InvalidNamespace {
        namespace: namespace.to_string(),
        msg: msg.to_string(),
    };

    if namespace.is_empty() {
        return Err(invalid("namespace can't be empty"));
    }
    if namespace.len() > NAMESPACE_MAX_LENGTH {
        return Err(invalid("namespace is limited to 63 characters"));
    }
    if !NAMESPACE_REGEX.is_match(namespace) {
        return Err(invalid(
            "only lowercase alphanumeric characters and `-` are allowed, starting and ending with an alphanumeric character",
        ));
    }

    Ok(())
}
