use crate::helm::{ChartRequest, ChartRequestError};
use crate::infrastructure::helm_charts::ChartValues;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("cannot read release manifest `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("cannot parse release manifest: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("release `{0}` is declared more than once")]
    DuplicateRelease(String),

    #[error("release `{release_name}` is invalid: {source}")]
    InvalidRelease {
        release_name: String,
        source: ChartRequestError,
    },
}

/// Releases to declare, as written by operators.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReleaseManifest {
    #[serde(default)]
    pub releases: Vec<Release>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Release {
    pub name: String,
    pub chart: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Missing values means the platform defaults of the chart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Mapping>,
}

impl ReleaseManifest {
    pub fn from_yaml(content: &str) -> Result<ReleaseManifest, ManifestError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<ReleaseManifest, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml(&content)
    }

    /// Validates every release, keeping the manifest order.
    pub fn to_chart_requests(&self) -> Result<Vec<ChartRequest>, ManifestError> {
        let mut seen = HashSet::with_capacity(self.releases.len());
        let mut requests = Vec::with_capacity(self.releases.len());

        for release in &self.releases {
            if !seen.insert(release.name.as_str()) {
                return Err(ManifestError::DuplicateRelease(release.name.to_string()));
            }

            let request = release
                .to_chart_request()
                .map_err(|source| ManifestError::InvalidRelease {
                    release_name: release.name.to_string(),
                    source,
                })?;
            requests.push(request);
        }

        Ok(requests)
    }
}

impl Release {
    pub fn to_chart_request(&self) -> Result<ChartRequest, ChartRequestError> {
        let chart = self.chart.trim();
        let values = match &self.values {
            Some(values) => ChartValues::from_mapping(chart, values.clone())?,
            None => ChartValues::defaults(chart),
        };

        let mut request = ChartRequest::new(&self.name, chart, &self.namespace, values)?;
        if let Some(version) = &self.version {
            request = request.with_version(version)?;
        }
        if let Some(repository) = &self.repository {
            request = request.with_repository(repository)?;
        }

        Ok(request)
    }
}
