use semver::Version;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use url::Url;

pub const INDEX_FILE_NAME: &str = "index.yaml";

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, strum_macros::EnumString, strum_macros::Display, strum_macros::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum CandidateSelection {
    /// Trust publisher order, first matching entry wins.
    #[default]
    IndexOrder,
    /// Highest parsed semantic version wins, whatever the publisher order.
    HighestVersion,
}

/// Chart repository index as published at `<repo>/index.yaml`.
///
/// Only the index layout is strict. A malformed release of some chart never prevents reading
/// the releases of another one.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryIndex {
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub api_version: Option<String>,
    #[serde(default, deserialize_with = "lenient_entries")]
    pub entries: BTreeMap<String, Vec<IndexEntry>>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub generated: Option<String>,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub app_version: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub created: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub digest: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub description: Option<String>,
}

impl IndexEntry {
    /// Parsed semantic version, `None` when missing or not a semantic version.
    pub fn semver(&self) -> Option<Version> {
        let version = self.version.as_deref()?.trim();
        Version::parse(version.strip_prefix('v').unwrap_or(version)).ok()
    }

    /// Only a parseable version carrying a prerelease tag is a prerelease.
    pub fn is_prerelease(&self) -> bool {
        self.semver().map(|version| !version.pre.is_empty()).unwrap_or(false)
    }
}

impl RepositoryIndex {
    pub fn from_yaml(content: &str) -> Result<RepositoryIndex, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn releases(&self, chart: &str) -> &[IndexEntry] {
        self.entries.get(chart).map(Vec::as_slice).unwrap_or_default()
    }

    /// Picks the version a requested constraint is compared against.
    ///
    /// When a prerelease is requested any entry can be the candidate, otherwise only
    /// stable versions are. In index order the first eligible entry is the candidate even
    /// without a parseable version, leaving the latest version unknown.
    pub fn latest_candidate(
        &self,
        chart: &str,
        prerelease_requested: bool,
        selection: CandidateSelection,
    ) -> Option<Version> {
        let releases = self.releases(chart);

        match selection {
            CandidateSelection::IndexOrder if prerelease_requested => releases.first()?.semver(),
            CandidateSelection::IndexOrder => releases.iter().find(|entry| !entry.is_prerelease())?.semver(),
            CandidateSelection::HighestVersion => releases
                .iter()
                .filter_map(IndexEntry::semver)
                .filter(|version| prerelease_requested || version.pre.is_empty())
                .max(),
        }
    }
}

/// `<repository>/index.yaml`, whether the repository url has a trailing slash or not.
pub fn index_url(repository: &Url) -> Result<Url, url::ParseError> {
    let mut base = repository.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    base.join(INDEX_FILE_NAME)
}

// chart repositories are hand written too, `version: 1.0` must not fail the whole index
fn scalar_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_yaml::Value>::deserialize(deserializer)? {
        Some(serde_yaml::Value::String(s)) => Some(s),
        Some(serde_yaml::Value::Number(n)) => Some(n.to_string()),
        Some(serde_yaml::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

// a chart whose releases aren't a list has no release, a release that isn't a mapping has no version
fn lenient_entries<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<IndexEntry>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_yaml::Mapping>::deserialize(deserializer)?.unwrap_or_default();

    Ok(raw
        .into_iter()
        .filter_map(|(chart, releases)| {
            let chart = match chart {
                serde_yaml::Value::String(chart) => chart,
                serde_yaml::Value::Number(chart) => chart.to_string(),
                _ => return None,
            };
            let releases = match releases {
                serde_yaml::Value::Sequence(releases) => releases
                    .into_iter()
                    .map(|release| serde_yaml::from_value(release).unwrap_or_default())
                    .collect(),
                _ => vec![],
            };
            Some((chart, releases))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    const INDEX: &str = r#"
apiVersion: v1
entries:
  kube-prometheus-stack:
    - version: 43.3.1
      appVersion: v0.61.1
      created: "2023-01-10T12:00:00Z"
      digest: abc
      urls:
        - https://charts.example.com/kube-prometheus-stack-43.3.1.tgz
    - version: 43.2.0
  ingress-nginx:
    - version: 4.7.0-beta.1
    - version: 4.6.2
    - version: 4.6.1
  numeric:
    - version: 1.0
  broken:
    - version: not-a-version
    - version: 2.1.0
generated: 2023-01-10T12:00:00Z
"#;

    fn index() -> RepositoryIndex {
        RepositoryIndex::from_yaml(INDEX).expect("cannot parse index")
    }

    #[test]
    fn test_index_parsing() {
        let index = index();

        assert_eq!(index.api_version.as_deref(), Some("v1"));
        assert_eq!(index.releases("kube-prometheus-stack").len(), 2);
        assert_eq!(
            index.releases("kube-prometheus-stack")[0].app_version.as_deref(),
            Some("v0.61.1")
        );
        assert_eq!(index.releases("kube-prometheus-stack")[0].digest.as_deref(), Some("abc"));
        assert!(index.releases("unknown").is_empty());
        // unquoted numbers are kept as written
        assert_eq!(index.releases("numeric")[0].version.as_deref(), Some("1.0"));
        assert_eq!(index.releases("numeric")[0].semver(), None);
    }

    #[test]
    fn test_index_without_entries_is_empty() {
        let index = RepositoryIndex::from_yaml("apiVersion: v1\n").expect("cannot parse index");
        assert!(index.entries.is_empty());
        assert!(RepositoryIndex::from_yaml("entries: [").is_err());
    }

    #[test]
    fn test_latest_candidate() {
        // setup:
        struct TestCase<'a> {
            chart: &'a str,
            prerelease_requested: bool,
            selection: CandidateSelection,
            expected: Option<&'a str>,
        }

        let test_cases = vec![
            TestCase {
                chart: "kube-prometheus-stack",
                prerelease_requested: false,
                selection: CandidateSelection::IndexOrder,
                expected: Some("43.3.1"),
            },
            TestCase {
                chart: "ingress-nginx",
                prerelease_requested: false,
                selection: CandidateSelection::IndexOrder,
                expected: Some("4.6.2"),
            },
            TestCase {
                chart: "ingress-nginx",
                prerelease_requested: true,
                selection: CandidateSelection::IndexOrder,
                expected: Some("4.7.0-beta.1"),
            },
            // the first stable entry is the candidate, even when its version is unusable
            TestCase {
                chart: "broken",
                prerelease_requested: false,
                selection: CandidateSelection::IndexOrder,
                expected: None,
            },
            TestCase {
                chart: "broken",
                prerelease_requested: false,
                selection: CandidateSelection::HighestVersion,
                expected: Some("2.1.0"),
            },
            TestCase {
                chart: "broken",
                prerelease_requested: true,
                selection: CandidateSelection::IndexOrder,
                expected: None,
            },
            TestCase {
                chart: "numeric",
                prerelease_requested: false,
                selection: CandidateSelection::IndexOrder,
                expected: None,
            },
            TestCase {
                chart: "absent",
                prerelease_requested: false,
                selection: CandidateSelection::HighestVersion,
                expected: None,
            },
            TestCase {
                chart: "ingress-nginx",
                prerelease_requested: true,
                selection: CandidateSelection::HighestVersion,
                expected: Some("4.7.0-beta.1"),
            },
            TestCase {
                chart: "broken",
                prerelease_requested: true,
                selection: CandidateSelection::HighestVersion,
                expected: Some("2.1.0"),
            },
        ];

        let index = index();
        for tc in test_cases {
            // execute:
            let candidate = index.latest_candidate(tc.chart, tc.prerelease_requested, tc.selection);

            // verify:
            assert_eq!(
                tc.expected.map(|v| Version::parse(v).expect("invalid test version")),
                candidate,
                "chart: {}, prerelease: {}, selection: {}",
                tc.chart,
                tc.prerelease_requested,
                tc.selection
            );
        }
    }

    #[test]
    fn test_malformed_releases_of_other_charts_are_tolerated() {
        // setup:
        let raw = r#"
apiVersion: v1
entries:
  grafana:
    - version: 6.9.1
      urls: https://charts.example.com/grafana-6.9.1.tgz
      deprecated: maybe
    - version: 6.7.0
  other:
    - version: 1.0.0
      urls: null
      digest: [a, b]
    - just-a-string
  listless: 3
  42:
    - version: 0.1.0
"#;

        // execute:
        let index = RepositoryIndex::from_yaml(raw).expect("odd releases must not fail the index");

        // verify:
        assert_eq!(
            index.latest_candidate("grafana", false, CandidateSelection::IndexOrder),
            Some(Version::new(6, 9, 1))
        );
        assert_eq!(index.releases("other").len(), 2);
        assert_eq!(index.releases("other")[0].semver(), Some(Version::new(1, 0, 0)));
        assert_eq!(index.releases("other")[0].digest, None);
        assert_eq!(index.releases("other")[1], IndexEntry::default());
        assert!(index.releases("listless").is_empty());
        assert_eq!(index.releases("42").len(), 1);
    }

    #[test]
    fn test_stable_candidate_skips_prereleases_only() {
        let index = RepositoryIndex::from_yaml(
            r#"
entries:
  loki:
    - version: 5.9.0-rc.1
    - {}
    - version: 5.8.0
"#,
        )
        .expect("cannot parse index");

        assert_eq!(index.latest_candidate("loki", false, CandidateSelection::IndexOrder), None);
        assert_eq!(
            index.latest_candidate("loki", false, CandidateSelection::HighestVersion),
            Some(Version::new(5, 8, 0))
        );
    }

    #[test]
    fn test_highest_version_ignores_publisher_order() {
        let index = RepositoryIndex::from_yaml(
            r#"
entries:
  loki:
    - version: 5.8.0
    - version: 5.10.0
    - version: 5.9.1
"#,
        )
        .expect("cannot parse index");

        assert_eq!(
            index.latest_candidate("loki", false, CandidateSelection::IndexOrder),
            Some(Version::new(5, 8, 0))
        );
        assert_eq!(
            index.latest_candidate("loki", false, CandidateSelection::HighestVersion),
            Some(Version::new(5, 10, 0))
        );
    }

    #[test]
    fn test_candidate_selection_from_string() {
        for selection in CandidateSelection::iter() {
            assert_eq!(selection.to_string().parse::<CandidateSelection>(), Ok(selection));
        }
        assert_eq!(
            "highest-version".parse::<CandidateSelection>(),
            Ok(CandidateSelection::HighestVersion)
        );
        assert!("newest".parse::<CandidateSelection>().is_err());
    }

    #[test]
    fn test_index_url() {
        for repository in ["https://charts.example.com", "https://charts.example.com/"] {
            let url = index_url(&Url::parse(repository).unwrap()).unwrap();
            assert_eq!(url.as_str(), "https://charts.example.com/index.yaml");
        }

        let url = index_url(&Url::parse("https://example.com/helm/stable").unwrap()).unwrap();
        assert_eq!(url.as_str(), "https://example.com/helm/stable/index.yaml");
    }
}
