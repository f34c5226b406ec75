use std::io::Write;
use tempfile::NamedTempFile;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Chart repository serving `index` once per expected fetch.
pub async fn chart_repository(index: &str, expected_fetches: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(index))
        .expect(expected_fetches)
        .mount(&server)
        .await;

    server
}

pub fn manifest_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("cannot create manifest file");
    file.write_all(content.as_bytes()).expect("cannot write manifest file");
    file
}

pub const GRAFANA_INDEX: &str = r#"
apiVersion: v1
entries:
  grafana:
    - version: 6.50.0
      appVersion: 9.3.6
    - version: 6.48.2
      appVersion: 9.3.1
  loki:
    - version: 5.9.0-rc.1
    - version: 5.8.9
    - version: 5.10.0
"#;
