use crate::infrastructure::helm_charts::{ChartValuesError, ChartValuesSchema, ServiceMonitorValues};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use url::Url;

pub const DEFAULT_LOKI_PUSH_URL: &str = "http://loki.monitoring:3100/loki/api/v1/push";

/// Promtail values
/// Doc https://github.com/grafana/helm-charts/blob/main/charts/promtail/values.yaml
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromtailValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<PromtailConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_monitor: Option<ServiceMonitorValues>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PromtailConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clients: Option<Vec<PromtailClient>>,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// Loki instance logs are pushed to.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PromtailClient {
    pub url: String,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl PromtailValues {
    pub fn pushing_to(loki_push_url: &str) -> PromtailValues {
        PromtailValues {
            config: Some(PromtailConfig {
                clients: Some(vec![PromtailClient {
                    url: loki_push_url.to_string(),
                    extra: Mapping::new(),
                }]),
                extra: Mapping::new(),
            }),
            ..Default::default()
        }
    }
}

impl ChartValuesSchema for PromtailValues {
    fn chart_name() -> String {
        "promtail".to_string()
    }

    fn validate(&self) -> Result<(), ChartValuesError> {
        let clients = self
            .config
            .as_ref()
            .and_then(|c| c.clients.as_deref())
            .unwrap_or_default();

        if clients.is_empty() {
            return Err(ChartValuesError::invalid_value(
                Self::chart_name(),
                "config.clients",
                "at least one client is needed to push logs",
            ));
        }

        for client in clients {
            Url::parse(&client.url).map_err(|e| {
                ChartValuesError::invalid_value(
                    Self::chart_name(),
                    "config.clients.url",
                    format!("`{}` is not a valid url: {}", client.url, e),
                )
            })?;
        }

        Ok(())
    }
}

impl Default for PromtailValues {
    fn default() -> Self {
        PromtailValues {
            config: Some(PromtailConfig {
                clients: Some(vec![PromtailClient {
                    url: DEFAULT_LOKI_PUSH_URL.to_string(),
                    extra: Mapping::new(),
                }]),
                extra: Mapping::new(),
            }),
            service_monitor: Some(ServiceMonitorValues {
                enabled: Some(true),
                ..Default::default()
            }),
            extra: Mapping::new(),
        }
    }
}
