use crate::io_models::models::{KubernetesCpuResourceUnit, KubernetesMemoryResourceUnit};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_yaml::{Mapping, Value};
use thiserror::Error;

pub mod grafana_chart;
pub mod kube_prometheus_stack_chart;
pub mod loki_chart;
pub mod nginx_ingress_chart;
pub mod promtail_chart;

use grafana_chart::GrafanaValues;
use kube_prometheus_stack_chart::KubePrometheusStackValues;
use loki_chart::LokiValues;
use nginx_ingress_chart::IngressNginxValues;
use promtail_chart::PromtailValues;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChartValuesError {
    #[error("values of chart `{chart}` can't be read: {msg}")]
    Deserialize { chart: String, msg: String },

    #[error("invalid values for chart `{chart}`, `{field}`: {msg}")]
    InvalidValue { chart: String, field: String, msg: String },

    #[error("values are meant for chart `{values_chart}` while chart `{chart}` is requested")]
    ChartMismatch { chart: String, values_chart: String },

    #[error("values of chart `{chart}` can't be rendered: {msg}")]
    Serialize { chart: String, msg: String },
}

impl ChartValuesError {
    pub(crate) fn invalid_value(chart: String, field: &str, msg: impl Into<String>) -> ChartValuesError {
        ChartValuesError::InvalidValue {
            chart,
            field: field.to_string(),
            msg: msg.into(),
        }
    }
}

/// Typed values of a chart the platform knows the schema of.
pub trait ChartValuesSchema: Serialize + DeserializeOwned {
    fn chart_name() -> String;

    /// Checks what types alone can't express.
    fn validate(&self) -> Result<(), ChartValuesError>;
}

/// Values handed to a chart release.
///
/// Known charts get a typed, validated structure. Keys these structures don't model are kept
/// as is and rendered back, so nothing written by operators is lost.
#[derive(Clone, Debug, PartialEq)]
pub enum ChartValues {
    KubePrometheusStack(KubePrometheusStackValues),
    Grafana(GrafanaValues),
    Loki(LokiValues),
    Promtail(PromtailValues),
    IngressNginx(IngressNginxValues),
    /// Any chart without a known schema.
    Custom { chart: String, values: Mapping },
}

impl ChartValues {
    /// Picks the schema from the chart name, unknown charts end up as `Custom`.
    pub fn from_mapping(chart: &str, values: Mapping) -> Result<ChartValues, ChartValuesError> {
        let chart_values = match chart {
            c if c == KubePrometheusStackValues::chart_name() => ChartValues::KubePrometheusStack(typed(values)?),
            c if c == GrafanaValues::chart_name() => ChartValues::Grafana(typed(values)?),
            c if c == LokiValues::chart_name() => ChartValues::Loki(typed(values)?),
            c if c == PromtailValues::chart_name() => ChartValues::Promtail(typed(values)?),
            c if c == IngressNginxValues::chart_name() => ChartValues::IngressNginx(typed(values)?),
            _ => ChartValues::Custom {
                chart: chart.to_string(),
                values,
            },
        };

        chart_values.validate()?;
        Ok(chart_values)
    }

    /// Platform values of a known chart, an empty `Custom` otherwise.
    pub fn defaults(chart: &str) -> ChartValues {
        match chart {
            c if c == KubePrometheusStackValues::chart_name() => {
                ChartValues::KubePrometheusStack(KubePrometheusStackValues::default())
            }
            c if c == GrafanaValues::chart_name() => ChartValues::Grafana(GrafanaValues::default()),
            c if c == LokiValues::chart_name() => ChartValues::Loki(LokiValues::default()),
            c if c == PromtailValues::chart_name() => ChartValues::Promtail(PromtailValues::default()),
            c if c == IngressNginxValues::chart_name() => ChartValues::IngressNginx(IngressNginxValues::default()),
            _ => ChartValues::custom(chart, Mapping::new()),
        }
    }

    pub fn custom(chart: &str, values: Mapping) -> ChartValues {
        ChartValues::Custom {
            chart: chart.to_string(),
            values,
        }
    }

    pub fn chart_name(&self) -> String {
        match self {
            ChartValues::KubePrometheusStack(_) => KubePrometheusStackValues::chart_name(),
            ChartValues::Grafana(_) => GrafanaValues::chart_name(),
            ChartValues::Loki(_) => LokiValues::chart_name(),
            ChartValues::Promtail(_) => PromtailValues::chart_name(),
            ChartValues::IngressNginx(_) => IngressNginxValues::chart_name(),
            ChartValues::Custom { chart, .. } => chart.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ChartValuesError> {
        match self {
            ChartValues::KubePrometheusStack(v) => v.validate(),
            ChartValues::Grafana(v) => v.validate(),
            ChartValues::Loki(v) => v.validate(),
            ChartValues::Promtail(v) => v.validate(),
            ChartValues::IngressNginx(v) => v.validate(),
            ChartValues::Custom { .. } => Ok(()),
        }
    }

    /// Renders the values file given to the chart.
    pub fn to_yaml(&self) -> Result<String, ChartValuesError> {
        serde_yaml::to_string(self).map_err(|e| ChartValuesError::Serialize {
            chart: self.chart_name(),
            msg: e.to_string(),
        })
    }
}

impl Serialize for ChartValues {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ChartValues::KubePrometheusStack(v) => v.serialize(serializer),
            ChartValues::Grafana(v) => v.serialize(serializer),
            ChartValues::Loki(v) => v.serialize(serializer),
            ChartValues::Promtail(v) => v.serialize(serializer),
            ChartValues::IngressNginx(v) => v.serialize(serializer),
            ChartValues::Custom { values, .. } => values.serialize(serializer),
        }
    }
}

impl From<KubePrometheusStackValues> for ChartValues {
    fn from(values: KubePrometheusStackValues) -> Self {
        ChartValues::KubePrometheusStack(values)
    }
}

impl From<GrafanaValues> for ChartValues {
    fn from(values: GrafanaValues) -> Self {
        ChartValues::Grafana(values)
    }
}

impl From<LokiValues> for ChartValues {
    fn from(values: LokiValues) -> Self {
        ChartValues::Loki(values)
    }
}

impl From<PromtailValues> for ChartValues {
    fn from(values: PromtailValues) -> Self {
        ChartValues::Promtail(values)
    }
}

impl From<IngressNginxValues> for ChartValues {
    fn from(values: IngressNginxValues) -> Self {
        ChartValues::IngressNginx(values)
    }
}

fn typed<T: ChartValuesSchema>(values: Mapping) -> Result<T, ChartValuesError> {
    serde_yaml::from_value(Value::Mapping(values)).map_err(|e| ChartValuesError::Deserialize {
        chart: T::chart_name(),
        msg: e.to_string(),
    })
}

/// `enabled` flag most charts components carry.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Toggle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl Toggle {
    pub fn enabled(enabled: bool) -> Toggle {
        Toggle {
            enabled: Some(enabled),
            ..Default::default()
        }
    }
}

/// Represents container resources such as:
/// resources:
//   limits:
//     cpu: [cpu]
//     memory: [memory]
//   requests:
//     cpu: [cpu]
//     memory: [memory]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ContainerResources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceQuantities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceQuantities>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ResourceQuantities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<KubernetesCpuResourceUnit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<KubernetesMemoryResourceUnit>,
    /// `ephemeral-storage`, extended resources...
    #[serde(flatten)]
    pub extra: Mapping,
}

impl ContainerResources {
    /// Requests can't be higher than limits.
    pub fn validate(&self, chart: String, field: &str) -> Result<(), ChartValuesError> {
        let (Some(limits), Some(requests)) = (&self.limits, &self.requests) else {
            return Ok(());
        };

        if let (Some(limit), Some(request)) = (&limits.cpu, &requests.cpu) {
            if request.as_milli_cpu() > limit.as_milli_cpu() {
                return Err(ChartValuesError::invalid_value(
                    chart,
                    &format!("{field}.requests.cpu"),
                    format!("request `{request}` is higher than limit `{limit}`"),
                ));
            }
        }

        if let (Some(limit), Some(request)) = (&limits.memory, &requests.memory) {
            if request.as_bytes() > limit.as_bytes() {
                return Err(ChartValuesError::invalid_value(
                    chart,
                    &format!("{field}.requests.memory"),
                    format!("request `{request}` is higher than limit `{limit}`"),
                ));
            }
        }

        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMonitorValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub extra: Mapping,
}
