use crate::infrastructure::helm_charts::{ChartValuesError, ChartValuesSchema, Toggle};
use crate::io_models::models::KubernetesMemoryResourceUnit;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

// Watchdog and InfoInhibitor always fire, overcommit alerts are expected on batch workloads
const ALERTMANAGER_CONFIG: &str = r#"
global: {}
receivers:
  - name: default
  - name: "null"
route:
  group_by: [cluster]
  group_wait: 30s
  group_interval: 5m
  repeat_interval: 12h
  receiver: default
  routes:
    - matchers: ["alertname = Watchdog"]
      receiver: "null"
    - matchers: ["alertname = KubeCPUOvercommit"]
      receiver: "null"
    - matchers: ["alertname = KubeMemoryOvercommit"]
      receiver: "null"
    - matchers: ["alertname = InfoInhibitor"]
      receiver: "null"
"#;

/// kube-prometheus-stack values
/// Doc https://github.com/prometheus-community/helm-charts/tree/main/charts/kube-prometheus-stack
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubePrometheusStackValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alertmanager: Option<AlertmanagerValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grafana: Option<BundledGrafanaValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kube_scheduler: Option<Toggle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kube_etcd: Option<Toggle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kube_controller_manager: Option<Toggle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prometheus: Option<PrometheusValues>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AlertmanagerValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Raw alertmanager configuration, routes and receivers are free form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// Grafana bundled in the stack, only its datasources and dashboards are usually wanted.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundledGrafanaValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_deploy_datasources: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_deploy_dashboards: Option<bool>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prometheus_spec: Option<PrometheusSpecValues>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusSpecValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_monitor_selector_nil_uses_helm_values: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_monitor_selector_nil_uses_helm_values: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_selector_nil_uses_helm_values: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_spec: Option<StorageSpecValues>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpecValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_claim_template: Option<VolumeClaimTemplate>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct VolumeClaimTemplate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<VolumeClaimSpec>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeClaimSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_modes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<VolumeResources>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct VolumeResources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<StorageRequest>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct StorageRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<KubernetesMemoryResourceUnit>,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl KubePrometheusStackValues {
    /// Requested Prometheus storage, if any.
    pub fn storage_request(&self) -> Option<&KubernetesMemoryResourceUnit> {
        self.prometheus
            .as_ref()?
            .prometheus_spec
            .as_ref()?
            .storage_spec
            .as_ref()?
            .volume_claim_template
            .as_ref()?
            .spec
            .as_ref()?
            .resources
            .as_ref()?
            .requests
            .as_ref()?
            .storage
            .as_ref()
    }
}

impl ChartValuesSchema for KubePrometheusStackValues {
    fn chart_name() -> String {
        "kube-prometheus-stack".to_string()
    }

    fn validate(&self) -> Result<(), ChartValuesError> {
        if let Some(storage) = self.storage_request() {
            if storage.as_bytes() == 0 {
                return Err(ChartValuesError::invalid_value(
                    Self::chart_name(),
                    "prometheus.prometheusSpec.storageSpec.volumeClaimTemplate.spec.resources.requests.storage",
                    "storage request can't be empty",
                ));
            }
        }

        if let Some(config) = self.alertmanager.as_ref().and_then(|a| a.config.as_ref()) {
            if !config.is_mapping() {
                return Err(ChartValuesError::invalid_value(
                    Self::chart_name(),
                    "alertmanager.config",
                    "alertmanager configuration must be a mapping",
                ));
            }
        }

        Ok(())
    }
}

impl Default for KubePrometheusStackValues {
    fn default() -> Self {
        KubePrometheusStackValues {
            alertmanager: Some(AlertmanagerValues {
                enabled: Some(true),
                config: serde_yaml::from_str(ALERTMANAGER_CONFIG).ok(),
                ..Default::default()
            }),
            // grafana isn't deployed by the stack, its datasources and dashboards are
            grafana: Some(BundledGrafanaValues {
                enabled: Some(false),
                force_deploy_datasources: Some(true),
                force_deploy_dashboards: Some(true),
                ..Default::default()
            }),
            // control plane components aren't reachable on managed clusters
            kube_scheduler: Some(Toggle::enabled(false)),
            kube_etcd: Some(Toggle::enabled(false)),
            kube_controller_manager: Some(Toggle::enabled(false)),
            prometheus: Some(PrometheusValues {
                prometheus_spec: Some(PrometheusSpecValues {
                    pod_monitor_selector_nil_uses_helm_values: Some(false),
                    service_monitor_selector_nil_uses_helm_values: Some(false),
                    rule_selector_nil_uses_helm_values: Some(false),
                    storage_spec: Some(StorageSpecValues {
                        volume_claim_template: Some(VolumeClaimTemplate {
                            spec: Some(VolumeClaimSpec {
                                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                                resources: Some(VolumeResources {
                                    requests: Some(StorageRequest {
                                        storage: Some(KubernetesMemoryResourceUnit::GibiByte(20)),
                                        ..Default::default()
                                    }),
                                    ..Default::default()
                                }),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            extra: Mapping::new(),
        }
    }
}
