use crate::infrastructure::helm_charts::{ChartValuesError, ChartValuesSchema, ContainerResources, ResourceQuantities, Toggle};
use crate::io_models::models::{KubernetesCpuResourceUnit, KubernetesMemoryResourceUnit};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

/// Loki values
/// Doc https://github.com/grafana/loki/tree/main/production/helm/loki
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LokiValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loki: Option<LokiConfigValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<Toggle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single_binary: Option<SingleBinaryValues>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LokiConfigValues {
    #[serde(rename = "auth_enabled", skip_serializing_if = "Option::is_none")]
    pub auth_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_config: Option<LokiCommonConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<LokiStorage>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LokiCommonConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication_factor: Option<u32>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LokiStorage {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub storage_type: Option<LokiStorageType>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LokiStorageType {
    Filesystem,
    S3,
    Gcs,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SingleBinaryValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence: Option<LokiPersistence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ContainerResources>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LokiPersistence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<KubernetesMemoryResourceUnit>,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl LokiValues {
    fn replication_factor(&self) -> Option<u32> {
        self.loki.as_ref()?.common_config.as_ref()?.replication_factor
    }

    fn storage_type(&self) -> Option<LokiStorageType> {
        self.loki.as_ref()?.storage.as_ref()?.storage_type
    }
}

impl ChartValuesSchema for LokiValues {
    fn chart_name() -> String {
        "loki".to_string()
    }

    fn validate(&self) -> Result<(), ChartValuesError> {
        let single_binary = self.single_binary.as_ref();

        if let Some(replication_factor) = self.replication_factor() {
            if replication_factor == 0 {
                return Err(ChartValuesError::invalid_value(
                    Self::chart_name(),
                    "loki.commonConfig.replication_factor",
                    "replication factor must be at least 1",
                ));
            }

            if let Some(replicas) = single_binary.and_then(|s| s.replicas) {
                if replication_factor > replicas {
                    return Err(ChartValuesError::invalid_value(
                        Self::chart_name(),
                        "loki.commonConfig.replication_factor",
                        format!("replication factor {replication_factor} is higher than the {replicas} replica(s)"),
                    ));
                }
            }
        }

        // filesystem storage lives in the single binary pod volume
        if self.storage_type() == Some(LokiStorageType::Filesystem) {
            if let Some(replicas) = single_binary.and_then(|s| s.replicas) {
                if replicas > 1 {
                    return Err(ChartValuesError::invalid_value(
                        Self::chart_name(),
                        "singleBinary.replicas",
                        "filesystem storage can't be shared by several replicas",
                    ));
                }
            }
        }

        if let Some(size) = single_binary.and_then(|s| s.persistence.as_ref()).and_then(|p| p.size.as_ref()) {
            if size.as_bytes() == 0 {
                return Err(ChartValuesError::invalid_value(
                    Self::chart_name(),
                    "singleBinary.persistence.size",
                    "persistence size can't be empty",
                ));
            }
        }

        if let Some(resources) = single_binary.and_then(|s| s.resources.as_ref()) {
            resources.validate(Self::chart_name(), "singleBinary.resources")?;
        }

        Ok(())
    }
}

impl Default for LokiValues {
    fn default() -> Self {
        LokiValues {
            loki: Some(LokiConfigValues {
                auth_enabled: Some(false),
                common_config: Some(LokiCommonConfig {
                    replication_factor: Some(1),
                    extra: Mapping::new(),
                }),
                storage: Some(LokiStorage {
                    storage_type: Some(LokiStorageType::Filesystem),
                    extra: Mapping::new(),
                }),
                extra: Mapping::new(),
            }),
            gateway: Some(Toggle::enabled(false)),
            single_binary: Some(SingleBinaryValues {
                replicas: Some(1),
                persistence: Some(LokiPersistence {
                    size: Some(KubernetesMemoryResourceUnit::GibiByte(20)),
                    extra: Mapping::new(),
                }),
                resources: Some(ContainerResources {
                    limits: Some(ResourceQuantities {
                        cpu: None,
                        memory: Some(KubernetesMemoryResourceUnit::MebiByte(350)),
                        extra: Mapping::new(),
                    }),
                    requests: Some(ResourceQuantities {
                        cpu: Some(KubernetesCpuResourceUnit::MilliCpu(100)),
                        memory: Some(KubernetesMemoryResourceUnit::MebiByte(200)),
                        extra: Mapping::new(),
                    }),
                    extra: Mapping::new(),
                }),
                extra: Mapping::new(),
            }),
            extra: Mapping::new(),
        }
    }
}
