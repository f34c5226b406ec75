use crate::infrastructure::helm_charts::{ChartValuesError, ChartValuesSchema, ServiceMonitorValues};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

static INGRESS_CLASS_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("ingress class name regex is valid")
});

static CONTROLLER_VALUE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9.]*[a-z0-9])?/[a-zA-Z0-9]([-a-zA-Z0-9_.]*[a-zA-Z0-9])?$")
        .expect("ingress controller value regex is valid")
});

/// NGINX ingress controller values
/// Doc https://github.com/kubernetes/ingress-nginx/tree/main/charts/ingress-nginx
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct IngressNginxValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<ControllerValues>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ControllerKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_class_resource: Option<IngressClassResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ControllerService>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ControllerMetrics>,
    /// Entries of the controller config map.
    /// https://kubernetes.github.io/ingress-nginx/user-guide/nginx-configuration/configmap/
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Mapping>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerKind {
    DaemonSet,
    Deployment,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressClassResource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_value: Option<String>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ControllerService {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceType {
    ClusterIP,
    LoadBalancer,
    NodePort,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_monitor: Option<ServiceMonitorValues>,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl IngressNginxValues {
    /// Controller serving `ingress_class`, its controller value being `<domain>/<ingress_class>`.
    pub fn for_ingress_class(ingress_class: &str, controller_domain: &str) -> IngressNginxValues {
        let mut values = IngressNginxValues::default();
        if let Some(controller) = values.controller.as_mut() {
            controller.ingress_class_resource = Some(IngressClassResource {
                name: Some(ingress_class.to_string()),
                controller_value: Some(format!("{controller_domain}/{ingress_class}")),
                extra: Mapping::new(),
            });
        }
        values
    }
}

impl ChartValuesSchema for IngressNginxValues {
    fn chart_name() -> String {
        "ingress-nginx".to_string()
    }

    fn validate(&self) -> Result<(), ChartValuesError> {
        let Some(controller) = &self.controller else {
            return Ok(());
        };

        if let Some(class) = &controller.ingress_class_resource {
            if let Some(name) = &class.name {
                if name.len() > 253 || !INGRESS_CLASS_NAME_REGEX.is_match(name) {
                    return Err(ChartValuesError::invalid_value(
                        Self::chart_name(),
                        "controller.ingressClassResource.name",
                        format!("`{name}` is not a valid ingress class name"),
                    ));
                }
            }

            if let Some(controller_value) = &class.controller_value {
                if !CONTROLLER_VALUE_REGEX.is_match(controller_value) {
                    return Err(ChartValuesError::invalid_value(
                        Self::chart_name(),
                        "controller.ingressClassResource.controllerValue",
                        format!("`{controller_value}` should look like `<domain>/<name>`"),
                    ));
                }
            }
        }

        // config map data only holds strings, helm quotes scalars but can't flatten structures
        if let Some(config) = &controller.config {
            for (key, value) in config {
                if matches!(value, Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_)) {
                    return Err(ChartValuesError::invalid_value(
                        Self::chart_name(),
                        "controller.config",
                        format!("`{}` must be a scalar", key.as_str().unwrap_or("?")),
                    ));
                }
            }
        }

        Ok(())
    }
}

impl Default for IngressNginxValues {
    fn default() -> Self {
        let config = [
            ("hsts", "true"),
            ("ssl-redirect", "true"),
            ("force-ssl-redirect", "true"),
            ("server-tokens", "false"),
            ("http2-max-concurrent-streams", "1000"),
            ("keepalive_requests", "1000000"),
            ("ignore-invalid-headers", "false"),
            ("worker-processes", "6"),
        ]
        .into_iter()
        .map(|(k, v)| (Value::String(k.to_string()), Value::String(v.to_string())))
        .collect::<Mapping>();

        IngressNginxValues {
            controller: Some(ControllerValues {
                kind: Some(ControllerKind::DaemonSet),
                ingress_class_resource: Some(IngressClassResource {
                    name: Some("nginx-internal".to_string()),
                    controller_value: Some("k8s.io/nginx-internal".to_string()),
                    extra: Mapping::new(),
                }),
                service: Some(ControllerService {
                    service_type: Some(ServiceType::ClusterIP),
                    ..Default::default()
                }),
                metrics: Some(ControllerMetrics {
                    enabled: Some(true),
                    service_monitor: Some(ServiceMonitorValues {
                        enabled: Some(true),
                        ..Default::default()
                    }),
                    extra: Mapping::new(),
                }),
                config: Some(config),
                extra: Mapping::new(),
            }),
            extra: Mapping::new(),
        }
    }
}
