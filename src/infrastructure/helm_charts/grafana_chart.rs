use crate::infrastructure::helm_charts::{ChartValuesError, ChartValuesSchema, Toggle};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

/// Grafana values
/// Doc https://github.com/grafana/helm-charts/tree/main/charts/grafana
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress: Option<GrafanaIngressValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidecar: Option<GrafanaSidecarValues>,
    #[serde(rename = "grafana.ini", skip_serializing_if = "Option::is_none")]
    pub grafana_ini: Option<Mapping>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaIngressValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosts: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// Sidecars loading dashboards, datasources and notifiers from labelled config maps.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct GrafanaSidecarValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboards: Option<Toggle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datasources: Option<Toggle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifiers: Option<Toggle>,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl ChartValuesSchema for GrafanaValues {
    fn chart_name() -> String {
        "grafana".to_string()
    }

    fn validate(&self) -> Result<(), ChartValuesError> {
        if let Some(admin_user) = &self.admin_user {
            if admin_user.trim().is_empty() {
                return Err(ChartValuesError::invalid_value(
                    Self::chart_name(),
                    "adminUser",
                    "admin user can't be empty",
                ));
            }
        }

        let Some(ingress) = &self.ingress else {
            return Ok(());
        };
        if ingress.enabled != Some(true) {
            return Ok(());
        }

        match &ingress.ingress_class_name {
            Some(class) if !class.trim().is_empty() => {}
            _ => {
                return Err(ChartValuesError::invalid_value(
                    Self::chart_name(),
                    "ingress.ingressClassName",
                    "an enabled ingress needs an ingress class",
                ));
            }
        }

        let hosts = ingress.hosts.as_deref().unwrap_or_default();
        if hosts.is_empty() {
            return Err(ChartValuesError::invalid_value(
                Self::chart_name(),
                "ingress.hosts",
                "an enabled ingress needs at least one host",
            ));
        }
        if let Some(host) = hosts.iter().find(|h| h.trim().is_empty() || h.contains("://")) {
            return Err(ChartValuesError::invalid_value(
                Self::chart_name(),
                "ingress.hosts",
                format!("`{host}` is not a host name"),
            ));
        }

        Ok(())
    }
}

impl Default for GrafanaValues {
    fn default() -> Self {
        let mut users = Mapping::new();
        users.insert(
            Value::String("auto_assign_org_role".to_string()),
            Value::String("Editor".to_string()),
        );
        let mut grafana_ini = Mapping::new();
        grafana_ini.insert(Value::String("users".to_string()), Value::Mapping(users));

        GrafanaValues {
            admin_user: None,
            admin_password: None,
            // hosts are environment specific, the ingress is only enabled once they are known
            ingress: Some(GrafanaIngressValues {
                enabled: Some(false),
                ingress_class_name: Some("nginx-internal".to_string()),
                hosts: None,
                extra: Mapping::new(),
            }),
            sidecar: Some(GrafanaSidecarValues {
                dashboards: Some(Toggle::enabled(true)),
                datasources: Some(Toggle::enabled(true)),
                notifiers: Some(Toggle::enabled(true)),
                extra: Mapping::new(),
            }),
            grafana_ini: Some(grafana_ini),
            extra: Mapping::new(),
        }
    }
}
