//! Chart coordinates and versions passed into hooks
//!
//! Hooks receive the exact chart configuration they depend on at construction
//! time; there is no process-wide configuration store to reach into. Defaults
//! cover the standard charts; an optional YAML file overrides them per field.

use serde::Deserialize;

/// Coordinates of one chart deployment
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChartConfig {
    /// Chart reference, `repository/name`
    pub chart: String,
    /// Release name
    pub release: String,
    /// Target namespace
    pub namespace: String,
    /// Chart version to install
    pub version: String,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            chart: String::new(),
            release: String::new(),
            namespace: "default".to_string(),
            version: String::new(),
        }
    }
}

/// Chart configuration for every built-in hook
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Charts {
    /// Service mesh control plane chart
    #[serde(default = "Charts::default_mesh")]
    pub mesh: ChartConfig,
    /// Ingress controller chart
    #[serde(default = "Charts::default_ingress")]
    pub ingress: ChartConfig,
    /// Cluster autoscaler chart
    #[serde(default = "Charts::default_autoscaler")]
    pub autoscaler: ChartConfig,
}

impl Default for Charts {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Charts {
    fn default_mesh() -> ChartConfig {
        ChartConfig {
            chart: "rigger-stable/istio".to_string(),
            release: "istio".to_string(),
            namespace: "istio-system".to_string(),
            version: "1.1.8".to_string(),
        }
    }

    fn default_ingress() -> ChartConfig {
        ChartConfig {
            chart: "ingress-nginx/ingress-nginx".to_string(),
            release: "ingress".to_string(),
            namespace: "ingress-system".to_string(),
            version: "4.11.3".to_string(),
        }
    }

    fn default_autoscaler() -> ChartConfig {
        ChartConfig {
            chart: "autoscaler/cluster-autoscaler".to_string(),
            release: "autoscaler".to_string(),
            namespace: "kube-system".to_string(),
            version: "9.43.0".to_string(),
        }
    }

    /// Charts with all defaults applied
    pub fn builtin() -> Self {
        Self {
            mesh: Self::default_mesh(),
            ingress: Self::default_ingress(),
            autoscaler: Self::default_autoscaler(),
        }
    }

    /// Parse a charts file, applying defaults for absent sections
    ///
    /// A section that is present but incomplete is rejected here: a
    /// default-filled empty chart reference or release name would otherwise
    /// only surface once helm is invoked with it.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let charts: Self = serde_yaml::from_str(yaml)
            .map_err(|e| crate::Error::config(format!("invalid charts file: {e}")))?;
        charts.validate()?;
        Ok(charts)
    }

    fn validate(&self) -> crate::Result<()> {
        let sections = [
            ("mesh", &self.mesh),
            ("ingress", &self.ingress),
            ("autoscaler", &self.autoscaler),
        ];
        for (section, config) in sections {
            let fields = [
                ("chart", &config.chart),
                ("release", &config.release),
                ("namespace", &config.namespace),
                ("version", &config.version),
            ];
            for (field, value) in fields {
                if value.is_empty() {
                    return Err(crate::Error::config(format!(
                        "charts file section {section} is missing {field}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_charts_pin_versions() {
        let charts = Charts::builtin();
        assert_eq!(charts.mesh.release, "istio");
        assert_eq!(charts.mesh.namespace, "istio-system");
        assert!(!charts.mesh.version.is_empty());
        assert!(!charts.ingress.version.is_empty());
        assert!(!charts.autoscaler.version.is_empty());
    }

    #[test]
    fn charts_file_overrides_only_named_sections() {
        let charts = Charts::from_yaml(
            r#"
mesh:
  chart: internal-mirror/istio
  release: istio
  namespace: istio-system
  version: 1.2.0
"#,
        )
        .expect("valid charts file");

        assert_eq!(charts.mesh.chart, "internal-mirror/istio");
        assert_eq!(charts.mesh.version, "1.2.0");
        // Untouched sections keep their defaults
        assert_eq!(charts.ingress, Charts::default_ingress());
        assert_eq!(charts.autoscaler, Charts::default_autoscaler());
    }

    #[test]
    fn partially_specified_chart_sections_are_rejected() {
        // Only the version given; the chart reference and release would
        // otherwise default to empty strings and reach helm unnoticed
        let err = Charts::from_yaml("mesh:\n  version: 1.2.0\n").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("mesh"));
        assert!(message.contains("chart"));
    }

    #[test]
    fn malformed_charts_file_is_a_config_error() {
        let err = Charts::from_yaml("mesh: [not, a, mapping]").unwrap_err();
        assert!(err.to_string().contains("configuration error"));
    }
}
