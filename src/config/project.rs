//! `[project]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[project]` section in project.toml - the published application.
///
/// # Example
/// ```toml
/// [project]
/// name = "shop"
/// output_name = "Shop.Web"
/// portable = false
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectSection {
    /// Application name. Empty means the project directory name.
    #[serde(default)]
    pub name: String,

    /// File stem of the published entry module, if it differs from `name`.
    #[serde(default)]
    pub output_name: Option<String>,

    /// Portable deployments ship a `.mod` library; self-contained ones a `.bin`.
    #[serde(default = "defaults::project::portable")]
    #[educe(Default = defaults::project::portable())]
    pub portable: bool,
}

#[cfg(test)]
mod tests {
    use super::super::ProjectConfig;

    #[test]
    fn test_project_section_full() {
        let config: ProjectConfig = toml::from_str(
            r#"
            [project]
            name = "shop"
            output_name = "Shop.Web"
            portable = false
        "#,
        )
        .unwrap();

        assert_eq!(config.project.name, "shop");
        assert_eq!(config.project.output_name.as_deref(), Some("Shop.Web"));
        assert!(!config.project.portable);
    }

    #[test]
    fn test_project_section_defaults() {
        let config: ProjectConfig = toml::from_str("[project]").unwrap();
        assert!(config.project.name.is_empty());
        assert!(config.project.output_name.is_none());
        assert!(config.project.portable);
    }

    #[test]
    fn test_project_section_unknown_field() {
        let result: Result<ProjectConfig, _> = toml::from_str(
            r#"
            [project]
            nmae = "typo"
        "#,
        );
        assert!(result.is_err());
    }
}
