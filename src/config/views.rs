//! `[views]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[views]` section in project.toml - template discovery and output.
///
/// # Example
/// ```toml
/// [views]
/// pattern = "Views/**/*.tpl"
/// exclude = ["Views/Drafts/**"]
/// debug_info = false
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ViewsConfig {
    /// Glob over project-relative paths selecting template files.
    #[serde(default = "defaults::views::pattern")]
    #[educe(Default = defaults::views::pattern())]
    pub pattern: String,

    /// Globs of project-relative paths to skip.
    #[serde(default = "defaults::views::exclude")]
    #[educe(Default = defaults::views::exclude())]
    pub exclude: Vec<String>,

    /// Write `precompiledviews.debug.json` next to the artifact.
    #[serde(default = "defaults::views::debug_info")]
    #[educe(Default = defaults::views::debug_info())]
    pub debug_info: bool,
}

#[cfg(test)]
mod tests {
    use super::super::ProjectConfig;

    #[test]
    fn test_views_config_defaults() {
        let config: ProjectConfig = toml::from_str("").unwrap();
        assert_eq!(config.views.pattern, "**/*.tpl");
        assert!(config.views.exclude.contains(&"target/**".to_string()));
        assert!(config.views.debug_info);
    }

    #[test]
    fn test_views_config_custom() {
        let config: ProjectConfig = toml::from_str(
            r#"
            [views]
            pattern = "Views/**/*.tpl"
            exclude = []
            debug_info = false
        "#,
        )
        .unwrap();
        assert_eq!(config.views.pattern, "Views/**/*.tpl");
        assert!(config.views.exclude.is_empty());
        assert!(!config.views.debug_info);
    }
}
