//! Publish target: `[frameworks.*]`, `[configurations.*]` and the CLI selection.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[frameworks.<id>]` entry.
///
/// # Example
/// ```toml
/// [frameworks.net1]
///
/// [frameworks.desktop1]
/// desktop = true
/// output_name = "Shop.Desktop"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrameworkConfig {
    /// Desktop frameworks always publish self-contained entry modules.
    #[serde(default = "defaults::r#false")]
    pub desktop: bool,

    #[serde(default)]
    pub output_name: Option<String>,
}

/// `[configurations.<name>]` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigurationConfig {
    #[serde(default)]
    pub output_name: Option<String>,
}

/// What is being published: set from the command line, never from the file.
#[derive(Debug, Clone, Educe)]
#[educe(Default)]
pub struct PublishTarget {
    /// Absolute publish folder of the application
    pub publish_dir: PathBuf,
    pub framework: String,
    #[educe(Default = defaults::target::configuration())]
    pub configuration: String,
}

#[cfg(test)]
mod tests {
    use super::super::ProjectConfig;
    use super::*;

    #[test]
    fn test_framework_tables() {
        let config: ProjectConfig = toml::from_str(
            r#"
            [frameworks.net1]

            [frameworks.desktop1]
            desktop = true
            output_name = "Shop.Desktop"

            [configurations.Release]
            output_name = "Shop.Release"
        "#,
        )
        .unwrap();

        assert!(!config.frameworks["net1"].desktop);
        assert!(config.frameworks["desktop1"].desktop);
        assert_eq!(
            config.frameworks["desktop1"].output_name.as_deref(),
            Some("Shop.Desktop")
        );
        assert_eq!(
            config.configurations["Release"].output_name.as_deref(),
            Some("Shop.Release")
        );
    }

    #[test]
    fn test_publish_target_default_configuration() {
        assert_eq!(PublishTarget::default().configuration, "Debug");
    }
}
