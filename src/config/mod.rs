//! Project configuration for `project.toml`.
//!
//! # Sections
//!
//! | Section                   | Purpose                                       |
//! |---------------------------|-----------------------------------------------|
//! | `[project]`               | Application name, output name, portability    |
//! | `[views]`                 | Template glob, excludes, debug info           |
//! | `[frameworks.<id>]`       | Per-framework output name, desktop flag       |
//! | `[configurations.<name>]` | Per-configuration output name                 |
//!
//! The publish folder, framework and configuration come from the command line
//! and are stored in [`ProjectConfig::target`].
//!
//! # Example
//!
//! ```toml
//! [project]
//! name = "shop"
//!
//! [views]
//! pattern = "Views/**/*.tpl"
//!
//! [frameworks.net1]
//! ```

pub mod defaults;
mod error;
mod project;
mod target;
mod views;

pub use error::ConfigError;
pub use project::ProjectSection;
pub use target::{ConfigurationConfig, FrameworkConfig, PublishTarget};
pub use views::ViewsConfig;

use crate::cli::Cli;
use anyhow::{Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

/// Name of the project descriptor file.
pub const CONFIG_FILE: &str = "project.toml";

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing project.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Absolute path to the config file (set after loading, may not exist)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Absolute project directory; templates are discovered below it
    #[serde(skip)]
    pub root: PathBuf,

    /// Publish target selected on the command line
    #[serde(skip)]
    pub target: PublishTarget,

    #[serde(default)]
    pub project: ProjectSection,

    #[serde(default)]
    pub views: ViewsConfig,

    #[serde(default)]
    pub frameworks: BTreeMap<String, FrameworkConfig>,

    #[serde(default)]
    pub configurations: BTreeMap<String, ConfigurationConfig>,
}

impl ProjectConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: ProjectConfig = toml::from_str(content).map_err(ConfigError::Toml)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Load the project at `project`: a directory, or a `project.toml` inside one.
    ///
    /// `None` or an empty path means the current directory. A missing
    /// descriptor yields defaults named after the directory.
    pub fn load(project: Option<&Path>) -> Result<Self> {
        let root = Self::project_root(project)?;
        let config_path = root.join(CONFIG_FILE);

        let mut config = if config_path.is_file() {
            Self::from_path(&config_path)?
        } else {
            Self::default()
        };

        config.root = root;
        config.config_path = config_path;
        if config.project.name.is_empty() {
            config.project.name = config
                .root
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        Ok(config)
    }

    /// Resolve the project directory from the positional argument.
    fn project_root(project: Option<&Path>) -> Result<PathBuf> {
        let raw = project
            .map(|p| p.to_string_lossy().into_owned())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| ".".into());
        let path = PathBuf::from(shellexpand::tilde(&raw).into_owned());

        if !path.exists() {
            bail!(ConfigError::ProjectMissing(path));
        }
        let dir = if path.is_file() {
            path.parent().map(Path::to_path_buf).unwrap_or_default()
        } else {
            path
        };
        Ok(Self::normalize_path(&dir))
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        self.set_target(PublishTarget {
            publish_dir: cli.publish_folder.clone().unwrap_or_default(),
            framework: cli.framework.clone().unwrap_or_default(),
            configuration: cli.configuration.clone(),
        });
    }

    /// Set the publish target, normalizing the publish folder to absolute.
    pub fn set_target(&mut self, target: PublishTarget) {
        self.target = PublishTarget {
            publish_dir: Self::normalize_path(&target.publish_dir),
            ..target
        };
    }

    /// File stem of the published entry module.
    ///
    /// Precedence: configuration, framework, project `output_name`, project name.
    pub fn output_name(&self) -> &str {
        self.configurations
            .get(&self.target.configuration)
            .and_then(|c| c.output_name.as_deref())
            .or_else(|| {
                self.frameworks
                    .get(&self.target.framework)
                    .and_then(|f| f.output_name.as_deref())
            })
            .or(self.project.output_name.as_deref())
            .unwrap_or(&self.project.name)
    }

    /// Whether the entry module is a portable library rather than self-contained.
    pub fn is_portable(&self) -> bool {
        let desktop = self
            .frameworks
            .get(&self.target.framework)
            .is_some_and(|f| f.desktop);
        self.project.portable && !desktop
    }

    /// Directories discovery must not descend into.
    ///
    /// The publish folder is skipped when it lies inside the project, so a
    /// previous publish never contributes templates.
    pub fn skip_dirs(&self) -> Vec<PathBuf> {
        let publish_dir = &self.target.publish_dir;
        if publish_dir != &self.root && publish_dir.starts_with(&self.root) {
            vec![publish_dir.clone()]
        } else {
            Vec::new()
        }
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            // For non-existent paths, manually make them absolute
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate configuration against the selected publish target
    pub fn validate(&self) -> Result<()> {
        if self.views.pattern.trim().is_empty() {
            bail!(ConfigError::Validation(
                "[views.pattern] must not be empty".into()
            ));
        }

        if self.target.framework.is_empty() {
            bail!(ConfigError::Validation("a target framework is required".into()));
        }

        if !self.frameworks.is_empty() && !self.frameworks.contains_key(&self.target.framework) {
            let declared: Vec<_> = self.frameworks.keys().map(String::as_str).collect();
            bail!(ConfigError::Validation(format!(
                "framework `{}` is not declared in [frameworks] (declared: {})",
                self.target.framework,
                declared.join(", ")
            )));
        }

        if self.output_name().is_empty() {
            bail!(ConfigError::Validation(
                "cannot derive an output name; set [project.name]".into()
            ));
        }

        if !self.target.publish_dir.is_dir() {
            bail!(ConfigError::Validation(format!(
                "publish folder `{}` does not exist",
                self.target.publish_dir.display()
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn target(publish_dir: &Path, framework: &str, configuration: &str) -> PublishTarget {
        PublishTarget {
            publish_dir: publish_dir.to_path_buf(),
            framework: framework.into(),
            configuration: configuration.into(),
        }
    }

    #[test]
    fn test_load_without_descriptor_uses_dir_name() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("shop");
        fs::create_dir(&root).unwrap();

        let config = ProjectConfig::load(Some(&root)).unwrap();
        assert_eq!(config.project.name, "shop");
        assert_eq!(config.root, root.canonicalize().unwrap());
        assert_eq!(config.config_path, config.root.join(CONFIG_FILE));
        assert_eq!(config.views.pattern, "**/*.tpl");
    }

    #[test]
    fn test_load_from_descriptor_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[project]\nname = \"store\"\n").unwrap();

        let config = ProjectConfig::load(Some(&path)).unwrap();
        assert_eq!(config.project.name, "store");
        assert_eq!(config.root, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_load_missing_project() {
        let dir = TempDir::new().unwrap();
        let err = ProjectConfig::load(Some(&dir.path().join("nope"))).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ProjectMissing(_))
        ));
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[views\n").unwrap();
        let err = ProjectConfig::load(Some(dir.path())).unwrap_err();
        assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::Toml(_))));
    }

    #[test]
    fn test_output_name_precedence() {
        let mut config = ProjectConfig::from_str(
            r#"
            [project]
            name = "shop"
            output_name = "Shop.Web"

            [frameworks.net1]
            output_name = "Shop.Net"

            [frameworks.net2]

            [configurations.Release]
            output_name = "Shop.Release"
        "#,
        )
        .unwrap();

        config.set_target(target(Path::new("/tmp"), "net1", "Release"));
        assert_eq!(config.output_name(), "Shop.Release");
        config.set_target(target(Path::new("/tmp"), "net1", "Debug"));
        assert_eq!(config.output_name(), "Shop.Net");
        config.set_target(target(Path::new("/tmp"), "net2", "Debug"));
        assert_eq!(config.output_name(), "Shop.Web");
        config.project.output_name = None;
        assert_eq!(config.output_name(), "shop");
    }

    #[test]
    fn test_is_portable() {
        let mut config = ProjectConfig::from_str(
            r#"
            [frameworks.net1]
            [frameworks.desktop1]
            desktop = true
        "#,
        )
        .unwrap();
        config.set_target(target(Path::new("/tmp"), "net1", "Debug"));
        assert!(config.is_portable());
        config.set_target(target(Path::new("/tmp"), "desktop1", "Debug"));
        assert!(!config.is_portable());
        config.set_target(target(Path::new("/tmp"), "net1", "Debug"));
        config.project.portable = false;
        assert!(!config.is_portable());
    }

    #[test]
    fn test_validate_framework_must_be_declared() {
        let dir = TempDir::new().unwrap();
        let mut config = ProjectConfig::from_str("[project]\nname = \"shop\"\n[frameworks.net1]\n").unwrap();
        config.set_target(target(dir.path(), "net9", "Debug"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("framework `net9` is not declared"));

        config.set_target(target(dir.path(), "net1", "Debug"));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_empty_pattern_and_missing_publish_dir() {
        let dir = TempDir::new().unwrap();
        let mut config = ProjectConfig::from_str("[project]\nname = \"shop\"\n[views]\npattern = \"\"\n").unwrap();
        config.set_target(target(dir.path(), "net1", "Debug"));
        assert!(config.validate().unwrap_err().to_string().contains("[views.pattern]"));

        config.views.pattern = "**/*.tpl".into();
        config.set_target(target(&dir.path().join("missing"), "net1", "Debug"));
        assert!(config.validate().unwrap_err().to_string().contains("publish folder"));
    }

    #[test]
    fn test_skip_dirs_only_inside_root() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("bin/publish")).unwrap();
        let mut config = ProjectConfig::load(Some(dir.path())).unwrap();

        config.set_target(target(&dir.path().join("bin/publish"), "net1", "Debug"));
        assert_eq!(config.skip_dirs(), vec![config.root.join("bin/publish")]);

        let outside = TempDir::new().unwrap();
        config.set_target(target(outside.path(), "net1", "Debug"));
        assert!(config.skip_dirs().is_empty());
    }
}
