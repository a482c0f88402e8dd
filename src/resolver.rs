//! Reference resolution against an already-published application.
//!
//! The generated pages reference the application's own types, so compilation
//! needs the application's entry module plus its compile-time dependency
//! closure. Both are read from the publish folder through an explicit
//! [`ModuleDescriptor`]:
//!
//! ```text
//! <publish>/<output_name>.<mod|bin>        entry module
//! <publish>/<output_name>.deps.json        dependency manifest
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use serde::Deserialize;
use thiserror::Error;

use crate::config::ProjectConfig;
use crate::log;
use crate::module::{self, EXECUTABLE_EXTENSION, LIBRARY_EXTENSION, ModuleError};

const MANIFEST_EXTENSION: &str = "deps.json";

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// A module file on disk
    Module(PathBuf),
    /// The built-in module declaring the page capability and `ViewPath`
    Host,
}

/// Ordered, de-duplicated references for one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    references: Vec<Reference>,
}

impl ReferenceSet {
    /// Only the built-in host module, as used for on-demand compilation.
    pub fn host_only() -> Self {
        Self {
            references: vec![Reference::Host],
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Reference> {
        self.references.iter()
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// Paths of all on-disk references.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.references.iter().filter_map(|r| match r {
            Reference::Module(path) => Some(path.as_path()),
            Reference::Host => None,
        })
    }
}

impl FromIterator<Reference> for ReferenceSet {
    fn from_iter<I: IntoIterator<Item = Reference>>(iter: I) -> Self {
        Self {
            references: iter.into_iter().collect(),
        }
    }
}

/// Where the published application's entry module and manifest live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub module: PathBuf,
    pub dependencies: PathBuf,
}

impl ModuleDescriptor {
    /// Derive the descriptor for the configured publish target.
    ///
    /// A portable deployment ships a library module (`.mod`); a self-contained
    /// or desktop one ships an executable module (`.bin`).
    pub fn locate(config: &ProjectConfig) -> Self {
        let publish_dir = &config.target.publish_dir;
        let output_name = config.output_name();
        let extension = if config.is_portable() {
            LIBRARY_EXTENSION
        } else {
            EXECUTABLE_EXTENSION
        };
        Self {
            module: publish_dir.join(format!("{output_name}.{extension}")),
            dependencies: publish_dir.join(format!("{output_name}.{MANIFEST_EXTENSION}")),
        }
    }
}

/// Persisted dependency closure of the published application.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DependencyManifest {
    #[serde(default)]
    pub target: Option<ManifestTarget>,
    #[serde(default)]
    pub libraries: Vec<Library>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestTarget {
    pub framework: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Library {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Compile-time files, relative to the manifest directory
    #[serde(default)]
    pub compile: Vec<PathBuf>,
    #[serde(default)]
    pub runtime: Vec<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("application module `{0}` not found in the publish folder")]
    EntryModuleMissing(PathBuf),

    #[error("application module `{0}` cannot be loaded")]
    EntryModuleInvalid(PathBuf, #[source] ModuleError),

    #[error("cannot read dependency manifest `{0}`")]
    ManifestIo(PathBuf, #[source] std::io::Error),

    #[error("dependency manifest `{0}` is malformed")]
    ManifestInvalid(PathBuf, #[source] serde_json::Error),

    #[error("library `{name}` {version}: compile reference `{path}` does not exist")]
    LibraryUnresolved {
        name: String,
        version: String,
        path: PathBuf,
    },
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the compile references for the generated views.
///
/// Order: entry module, manifest compile paths in declaration order, host
/// module. Paths are de-duplicated case-insensitively, first occurrence kept.
/// A missing manifest degrades to the entry module and host module with a
/// warning; everything else is fatal.
pub fn resolve_references(
    descriptor: &ModuleDescriptor,
    framework: &str,
) -> Result<ReferenceSet, ReferenceError> {
    let entry = &descriptor.module;
    if !entry.is_file() {
        return Err(ReferenceError::EntryModuleMissing(entry.clone()));
    }
    module::read(entry).map_err(|e| ReferenceError::EntryModuleInvalid(entry.clone(), e))?;

    let mut paths = vec![entry.clone()];
    match load_manifest(&descriptor.dependencies)? {
        Some(manifest) => {
            if let Some(target) = &manifest.target
                && target.framework != framework
            {
                log!(
                    "warn";
                    "dependency manifest targets `{}`, building for `{framework}`",
                    target.framework
                );
            }
            let base = descriptor
                .dependencies
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            for library in &manifest.libraries {
                for rel in &library.compile {
                    let path = base.join(rel);
                    if !path.is_file() {
                        return Err(ReferenceError::LibraryUnresolved {
                            name: library.name.clone(),
                            version: library.version.clone(),
                            path,
                        });
                    }
                    paths.push(path);
                }
            }
        }
        None => log!(
            "warn";
            "dependency manifest `{}` not found, compiling against the application module only",
            descriptor.dependencies.display()
        ),
    }

    let mut seen = FxHashSet::default();
    let mut references: Vec<_> = paths
        .into_iter()
        .filter(|path| seen.insert(path.to_string_lossy().to_lowercase()))
        .map(Reference::Module)
        .collect();
    references.push(Reference::Host);

    Ok(ReferenceSet { references })
}

fn load_manifest(path: &Path) -> Result<Option<DependencyManifest>, ReferenceError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ReferenceError::ManifestIo(path.to_path_buf(), e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| ReferenceError::ManifestInvalid(path.to_path_buf(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;
    use tempfile::TempDir;

    fn write_module(path: &Path, name: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        module::write(path, &Module::new(name)).unwrap();
    }

    fn descriptor(dir: &Path) -> ModuleDescriptor {
        ModuleDescriptor {
            module: dir.join("shop.mod"),
            dependencies: dir.join("shop.deps.json"),
        }
    }

    fn module_paths(set: &ReferenceSet, root: &Path) -> Vec<String> {
        set.iter()
            .map(|r| match r {
                Reference::Module(p) => p.strip_prefix(root).unwrap().display().to_string(),
                Reference::Host => "<host>".into(),
            })
            .collect()
    }

    #[test]
    fn test_resolve_with_manifest() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_module(&root.join("shop.mod"), "shop");
        write_module(&root.join("lib/a.mod"), "a");
        write_module(&root.join("lib/b.mod"), "b");
        fs::write(
            root.join("shop.deps.json"),
            r#"{
                "target": { "framework": "net1" },
                "libraries": [
                    { "name": "shop", "version": "1.0", "type": "project", "compile": ["shop.mod"] },
                    { "name": "a", "version": "2.1", "type": "package", "compile": ["lib/a.mod", "lib/A.mod"] },
                    { "name": "b", "version": "0.3", "type": "package", "compile": ["lib/b.mod"], "runtime": ["lib/b.mod"] }
                ]
            }"#,
        )
        .unwrap();

        // `lib/A.mod` only exists on case-insensitive file systems
        if !root.join("lib/A.mod").exists() {
            let manifest = fs::read_to_string(root.join("shop.deps.json")).unwrap();
            fs::write(root.join("shop.deps.json"), manifest.replace(", \"lib/A.mod\"", "")).unwrap();
        }

        let set = resolve_references(&descriptor(root), "net1").unwrap();
        assert_eq!(
            module_paths(&set, root),
            vec!["shop.mod", "lib/a.mod", "lib/b.mod", "<host>"]
        );
        assert_eq!(set.paths().count(), 3);
    }

    #[test]
    fn test_missing_manifest_degrades() {
        let dir = TempDir::new().unwrap();
        write_module(&dir.path().join("shop.mod"), "shop");
        let set = resolve_references(&descriptor(dir.path()), "net1").unwrap();
        assert_eq!(module_paths(&set, dir.path()), vec!["shop.mod", "<host>"]);
    }

    #[test]
    fn test_missing_entry_module_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = resolve_references(&descriptor(dir.path()), "net1").unwrap_err();
        assert!(matches!(err, ReferenceError::EntryModuleMissing(_)));
    }

    #[test]
    fn test_corrupt_entry_module_is_fatal() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("shop.mod"), "garbage").unwrap();
        let err = resolve_references(&descriptor(dir.path()), "net1").unwrap_err();
        assert!(matches!(err, ReferenceError::EntryModuleInvalid(_, ModuleError::BadMagic)));
    }

    #[test]
    fn test_unresolved_library() {
        let dir = TempDir::new().unwrap();
        write_module(&dir.path().join("shop.mod"), "shop");
        fs::write(
            dir.path().join("shop.deps.json"),
            r#"{ "libraries": [ { "name": "gone", "version": "1.0", "compile": ["gone.mod"] } ] }"#,
        )
        .unwrap();
        let err = resolve_references(&descriptor(dir.path()), "net1").unwrap_err();
        assert!(err.to_string().contains("library `gone` 1.0"));
    }

    #[test]
    fn test_malformed_manifest() {
        let dir = TempDir::new().unwrap();
        write_module(&dir.path().join("shop.mod"), "shop");
        fs::write(dir.path().join("shop.deps.json"), "{ not json").unwrap();
        let err = resolve_references(&descriptor(dir.path()), "net1").unwrap_err();
        assert!(matches!(err, ReferenceError::ManifestInvalid(..)));
    }
}
