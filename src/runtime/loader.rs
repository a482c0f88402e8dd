//! Module loading by logical name.
//!
//! The artifact is found the same way as any other application dependency: by
//! name, in the application's own binary search path (by default, the
//! directory of the running executable).

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::module::{self, EXECUTABLE_EXTENSION, LIBRARY_EXTENSION, Module, ModuleError};

/// Why precompiled views are unavailable. Never escapes the runtime cache.
#[derive(Debug, Error)]
pub enum ArtifactLoadError {
    #[error("module `{name}` not found (searched {})", format_dirs(.searched))]
    NotFound { name: String, searched: Vec<PathBuf> },

    #[error("module `{0}` is unreadable or stale")]
    Invalid(PathBuf, #[source] ModuleError),

    #[error("module `{path}` identifies as `{found}`, expected `{expected}`")]
    IdentityMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("view path `{path}` is claimed by both `{first}` and `{second}`")]
    DuplicatePath {
        path: String,
        first: String,
        second: String,
    },
}

fn format_dirs(dirs: &[PathBuf]) -> String {
    if dirs.is_empty() {
        return "no directories".into();
    }
    dirs.iter()
        .map(|d| format!("`{}`", d.display()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolves logical module names against ordered search directories.
#[derive(Debug, Clone)]
pub struct ModuleLoader {
    search_dirs: Vec<PathBuf>,
}

impl Default for ModuleLoader {
    /// Search the directory of the running executable.
    fn default() -> Self {
        let search_dirs = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(PathBuf::from))
            .into_iter()
            .collect();
        Self { search_dirs }
    }
}

impl ModuleLoader {
    pub fn new(search_dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            search_dirs: search_dirs.into_iter().collect(),
        }
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// First `<dir>/<name>.mod` or `<dir>/<name>.bin` that exists.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        self.search_dirs.iter().find_map(|dir| {
            [LIBRARY_EXTENSION, EXECUTABLE_EXTENSION]
                .iter()
                .map(|ext| dir.join(format!("{name}.{ext}")))
                .find(|path| path.is_file())
        })
    }

    /// Load and verify the module called `name`.
    pub fn load(&self, name: &str) -> Result<Arc<Module>, ArtifactLoadError> {
        let path = self.locate(name).ok_or_else(|| ArtifactLoadError::NotFound {
            name: name.to_owned(),
            searched: self.search_dirs.clone(),
        })?;

        let module = module::read(&path).map_err(|e| ArtifactLoadError::Invalid(path.clone(), e))?;
        if module.name != name {
            return Err(ArtifactLoadError::IdentityMismatch {
                path,
                expected: name.to_owned(),
                found: module.name,
            });
        }
        Ok(Arc::new(module))
    }
}
