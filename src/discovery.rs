//! Template discovery.
//!
//! Walks the project root and returns every file whose root-relative path
//! matches the configured glob. The relative path (forward slashes, case
//! preserved) is the identity of a view from here on: it becomes the class
//! name, the path tag and, through [`lookup_key`], the runtime index key.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use gix::glob::wildmatch;
use thiserror::Error;
use walkdir::WalkDir;

/// Files to ignore during directory traversal
const IGNORED_FILES: &[&str] = &[".DS_Store"];

/// A template source file found under the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFile {
    /// Root-relative path with `/` separators, case preserved
    pub relative_path: String,
    pub absolute_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("project root `{0}` does not exist or is not a directory")]
    RootMissing(PathBuf),

    #[error("cannot read `{0}`")]
    Io(PathBuf, #[source] walkdir::Error),

    #[error("template path `{0}` is not valid UTF-8")]
    NonUtf8Path(PathBuf),

    #[error("{} template path(s) collide when compared case-insensitively:\n{}", .0.len(), format_collisions(.0))]
    DuplicatePaths(Vec<Vec<String>>),
}

fn format_collisions(groups: &[Vec<String>]) -> String {
    groups
        .iter()
        .map(|group| format!("  {}", group.join(" <-> ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Normalize a view path into the key used for runtime lookups.
///
/// Backslashes become `/`, a leading `~/` or `/` is dropped and ASCII letters
/// are lowercased, so `/Home/Index.tpl`, `~/home/index.tpl` and
/// `Home\Index.tpl` all resolve to the same view.
pub fn lookup_key(path: &str) -> String {
    let path = path.replace('\\', "/");
    let trimmed = path.strip_prefix("~/").unwrap_or(&path);
    trimmed.trim_start_matches('/').to_ascii_lowercase()
}

/// Check a relative path against a glob (`**` crosses directories, `*` does not).
pub fn matches_glob(pattern: &str, relative_path: &str) -> bool {
    wildmatch(
        pattern.into(),
        relative_path.into(),
        wildmatch::Mode::NO_MATCH_SLASH_LITERAL,
    )
}

/// Discover all templates under `root` matching `pattern`.
///
/// Paths matching any of `exclude` (globs over the relative path) and files
/// inside `skip_dirs` are left out. The result is sorted by relative path so
/// that compilation output is reproducible. An empty result is not an error.
pub fn discover(
    root: &Path,
    pattern: &str,
    exclude: &[String],
    skip_dirs: &[PathBuf],
) -> Result<Vec<TemplateFile>, DiscoveryError> {
    if !fs::metadata(root).is_ok_and(|m| m.is_dir()) {
        return Err(DiscoveryError::RootMissing(root.to_path_buf()));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !skip_dirs.iter().any(|dir| e.path() == dir));

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            DiscoveryError::Io(path, e)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_str().unwrap_or_default();
        if IGNORED_FILES.contains(&name) {
            continue;
        }

        let relative_path = relative_path(root, entry.path())?;
        if !matches_glob(pattern, &relative_path)
            || exclude.iter().any(|p| matches_glob(p, &relative_path))
        {
            continue;
        }

        files.push(TemplateFile {
            relative_path,
            absolute_path: entry.into_path(),
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    check_collisions(&files)?;
    Ok(files)
}

/// Join the components of `path` below `root` with `/`.
fn relative_path(root: &Path, path: &Path) -> Result<String, DiscoveryError> {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let mut parts = Vec::new();
    for component in rel.components() {
        let part = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| DiscoveryError::NonUtf8Path(path.to_path_buf()))?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

/// Reject relative paths that would share a runtime lookup key.
fn check_collisions(files: &[TemplateFile]) -> Result<(), DiscoveryError> {
    let mut by_key: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for file in files {
        by_key
            .entry(lookup_key(&file.relative_path))
            .or_default()
            .push(file.relative_path.clone());
    }

    let collisions: Vec<_> = by_key.into_values().filter(|group| group.len() > 1).collect();
    if collisions.is_empty() {
        Ok(())
    } else {
        Err(DiscoveryError::DuplicatePaths(collisions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    fn rel_paths(files: &[TemplateFile]) -> Vec<&str> {
        files.iter().map(|f| f.relative_path.as_str()).collect()
    }

    #[test]
    fn test_lookup_key_normalization() {
        assert_eq!(lookup_key("Home/Index.tpl"), "home/index.tpl");
        assert_eq!(lookup_key("/Home/Index.tpl"), "home/index.tpl");
        assert_eq!(lookup_key("~/Home/Index.tpl"), "home/index.tpl");
        assert_eq!(lookup_key("Home\\Index.tpl"), "home/index.tpl");
    }

    #[test]
    fn test_matches_glob() {
        assert!(matches_glob("**/*.tpl", "Home/Index.tpl"));
        assert!(matches_glob("**/*.tpl", "Views/Shared/Layout.tpl"));
        assert!(matches_glob("**/*.tpl", "Index.tpl"));
        assert!(!matches_glob("**/*.tpl", "Home/Index.html"));
        assert!(!matches_glob("*.tpl", "Home/Index.tpl"));
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "Views/Home/Index.tpl");
        touch(dir.path(), "Views/Home/About.tpl");
        touch(dir.path(), "Views/site.css");
        touch(dir.path(), "Index.tpl");

        let files = discover(dir.path(), "**/*.tpl", &[], &[]).unwrap();
        assert_eq!(
            rel_paths(&files),
            vec!["Index.tpl", "Views/Home/About.tpl", "Views/Home/Index.tpl"]
        );
        assert_eq!(files[1].absolute_path, dir.path().join("Views/Home/About.tpl"));
    }

    #[test]
    fn test_discover_empty_is_ok() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "readme.md");
        let files = discover(dir.path(), "**/*.tpl", &[], &[]).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_discover_missing_root() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = discover(&missing, "**/*.tpl", &[], &[]).unwrap_err();
        assert!(matches!(err, DiscoveryError::RootMissing(_)));
    }

    #[test]
    fn test_discover_exclude_and_skip_dirs() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "Views/Index.tpl");
        touch(dir.path(), "node_modules/pkg/Thing.tpl");
        touch(dir.path(), "publish/Views/Index.tpl");

        let files = discover(
            dir.path(),
            "**/*.tpl",
            &["node_modules/**".to_string()],
            &[dir.path().join("publish")],
        )
        .unwrap();
        assert_eq!(rel_paths(&files), vec!["Views/Index.tpl"]);
    }

    #[test]
    fn test_discover_case_collision_is_reported() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "Home/Index.tpl");
        touch(dir.path(), "Home/About.tpl");
        // Only possible on case-sensitive file systems
        let second = dir.path().join("home/index.tpl");
        fs::create_dir_all(second.parent().unwrap()).unwrap();
        fs::write(&second, "y").unwrap();

        let files = fs::read_dir(dir.path()).unwrap().count();
        if files < 2 {
            // Case-insensitive file system: both names are the same file
            return;
        }

        let err = discover(dir.path(), "**/*.tpl", &[], &[]).unwrap_err();
        match err {
            DiscoveryError::DuplicatePaths(groups) => {
                assert_eq!(groups.len(), 1);
                assert_eq!(groups[0], vec!["Home/Index.tpl", "home/index.tpl"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
