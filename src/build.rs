//! Publish-time orchestration.
//!
//! # Architecture
//!
//! ```text
//! precompile_views()
//!     │
//!     ├── discover() ──► TemplateFile[]
//!     │
//!     ├── rayon::join
//!     │       ├── TemplateHost::generate_file()   (par_iter, all templates attempted)
//!     │       └── resolve_references()            (publish folder + manifest)
//!     │
//!     ├── compiler::compile() ──► tagged module bytes
//!     │
//!     └── write <publish>/precompiledviews.mod (+ .debug.json)
//! ```
//!
//! Nothing is written unless every stage succeeds, so a failed build leaves a
//! previous artifact untouched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use rayon::prelude::*;

use crate::{
    compiler,
    config::ProjectConfig,
    diagnostic::format_diagnostics,
    discovery::discover,
    error::BuildError,
    host::{GeneratedUnit, HostEnvironment, TemplateHost},
    log,
    logger::Progress,
    module::{ARTIFACT_NAME, DEBUG_EXTENSION, LIBRARY_EXTENSION, ModuleError, format::write_bytes},
    resolver::{ModuleDescriptor, resolve_references},
};

/// Outcome of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub artifact: PathBuf,
    pub debug_info: Option<PathBuf>,
    /// Number of path-tagged page types in the artifact
    pub views: usize,
    /// Content hash of the `(path, type)` set, stable across rebuilds
    pub fingerprint: String,
}

/// Path of the views artifact inside a publish folder.
pub fn artifact_path(config: &ProjectConfig) -> PathBuf {
    config
        .target
        .publish_dir
        .join(format!("{ARTIFACT_NAME}.{LIBRARY_EXTENSION}"))
}

/// Precompile every template of the project into the publish folder.
pub fn precompile_views(config: &ProjectConfig) -> Result<BuildReport> {
    let publish_dir = &config.target.publish_dir;

    let templates = discover(
        &config.root,
        &config.views.pattern,
        &config.views.exclude,
        &config.skip_dirs(),
    )
    .map_err(BuildError::from)?;
    log!("discover"; "found {} template(s) in {}", templates.len(), config.root.display());

    let host = TemplateHost::new(HostEnvironment {
        application_name: config.project.name.clone(),
        content_root: config.root.clone(),
    });
    let descriptor = ModuleDescriptor::locate(config);

    let progress = Progress::start("generate", templates.len());
    let (units, references) = rayon::join(
        || {
            templates
                .par_iter()
                .map(|file| {
                    let unit = host.generate_file(file);
                    if let Some(progress) = &progress {
                        progress.inc();
                    }
                    unit
                })
                .collect::<Vec<_>>()
        },
        || resolve_references(&descriptor, &config.target.framework),
    );
    if let Some(progress) = &progress {
        progress.finish();
    }

    check_generation(&units)?;
    let references = references.map_err(BuildError::from)?;

    log!(
        "compile";
        "compiling {} view(s) against {} reference(s)",
        units.len(),
        references.len()
    );
    let output = compiler::compile(&units, &references);
    if !output.success {
        return Err(BuildError::Compilation {
            count: output.diagnostics.len(),
            report: format_diagnostics(&output.diagnostics),
        }
        .into());
    }

    // The artifact rename is the last fallible step
    let artifact = artifact_path(config);
    let debug_path = publish_dir.join(format!("{ARTIFACT_NAME}.{DEBUG_EXTENSION}"));
    let debug_info = if config.views.debug_info {
        write_bytes(&debug_path, &output.debug)
            .map_err(|e| BuildError::ArtifactWrite(debug_path.clone(), e))?;
        Some(debug_path.clone())
    } else {
        remove_stale(&debug_path)?;
        None
    };

    if let Err(e) = write_bytes(&artifact, &output.binary) {
        if debug_info.is_some() {
            fs::remove_file(&debug_path).ok();
        }
        return Err(BuildError::ArtifactWrite(artifact, e).into());
    }

    let (views, fingerprint) = output
        .module
        .as_ref()
        .map(|module| (module.tagged_types().count(), module.tag_fingerprint()))
        .unwrap_or_default();

    log!("done"; "precompiled {} view(s) into {}", views, artifact.display());

    Ok(BuildReport {
        artifact,
        debug_info,
        views,
        fingerprint,
    })
}

/// Remove debug info left by an earlier build.
fn remove_stale(path: &Path) -> Result<(), BuildError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BuildError::ArtifactWrite(
            path.to_path_buf(),
            ModuleError::Io(path.to_path_buf(), e),
        )),
    }
}

/// Fail with every generation diagnostic once all templates were attempted.
fn check_generation(units: &[GeneratedUnit]) -> Result<(), BuildError> {
    let failed: Vec<_> = units.iter().filter(|unit| !unit.success()).collect();
    if failed.is_empty() {
        return Ok(());
    }

    let diagnostics: Vec<_> = failed
        .iter()
        .flat_map(|unit| unit.diagnostics.iter().cloned())
        .collect();
    Err(BuildError::TemplateGeneration {
        count: failed.len(),
        report: format_diagnostics(&diagnostics),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Diagnostic;

    fn unit(path: &str, diagnostics: Vec<Diagnostic>) -> GeneratedUnit {
        GeneratedUnit {
            source_path: path.into(),
            generated_code: String::new(),
            diagnostics,
        }
    }

    #[test]
    fn test_check_generation_counts_failed_templates() {
        let units = vec![
            unit("a.tpl", Vec::new()),
            unit("b.tpl", vec![Diagnostic::new("first"), Diagnostic::new("second")]),
            unit("c.tpl", vec![Diagnostic::new("third")]),
        ];
        match check_generation(&units).unwrap_err() {
            BuildError::TemplateGeneration { count, report } => {
                assert_eq!(count, 2);
                assert!(report.contains("first"));
                assert!(report.contains("second"));
                assert!(report.contains("third"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_check_generation_ok() {
        assert!(check_generation(&[unit("a.tpl", Vec::new())]).is_ok());
        assert!(check_generation(&[]).is_ok());
    }
}
