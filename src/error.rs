//! Build pipeline errors.
//!
//! Layer errors ([`DiscoveryError`], [`ReferenceError`], [`ModuleError`]) are
//! wrapped here; template and compilation failures carry the rendered report of
//! every diagnostic so the binary can print them in one go.

use std::path::PathBuf;

use thiserror::Error;

use crate::discovery::DiscoveryError;
use crate::module::ModuleError;
use crate::resolver::ReferenceError;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("{count} template(s) failed to generate:\n{report}")]
    TemplateGeneration { count: usize, report: String },

    #[error("cannot resolve compile references")]
    ReferenceResolution(#[from] ReferenceError),

    #[error("compilation failed with {count} error(s):\n{report}")]
    Compilation { count: usize, report: String },

    #[error("cannot write `{0}`")]
    ArtifactWrite(PathBuf, #[source] ModuleError),
}
