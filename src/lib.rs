//! Precompiled views - compile server-rendered templates once, at publish time.
//!
//! The crate has two halves that run in different processes:
//!
//! - **build** (the `precompile-views` binary): discovers templates, turns each
//!   into intermediate source, compiles everything against the published
//!   application's references, tags every page type with its template path and
//!   writes one artifact into the publish folder.
//! - **runtime** (linked into the web application): loads that artifact once and
//!   answers "which compiled view belongs to this path" before falling back to
//!   compiling on demand.
//!
//! # Build Flow
//!
//! ```text
//! discover() ──► TemplateHost::generate() ──┐ (rayon, per template)
//!                                           ├──► compiler::compile() ──► precompiledviews.mod
//! resolve_references() ─────────────────────┘         │
//!                                                      └── PathTagRewriter (before emit)
//!
//! precompiledviews.mod ──► ModuleLoader ──► PrecompiledCache ──► OnDemandCache (fallback)
//! ```

pub mod build;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod diagnostic;
pub mod discovery;
pub mod error;
pub mod host;
pub mod logger;
pub mod module;
pub mod resolver;
pub mod runtime;

pub use build::{BuildReport, precompile_views};
pub use config::ProjectConfig;
pub use error::BuildError;
pub use runtime::{CompiledView, CompilerCache, PrecompiledCache, ViewEngine};
