//! Runtime side: finding and rendering views inside the web application.
//!
//! A [`ViewEngine`] resolves view paths through its active [`CompilerCache`].
//! By default that is an [`OnDemandCache`], which compiles templates from the
//! content root the first time they are requested. Calling
//! [`ViewEngine::add_precompiled_views`] wraps it in a [`PrecompiledCache`]
//! that answers from the published artifact first.
//!
//! ```ignore
//! let mut engine = ViewEngine::new("/srv/shop");
//! engine.add_precompiled_views();
//! let html = engine.render("Home/Index.tpl", &serde_json::json!({ "title": "Hi" }))?;
//! ```

mod cache;
mod loader;
mod render;

use std::fs::File;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

use crate::compiler;
use crate::diagnostic::format_diagnostics;
use crate::discovery::lookup_key;
use crate::host::{HostEnvironment, TemplateHost};
use crate::module::Module;
use crate::resolver::ReferenceSet;

pub use cache::{CacheStatus, PrecompiledCache, PrecompiledIndex};
pub use loader::{ArtifactLoadError, ModuleLoader};

/// Compiler invoked by a cache on a miss.
pub type CompileFn<'a> = dyn Fn(&str) -> Result<Arc<CompiledView>, ViewError> + 'a;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("view `{0}` was not found")]
    NotFound(String),

    #[error("view `{path}` failed to generate:\n{report}")]
    Template { path: String, report: String },

    #[error("view `{path}` failed to compile:\n{report}")]
    Compilation { path: String, report: String },
}

// ============================================================================
// Compiled View
// ============================================================================

/// A page type inside a loaded module.
#[derive(Debug, Clone)]
pub struct CompiledView {
    module: Arc<Module>,
    type_index: usize,
}

impl CompiledView {
    pub(crate) fn new(module: Arc<Module>, type_index: usize) -> Self {
        Self { module, type_index }
    }

    pub fn type_name(&self) -> &str {
        &self.module.types[self.type_index].name
    }

    /// Template path the view was tagged with.
    pub fn path(&self) -> Option<&str> {
        self.module.types[self.type_index].view_path()
    }

    /// Name of the module the view lives in.
    pub fn module_name(&self) -> &str {
        &self.module.name
    }

    pub fn render(&self, model: &Value) -> String {
        render::render(&self.module.types[self.type_index].body, model)
    }
}

// ============================================================================
// Caches
// ============================================================================

/// Path to compiled view, compiling on a miss.
pub trait CompilerCache: Send + Sync {
    fn get_or_add(&self, path: &str, compile: &CompileFn<'_>) -> Result<Arc<CompiledView>, ViewError>;
}

/// Default cache: compiles on first request and keeps the result for the
/// process lifetime.
#[derive(Default)]
pub struct OnDemandCache {
    views: RwLock<FxHashMap<String, Arc<CompiledView>>>,
}

impl OnDemandCache {
    pub fn len(&self) -> usize {
        self.views.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.read().is_empty()
    }
}

impl CompilerCache for OnDemandCache {
    fn get_or_add(&self, path: &str, compile: &CompileFn<'_>) -> Result<Arc<CompiledView>, ViewError> {
        let key = lookup_key(path);
        if let Some(view) = self.views.read().get(&key) {
            return Ok(Arc::clone(view));
        }

        // Compile outside the lock; a racing compile of the same path loses
        let view = compile(path)?;
        Ok(Arc::clone(self.views.write().entry(key).or_insert(view)))
    }
}

// ============================================================================
// View Engine
// ============================================================================

pub struct ViewEngine {
    host: TemplateHost,
    cache: Arc<dyn CompilerCache>,
    precompiled: Option<Arc<PrecompiledCache>>,
}

impl ViewEngine {
    /// Engine compiling templates below `content_root` on demand.
    pub fn new(content_root: impl Into<PathBuf>) -> Self {
        let content_root = content_root.into();
        let application_name = content_root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            host: TemplateHost::new(HostEnvironment {
                application_name,
                content_root,
            }),
            cache: Arc::new(OnDemandCache::default()),
            precompiled: None,
        }
    }

    /// Look up the views artifact next to the running executable first.
    pub fn add_precompiled_views(&mut self) -> &mut Self {
        self.add_precompiled_views_from(ModuleLoader::default())
    }

    /// Wrap the current cache with a precompiled cache using `loader`.
    ///
    /// Only the first registration takes effect.
    pub fn add_precompiled_views_from(&mut self, loader: ModuleLoader) -> &mut Self {
        if self.precompiled.is_none() {
            let cache = Arc::new(PrecompiledCache::new(loader, Arc::clone(&self.cache)));
            self.cache = cache.clone();
            self.precompiled = Some(cache);
        }
        self
    }

    /// State of the precompiled cache, if one is registered.
    pub fn precompiled_status(&self) -> Option<CacheStatus> {
        self.precompiled.as_ref().map(|cache| cache.status())
    }

    pub fn find_view(&self, path: &str) -> Result<Arc<CompiledView>, ViewError> {
        self.cache
            .get_or_add(path, &|path| self.compile_on_demand(path))
    }

    pub fn render(&self, path: &str, model: &Value) -> Result<String, ViewError> {
        Ok(self.find_view(path)?.render(model))
    }

    /// Generate and compile one template from the content root.
    fn compile_on_demand(&self, path: &str) -> Result<Arc<CompiledView>, ViewError> {
        let relative = path.replace('\\', "/");
        let relative = relative
            .strip_prefix("~/")
            .unwrap_or(&relative)
            .trim_start_matches('/');
        if !is_contained(relative) {
            return Err(ViewError::NotFound(path.to_owned()));
        }
        let file = self.host.environment().content_root.join(relative);
        let reader = File::open(&file).map_err(|_| ViewError::NotFound(path.to_owned()))?;

        let unit = self.host.generate(relative, reader);
        if !unit.success() {
            return Err(ViewError::Template {
                path: path.to_owned(),
                report: format_diagnostics(&unit.diagnostics),
            });
        }

        let output = compiler::compile_module(relative, &[unit], &ReferenceSet::host_only());
        let module = match output.module {
            Some(module) if output.success => module,
            _ => {
                return Err(ViewError::Compilation {
                    path: path.to_owned(),
                    report: format_diagnostics(&output.diagnostics),
                });
            }
        };

        let type_index = module
            .types
            .iter()
            .position(|ty| ty.view_path().is_some())
            .ok_or_else(|| ViewError::NotFound(path.to_owned()))?;
        Ok(Arc::new(CompiledView::new(Arc::new(module), type_index)))
    }
}

/// Whether a normalized view path stays below the content root: only plain
/// file and directory names, no `..`, no root or drive prefix.
fn is_contained(relative: &str) -> bool {
    let mut components = Path::new(relative).components().peekable();
    components.peek().is_some() && components.all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
