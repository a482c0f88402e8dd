//! Precompiled view cache.
//!
//! # State
//!
//! ```text
//! Unloaded ──first lookup──► Loading ──┬──► Loaded(index)     hits served from the index
//!                                      └──► LoadFailed        every lookup falls through
//! ```
//!
//! The transition runs once per cache, inside a `OnceLock`: concurrent first
//! lookups wait for the single load instead of racing it. Afterwards the index
//! is read without locks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use rustc_hash::FxHashMap;

use super::loader::{ArtifactLoadError, ModuleLoader};
use super::{CompileFn, CompiledView, CompilerCache, ViewError};
use crate::discovery::lookup_key;
use crate::log;
use crate::module::{ARTIFACT_NAME, Module};

/// Observable state of a [`PrecompiledCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Unloaded,
    Loading,
    Loaded { views: usize },
    LoadFailed,
}

/// Lookup key to precompiled view, built once from the artifact.
#[derive(Debug, Default)]
pub struct PrecompiledIndex {
    views: FxHashMap<String, Arc<CompiledView>>,
}

impl PrecompiledIndex {
    /// Index every path-tagged type of `module`.
    ///
    /// Views share the module; nothing is copied out of it.
    pub fn build(module: Arc<Module>) -> Result<Self, ArtifactLoadError> {
        let mut views: FxHashMap<String, Arc<CompiledView>> = FxHashMap::default();
        for (type_index, ty) in module.types.iter().enumerate() {
            let Some(path) = ty.view_path() else {
                continue;
            };
            if let Some(existing) = views.get(&lookup_key(path)) {
                return Err(ArtifactLoadError::DuplicatePath {
                    path: path.to_owned(),
                    first: existing.type_name().to_owned(),
                    second: ty.name.clone(),
                });
            }
            let view = CompiledView::new(Arc::clone(&module), type_index);
            views.insert(lookup_key(path), Arc::new(view));
        }
        Ok(Self { views })
    }

    pub fn get(&self, path: &str) -> Option<&Arc<CompiledView>> {
        self.views.get(&lookup_key(path))
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

enum LoadState {
    Loaded(PrecompiledIndex),
    LoadFailed,
}

/// Serves precompiled views, delegating misses to a wrapped cache.
pub struct PrecompiledCache {
    loader: ModuleLoader,
    fallback: Arc<dyn CompilerCache>,
    state: OnceLock<LoadState>,
    loading: AtomicBool,
}

impl PrecompiledCache {
    pub fn new(loader: ModuleLoader, fallback: Arc<dyn CompilerCache>) -> Self {
        Self {
            loader,
            fallback,
            state: OnceLock::new(),
            loading: AtomicBool::new(false),
        }
    }

    pub fn status(&self) -> CacheStatus {
        match self.state.get() {
            Some(LoadState::Loaded(index)) => CacheStatus::Loaded { views: index.len() },
            Some(LoadState::LoadFailed) => CacheStatus::LoadFailed,
            None if self.loading.load(Ordering::Acquire) => CacheStatus::Loading,
            None => CacheStatus::Unloaded,
        }
    }

    /// The frozen index, loading the artifact on first use.
    pub fn index(&self) -> Option<&PrecompiledIndex> {
        match self.state.get_or_init(|| self.load()) {
            LoadState::Loaded(index) => Some(index),
            LoadState::LoadFailed => None,
        }
    }

    fn load(&self) -> LoadState {
        self.loading.store(true, Ordering::Release);
        let result = self
            .loader
            .load(ARTIFACT_NAME)
            .and_then(PrecompiledIndex::build);

        match result {
            Ok(index) => {
                log!("runtime"; "loaded {} precompiled view(s)", index.len());
                LoadState::Loaded(index)
            }
            Err(err) => {
                log!("warn"; "precompiled views unavailable, compiling on demand: {err}");
                LoadState::LoadFailed
            }
        }
    }
}

impl CompilerCache for PrecompiledCache {
    fn get_or_add(&self, path: &str, compile: &CompileFn<'_>) -> Result<Arc<CompiledView>, ViewError> {
        if let Some(view) = self.index().and_then(|index| index.get(path)) {
            return Ok(Arc::clone(view));
        }
        self.fallback.get_or_add(path, compile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{AttributeDef, Instr, TypeDef, TypeKind, VIEW_PATH_ATTRIBUTE};
    use crate::runtime::OnDemandCache;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn page(name: &str, path: &str, text: &str) -> TypeDef {
        TypeDef {
            name: name.into(),
            kind: TypeKind::Class,
            bases: vec!["Page".into()],
            attributes: vec![AttributeDef {
                name: VIEW_PATH_ATTRIBUTE.into(),
                args: vec![path.into()],
            }],
            body: vec![Instr::Write(text.into())],
        }
    }

    fn artifact(dir: &TempDir, types: Vec<TypeDef>) -> ModuleLoader {
        let module = Module {
            name: ARTIFACT_NAME.into(),
            types,
        };
        crate::module::write(&dir.path().join("precompiledviews.mod"), &module).unwrap();
        ModuleLoader::new([dir.path().to_path_buf()])
    }

    fn fallback_view(_: &str) -> Result<Arc<CompiledView>, ViewError> {
        let module = Module {
            name: "ondemand".into(),
            types: vec![page("Fallback", "x", "fallback")],
        };
        Ok(Arc::new(CompiledView::new(Arc::new(module), 0)))
    }

    #[test]
    fn test_index_is_case_insensitive() {
        let module = Module {
            name: ARTIFACT_NAME.into(),
            types: vec![page("A", "Home/Index.tpl", "a")],
        };
        let index = PrecompiledIndex::build(Arc::new(module)).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.get("/home/INDEX.tpl").is_some());
        assert!(index.get("~/Home/Index.tpl").is_some());
        assert!(index.get("Home/About.tpl").is_none());
    }

    #[test]
    fn test_index_rejects_collisions() {
        let module = Module {
            name: ARTIFACT_NAME.into(),
            types: vec![page("A", "Home/Index.tpl", "a"), page("B", "home/index.tpl", "b")],
        };
        let err = PrecompiledIndex::build(Arc::new(module)).unwrap_err();
        assert!(matches!(err, ArtifactLoadError::DuplicatePath { .. }));
    }

    #[test]
    fn test_hit_skips_fallback_compiler() {
        let dir = TempDir::new().unwrap();
        let loader = artifact(&dir, vec![page("A", "Home/Index.tpl", "precompiled")]);
        let cache = PrecompiledCache::new(loader, Arc::new(OnDemandCache::default()));
        assert_eq!(cache.status(), CacheStatus::Unloaded);

        let calls = AtomicUsize::new(0);
        let compile = |path: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
            fallback_view(path)
        };
        let view = cache.get_or_add("Home/Index.tpl", &compile).unwrap();
        assert_eq!(view.type_name(), "A");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.status(), CacheStatus::Loaded { views: 1 });

        let view = cache.get_or_add("Home/Missing.tpl", &compile).unwrap();
        assert_eq!(view.type_name(), "Fallback");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_artifact_falls_through() {
        let dir = TempDir::new().unwrap();
        let cache = PrecompiledCache::new(
            ModuleLoader::new([dir.path().to_path_buf()]),
            Arc::new(OnDemandCache::default()),
        );
        let view = cache.get_or_add("Home/Index.tpl", &fallback_view).unwrap();
        assert_eq!(view.type_name(), "Fallback");
        assert_eq!(cache.status(), CacheStatus::LoadFailed);
        assert!(cache.index().is_none());
    }

    #[test]
    fn test_concurrent_first_lookups_load_once() {
        let dir = TempDir::new().unwrap();
        let loader = artifact(&dir, vec![page("A", "a.tpl", "a")]);
        let cache = PrecompiledCache::new(loader, Arc::new(OnDemandCache::default()));

        let indexes: Vec<usize> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| cache.index().map(|i| i as *const _ as usize).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(indexes.windows(2).all(|w| w[0] == w[1]));
    }
}
