//! Binary modules: the unit of compiled output and of references.
//!
//! The application's entry module, its libraries and the precompiled views
//! artifact all share one on-disk format (see [`format`]). A module is a named
//! set of exported types; page types carry their template path as a
//! `ViewPath` attribute.

pub mod format;

use serde::{Deserialize, Serialize};

pub use format::{ModuleError, read, write};

// ============================================================================
// Well-Known Names
// ============================================================================

/// Logical name (and file stem) of the precompiled views artifact.
pub const ARTIFACT_NAME: &str = "precompiledviews";
/// Name of the built-in module declaring the well-known types below.
pub const HOST_MODULE_NAME: &str = "precompile_views.host";
/// Capability marker implemented by every template page.
pub const PAGE_CAPABILITY: &str = "TemplatePage";
/// Default base class of generated pages.
pub const PAGE_BASE: &str = "Page";
/// Attribute carrying a page's template path.
pub const VIEW_PATH_ATTRIBUTE: &str = "ViewPath";

/// Extension of portable library modules (and of the artifact).
pub const LIBRARY_EXTENSION: &str = "mod";
/// Extension of self-contained entry modules.
pub const EXECUTABLE_EXTENSION: &str = "bin";
/// Extension of the debug info written next to the artifact.
pub const DEBUG_EXTENSION: &str = "debug.json";

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    #[serde(default)]
    pub types: Vec<TypeDef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Class,
    Interface,
    Attribute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,
    #[serde(default)]
    pub bases: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
    #[serde(default)]
    pub body: Vec<Instr>,
}

impl TypeDef {
    /// Template path recorded by the `ViewPath` attribute, if tagged.
    pub fn view_path(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == VIEW_PATH_ATTRIBUTE)
            .and_then(|attr| attr.args.first())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Lowered render instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instr {
    Write(String),
    Emit(Vec<String>),
    If {
        cond: Vec<String>,
        negate: bool,
        then: Vec<Instr>,
        #[serde(default)]
        otherwise: Vec<Instr>,
    },
    For {
        binding: String,
        source: Vec<String>,
        body: Vec<Instr>,
    },
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
        }
    }

    pub fn find_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.iter().find(|ty| ty.name == name)
    }

    /// Types carrying a template path, as `(path, type)` pairs.
    pub fn tagged_types(&self) -> impl Iterator<Item = (&str, &TypeDef)> {
        self.types
            .iter()
            .filter_map(|ty| ty.view_path().map(|path| (path, ty)))
    }

    /// Content hash of the `(path, type name)` set.
    ///
    /// Two builds of an unchanged project produce the same fingerprint even when
    /// their bytes differ.
    pub fn tag_fingerprint(&self) -> String {
        let mut pairs: Vec<_> = self.tagged_types().map(|(path, ty)| (path, &*ty.name)).collect();
        pairs.sort_unstable();

        let mut hasher = blake3::Hasher::new();
        for (path, name) in pairs {
            hasher.update(path.as_bytes());
            hasher.update(&[0]);
            hasher.update(name.as_bytes());
            hasher.update(&[0]);
        }
        hex::encode(hasher.finalize().as_bytes())
    }
}

/// The built-in module every compilation references last.
pub fn host_module() -> Module {
    let def = |name: &str, kind, bases: &[&str]| TypeDef {
        name: name.to_owned(),
        kind,
        bases: bases.iter().map(|b| (*b).to_owned()).collect(),
        attributes: Vec::new(),
        body: Vec::new(),
    };
    Module {
        name: HOST_MODULE_NAME.to_owned(),
        types: vec![
            def(PAGE_CAPABILITY, TypeKind::Interface, &[]),
            def(PAGE_BASE, TypeKind::Class, &[PAGE_CAPABILITY]),
            def(VIEW_PATH_ATTRIBUTE, TypeKind::Attribute, &[]),
        ],
    }
}
