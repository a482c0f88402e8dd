//! Compilation engine for generated view sources.
//!
//! - **syntax**: lexer, parser and printer of the intermediate language
//! - **semantic**: symbol table, `implements` queries and diagnostics
//! - **rewrite**: path tagging of page classes
//! - **emit**: lowering into a [`Module`] and debug info
//!
//! # Compile Flow
//!
//! ```text
//! parse() ──► Compilation::create() ──► diagnostics() ──► PathTagRewriter ──► emit()
//!                    ▲                                     (per tree, pre-rewrite
//!             load references                               semantic snapshot)
//! ```
//!
//! Compilation is all or nothing: any diagnostic means no bytes.

pub mod emit;
pub mod rewrite;
pub mod semantic;
pub mod syntax;

use crate::diagnostic::Diagnostic;
use crate::host::GeneratedUnit;
use crate::module::{self, ARTIFACT_NAME, Module};
use crate::resolver::{Reference, ReferenceSet};
use rewrite::PathTagRewriter;
use semantic::Compilation;

/// Result of one compilation.
#[derive(Debug, Default)]
pub struct CompileOutput {
    pub success: bool,
    /// Encoded module; empty on failure
    pub binary: Vec<u8>,
    /// Debug info; empty on failure
    pub debug: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
    /// Decoded form of `binary`
    pub module: Option<Module>,
}

impl CompileOutput {
    fn failed(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            diagnostics,
            ..Self::default()
        }
    }
}

/// Compile generated units against `references` into the views artifact.
///
/// Units that already failed generation are skipped; the caller reports them.
pub fn compile(units: &[GeneratedUnit], references: &ReferenceSet) -> CompileOutput {
    compile_module(ARTIFACT_NAME, units, references)
}

pub fn compile_module(name: &str, units: &[GeneratedUnit], references: &ReferenceSet) -> CompileOutput {
    let mut diagnostics = Vec::new();

    let mut trees = Vec::with_capacity(units.len());
    for unit in units.iter().filter(|u| u.success()) {
        match syntax::parse(&unit.source_path, &unit.generated_code) {
            Ok(tree) => trees.push(tree),
            Err(diag) => diagnostics.push(diag),
        }
    }

    let modules = match load_references(references) {
        Ok(modules) => modules,
        Err(errors) => {
            diagnostics.extend(errors);
            return CompileOutput::failed(diagnostics);
        }
    };
    if !diagnostics.is_empty() {
        return CompileOutput::failed(diagnostics);
    }

    let compilation = Compilation::create(trees, modules);
    let diagnostics = compilation.diagnostics();
    if !diagnostics.is_empty() {
        return CompileOutput::failed(diagnostics);
    }

    // Every tree is rewritten from a snapshot of the unmodified compilation
    let rewritten: Vec<_> = (0..compilation.syntax_trees().len())
        .map(|index| PathTagRewriter::new(compilation.semantic_model(index)).rewrite())
        .collect();
    let compilation = compilation.replace_syntax_trees(rewritten.into_iter().enumerate());

    let diagnostics = compilation.diagnostics();
    if !diagnostics.is_empty() {
        return CompileOutput::failed(diagnostics);
    }

    let module = match emit::emit(&compilation, name) {
        Ok(module) => module,
        Err(diagnostics) => return CompileOutput::failed(diagnostics),
    };

    let encoded = module::format::to_bytes(&module)
        .map_err(|e| Diagnostic::new(format!("cannot encode module `{name}`: {e}")))
        .and_then(|binary| {
            emit::debug_info(&compilation, name)
                .map(|debug| (binary, debug))
                .map_err(|e| Diagnostic::new(format!("cannot encode debug info: {e}")))
        });

    match encoded {
        Ok((binary, debug)) => CompileOutput {
            success: true,
            binary,
            debug,
            diagnostics: Vec::new(),
            module: Some(module),
        },
        Err(diag) => CompileOutput::failed(vec![diag]),
    }
}

/// Read every reference module, in resolution order.
fn load_references(references: &ReferenceSet) -> Result<Vec<Module>, Vec<Diagnostic>> {
    let mut modules = Vec::with_capacity(references.len());
    let mut errors = Vec::new();
    for reference in references.iter() {
        match reference {
            Reference::Host => modules.push(module::host_module()),
            Reference::Module(path) => match module::read(path) {
                Ok(module) => modules.push(module),
                Err(err) => errors.push(Diagnostic::new(format!(
                    "cannot load reference `{}`: {err}",
                    path.display()
                ))),
            },
        }
    }
    if errors.is_empty() { Ok(modules) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostEnvironment, TemplateHost};
    use crate::module::{TypeDef, TypeKind};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn generate(templates: &[(&str, &str)]) -> Vec<GeneratedUnit> {
        let host = TemplateHost::new(HostEnvironment {
            application_name: "shop".into(),
            content_root: PathBuf::from("."),
        });
        templates
            .iter()
            .map(|(path, src)| host.generate(path, src.as_bytes()))
            .collect()
    }

    #[test]
    fn test_compile_tags_every_page() {
        let units = generate(&[("Home/Index.tpl", "<h1>{{ model.title }}</h1>"), ("Home/About.tpl", "about")]);
        let output = compile(&units, &ReferenceSet::host_only());
        assert!(output.success, "{:?}", output.diagnostics);

        let module = module::format::from_bytes(&output.binary).unwrap();
        assert_eq!(module.name, ARTIFACT_NAME);
        let mut paths: Vec<_> = module.tagged_types().map(|(p, _)| p.to_owned()).collect();
        paths.sort();
        assert_eq!(paths, vec!["Home/About.tpl", "Home/Index.tpl"]);
        assert!(!output.debug.is_empty());
    }

    #[test]
    fn test_compile_empty_is_valid() {
        let output = compile(&[], &ReferenceSet::host_only());
        assert!(output.success);
        let module = module::format::from_bytes(&output.binary).unwrap();
        assert!(module.types.is_empty());
    }

    #[test]
    fn test_compile_unresolved_base_fails_atomically() {
        let units = generate(&[("a.tpl", "ok"), ("b.tpl", "{% inherits Shop.Layout %}x")]);
        let output = compile(&units, &ReferenceSet::host_only());
        assert!(!output.success);
        assert!(output.binary.is_empty());
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].message, "unresolved base type `Shop.Layout`");
    }

    #[test]
    fn test_compile_against_application_module() {
        let dir = TempDir::new().unwrap();
        let app_path = dir.path().join("shop.mod");
        let mut app = Module::new("shop");
        app.types.push(TypeDef {
            name: "Shop.Layout".into(),
            kind: TypeKind::Class,
            bases: vec!["Page".into()],
            attributes: Vec::new(),
            body: Vec::new(),
        });
        module::write(&app_path, &app).unwrap();

        let units = generate(&[("b.tpl", "{% inherits Shop.Layout %}x")]);
        let references = ReferenceSet::from_iter([Reference::Module(app_path), Reference::Host]);
        let output = compile(&units, &references);
        assert!(output.success, "{:?}", output.diagnostics);
        let module = output.module.unwrap();
        assert_eq!(module.types[0].view_path(), Some("b.tpl"));
        assert_eq!(module.types[0].bases, vec!["Shop.Layout"]);
    }

    #[test]
    fn test_compile_missing_reference() {
        let dir = TempDir::new().unwrap();
        let references = ReferenceSet::from_iter([Reference::Module(dir.path().join("gone.mod"))]);
        let output = compile(&generate(&[("a.tpl", "x")]), &references);
        assert!(!output.success);
        assert!(output.diagnostics[0].message.starts_with("cannot load reference"));
    }

    #[test]
    fn test_compile_unit_with_view_and_layout() {
        let unit = GeneratedUnit {
            source_path: "Home/Index.tpl".into(),
            generated_code: "class View : Layout { render { write \"v\"; } }\nclass Layout : Page {}\n".into(),
            diagnostics: Vec::new(),
        };
        let output = compile(&[unit], &ReferenceSet::host_only());
        assert!(output.success, "{:?}", output.diagnostics);
        let module = output.module.unwrap();
        let tagged: Vec<_> = module.tagged_types().map(|(p, t)| (p, t.name.as_str())).collect();
        assert_eq!(tagged, vec![("Home/Index.tpl", "View")]);
    }

    #[test]
    fn test_compile_skips_failed_units() {
        let units = generate(&[("a.tpl", "{{ bad. }}"), ("b.tpl", "fine")]);
        let output = compile(&units, &ReferenceSet::host_only());
        assert!(output.success);
        assert_eq!(output.module.unwrap().types.len(), 1);
    }
}
