//! Emission: lower rewritten trees into a module plus debug info.

use rustc_hash::FxHashMap;
use serde::Serialize;

use super::semantic::Compilation;
use super::syntax::{Block, DeclarationKind, Statement, SyntaxTree, TypeDeclaration, print_unit};
use crate::diagnostic::{Diagnostic, Location};
use crate::discovery::lookup_key;
use crate::module::{AttributeDef, Instr, Module, PAGE_CAPABILITY, TypeDef, TypeKind, VIEW_PATH_ATTRIBUTE};

#[derive(Serialize)]
struct DebugInfo<'a> {
    module: &'a str,
    sources: Vec<DebugSource<'a>>,
}

#[derive(Serialize)]
struct DebugSource<'a> {
    path: &'a str,
    types: Vec<&'a str>,
    /// Rewritten source, as emitted
    code: String,
}

/// Lower every source type into a module named `name`.
///
/// Each unit declaring a page class must tag exactly one of them (its view)
/// with a single-argument `ViewPath`; other page classes of the unit stay
/// untagged. Fails with diagnostics when that does not hold, or when two pages
/// claim the same lookup key.
pub fn emit(compilation: &Compilation, name: &str) -> Result<Module, Vec<Diagnostic>> {
    let mut diagnostics = Vec::new();
    let mut module = Module::new(name);
    let mut claimed: FxHashMap<String, String> = FxHashMap::default();

    for tree in compilation.syntax_trees() {
        let mut first_page = None;
        let mut tagged = 0;

        for decl in &tree.root.types {
            let kind = match decl.kind {
                DeclarationKind::Class => TypeKind::Class,
                DeclarationKind::Interface => TypeKind::Interface,
            };
            let is_page =
                kind == TypeKind::Class && compilation.implements(&decl.name, PAGE_CAPABILITY);

            let tags: Vec<_> = decl
                .attributes
                .iter()
                .filter(|a| a.name == VIEW_PATH_ATTRIBUTE)
                .collect();
            if is_page {
                if first_page.is_none() {
                    first_page = Some(decl);
                }
                match tags.as_slice() {
                    [] => {}
                    [tag] if tag.args.len() == 1 => {
                        tagged += 1;
                        let key = lookup_key(&tag.args[0]);
                        if let Some(other) = claimed.insert(key, decl.name.clone()) {
                            diagnostics.push(Diagnostic::at(
                                format!(
                                    "template path `{}` is claimed by both `{other}` and `{}`",
                                    tag.args[0], decl.name
                                ),
                                location(tree, decl),
                            ));
                        }
                    }
                    _ => {
                        tagged += 1;
                        diagnostics.push(untagged_page(tree, decl));
                    }
                }
            }

            module.types.push(TypeDef {
                name: decl.name.clone(),
                kind,
                bases: decl.bases.iter().map(|b| b.name.clone()).collect(),
                attributes: decl
                    .attributes
                    .iter()
                    .map(|a| AttributeDef {
                        name: a.name.clone(),
                        args: a.args.clone(),
                    })
                    .collect(),
                body: decl.render.as_ref().map(lower).unwrap_or_default(),
            });
        }

        if let Some(page) = first_page
            && tagged == 0
        {
            diagnostics.push(untagged_page(tree, page));
        }
    }

    if diagnostics.is_empty() {
        Ok(module)
    } else {
        Err(diagnostics)
    }
}

fn location(tree: &SyntaxTree, decl: &TypeDeclaration) -> Location {
    Location::from_offset(&tree.path, &tree.source, decl.span.start, decl.span.len)
}

fn untagged_page(tree: &SyntaxTree, decl: &TypeDeclaration) -> Diagnostic {
    Diagnostic::at(
        format!("page `{}` must carry exactly one `{VIEW_PATH_ATTRIBUTE}` path", decl.name),
        location(tree, decl),
    )
}

fn lower(block: &Block) -> Vec<Instr> {
    block
        .iter()
        .map(|stmt| match stmt {
            Statement::Write(text) => Instr::Write(text.clone()),
            Statement::Emit(path) => Instr::Emit(path.segments.clone()),
            Statement::If { cond, negate, then, otherwise } => Instr::If {
                cond: cond.segments.clone(),
                negate: *negate,
                then: lower(then),
                otherwise: otherwise.as_ref().map(lower).unwrap_or_default(),
            },
            Statement::For { binding, source, body } => Instr::For {
                binding: binding.clone(),
                source: source.segments.clone(),
                body: lower(body),
            },
        })
        .collect()
}

/// Pretty JSON mapping each template to its types and rewritten source.
pub fn debug_info(compilation: &Compilation, name: &str) -> Result<Vec<u8>, serde_json::Error> {
    let info = DebugInfo {
        module: name,
        sources: compilation
            .syntax_trees()
            .iter()
            .map(|tree| DebugSource {
                path: &tree.path,
                types: tree.root.types.iter().map(|d| d.name.as_str()).collect(),
                code: print_unit(&tree.root),
            })
            .collect(),
    };
    serde_json::to_vec_pretty(&info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::syntax::parse;
    use crate::module::host_module;

    fn compilation(sources: &[(&str, &str)]) -> Compilation {
        let trees = sources.iter().map(|(p, s)| parse(p, s).unwrap()).collect();
        Compilation::create(trees, vec![host_module()])
    }

    #[test]
    fn test_emit_lowers_types() {
        let c = compilation(&[(
            "a.tpl",
            "#[ViewPath(\"a.tpl\")]\nclass A : Page { render { if !model.x { write \"n\"; } } }\ninterface I {}",
        )]);
        let module = emit(&c, "out").unwrap();
        assert_eq!(module.name, "out");
        assert_eq!(module.types.len(), 2);
        assert_eq!(module.types[0].view_path(), Some("a.tpl"));
        assert_eq!(
            module.types[0].body,
            vec![Instr::If {
                cond: vec!["model".into(), "x".into()],
                negate: true,
                then: vec![Instr::Write("n".into())],
                otherwise: Vec::new(),
            }]
        );
        assert_eq!(module.types[1].kind, TypeKind::Interface);
    }

    #[test]
    fn test_emit_requires_tag_on_pages() {
        let c = compilation(&[("a.tpl", "class A : Page {}")]);
        let diags = emit(&c, "out").unwrap_err();
        assert_eq!(diags[0].message, "page `A` must carry exactly one `ViewPath` path");
    }

    #[test]
    fn test_emit_accepts_layout_beside_view() {
        let c = compilation(&[(
            "a.tpl",
            "#[ViewPath(\"a.tpl\")]\nclass A : Layout {}\nclass Layout : Page {}",
        )]);
        let module = emit(&c, "out").unwrap();
        let tagged: Vec<_> = module.tagged_types().map(|(p, t)| (p, t.name.as_str())).collect();
        assert_eq!(tagged, vec![("a.tpl", "A")]);
    }

    #[test]
    fn test_emit_rejects_malformed_tag() {
        let c = compilation(&[("a.tpl", "#[ViewPath(\"a.tpl\", \"b.tpl\")]\nclass A : Page {}")]);
        let diags = emit(&c, "out").unwrap_err();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "page `A` must carry exactly one `ViewPath` path");
    }

    #[test]
    fn test_emit_rejects_colliding_paths() {
        let c = compilation(&[
            ("a.tpl", "#[ViewPath(\"Home/A.tpl\")]\nclass A : Page {}"),
            ("b.tpl", "#[ViewPath(\"home/a.tpl\")]\nclass B : Page {}"),
        ]);
        let diags = emit(&c, "out").unwrap_err();
        assert!(diags[0].message.contains("claimed by both `A` and `B`"));
    }

    #[test]
    fn test_debug_info_lists_sources() {
        let c = compilation(&[("a.tpl", "class A {}")]);
        let json: serde_json::Value = serde_json::from_slice(&debug_info(&c, "out").unwrap()).unwrap();
        assert_eq!(json["module"], "out");
        assert_eq!(json["sources"][0]["path"], "a.tpl");
        assert_eq!(json["sources"][0]["types"][0], "A");
        assert!(json["sources"][0]["code"].as_str().unwrap().starts_with("class A {"));
    }
}
