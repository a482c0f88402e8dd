//! Path tagging: attach `#[ViewPath("<template path>")]` to page classes.

use super::semantic::SemanticModel;
use super::syntax::{AttributeSyntax, CompilationUnit, DeclarationKind, Span, SyntaxTree, TypeDeclaration};
use crate::module::{PAGE_CAPABILITY, TypeKind, VIEW_PATH_ATTRIBUTE};

/// Rewrites one tree using a semantic model of the pre-rewrite compilation.
///
/// Only metadata changes. The first class of the unit whose bases reach the
/// page capability is the unit's view: it gets exactly one `ViewPath`
/// attribute carrying the tree's template path, replacing any present. Later
/// page classes in the same unit (layouts declared alongside the view) lose
/// any `ViewPath` they carry, so one template path never names two types.
/// Other types are returned unchanged.
pub struct PathTagRewriter<'a> {
    model: SemanticModel<'a>,
}

impl<'a> PathTagRewriter<'a> {
    pub fn new(model: SemanticModel<'a>) -> Self {
        Self { model }
    }

    pub fn rewrite(&self) -> SyntaxTree {
        let tree = self.model.syntax_tree();
        let mut view_tagged = false;
        let types = tree
            .root
            .types
            .iter()
            .map(|decl| {
                if !self.is_page_class(decl) {
                    return decl.clone();
                }

                let mut untagged = decl.clone();
                untagged.attributes.retain(|a| a.name != VIEW_PATH_ATTRIBUTE);
                if view_tagged {
                    return untagged;
                }
                view_tagged = true;
                untagged.add_attribute(AttributeSyntax {
                    name: VIEW_PATH_ATTRIBUTE.to_owned(),
                    args: vec![tree.path.clone()],
                    span: Span::default(),
                })
            })
            .collect();

        SyntaxTree {
            path: tree.path.clone(),
            source: tree.source.clone(),
            root: CompilationUnit { types },
        }
    }

    fn is_page_class(&self, decl: &TypeDeclaration) -> bool {
        decl.kind == DeclarationKind::Class
            && self
                .model
                .declared_symbol(decl)
                .is_some_and(|s| s.kind == TypeKind::Class)
            && self.model.base_implements(decl, PAGE_CAPABILITY)
    }
}
