//! Symbol table and semantic checks for a compilation.
//!
//! A [`Compilation`] is an immutable value: replacing a syntax tree yields a new
//! compilation, so a [`SemanticModel`] taken earlier keeps reading the trees it
//! was created from.

use rustc_hash::{FxHashMap, FxHashSet};

use super::syntax::{Block, DeclarationKind, Span, Statement, SyntaxTree, TypeDeclaration};
use crate::diagnostic::{Diagnostic, Location};
use crate::module::{Module, TypeKind};

/// Where a type was declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Index into [`Compilation::syntax_trees`]
    Source(usize),
    /// Name of the reference module
    Reference(String),
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: TypeKind,
    pub bases: Vec<String>,
    pub origin: Origin,
}

#[derive(Debug, Clone)]
pub struct Compilation {
    trees: Vec<SyntaxTree>,
    references: Vec<Module>,
    symbols: FxHashMap<String, Symbol>,
    declaration_errors: Vec<Diagnostic>,
}

impl Compilation {
    /// Build the symbol table. References are entered first, in order, so the
    /// first reference exporting a name wins.
    pub fn create(trees: Vec<SyntaxTree>, references: Vec<Module>) -> Self {
        let mut symbols: FxHashMap<String, Symbol> = FxHashMap::default();
        let mut declaration_errors = Vec::new();

        for module in &references {
            for ty in &module.types {
                symbols.entry(ty.name.clone()).or_insert_with(|| Symbol {
                    name: ty.name.clone(),
                    kind: ty.kind,
                    bases: ty.bases.clone(),
                    origin: Origin::Reference(module.name.clone()),
                });
            }
        }

        for (index, tree) in trees.iter().enumerate() {
            for decl in &tree.root.types {
                if let Some(existing) = symbols.get(&decl.name) {
                    let message = match &existing.origin {
                        Origin::Source(other) => format!(
                            "type `{}` is already defined in `{}`",
                            decl.name, trees[*other].path
                        ),
                        Origin::Reference(module) => format!(
                            "type `{}` conflicts with a type exported by reference `{module}`",
                            decl.name
                        ),
                    };
                    declaration_errors.push(Diagnostic::at(message, locate(tree, decl.span)));
                    continue;
                }
                symbols.insert(
                    decl.name.clone(),
                    Symbol {
                        name: decl.name.clone(),
                        kind: match decl.kind {
                            DeclarationKind::Class => TypeKind::Class,
                            DeclarationKind::Interface => TypeKind::Interface,
                        },
                        bases: decl.bases.iter().map(|b| b.name.clone()).collect(),
                        origin: Origin::Source(index),
                    },
                );
            }
        }

        Self {
            trees,
            references,
            symbols,
            declaration_errors,
        }
    }

    pub fn syntax_trees(&self) -> &[SyntaxTree] {
        &self.trees
    }

    pub fn references(&self) -> &[Module] {
        &self.references
    }

    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// New compilation with the given trees replaced by index.
    pub fn replace_syntax_trees(
        &self,
        replacements: impl IntoIterator<Item = (usize, SyntaxTree)>,
    ) -> Self {
        let mut trees = self.trees.clone();
        for (index, tree) in replacements {
            trees[index] = tree;
        }
        Self::create(trees, self.references.clone())
    }

    pub fn semantic_model(&self, index: usize) -> SemanticModel<'_> {
        SemanticModel {
            compilation: self,
            tree: &self.trees[index],
        }
    }

    /// Whether `name` is, or transitively derives from, `marker`.
    pub fn implements(&self, name: &str, marker: &str) -> bool {
        let mut seen = FxHashSet::default();
        let mut pending = vec![name];
        while let Some(current) = pending.pop() {
            if current == marker {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(symbol) = self.symbols.get(current) {
                pending.extend(symbol.bases.iter().map(String::as_str));
            }
        }
        false
    }

    /// All declaration and body diagnostics, in tree order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut diagnostics = self.declaration_errors.clone();
        for tree in &self.trees {
            for decl in &tree.root.types {
                self.check_declaration(tree, decl, &mut diagnostics);
            }
        }
        diagnostics
    }

    fn check_declaration(&self, tree: &SyntaxTree, decl: &TypeDeclaration, out: &mut Vec<Diagnostic>) {
        for base in &decl.bases {
            if !self.symbols.contains_key(&base.name) {
                out.push(Diagnostic::at(
                    format!("unresolved base type `{}`", base.name),
                    locate(tree, base.span),
                ));
            }
        }

        if self.in_cycle(&decl.name) {
            out.push(Diagnostic::at(
                format!("cyclic inheritance involving `{}`", decl.name),
                locate(tree, decl.span),
            ));
        }

        for attr in &decl.attributes {
            match self.symbols.get(&attr.name) {
                None => out.push(Diagnostic::at(
                    format!("unresolved attribute `{}`", attr.name),
                    locate(tree, attr.span),
                )),
                Some(symbol) if symbol.kind != TypeKind::Attribute => out.push(Diagnostic::at(
                    format!("`{}` is not an attribute", attr.name),
                    locate(tree, attr.span),
                )),
                Some(_) => {}
            }
        }

        if let Some(render) = &decl.render {
            let mut scope = vec!["model"];
            check_block(tree, render, &mut scope, out);
        }
    }

    /// Whether following bases from `name` leads back to `name`.
    fn in_cycle(&self, name: &str) -> bool {
        let mut seen = FxHashSet::default();
        let mut pending: Vec<&str> = self
            .symbols
            .get(name)
            .map(|s| s.bases.iter().map(String::as_str).collect())
            .unwrap_or_default();
        while let Some(current) = pending.pop() {
            if current == name {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(symbol) = self.symbols.get(current) {
                pending.extend(symbol.bases.iter().map(String::as_str));
            }
        }
        false
    }
}

fn check_block<'a>(
    tree: &SyntaxTree,
    block: &'a Block,
    scope: &mut Vec<&'a str>,
    out: &mut Vec<Diagnostic>,
) {
    for stmt in block {
        let path = match stmt {
            Statement::Write(_) => None,
            Statement::Emit(path) => Some(path),
            Statement::If { cond, .. } => Some(cond),
            Statement::For { source, .. } => Some(source),
        };
        if let Some(path) = path
            && !scope.contains(&path.root())
        {
            out.push(
                Diagnostic::at(
                    format!("cannot find value `{}` in this scope", path.root()),
                    locate(tree, path.span),
                )
                .with_hint("paths start with `model` or a `for` loop variable"),
            );
        }

        match stmt {
            Statement::If { then, otherwise, .. } => {
                check_block(tree, then, scope, out);
                if let Some(otherwise) = otherwise {
                    check_block(tree, otherwise, scope, out);
                }
            }
            Statement::For { binding, body, .. } => {
                scope.push(binding);
                check_block(tree, body, scope, out);
                scope.pop();
            }
            _ => {}
        }
    }
}

fn locate(tree: &SyntaxTree, span: Span) -> Location {
    Location::from_offset(&tree.path, &tree.source, span.start, span.len)
}

/// Read-only view of one tree within a compilation.
#[derive(Clone, Copy)]
pub struct SemanticModel<'a> {
    compilation: &'a Compilation,
    tree: &'a SyntaxTree,
}

impl<'a> SemanticModel<'a> {
    pub fn syntax_tree(&self) -> &'a SyntaxTree {
        self.tree
    }

    pub fn declared_symbol(&self, decl: &TypeDeclaration) -> Option<&'a Symbol> {
        self.compilation.symbol(&decl.name)
    }

    /// Whether any base of `decl` transitively reaches `marker`.
    pub fn base_implements(&self, decl: &TypeDeclaration, marker: &str) -> bool {
        decl.bases
            .iter()
            .any(|base| self.compilation.implements(&base.name, marker))
    }
}
