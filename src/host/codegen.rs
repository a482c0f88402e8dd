//! Lower parsed templates into intermediate source.

use super::parser::{Node, Template};
use crate::compiler::syntax::{
    Block, CompilationUnit, DeclarationKind, PathExpr, Span, Statement, TypeDeclaration, TypeRef,
    print_unit,
};
use crate::module::PAGE_BASE;

/// Derive the generated class name from a template-relative path.
///
/// Every non-alphanumeric character becomes `_` in a readable stem, and the
/// replaced characters follow as hex code points after `__`:
/// `Home/Index.tpl` becomes `View_Home_Index_tpl__2f_2e`. The stem holds `k`
/// underscores and the suffix `k + 1` more, so the split point is fixed and
/// distinct paths always get distinct names.
pub fn class_name_for(relative_path: &str) -> String {
    let mut stem = String::from("View_");
    let mut replaced = Vec::new();
    for c in relative_path.chars() {
        if c.is_ascii_alphanumeric() {
            stem.push(c);
        } else {
            stem.push('_');
            replaced.push(format!("{:x}", u32::from(c)));
        }
    }
    if replaced.is_empty() {
        return stem;
    }
    format!("{stem}__{}", replaced.join("_"))
}

/// Render the page class for one template.
pub fn generate(relative_path: &str, application: &str, template: Template) -> String {
    let decl = TypeDeclaration {
        attributes: Vec::new(),
        kind: DeclarationKind::Class,
        name: class_name_for(relative_path),
        bases: vec![TypeRef {
            name: template.inherits.unwrap_or_else(|| PAGE_BASE.to_owned()),
            span: Span::default(),
        }],
        render: Some(lower(template.nodes)),
        span: Span::default(),
    };

    let header = format!(
        "// Generated from `{}` for application `{}`.\n",
        relative_path.replace(['\n', '\r'], " "),
        application.replace(['\n', '\r'], " "),
    );
    header + &print_unit(&CompilationUnit { types: vec![decl] })
}

fn lower(nodes: Vec<Node>) -> Block {
    nodes.into_iter().map(lower_node).collect()
}

fn lower_node(node: Node) -> Statement {
    match node {
        Node::Text(text) => Statement::Write(text),
        Node::Emit(segments) => Statement::Emit(path(segments)),
        Node::If { cond, negate, then, otherwise } => Statement::If {
            cond: path(cond),
            negate,
            then: lower(then),
            otherwise: otherwise.map(lower),
        },
        Node::For { binding, source, body } => Statement::For {
            binding,
            source: path(source),
            body: lower(body),
        },
    }
}

fn path(segments: Vec<String>) -> PathExpr {
    PathExpr {
        segments,
        span: Span::default(),
    }
}
