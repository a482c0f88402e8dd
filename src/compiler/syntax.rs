//! Syntax of the intermediate view language.
//!
//! The template host emits this language and the compilation engine parses it
//! back into trees, so both sides agree on one grammar:
//!
//! ```text
//! unit      := type_decl*
//! type_decl := attribute* ("class" | "interface") NAME (":" NAME ("," NAME)*)? "{" ("render" block)? "}"
//! attribute := "#" "[" NAME ("(" STRING ("," STRING)* ")")? "]"
//! block     := "{" stmt* "}"
//! stmt      := "write" STRING ";" | "emit" path ";"
//!            | "if" "!"? path block ("else" block)?
//!            | "for" IDENT "in" path block
//! ```
//!
//! Trees are immutable values; the path-tag rewriter produces new trees and
//! [`print_unit`] turns any tree back into source.

use std::fmt::Write;

use crate::diagnostic::{Diagnostic, Location};

// ============================================================================
// Tree
// ============================================================================

/// Byte range in the generated source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

/// One parsed compilation unit, keyed by the template path it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxTree {
    /// Template-relative path of the originating view
    pub path: String,
    pub source: String,
    pub root: CompilationUnit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilationUnit {
    pub types: Vec<TypeDeclaration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Class,
    Interface,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDeclaration {
    pub attributes: Vec<AttributeSyntax>,
    pub kind: DeclarationKind,
    pub name: String,
    pub bases: Vec<TypeRef>,
    pub render: Option<Block>,
    pub span: Span,
}

impl TypeDeclaration {
    /// Return a copy with one more attribute list entry.
    pub fn add_attribute(&self, attribute: AttributeSyntax) -> Self {
        let mut node = self.clone();
        node.attributes.push(attribute);
        node
    }
}

/// A type name used in a base list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSyntax {
    pub name: String,
    pub args: Vec<String>,
    pub span: Span,
}

pub type Block = Vec<Statement>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Write(String),
    Emit(PathExpr),
    If {
        cond: PathExpr,
        negate: bool,
        then: Block,
        otherwise: Option<Block>,
    },
    For {
        binding: String,
        source: PathExpr,
        body: Block,
    },
}

/// Dotted value path such as `model.user.name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    pub segments: Vec<String>,
    pub span: Span,
}

impl PathExpr {
    pub fn root(&self) -> &str {
        self.segments.first().map_or("", String::as_str)
    }

    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Punct(char),
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("`{name}`"),
            Token::Str(_) => "string literal".into(),
            Token::Punct(c) => format!("`{c}`"),
            Token::Eof => "end of file".into(),
        }
    }
}

const PUNCTUATION: &[char] = &['{', '}', '(', ')', '[', ']', ':', ';', ',', '.', '#', '!'];

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_trivia(&mut self) {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();
            if trimmed.starts_with("//") {
                self.pos += trimmed.find('\n').unwrap_or(trimmed.len());
            } else {
                break;
            }
        }
    }

    /// Lex the next token, returning it with its span.
    fn next(&mut self) -> Result<(Token, Span), (String, Span)> {
        self.skip_trivia();
        let start = self.pos;
        let Some(c) = self.rest().chars().next() else {
            return Ok((Token::Eof, Span { start, len: 0 }));
        };

        if c.is_ascii_alphabetic() || c == '_' {
            let len = self
                .rest()
                .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                .unwrap_or(self.rest().len());
            self.pos += len;
            return Ok((Token::Ident(self.src[start..self.pos].to_owned()), Span { start, len }));
        }

        if c == '"' {
            return self.string(start);
        }

        if PUNCTUATION.contains(&c) {
            self.pos += 1;
            return Ok((Token::Punct(c), Span { start, len: 1 }));
        }

        Err((format!("unexpected character `{c}`"), Span { start, len: c.len_utf8() }))
    }

    fn string(&mut self, start: usize) -> Result<(Token, Span), (String, Span)> {
        let mut value = String::new();
        let mut chars = self.src[start + 1..].char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos = start + 1 + i + 1;
                    let len = self.pos - start;
                    return Ok((Token::Str(value), Span { start, len }));
                }
                '\\' => {
                    let escaped = match chars.next() {
                        Some((_, 'n')) => '\n',
                        Some((_, 'r')) => '\r',
                        Some((_, 't')) => '\t',
                        Some((_, '"')) => '"',
                        Some((_, '\\')) => '\\',
                        Some((j, other)) => {
                            let at = start + 1 + j;
                            return Err((
                                format!("unknown escape sequence `\\{other}`"),
                                Span { start: at, len: other.len_utf8() },
                            ));
                        }
                        None => break,
                    };
                    value.push(escaped);
                }
                _ => value.push(c),
            }
        }
        Err((
            "unterminated string literal".into(),
            Span { start, len: self.src.len() - start },
        ))
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Parse generated source into a syntax tree.
///
/// The parser stops at the first error; generated code is machine-written,
/// so one precise diagnostic is more useful than recovery.
pub fn parse(path: &str, source: &str) -> Result<SyntaxTree, Diagnostic> {
    let mut parser = Parser::new(path, source)?;
    let mut types = Vec::new();
    while parser.peek != Token::Eof {
        types.push(parser.type_declaration()?);
    }
    Ok(SyntaxTree {
        path: path.to_owned(),
        source: source.to_owned(),
        root: CompilationUnit { types },
    })
}

struct Parser<'a> {
    path: &'a str,
    source: &'a str,
    lexer: Lexer<'a>,
    peek: Token,
    peek_span: Span,
}

impl<'a> Parser<'a> {
    fn new(path: &'a str, source: &'a str) -> Result<Self, Diagnostic> {
        let mut parser = Self {
            path,
            source,
            lexer: Lexer::new(source),
            peek: Token::Eof,
            peek_span: Span::default(),
        };
        parser.advance()?;
        Ok(parser)
    }

    fn error(&self, message: impl Into<String>, span: Span) -> Diagnostic {
        Diagnostic::at(
            message,
            Location::from_offset(self.path, self.source, span.start, span.len),
        )
    }

    /// Consume the current token and lex the next one.
    fn advance(&mut self) -> Result<(Token, Span), Diagnostic> {
        let next = self
            .lexer
            .next()
            .map_err(|(message, span)| self.error(message, span))?;
        let prev_span = std::mem::replace(&mut self.peek_span, next.1);
        let prev = std::mem::replace(&mut self.peek, next.0);
        Ok((prev, prev_span))
    }

    fn unexpected(&self, expected: &str) -> Diagnostic {
        self.error(
            format!("expected {expected}, found {}", self.peek.describe()),
            self.peek_span,
        )
    }

    fn at_punct(&self, c: char) -> bool {
        self.peek == Token::Punct(c)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek, Token::Ident(name) if name == keyword)
    }

    fn expect_punct(&mut self, c: char) -> Result<Span, Diagnostic> {
        if self.at_punct(c) {
            Ok(self.advance()?.1)
        } else {
            Err(self.unexpected(&format!("`{c}`")))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<Span, Diagnostic> {
        if self.at_keyword(keyword) {
            Ok(self.advance()?.1)
        } else {
            Err(self.unexpected(&format!("`{keyword}`")))
        }
    }

    fn ident(&mut self) -> Result<(String, Span), Diagnostic> {
        match &self.peek {
            Token::Ident(_) => match self.advance()? {
                (Token::Ident(name), span) => Ok((name, span)),
                _ => unreachable!("peeked an identifier"),
            },
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn string(&mut self) -> Result<String, Diagnostic> {
        match &self.peek {
            Token::Str(_) => match self.advance()? {
                (Token::Str(value), _) => Ok(value),
                _ => unreachable!("peeked a string"),
            },
            _ => Err(self.unexpected("string literal")),
        }
    }

    /// `ident ("." ident)*` with the covering span.
    fn dotted(&mut self) -> Result<(Vec<String>, Span), Diagnostic> {
        let (first, span) = self.ident()?;
        let mut segments = vec![first];
        let mut end = span.start + span.len;
        while self.at_punct('.') {
            self.advance()?;
            let (segment, seg_span) = self.ident()?;
            end = seg_span.start + seg_span.len;
            segments.push(segment);
        }
        Ok((segments, Span { start: span.start, len: end - span.start }))
    }

    fn type_declaration(&mut self) -> Result<TypeDeclaration, Diagnostic> {
        let mut attributes = Vec::new();
        while self.at_punct('#') {
            attributes.push(self.attribute()?);
        }

        let kind = if self.at_keyword("class") {
            DeclarationKind::Class
        } else if self.at_keyword("interface") {
            DeclarationKind::Interface
        } else {
            return Err(self.unexpected("`class` or `interface`"));
        };
        self.advance()?;

        let (segments, span) = self.dotted()?;
        let mut bases = Vec::new();
        if self.at_punct(':') {
            self.advance()?;
            loop {
                let (name, span) = self.dotted()?;
                bases.push(TypeRef { name: name.join("."), span });
                if !self.at_punct(',') {
                    break;
                }
                self.advance()?;
            }
        }

        self.expect_punct('{')?;
        let mut render = None;
        while !self.at_punct('}') {
            if self.at_keyword("render") {
                if render.is_some() {
                    return Err(self.error("duplicate `render` member", self.peek_span));
                }
                self.advance()?;
                render = Some(self.block()?);
            } else {
                return Err(self.unexpected("`render` or `}`"));
            }
        }
        self.expect_punct('}')?;

        Ok(TypeDeclaration {
            attributes,
            kind,
            name: segments.join("."),
            bases,
            render,
            span,
        })
    }

    fn attribute(&mut self) -> Result<AttributeSyntax, Diagnostic> {
        let start = self.expect_punct('#')?.start;
        self.expect_punct('[')?;
        let (name, _) = self.dotted()?;
        let mut args = Vec::new();
        if self.at_punct('(') {
            self.advance()?;
            while !self.at_punct(')') {
                args.push(self.string()?);
                if !self.at_punct(',') {
                    break;
                }
                self.advance()?;
            }
            self.expect_punct(')')?;
        }
        let end = self.expect_punct(']')?;
        Ok(AttributeSyntax {
            name: name.join("."),
            args,
            span: Span { start, len: end.start + 1 - start },
        })
    }

    fn block(&mut self) -> Result<Block, Diagnostic> {
        self.expect_punct('{')?;
        let mut statements = Vec::new();
        while !self.at_punct('}') {
            statements.push(self.statement()?);
        }
        self.expect_punct('}')?;
        Ok(statements)
    }

    fn path(&mut self) -> Result<PathExpr, Diagnostic> {
        let (segments, span) = self.dotted()?;
        Ok(PathExpr { segments, span })
    }

    fn statement(&mut self) -> Result<Statement, Diagnostic> {
        let keyword = match &self.peek {
            Token::Ident(name) => name.clone(),
            _ => return Err(self.unexpected("statement")),
        };
        match keyword.as_str() {
            "write" => {
                self.advance()?;
                let text = self.string()?;
                self.expect_punct(';')?;
                Ok(Statement::Write(text))
            }
            "emit" => {
                self.advance()?;
                let path = self.path()?;
                self.expect_punct(';')?;
                Ok(Statement::Emit(path))
            }
            "if" => {
                self.advance()?;
                let negate = self.at_punct('!');
                if negate {
                    self.advance()?;
                }
                let cond = self.path()?;
                let then = self.block()?;
                let otherwise = if self.at_keyword("else") {
                    self.advance()?;
                    Some(self.block()?)
                } else {
                    None
                };
                Ok(Statement::If { cond, negate, then, otherwise })
            }
            "for" => {
                self.advance()?;
                let (binding, _) = self.ident()?;
                self.expect_keyword("in")?;
                let source = self.path()?;
                let body = self.block()?;
                Ok(Statement::For { binding, source, body })
            }
            _ => Err(self.unexpected("`write`, `emit`, `if` or `for`")),
        }
    }
}

// ============================================================================
// Printer
// ============================================================================

const INDENT: &str = "    ";

/// Render a compilation unit back into source text.
pub fn print_unit(unit: &CompilationUnit) -> String {
    let mut out = String::new();
    for (i, decl) in unit.types.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        print_type(&mut out, decl);
    }
    out
}

fn print_type(out: &mut String, decl: &TypeDeclaration) {
    for attr in &decl.attributes {
        out.push_str("#[");
        out.push_str(&attr.name);
        if !attr.args.is_empty() {
            let args: Vec<_> = attr.args.iter().map(|a| quote(a)).collect();
            _ = write!(out, "({})", args.join(", "));
        }
        out.push_str("]\n");
    }

    let keyword = match decl.kind {
        DeclarationKind::Class => "class",
        DeclarationKind::Interface => "interface",
    };
    _ = write!(out, "{keyword} {}", decl.name);
    if !decl.bases.is_empty() {
        let bases: Vec<_> = decl.bases.iter().map(|b| b.name.as_str()).collect();
        _ = write!(out, " : {}", bases.join(", "));
    }
    out.push_str(" {\n");
    if let Some(render) = &decl.render {
        _ = write!(out, "{INDENT}render ");
        print_block(out, render, 1);
        out.push('\n');
    }
    out.push_str("}\n");
}

fn print_block(out: &mut String, block: &Block, depth: usize) {
    out.push_str("{\n");
    for stmt in block {
        print_statement(out, stmt, depth + 1);
    }
    out.push_str(&INDENT.repeat(depth));
    out.push('}');
}

fn print_statement(out: &mut String, stmt: &Statement, depth: usize) {
    let pad = INDENT.repeat(depth);
    match stmt {
        Statement::Write(text) => _ = writeln!(out, "{pad}write {};", quote(text)),
        Statement::Emit(path) => _ = writeln!(out, "{pad}emit {};", path.dotted()),
        Statement::If { cond, negate, then, otherwise } => {
            let bang = if *negate { "!" } else { "" };
            _ = write!(out, "{pad}if {bang}{} ", cond.dotted());
            print_block(out, then, depth);
            if let Some(otherwise) = otherwise {
                out.push_str(" else ");
                print_block(out, otherwise, depth);
            }
            out.push('\n');
        }
        Statement::For { binding, source, body } => {
            _ = write!(out, "{pad}for {binding} in {} ", source.dotted());
            print_block(out, body, depth);
            out.push('\n');
        }
    }
}

/// Quote a string literal with the escapes the lexer understands.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
// Generated from `Home/Index.tpl`.
class View_Home_Index_tpl : Page {
    render {
        write "<h1>\"hi\"</h1>\n";
        emit model.title;
        if !model.hidden {
            for item in model.items {
                emit item.name;
            }
        } else {
            write "hidden";
        }
    }
}
"#;

    #[test]
    fn test_parse_page() {
        let tree = parse("Home/Index.tpl", PAGE).unwrap();
        assert_eq!(tree.root.types.len(), 1);

        let decl = &tree.root.types[0];
        assert_eq!(decl.name, "View_Home_Index_tpl");
        assert_eq!(decl.kind, DeclarationKind::Class);
        assert_eq!(decl.bases[0].name, "Page");

        let render = decl.render.as_ref().unwrap();
        assert_eq!(render[0], Statement::Write("<h1>\"hi\"</h1>\n".into()));
        match &render[2] {
            Statement::If { negate, cond, otherwise, .. } => {
                assert!(*negate);
                assert_eq!(cond.dotted(), "model.hidden");
                assert!(otherwise.is_some());
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_attributes_and_multiple_bases() {
        let source = "#[ViewPath(\"a/b.tpl\")]\n#[Marker]\nclass Shop.Views.A : Shop.Base, TemplatePage {}\ninterface I {}";
        let tree = parse("a/b.tpl", source).unwrap();
        let decl = &tree.root.types[0];
        assert_eq!(decl.name, "Shop.Views.A");
        assert_eq!(decl.attributes.len(), 2);
        assert_eq!(decl.attributes[0].args, vec!["a/b.tpl".to_string()]);
        assert!(decl.attributes[1].args.is_empty());
        let bases: Vec<_> = decl.bases.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(bases, vec!["Shop.Base", "TemplatePage"]);
        assert_eq!(tree.root.types[1].kind, DeclarationKind::Interface);
        assert!(tree.root.types[1].render.is_none());
    }

    #[test]
    fn test_parse_error_location() {
        let source = "class A : Page {\n    render {\n        emit ;\n    }\n}";
        let err = parse("x.tpl", source).unwrap_err();
        let loc = err.location.unwrap();
        assert_eq!(loc.line, 3);
        assert_eq!(loc.column, 14);
        assert!(err.message.contains("expected identifier"));
    }

    #[test]
    fn test_parse_unterminated_string() {
        let err = parse("x.tpl", "class A { render { write \"oops } }").unwrap_err();
        assert!(err.message.contains("unterminated string literal"));
    }

    #[test]
    fn test_print_then_parse_is_stable() {
        let tree = parse("Home/Index.tpl", PAGE).unwrap();
        let printed = print_unit(&tree.root);
        let reparsed = parse("Home/Index.tpl", &printed).unwrap();
        assert_eq!(print_unit(&reparsed.root), printed);
        assert!(printed.contains("if !model.hidden {"));
        assert!(printed.contains("write \"<h1>\\\"hi\\\"</h1>\\n\";"));
    }

    #[test]
    fn test_add_attribute_keeps_original() {
        let tree = parse("a.tpl", "class A : Page {}").unwrap();
        let decl = &tree.root.types[0];
        let tagged = decl.add_attribute(AttributeSyntax {
            name: "ViewPath".into(),
            args: vec!["a.tpl".into()],
            span: Span::default(),
        });
        assert!(decl.attributes.is_empty());
        assert_eq!(tagged.attributes.len(), 1);
        assert!(print_unit(&CompilationUnit { types: vec![tagged] })
            .starts_with("#[ViewPath(\"a.tpl\")]\nclass A : Page {"));
    }
}
