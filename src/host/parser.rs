//! Template markup parser.
//!
//! Produces a node tree plus every diagnostic found in the file. Parsing keeps
//! going after an error so one pass reports all problems in a template.

use crate::diagnostic::{Diagnostic, Location};

const DIRECTIVES: &str = "if, else, endif, for, endfor, inherits";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Emit(Vec<String>),
    If {
        cond: Vec<String>,
        negate: bool,
        then: Vec<Node>,
        otherwise: Option<Vec<Node>>,
    },
    For {
        binding: String,
        source: Vec<String>,
        body: Vec<Node>,
    },
}

/// Parsed template: body nodes and the declared base type, if any.
#[derive(Debug, Default)]
pub struct Template {
    pub nodes: Vec<Node>,
    pub inherits: Option<String>,
}

/// An open `if` or `for` block awaiting its end tag.
enum Frame {
    If {
        cond: Vec<String>,
        negate: bool,
        then: Vec<Node>,
        otherwise: Option<Vec<Node>>,
        opened_at: Location,
    },
    For {
        binding: String,
        source: Vec<String>,
        body: Vec<Node>,
        opened_at: Location,
    },
}

impl Frame {
    fn children(&mut self) -> &mut Vec<Node> {
        match self {
            Frame::If { then, otherwise, .. } => otherwise.as_mut().unwrap_or(then),
            Frame::For { body, .. } => body,
        }
    }
}

pub fn parse(path: &str, source: &str) -> (Template, Vec<Diagnostic>) {
    let mut parser = TemplateParser {
        path,
        source,
        root: Vec::new(),
        stack: Vec::new(),
        inherits: None,
        diagnostics: Vec::new(),
    };
    parser.run();
    parser.finish()
}

struct TemplateParser<'a> {
    path: &'a str,
    source: &'a str,
    root: Vec<Node>,
    stack: Vec<Frame>,
    inherits: Option<String>,
    diagnostics: Vec<Diagnostic>,
}

impl TemplateParser<'_> {
    fn location(&self, start: usize, len: usize) -> Location {
        Location::from_offset(self.path, self.source, start, len)
    }

    fn error(&mut self, message: impl Into<String>, start: usize, len: usize) {
        let location = self.location(start, len);
        self.diagnostics.push(Diagnostic::at(message, location));
    }

    fn push(&mut self, node: Node) {
        let target = match self.stack.last_mut() {
            Some(frame) => frame.children(),
            None => &mut self.root,
        };
        if let (Node::Text(text), Some(Node::Text(prev))) = (&node, target.last_mut()) {
            prev.push_str(text);
            return;
        }
        target.push(node);
    }

    fn run(&mut self) {
        let mut pos = 0;
        while pos < self.source.len() {
            let rest = &self.source[pos..];
            let Some(open) = ["{{", "{%", "{#"]
                .iter()
                .filter_map(|delim| rest.find(delim))
                .min()
            else {
                self.push(Node::Text(rest.to_owned()));
                break;
            };

            if open > 0 {
                self.push(Node::Text(rest[..open].to_owned()));
            }

            let start = pos + open;
            let opener = &self.source[start..start + 2];
            let closer = match opener {
                "{{" => "}}",
                "{%" => "%}",
                _ => "#}",
            };
            let inner_start = start + 2;
            let Some(close) = self.source[inner_start..].find(closer) else {
                let line_len = self.source[start..].find('\n').unwrap_or(self.source.len() - start);
                self.diagnostics.push(
                    Diagnostic::at(
                        format!("unclosed tag `{opener}`"),
                        self.location(start, line_len),
                    )
                    .with_hint(format!("add the closing `{closer}`")),
                );
                break;
            };

            let inner = &self.source[inner_start..inner_start + close];
            let end = inner_start + close + 2;
            match opener {
                "{{" => self.expression(inner, start, end - start),
                "{%" => self.directive(inner, start, end - start),
                _ => {}
            }
            pos = end;
        }
    }

    fn expression(&mut self, inner: &str, start: usize, len: usize) {
        match parse_path(inner.trim()) {
            Some(path) => self.push(Node::Emit(path)),
            None => self.error(format!("invalid expression `{}`", inner.trim()), start, len),
        }
    }

    fn directive(&mut self, inner: &str, start: usize, len: usize) {
        let words: Vec<&str> = inner.split_whitespace().collect();
        let location = self.location(start, len);

        match words.as_slice() {
            ["if", "not", path] | ["if", path] => {
                let negate = words.len() == 3;
                let Some(cond) = parse_path(path) else {
                    return self.error(format!("invalid expression `{path}`"), start, len);
                };
                self.stack.push(Frame::If {
                    cond,
                    negate,
                    then: Vec::new(),
                    otherwise: None,
                    opened_at: location,
                });
            }
            ["else"] => {
                let result = match self.stack.last_mut() {
                    Some(Frame::If { otherwise: otherwise @ None, .. }) => {
                        *otherwise = Some(Vec::new());
                        Ok(())
                    }
                    Some(Frame::If { .. }) => Err("duplicate `{% else %}`"),
                    _ => Err("`{% else %}` without an open `{% if %}`"),
                };
                if let Err(message) = result {
                    self.error(message, start, len);
                }
            }
            ["endif"] => match self.stack.pop() {
                Some(Frame::If { cond, negate, then, otherwise, .. }) => {
                    self.push(Node::If { cond, negate, then, otherwise });
                }
                other => {
                    self.stack.extend(other);
                    self.error("`{% endif %}` without an open `{% if %}`", start, len);
                }
            },
            ["for", binding, "in", path] => {
                let Some(source) = parse_path(path) else {
                    return self.error(format!("invalid expression `{path}`"), start, len);
                };
                if !is_ident(binding) {
                    return self.error(format!("invalid loop variable `{binding}`"), start, len);
                }
                self.stack.push(Frame::For {
                    binding: (*binding).to_owned(),
                    source,
                    body: Vec::new(),
                    opened_at: location,
                });
            }
            ["endfor"] => match self.stack.pop() {
                Some(Frame::For { binding, source, body, .. }) => {
                    self.push(Node::For { binding, source, body });
                }
                other => {
                    self.stack.extend(other);
                    self.error("`{% endfor %}` without an open `{% for %}`", start, len);
                }
            },
            ["inherits", name] => {
                if !self.stack.is_empty() {
                    self.error("`{% inherits %}` must appear at the top level", start, len);
                } else if self.inherits.is_some() {
                    self.error("duplicate `{% inherits %}`", start, len);
                } else if parse_path(name).is_none() {
                    self.error(format!("invalid type name `{name}`"), start, len);
                } else {
                    self.inherits = Some((*name).to_owned());
                }
            }
            [keyword, ..] if is_directive(keyword) => {
                self.error(format!("malformed `{{% {keyword} %}}` directive"), start, len);
            }
            _ => {
                let name = words.first().copied().unwrap_or_default();
                self.diagnostics.push(
                    Diagnostic::at(format!("unknown directive `{name}`"), location)
                        .with_hint(format!("expected one of: {DIRECTIVES}")),
                );
            }
        }
    }

    fn finish(mut self) -> (Template, Vec<Diagnostic>) {
        while let Some(frame) = self.stack.pop() {
            let (what, opened_at) = match frame {
                Frame::If { opened_at, .. } => ("if", opened_at),
                Frame::For { opened_at, .. } => ("for", opened_at),
            };
            self.diagnostics.push(
                Diagnostic::at(format!("unclosed `{{% {what} %}}` block"), opened_at)
                    .with_hint(format!("add `{{% end{what} %}}`")),
            );
        }

        let template = Template {
            nodes: self.root,
            inherits: self.inherits,
        };
        (template, self.diagnostics)
    }
}

fn is_directive(word: &str) -> bool {
    matches!(word, "if" | "else" | "endif" | "for" | "endfor" | "inherits")
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split `a.b.c` into segments, rejecting anything that is not a dotted path.
fn parse_path(s: &str) -> Option<Vec<String>> {
    let segments: Vec<_> = s.split('.').collect();
    segments
        .iter()
        .all(|seg| is_ident(seg))
        .then(|| segments.into_iter().map(str::to_owned).collect())
}
