//! Diagnostics produced while generating and compiling views.
//!
//! Template parse errors and compilation errors share one type so the build
//! can aggregate everything into a single report. Formatting follows the
//! usual compiler layout:
//!
//! ```text
//! error: unclosed `{% if %}` block
//!   ┌─ Home/Index.tpl:3:1
//!   │
//! 3 │ {% if model.visible %}
//!   │ ^^^^^^^^^^^^^^^^^^^^^^
//! ```

use std::fmt::{self, Write};

use colored::{ColoredString, Colorize};

// ============================================================================
// Gutter Characters
// ============================================================================

/// Box-drawing characters for source code display.
mod gutter {
    pub const HEADER: &str = "┌─";
    pub const BAR: &str = "│";
    pub const MARKER: &str = "^";
}

// ============================================================================
// Color Theme
// ============================================================================

#[derive(Clone, Copy)]
struct DiagnosticTheme {
    colorize: fn(&str) -> ColoredString,
}

impl DiagnosticTheme {
    const ERROR: Self = Self {
        colorize: |s| s.red(),
    };
    const HELP: Self = Self {
        colorize: |s| s.cyan(),
    };

    #[inline]
    fn paint(self, text: &str) -> ColoredString {
        (self.colorize)(text)
    }
}

// ============================================================================
// Types
// ============================================================================

/// Resolved source location of a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Template-relative path (forward slashes)
    pub path: String,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column in characters (1-indexed)
    pub column: usize,
    /// Highlighted width in characters
    pub len: usize,
    /// Full text of the line, for snippet display
    pub line_text: String,
}

impl Location {
    /// Resolve a byte range of `source` into a location.
    pub fn from_offset(path: &str, source: &str, offset: usize, len: usize) -> Self {
        let offset = offset.min(source.len());
        let line_start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
        let line_end = source[offset..]
            .find('\n')
            .map_or(source.len(), |i| offset + i);

        let line = source[..offset].matches('\n').count() + 1;
        let column = source[line_start..offset].chars().count() + 1;
        let end = (offset + len).min(line_end);
        let width = source
            .get(offset..end)
            .map_or(1, |s| s.chars().count().max(1));

        Self {
            path: path.to_owned(),
            line,
            column,
            len: width,
            line_text: source[line_start..line_end].trim_end_matches('\r').to_owned(),
        }
    }
}

/// A single error produced while generating or compiling a view.
///
/// Carries no severity: every diagnostic fails the unit it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub location: Option<Location>,
    pub hints: Vec<String>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            hints: Vec::new(),
        }
    }

    pub fn at(message: impl Into<String>, location: Location) -> Self {
        Self {
            message: message.into(),
            location: Some(location),
            hints: Vec::new(),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}:{}:{}: {}", loc.path, loc.line, loc.column, self.message),
            None => f.write_str(&self.message),
        }
    }
}

// ============================================================================
// Snippet Writer
// ============================================================================

struct SnippetWriter<'a> {
    output: &'a mut String,
    theme: DiagnosticTheme,
    line_num_width: usize,
}

impl<'a> SnippetWriter<'a> {
    fn new(output: &'a mut String, theme: DiagnosticTheme, line: usize) -> Self {
        Self {
            output,
            theme,
            line_num_width: line.to_string().len().max(1),
        }
    }

    /// Write the location header: "  ┌─ path:line:col"
    fn write_header(&mut self, path: &str, line: usize, col: usize) {
        _ = writeln!(
            self.output,
            "{:>width$} {} {}:{}:{}",
            "",
            self.theme.paint(gutter::HEADER),
            path,
            line,
            col,
            width = self.line_num_width
        );
    }

    /// Write an empty gutter line: "  │"
    fn write_empty_gutter(&mut self) {
        _ = writeln!(
            self.output,
            "{:>width$} {}",
            "",
            self.theme.paint(gutter::BAR),
            width = self.line_num_width
        );
    }

    fn write_source_line(&mut self, line_num: usize, line_text: &str) {
        let line_num_str = format!("{:>width$}", line_num, width = self.line_num_width);
        _ = writeln!(
            self.output,
            "{} {} {}",
            self.theme.paint(&line_num_str),
            self.theme.paint(gutter::BAR),
            line_text
        );
    }

    /// Write marker line: "  │   ^^^^"
    fn write_marker(&mut self, column: usize, len: usize) {
        let spaces = " ".repeat(column.saturating_sub(1));
        let markers = gutter::MARKER.repeat(len.max(1));
        _ = writeln!(
            self.output,
            "{:>width$} {} {}{}",
            "",
            self.theme.paint(gutter::BAR),
            spaces,
            self.theme.paint(&markers),
            width = self.line_num_width
        );
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Format diagnostics into one human-readable report.
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let mut output = String::new();
    for diag in diagnostics {
        format_diagnostic(&mut output, diag);
    }
    output
}

fn format_diagnostic(output: &mut String, diag: &Diagnostic) {
    let theme = DiagnosticTheme::ERROR;

    _ = writeln!(output, "{}: {}", theme.paint("error"), diag.message);

    if let Some(loc) = &diag.location {
        let mut writer = SnippetWriter::new(output, theme, loc.line);
        writer.write_header(&loc.path, loc.line, loc.column);
        writer.write_empty_gutter();
        writer.write_source_line(loc.line, &loc.line_text);
        writer.write_marker(loc.column, loc.len);
    }

    for hint in &diag.hints {
        _ = writeln!(
            output,
            "  {} hint: {}",
            DiagnosticTheme::HELP.paint("="),
            hint
        );
    }
}
