//! Template host: turns template markup into intermediate source.
//!
//! One [`GeneratedUnit`] is produced per template. A unit with diagnostics is
//! excluded from compilation; callers collect all of them before failing.

mod codegen;
mod parser;

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use crate::diagnostic::{Diagnostic, Location};
use crate::discovery::TemplateFile;

pub use codegen::class_name_for;

const BOM: &str = "\u{feff}";

/// What the generated code knows about the application it is built for.
#[derive(Debug, Clone)]
pub struct HostEnvironment {
    pub application_name: String,
    pub content_root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct GeneratedUnit {
    /// Relative path of the originating template
    pub source_path: String,
    pub generated_code: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl GeneratedUnit {
    pub fn success(&self) -> bool {
        self.diagnostics.is_empty()
    }

    fn failed(source_path: &str, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            source_path: source_path.to_owned(),
            generated_code: String::new(),
            diagnostics,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemplateHost {
    env: HostEnvironment,
}

impl TemplateHost {
    pub fn new(env: HostEnvironment) -> Self {
        Self { env }
    }

    pub fn environment(&self) -> &HostEnvironment {
        &self.env
    }

    /// Open and generate one discovered template.
    pub fn generate_file(&self, file: &TemplateFile) -> GeneratedUnit {
        match File::open(&file.absolute_path) {
            Ok(reader) => self.generate(&file.relative_path, reader),
            Err(err) => GeneratedUnit::failed(
                &file.relative_path,
                vec![Diagnostic::new(format!(
                    "cannot open template `{}`: {err}",
                    file.relative_path
                ))],
            ),
        }
    }

    /// Generate intermediate source from a UTF-8 template stream.
    pub fn generate(&self, relative_path: &str, mut reader: impl Read) -> GeneratedUnit {
        let mut bytes = Vec::new();
        if let Err(err) = reader.read_to_end(&mut bytes) {
            return GeneratedUnit::failed(
                relative_path,
                vec![Diagnostic::new(format!("cannot read template `{relative_path}`: {err}"))],
            );
        }

        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => {
                let offset = err.utf8_error().valid_up_to();
                let lossy = String::from_utf8_lossy(err.as_bytes()).into_owned();
                let location = Location::from_offset(relative_path, &lossy, offset, 1);
                return GeneratedUnit::failed(
                    relative_path,
                    vec![Diagnostic::at("template is not valid UTF-8", location)],
                );
            }
        };
        let source = text.strip_prefix(BOM).unwrap_or(&text);

        let (template, diagnostics) = parser::parse(relative_path, source);
        if !diagnostics.is_empty() {
            return GeneratedUnit::failed(relative_path, diagnostics);
        }

        GeneratedUnit {
            source_path: relative_path.to_owned(),
            generated_code: codegen::generate(relative_path, &self.env.application_name, template),
            diagnostics: Vec::new(),
        }
    }
}
