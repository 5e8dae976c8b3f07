//! The driver boundary: one synchronous, deterministic function from source
//! text to (C translation unit, diagnostics). The emitter only runs when the
//! bag holds no errors.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::{self, ProjectConfig};
use crate::diagnostics::DiagnosticBag;
use crate::{analyzer, emitter, lexer, parser};

#[derive(Debug)]
pub struct CompileOutput {
    /// The emitted translation unit; `None` when errors gated emission.
    pub c_source: Option<String>,
    pub diagnostics: DiagnosticBag,
}

impl CompileOutput {
    pub fn succeeded(&self) -> bool {
        self.c_source.is_some()
    }
}

pub fn compile_source(source: &str, file_name: Option<&str>, config: &ProjectConfig) -> CompileOutput {
    let mut bag = DiagnosticBag::new();

    let mut lexer = lexer::Lexer::new(source);
    if let Some(name) = file_name {
        lexer = lexer.with_file(name);
    }
    let tokens = lexer.tokenize(&mut bag);
    let mut unit = parser::parse_unit(tokens, &mut bag);
    let analysis = analyzer::analyze(&mut unit, &mut bag);

    let c_source = if bag.has_errors() {
        None
    } else {
        Some(emitter::emit_unit(&unit, &analysis, config))
    };
    CompileOutput {
        c_source,
        diagnostics: bag,
    }
}

/// Reads the file, discovers the nearest project configuration, and
/// compiles. I/O problems are the only failures; user mistakes land in the
/// diagnostic bag.
pub fn compile_file(path: &Path) -> Result<CompileOutput> {
    let source =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let config = config::discover(path)?;
    let file_name = path.file_name().and_then(|n| n.to_str());
    Ok(compile_source(&source, file_name, &config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn emits_c_for_a_valid_program() {
        let output = compile_source(
            indoc! {r#"
                class Program {
                    static void main() {
                        Console.writeLine("Hello, World!");
                    }
                }
            "#},
            Some("hello.gg"),
            &ProjectConfig::default(),
        );
        assert!(output.succeeded());
        assert!(output.diagnostics.is_empty());
        let c_source = output.c_source.unwrap();
        assert!(c_source.contains("Hello, World!"));
    }

    #[test]
    fn errors_gate_the_emitter() {
        let output = compile_source(
            indoc! {r#"
                class Program {
                    static void main() {
                        int a = "teste";
                    }
                }
            "#},
            None,
            &ProjectConfig::default(),
        );
        assert!(!output.succeeded());
        assert!(output.diagnostics.has_errors());
    }

    #[test]
    fn warnings_do_not_gate_the_emitter() {
        let output = compile_source(
            indoc! {r#"
                class Program {
                    static void main() {
                        Console.writeLine(mystery);
                    }
                }
            "#},
            None,
            &ProjectConfig::default(),
        );
        assert!(output.succeeded());
        assert_eq!(output.diagnostics.warning_count(), 1);
    }
}
