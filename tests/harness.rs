use std::fs;
use std::path::Path;

use anyhow::{Context, Result, ensure};

use gglang::compile::{self, CompileOutput};
use gglang::config::{self, ProjectConfig};
use gglang::diagnostics::DiagnosticBag;
use gglang::fixtures::{Case, CaseClass, load_cases};
use gglang::{lexer, parser, printer};

fn case_config(case: &Case) -> Result<ProjectConfig> {
    match &case.spec.config_file {
        Some(file) => {
            let text = case.read_text(file)?;
            config::parse_config(&text)
                .with_context(|| format!("Parsing config for {}", case.name))
        }
        None => Ok(ProjectConfig::default()),
    }
}

fn rendered_diagnostics(output: &CompileOutput) -> String {
    output
        .diagnostics
        .sorted()
        .iter()
        .map(|d| format!("{}: {d}", d.severity))
        .collect::<Vec<_>>()
        .join("\n")
}

fn expected_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[test]
fn runs_program_corpus() -> Result<()> {
    let cases = load_cases(Path::new("tests/programs"))?;

    for case in cases {
        if case.spec.bench.enabled {
            ensure!(
                !case.spec.bench.tags.is_empty(),
                "Case {} has bench enabled but no tags",
                case.name
            );
        }
        let source = fs::read_to_string(&case.program_path)
            .with_context(|| format!("Reading {}", case.name))?;
        let config = case_config(&case)?;
        let output = compile::compile_source(&source, None, &config);

        match case.spec.class {
            CaseClass::EmitSuccess => {
                ensure!(
                    !output.diagnostics.has_errors(),
                    "Case {} failed to compile: {}",
                    case.name,
                    rendered_diagnostics(&output)
                );
                let c_source = output
                    .c_source
                    .as_deref()
                    .with_context(|| format!("Missing C output for {}", case.name))?;
                let expect_file = case
                    .spec
                    .expected
                    .c_contains_file
                    .as_deref()
                    .with_context(|| format!("Missing c_contains_file in {}", case.name))?;
                for line in expected_lines(&case.read_text(expect_file)?) {
                    ensure!(
                        c_source.contains(&line),
                        "Expected emitted C for {} to contain '{}'",
                        case.name,
                        line
                    );
                }
            }
            CaseClass::FrontendError => {
                ensure!(
                    output.diagnostics.has_errors(),
                    "Expected errors for case {}, got none",
                    case.name
                );
                ensure!(
                    output.c_source.is_none(),
                    "Errors must gate emission for case {}",
                    case.name
                );
                let expect_file = case
                    .spec
                    .expected
                    .diagnostics_file
                    .as_deref()
                    .with_context(|| format!("Missing diagnostics_file in {}", case.name))?;
                let rendered = rendered_diagnostics(&output);
                for line in expected_lines(&case.read_text(expect_file)?) {
                    ensure!(
                        rendered.contains(&line),
                        "Expected diagnostics for {} to contain '{}', got:\n{}",
                        case.name,
                        line,
                        rendered
                    );
                }
            }
        }
    }

    Ok(())
}

/// Every clean corpus program must survive a print -> reparse -> print
/// round trip unchanged.
#[test]
fn pretty_printer_round_trips_corpus() -> Result<()> {
    let cases = load_cases(Path::new("tests/programs"))?;

    for case in cases {
        if case.spec.class != CaseClass::EmitSuccess {
            continue;
        }
        let source = fs::read_to_string(&case.program_path)
            .with_context(|| format!("Reading {}", case.name))?;

        let mut bag = DiagnosticBag::new();
        let tokens = lexer::tokenize(&source, &mut bag);
        let unit = parser::parse_unit(tokens, &mut bag);
        ensure!(!bag.has_errors(), "Case {} failed to parse", case.name);

        let first = printer::print_unit(&unit);
        let mut bag = DiagnosticBag::new();
        let tokens = lexer::tokenize(&first, &mut bag);
        let reparsed = parser::parse_unit(tokens, &mut bag);
        ensure!(
            !bag.has_errors(),
            "Case {} printed output failed to reparse:\n{}",
            case.name,
            first
        );
        let second = printer::print_unit(&reparsed);
        ensure!(
            first == second,
            "Case {} is not stable under print -> reparse -> print",
            case.name
        );
    }

    Ok(())
}
