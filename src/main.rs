use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use gglang::compile;

fn main() -> Result<ExitCode> {
    let mut args = std::env::args().skip(1);
    let mut input_path: Option<PathBuf> = None;
    let mut output_path: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-o" | "--output" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing output path after {arg}"))?;
                output_path = Some(PathBuf::from(path));
            }
            _ if arg.starts_with('-') => bail!("Unknown option '{arg}'"),
            _ => {
                if input_path.is_some() {
                    bail!("Only one input file is supported");
                }
                input_path = Some(PathBuf::from(arg));
            }
        }
    }

    let Some(input_path) = input_path else {
        bail!("Usage: gg <file.gg> [-o out.c]");
    };

    let output = compile::compile_file(&input_path)?;
    for diagnostic in output.diagnostics.sorted() {
        eprintln!("{}: {diagnostic}", diagnostic.severity);
    }

    let Some(c_source) = output.c_source else {
        eprintln!(
            "compilation failed: {} error(s), {} warning(s)",
            output.diagnostics.error_count(),
            output.diagnostics.warning_count()
        );
        return Ok(ExitCode::FAILURE);
    };

    match output_path {
        Some(path) => {
            fs::write(&path, c_source).with_context(|| format!("Writing {}", path.display()))?;
        }
        None => print!("{c_source}"),
    }
    Ok(ExitCode::SUCCESS)
}
