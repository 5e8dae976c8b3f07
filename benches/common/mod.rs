#![allow(dead_code)]
use std::fs;
use std::path::Path;

use gglang::fixtures;

/// Corpus cases flagged for benchmarking in their `case.yaml`.
pub fn workloads() -> Vec<(String, String)> {
    fixtures::load_cases(Path::new("tests/programs"))
        .expect("load bench workloads")
        .into_iter()
        .filter(|case| case.spec.bench.enabled)
        .map(|case| {
            (
                case.name.clone(),
                case.program_path.to_string_lossy().into_owned(),
            )
        })
        .collect()
}

pub fn load_source(path: &str) -> String {
    fs::read_to_string(path).unwrap_or_else(|err| panic!("read {path}: {err}"))
}
