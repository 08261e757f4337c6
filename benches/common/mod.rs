#![allow(dead_code)]
use std::fs;

use pyxlate::ast::Program;
use pyxlate::{lexer, parser};
use test_support::load_cases;

/// `(case name, program path)` for every fixture with benchmarking enabled.
pub fn workloads() -> Vec<(String, String)> {
    load_cases(std::path::Path::new("tests/programs"))
        .unwrap_or_else(|err| panic!("load fixtures: {err:#}"))
        .into_iter()
        .filter(|case| case.spec.bench.enabled)
        .map(|case| (case.name, case.program_path.display().to_string()))
        .collect()
}

pub fn load_source(path: &str) -> String {
    fs::read_to_string(path).unwrap_or_else(|err| panic!("read {path}: {err}"))
}

pub fn load_program(path: &str) -> Program {
    let source = load_source(path);
    let tokens = lexer::tokenize(&source).unwrap_or_else(|err| panic!("tokenize {path}: {err}"));
    parser::parse_tokens(tokens).unwrap_or_else(|err| panic!("parse {path}: {err}"))
}

/// All benchmark workloads glued into one module, one copy per repetition.
pub fn concatenated_source(repetitions: usize) -> String {
    let mut combined = String::new();
    for index in 0..repetitions {
        for (name, path) in workloads() {
            let source = load_source(&path);
            combined.push_str(&format!("# {name} #{index}\n"));
            combined.push_str(&source);
            combined.push('\n');
        }
    }
    combined
}
