use anyhow::{Context, Result, bail, ensure};
use std::path::Path;

use pyxlate::toolchain::CSharpToolchain;
use pyxlate::transpiler::cs_runtime;
use pyxlate::{CompileError, TranspileOptions, transpile_source};
use test_support::{
    Case, CaseClass, load_cases, normalize_output, run_python_file, run_python_startup,
};

fn required(env_var: &str) -> bool {
    std::env::var(env_var)
        .map(|value| value == "1")
        .unwrap_or(false)
}

fn detect_python_interpreter() -> Result<Option<String>> {
    if let Ok(python) = std::env::var("PYTHON")
        && run_python_startup(&python).is_ok()
    {
        return Ok(Some(python));
    }

    for candidate in ["python3", "python"] {
        if run_python_startup(candidate).is_ok() {
            return Ok(Some(candidate.to_string()));
        }
    }

    if required("PYTHON_PARITY_REQUIRED") {
        bail!("CPython parity required but no interpreter found. Set PYTHON or install python3.");
    }

    eprintln!("Skipping CPython parity test: no PYTHON env or python3 interpreter found.");
    Ok(None)
}

fn detect_csharp_toolchain() -> Result<Option<CSharpToolchain>> {
    if let Some(toolchain) = CSharpToolchain::detect() {
        return Ok(Some(toolchain));
    }
    if required("CSHARP_PARITY_REQUIRED") {
        bail!("C# execution required but no compiler found. Set CSHARP or install mono.");
    }
    eprintln!("Skipping C# execution: no CSHARP env, mcs or csc found.");
    Ok(None)
}

fn cases() -> Result<Vec<Case>> {
    let cases = load_cases(Path::new("tests/programs"))?;
    for case in &cases {
        if case.spec.bench.enabled {
            ensure!(
                !case.spec.bench.tags.is_empty(),
                "Case {} has bench enabled but no tags",
                case.name
            );
        }
    }
    Ok(cases)
}

fn check_transpiled(case: &Case) -> Result<String> {
    ensure!(
        case.spec.expected.exit_code == 0,
        "Case {} expected exit code must be 0 for runtime_success",
        case.name
    );
    let source = case.source()?;
    let output = transpile_source(&source, &TranspileOptions::default())
        .with_context(|| format!("Transpiling {}", case.name))?;
    for fragment in &case.spec.expected.output_contains {
        ensure!(
            output.contains(fragment.as_str()),
            "Generated C# for {} is missing '{fragment}':\n{output}",
            case.name
        );
    }
    Ok(output)
}

fn check_rejected(case: &Case) -> Result<()> {
    ensure!(
        case.spec.expected.exit_code == 1,
        "Case {} expected exit code must be 1 for rejected programs",
        case.name
    );
    let expected_error = case.expected_text()?;
    let source = case.source()?;
    let error = match transpile_source(&source, &TranspileOptions::default()) {
        Ok(_) => bail!("Expected {} to be rejected, but it transpiled", case.name),
        Err(error) => error,
    };
    match (case.spec.class, &error) {
        (CaseClass::FrontendError, CompileError::Lex(_) | CompileError::Parse(_)) => {}
        (CaseClass::TranspileError, CompileError::Transpile(inner)) => {
            if let Some(kind) = &case.spec.expected.error_kind {
                ensure!(
                    inner.kind() == kind.as_str(),
                    "Expected {kind} in {}, got {} ({inner})",
                    case.name,
                    inner.kind()
                );
            }
        }
        (class, error) => bail!("Case {} is {class:?} but failed with '{error}'", case.name),
    }
    let actual = error.to_string();
    ensure!(
        actual.contains(&expected_error),
        "Expected error containing '{expected_error}' in {}, got '{actual}'",
        case.name
    );
    Ok(())
}

#[test]
fn transpiles_fixture_programs() -> Result<()> {
    for case in cases()? {
        match case.spec.class {
            CaseClass::RuntimeSuccess => {
                check_transpiled(&case)?;
            }
            CaseClass::FrontendError | CaseClass::TranspileError => check_rejected(&case)?,
        }
    }
    Ok(())
}

#[test]
fn runs_fixture_programs_on_mono() -> Result<()> {
    let Some(toolchain) = detect_csharp_toolchain()? else {
        return Ok(());
    };
    let runtime = cs_runtime::runtime_source();
    for case in cases()? {
        if case.spec.class != CaseClass::RuntimeSuccess {
            continue;
        }
        let program = check_transpiled(&case)?;
        let output = toolchain
            .compile_and_run(&program, Some(&runtime))
            .with_context(|| format!("{} failed for {}", toolchain.compiler(), case.name))?;
        let expected = case.read_text(case.spec.expected.stdout_file.as_deref().unwrap_or("expected_output"))?;
        pretty_assertions::assert_eq!(
            normalize_output(&output),
            normalize_output(&expected),
            "C# output mismatch for {}",
            case.name
        );
    }
    Ok(())
}

#[test]
fn embedded_runtime_compiles_alone() -> Result<()> {
    let Some(toolchain) = detect_csharp_toolchain()? else {
        return Ok(());
    };
    let options = TranspileOptions {
        embed_runtime: true,
        ..TranspileOptions::default()
    };
    let program = transpile_source("print('embedded', 1 + 1)\n", &options)?;
    let output = toolchain.compile_and_run(&program, None)?;
    assert_eq!(normalize_output(&output), "embedded 2");
    Ok(())
}

#[test]
fn fixtures_match_cpython() -> Result<()> {
    let Some(interpreter) = detect_python_interpreter()? else {
        return Ok(());
    };
    for case in cases()? {
        if case.spec.class != CaseClass::RuntimeSuccess || !case.spec.parity {
            continue;
        }
        let stdout_file = case
            .spec
            .expected
            .stdout_file
            .as_deref()
            .with_context(|| format!("Missing stdout_file in {}", case.name))?;
        let expected = case.read_text(stdout_file)?;
        let actual = run_python_file(&interpreter, &case.program_path)
            .with_context(|| format!("Running CPython for {}", case.name))?;
        pretty_assertions::assert_eq!(
            normalize_output(&actual),
            normalize_output(&expected),
            "CPython mismatch for {}",
            case.name
        );
    }
    Ok(())
}
