//! Translates type-annotated Python into a standalone C# program.
//!
//! The pipeline is `lexer` → `parser` → `transpiler`; `lattice` models the
//! runtime type hierarchy the generated code registers its classes into.

pub mod ast;
pub mod builtins;
pub mod error;
pub mod lattice;
pub mod lexer;
pub mod logging;
pub mod parser;
pub mod token;
pub mod toolchain;
pub mod transpiler;

pub use error::{CompileError, TranspileError};
pub use transpiler::{Target, TranspileOptions, Transpiler};

/// Runs the whole pipeline over one source file.
#[tracing::instrument(level = "debug", skip_all, fields(bytes = source.len()))]
pub fn transpile_source(source: &str, options: &TranspileOptions) -> Result<String, CompileError> {
    let tokens = lexer::tokenize(source)?;
    tracing::trace!(tokens = tokens.len(), "tokenized");
    let program = parser::parse_tokens(tokens)?;
    tracing::trace!(statements = program.statements.len(), "parsed");
    Ok(Transpiler::new(options.clone()).transpile(&program)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_each_stage_through_one_error_type() {
        let options = TranspileOptions::default();
        assert!(matches!(transpile_source("x = 'open\n", &options), Err(CompileError::Lex(_))));
        assert!(matches!(transpile_source("x = (1 +\n", &options), Err(CompileError::Lex(_) | CompileError::Parse(_))));
        assert!(matches!(transpile_source("def f(x):\n    pass\n", &options), Err(CompileError::Transpile(_))));
        let output = transpile_source("print(1)\n", &options).expect("transpile");
        assert!(output.contains("py_runtime.print(1L);"), "{output}");
    }
}
