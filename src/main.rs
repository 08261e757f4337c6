use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tempfile::NamedTempFile;

use pyxlate::toolchain::CSharpToolchain;
use pyxlate::transpiler::cs_runtime;
use pyxlate::{Target, TranspileOptions, logging, transpile_source};

#[derive(Parser)]
#[command(name = "pyxlate", version, about = "Transpile annotated Python into C#")]
struct Cli {
    /// Python source file; reads stdin when omitted
    input: Option<PathBuf>,

    /// Where to write the generated program (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output language
    #[arg(long, value_enum, default_value_t = Target::CSharp)]
    target: Target,

    /// Also write the C# runtime library to this path
    #[arg(long = "runtime-out")]
    runtime_out: Option<PathBuf>,

    /// Append the runtime library to the generated program
    #[arg(long = "embed-runtime")]
    embed_runtime: bool,

    /// Compile the result with the installed C# toolchain and run it
    #[arg(long)]
    run: bool,
}

fn main() -> ExitCode {
    logging::init_tracing();
    match execute(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<()> {
    let source = match &cli.input {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?
        }
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Reading stdin")?;
            buffer
        }
    };

    let options = TranspileOptions {
        target: cli.target,
        embed_runtime: cli.embed_runtime,
    };
    let program = transpile_source(&source, &options).with_context(|| match &cli.input {
        Some(path) => format!("Transpiling {}", path.display()),
        None => "Transpiling stdin".to_string(),
    })?;

    if let Some(path) = &cli.runtime_out {
        write_atomically(path, &cs_runtime::runtime_source())?;
    }

    if cli.run {
        let toolchain = CSharpToolchain::detect()
            .context("No C# compiler found; install mono (mcs) or set CSHARP")?;
        let runtime = (!cli.embed_runtime).then(cs_runtime::runtime_source);
        let stdout = toolchain.compile_and_run(&program, runtime.as_deref())?;
        if let Some(path) = &cli.output {
            write_atomically(path, &program)?;
        }
        print!("{stdout}");
        return Ok(());
    }

    match &cli.output {
        Some(path) => write_atomically(path, &program),
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(program.as_bytes())
                .context("Writing generated program")?;
            stdout.flush().context("Flushing stdout")
        }
    }
}

/// Replaces `path` only once the whole file has been written.
fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(parent)
        .with_context(|| format!("Creating temporary file in {}", parent.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("Writing {}", path.display()))?;
    file.persist(path)
        .with_context(|| format!("Replacing {}", path.display()))?;
    Ok(())
}
