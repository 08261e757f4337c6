//! Builds and runs generated C# with an installed Mono toolchain.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tempfile::TempDir;

/// A C# compiler plus the host that runs what it produces.
#[derive(Debug, Clone)]
pub struct CSharpToolchain {
    compiler: String,
    host: Option<String>,
}

impl CSharpToolchain {
    /// Finds a compiler from `CSHARP`, then `mcs` or `csc` on the path.
    pub fn detect() -> Option<Self> {
        let compiler = std::env::var("CSHARP")
            .ok()
            .filter(|candidate| responds(candidate))
            .or_else(|| {
                ["mcs", "csc"]
                    .into_iter()
                    .find(|candidate| responds(candidate))
                    .map(str::to_string)
            })?;
        let host = responds("mono").then(|| "mono".to_string());
        tracing::debug!(%compiler, ?host, "found C# toolchain");
        Some(Self { compiler, host })
    }

    pub fn compiler(&self) -> &str {
        &self.compiler
    }

    /// Compiles `program` (plus a separate runtime file when given) and
    /// returns the program's stdout.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn compile_and_run(&self, program: &str, runtime: Option<&str>) -> Result<String> {
        let workdir = TempDir::with_prefix("pyxlate").context("Creating build directory")?;
        let mut sources = vec![write_source(workdir.path(), "program.cs", program)?];
        if let Some(runtime) = runtime {
            sources.push(write_source(workdir.path(), "py_runtime.cs", runtime)?);
        }
        let binary = workdir.path().join("program.exe");
        self.compile(&sources, &binary)?;
        self.run(&binary)
    }

    fn compile(&self, sources: &[PathBuf], binary: &Path) -> Result<()> {
        let compile = Command::new(&self.compiler)
            .arg("-nowarn:162,168,219")
            .arg(format!("-out:{}", binary.display()))
            .args(sources)
            .output()
            .with_context(|| format!("Running {}", self.compiler))?;
        if !compile.status.success() {
            let stdout = String::from_utf8_lossy(&compile.stdout);
            let stderr = String::from_utf8_lossy(&compile.stderr);
            bail!("C# compilation failed: {stdout}{stderr}");
        }
        Ok(())
    }

    fn run(&self, binary: &Path) -> Result<String> {
        let mut command = match &self.host {
            Some(host) => {
                let mut command = Command::new(host);
                command.arg(binary);
                command
            }
            None => Command::new(binary),
        };
        let output = command.output().context("Running compiled program")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("Compiled program failed: {stderr}");
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

fn write_source(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, contents).with_context(|| format!("Writing {}", path.display()))?;
    Ok(path)
}

fn responds(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_sources_into_the_build_directory() {
        let dir = TempDir::new().expect("tempdir");
        let path = write_source(dir.path(), "program.cs", "class A {}").expect("write");
        assert_eq!(path, dir.path().join("program.cs"));
        assert_eq!(fs::read_to_string(path).expect("read"), "class A {}");
    }

    #[test]
    fn missing_programs_do_not_respond() {
        assert!(!responds("pyxlate-no-such-compiler"));
    }
}
