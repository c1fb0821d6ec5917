//! LaTeX to PDF compilation.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::RenderError;

/// Default compile timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Interval between checks on the running compiler.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lines of compiler output kept in errors.
const LOG_TAIL_LINES: usize = 40;

/// Runs an external LaTeX compiler on a `.tex` file.
///
/// The compiler is invoked as `<program> <args> -auxdir=<dir> -outdir=<dir>
/// <file>` from the source file's directory, so it must accept `latexmk`'s
/// options.
#[derive(Debug, Clone)]
pub struct PdfCompiler {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl Default for PdfCompiler {
    fn default() -> Self {
        Self {
            program: PathBuf::from("latexmk"),
            args: vec!["-lualatex".to_owned()],
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PdfCompiler {
    /// Compiler running `program` with leading `args`.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Compile `source` and return the path of the PDF next to it.
    ///
    /// Fails when the compiler cannot start, exits unsuccessfully, runs past
    /// the timeout, or exits successfully without producing the PDF.
    pub fn compile(&self, source: &Path) -> Result<PathBuf, RenderError> {
        let dir = source.parent().unwrap_or_else(|| Path::new("."));
        let log_path = source.with_extension("compile.log");
        let log = File::create(&log_path).map_err(|e| RenderError::io(&log_path, e))?;
        let log_err = log.try_clone().map_err(|e| RenderError::io(&log_path, e))?;

        let pdf = source.with_extension("pdf");
        match fs::remove_file(&pdf) {
            Ok(()) => tracing::debug!(pdf = %pdf.display(), "Removed previous PDF"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(RenderError::io(&pdf, e)),
        }

        tracing::info!(source = %source.display(), "Compiling PDF");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(format!("-auxdir={}", dir.display()))
            .arg(format!("-outdir={}", dir.display()))
            .arg(source)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err)
            .spawn()
            .map_err(|source_err| RenderError::CompileSpawn {
                program: self.program.display().to_string(),
                source: source_err,
            })?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RenderError::CompileTimeout {
                        source_path: source.to_path_buf(),
                        timeout: self.timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(RenderError::io(source, e)),
            }
        };

        if !status.success() {
            return Err(RenderError::Compile {
                source_path: source.to_path_buf(),
                status: status.to_string(),
                log: log_tail(&log_path),
            });
        }

        if !pdf.is_file() {
            return Err(RenderError::PdfMissing {
                source_path: source.to_path_buf(),
            });
        }
        Ok(pdf)
    }
}

fn log_tail(path: &Path) -> String {
    let text = fs::read_to_string(path).unwrap_or_default();
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(LOG_TAIL_LINES);
    lines[start..].join("\n")
}
