//! `basil build` command implementation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use basil_config::{CliSettings, Config};
use basil_render::{BuildOptions, DATABASE_PATH, build};
use clap::Args;
use regex::Regex;

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the build command.
#[derive(Args)]
pub(crate) struct BuildArgs {
    /// Site root directory.
    #[arg(default_value = ".")]
    dir: PathBuf,

    /// Cache TTL in seconds (overrides config).
    #[arg(short, long, env = "BASIL_TTL")]
    ttl: Option<u64>,

    /// ID of a page to render. May be repeated.
    #[arg(short, long = "page")]
    pages: Vec<String>,

    /// Skip processing of site pages, and use the existing database.
    #[arg(short, long)]
    skip: bool,

    /// Enable verbose output (log every fetch and render).
    #[arg(short, long)]
    pub verbose: bool,
}

impl BuildArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let started = Instant::now();
        let output = Output::new();

        let cli_settings = CliSettings { ttl: self.ttl };
        let config = Config::load(&self.dir, Some(&cli_settings))?;

        let output_dir = self.dir.join("output");
        clean_output(&output_dir, &config.output_exclude_patterns()?)?;

        output.building(&self.dir);
        if self.skip {
            output.reusing_database(&self.dir.join("cache").join(DATABASE_PATH));
        }

        let summary = build(BuildOptions {
            root: self.dir,
            ttl: self.ttl,
            pages: self.pages,
            skip_ingest: self.skip,
            compiler: None,
        })?;

        output.outputs(&output_dir, &summary.outputs);
        output.built(summary.pages, &output_dir, started.elapsed());
        Ok(())
    }
}

/// Remove everything in `dir` except top-level entries whose names match
/// one of `exclude`. Returns the number of entries removed.
fn clean_output(dir: &Path, exclude: &[Regex]) -> Result<usize, CliError> {
    let io_error = |source| CliError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(io_error(e)),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(io_error)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if exclude.iter().any(|re| re.is_match(&name)) {
            tracing::debug!(name, "Keeping excluded output entry");
            continue;
        }
        let path = entry.path();
        let result = if entry.file_type().is_ok_and(|t| t.is_dir()) {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|source| CliError::Io { path, source })?;
        removed += 1;
    }
    Ok(removed)
}
