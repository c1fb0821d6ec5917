//! Build and write reports on stderr.

use std::path::{Path, PathBuf};
use std::time::Duration;

use console::{Style, Term};

/// Terminal reporter for `basil build` and `basil write`.
pub(crate) struct Output {
    term: Term,
    green: Style,
    yellow: Style,
    red: Style,
    cyan_bold: Style,
}

impl Output {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
            green: Style::new().green(),
            yellow: Style::new().yellow(),
            red: Style::new().red(),
            cyan_bold: Style::new().cyan().bold(),
        }
    }

    fn line(&self, style: Option<&Style>, msg: &str) {
        let _ = match style {
            Some(style) => self.term.write_line(&style.apply_to(msg).to_string()),
            None => self.term.write_line(msg),
        };
    }

    pub(crate) fn building(&self, root: &Path) {
        self.line(Some(&self.cyan_bold), &format!("Building {}", root.display()));
    }

    /// Warn that `--skip` reuses the page database at `database`.
    pub(crate) fn reusing_database(&self, database: &Path) {
        self.line(
            Some(&self.yellow),
            &format!(
                "Skipping processing of pages. Using existing database at {}",
                database.display()
            ),
        );
    }

    /// List written files relative to the output directory.
    pub(crate) fn outputs(&self, output_dir: &Path, files: &[PathBuf]) {
        for line in output_lines(output_dir, files) {
            self.line(None, &line);
        }
    }

    pub(crate) fn built(&self, pages: usize, output_dir: &Path, elapsed: Duration) {
        self.line(
            Some(&self.green),
            &format!(
                "Built {} to {} in {}",
                plural(pages as u64, "page"),
                output_dir.display(),
                format_elapsed(elapsed.as_secs())
            ),
        );
    }

    pub(crate) fn written(&self, pages: usize) {
        self.line(Some(&self.green), &format!("Updated {}", plural(pages as u64, "page")));
    }

    pub(crate) fn error(&self, msg: &str) {
        self.line(Some(&self.red), &format!("Error: {msg}"));
    }
}

fn output_lines(output_dir: &Path, files: &[PathBuf]) -> Vec<String> {
    files
        .iter()
        .map(|path| {
            let relative = path.strip_prefix(output_dir).unwrap_or(path);
            format!("  {}", relative.display())
        })
        .collect()
}

fn plural(n: u64, unit: &str) -> String {
    format!("{n} {unit}{}", if n == 1 { "" } else { "s" })
}

/// Human-readable duration, e.g. `1 hour, 1 second`.
fn format_elapsed(total_secs: u64) -> String {
    let units = [
        (total_secs / 3600, "hour"),
        (total_secs % 3600 / 60, "minute"),
        (total_secs % 60, "second"),
    ];
    let parts: Vec<String> = units
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| plural(*n, unit))
        .collect();
    if parts.is_empty() {
        "0 seconds".to_owned()
    } else {
        parts.join(", ")
    }
}
