//! Discovery of the output formats a template provides.

use std::fs;
use std::path::Path;

use crate::RenderError;

/// File extension of template files.
pub const TEMPLATE_EXT: &str = "jinja";

/// File name of the template `name` in `format`, relative to the templates
/// directory.
pub fn template_file(name: &str, format: &str) -> String {
    format!("{name}.{format}.{TEMPLATE_EXT}")
}

/// Formats available for template `name`, sorted.
///
/// A format is any `<base>.<format>.jinja` file in the template's directory,
/// where `<base>` is the last path segment of `name`.
pub fn get_formats(templates_dir: &Path, name: &str) -> Result<Vec<String>, RenderError> {
    if !templates_dir.is_dir() {
        return Err(RenderError::TemplatesDirMissing(templates_dir.to_path_buf()));
    }

    let (dir, base) = match name.rsplit_once('/') {
        Some((dir, base)) => (templates_dir.join(dir), base),
        None => (templates_dir.to_path_buf(), name),
    };
    let prefix = format!("{base}.");
    let suffix = format!(".{TEMPLATE_EXT}");

    let mut formats: Vec<String> = match fs::read_dir(&dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|entry| {
                let file_name = entry.file_name().into_string().ok()?;
                let format = file_name.strip_prefix(&prefix)?.strip_suffix(&suffix)?;
                (!format.is_empty() && !format.contains('.')).then(|| format.to_owned())
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    formats.sort();

    if formats.is_empty() {
        return Err(RenderError::NoFormats {
            name: name.to_owned(),
            suggestion: templates_dir.join(template_file(name, "html")),
        });
    }
    Ok(formats)
}
