//! Page rendering through `minijinja` templates.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use basil_content::{ContentError, Page, Site};
use basil_enrich::ExternalDataCache;
use basil_query::QueryStore;
use minijinja::{Environment, Error, UndefinedBehavior, Value, path_loader};

use crate::RenderError;
use crate::escape::{auto_escape_for, formatter};
use crate::formats::{get_formats, template_file};
use crate::functions;
use crate::objects::{DatabaseObject, PageObject, SiteObject};
use crate::pdf::PdfCompiler;

/// Format compiled to PDF instead of being written out.
pub(crate) const PDF_FORMAT: &str = "tex";

/// Context variables every template receives.
pub(crate) const CONTEXT_KEYS: [&str; 3] = ["database", "site", "page"];

/// Renders pages with the templates under the site's `templates/`.
pub struct TemplateRenderer {
    env: Environment<'static>,
    site: Arc<Site>,
    store: Arc<QueryStore>,
    compiler: PdfCompiler,
}

impl TemplateRenderer {
    /// Create a renderer and register the template filters and functions.
    pub fn new(
        site: Arc<Site>,
        store: Arc<QueryStore>,
        data: Arc<ExternalDataCache>,
    ) -> Result<Self, RenderError> {
        let embeds = site
            .config()
            .embed_patterns()
            .map_err(ContentError::from)?;

        let mut env = Environment::new();
        env.set_loader(path_loader(site.templates_dir()));
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(auto_escape_for);
        env.set_formatter(formatter);
        functions::register(&mut env, Arc::clone(&site), data, embeds);

        Ok(Self {
            env,
            site,
            store,
            compiler: PdfCompiler::default(),
        })
    }

    /// Use `compiler` for the `tex` format.
    #[must_use]
    pub fn with_compiler(mut self, compiler: PdfCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    /// Formats provided by template `name`.
    pub fn formats(&self, name: &str) -> Result<Vec<String>, RenderError> {
        get_formats(&self.site.templates_dir(), name)
    }

    /// Render `page` in every format of its template.
    ///
    /// Returns the written output files in format order.
    pub fn render(&self, page: &Arc<Page>) -> Result<Vec<PathBuf>, RenderError> {
        let template = page.template_name()?;
        let formats = self.formats(&template)?;
        tracing::info!(page = %page.id(), template = %template, "Rendering");

        let relative = page.id().trim_start_matches('/');
        let mut outputs = Vec::with_capacity(formats.len());
        for format in &formats {
            let text = render_template(&self.env, &template, format, self.context(page))
                .map_err(|source| template_error(page, source))?;

            if format == PDF_FORMAT {
                outputs.push(self.render_pdf(page, relative, &text)?);
            } else {
                let path = self.site.output_dir().join(format!("{relative}.{format}"));
                write_file(&path, &text)?;
                outputs.push(path);
            }
        }
        Ok(outputs)
    }

    /// Render template `name` in `format` without writing anything.
    ///
    /// `extra` is merged into the standard context and wins on conflicts.
    pub fn render_simple(
        &self,
        name: &str,
        format: &str,
        page: &Arc<Page>,
        extra: BTreeMap<String, Value>,
    ) -> Result<String, RenderError> {
        let mut context = self.context(page);
        context.extend(extra);
        render_template(&self.env, name, format, context)
            .map_err(|source| template_error(page, source))
    }

    fn context(&self, page: &Arc<Page>) -> BTreeMap<String, Value> {
        let values = [
            DatabaseObject::value(Arc::clone(&self.store)),
            SiteObject::value(Arc::clone(&self.site)),
            PageObject::value(Arc::clone(page)),
        ];
        CONTEXT_KEYS
            .iter()
            .map(|key| (*key).to_owned())
            .zip(values)
            .collect()
    }

    /// Write the LaTeX source under `cache/tex/`, compile it and copy the
    /// PDF to the output tree.
    fn render_pdf(&self, page: &Page, relative: &str, text: &str) -> Result<PathBuf, RenderError> {
        let source = self
            .site
            .cache_dir()
            .join("tex")
            .join(format!("{relative}.{PDF_FORMAT}"));
        write_file(&source, text)?;

        tracing::debug!(page = %page.id(), "Wrote LaTeX source");
        let pdf = self.compiler.compile(&source)?;

        let target = self.site.output_dir().join(format!("{relative}.pdf"));
        create_parent(&target)?;
        fs::copy(&pdf, &target).map_err(|e| RenderError::io(&target, e))?;
        Ok(target)
    }
}

/// Render `<name>.<format>.jinja` with `context`.
pub(crate) fn render_template(
    env: &Environment<'_>,
    name: &str,
    format: &str,
    context: BTreeMap<String, Value>,
) -> Result<String, Error> {
    env.get_template(&template_file(name, format))?
        .render(Value::from_iter(context))
}

fn template_error(page: &Page, source: Error) -> RenderError {
    RenderError::Template {
        page: page.id().to_owned(),
        source,
    }
}

fn create_parent(path: &Path) -> Result<(), RenderError> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent).map_err(|e| RenderError::io(parent, e)),
        None => Ok(()),
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), RenderError> {
    create_parent(path)?;
    fs::write(path, contents).map_err(|e| RenderError::io(path, e))
}
