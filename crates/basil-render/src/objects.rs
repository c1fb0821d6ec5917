//! Template-facing views of pages, the site and the query store.

use std::fmt;
use std::sync::Arc;

use basil_content::{Page, Site};
use basil_query::{Param, QueryStore};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use minijinja::value::{Enumerator, Object, ObjectRepr, ValueKind, from_args};
use minijinja::{Error, ErrorKind, State, Value};

/// Fields of a page available to templates. Other keys read metadata.
const PAGE_FIELDS: &[&str] = &["id", "body", "metadata", "template", "dir"];

/// A page in a template context.
///
/// `page.id`, `page.body`, `page.metadata` and `page.template` are always
/// present; any other attribute reads the metadata key of that name.
/// `page.link(target)` gives a link relative to this page.
pub struct PageObject {
    page: Arc<Page>,
}

impl PageObject {
    pub fn new(page: Arc<Page>) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Arc<Page> {
        &self.page
    }

    pub fn value(page: Arc<Page>) -> Value {
        Value::from_object(Self::new(page))
    }
}

impl fmt::Debug for PageObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageObject")
            .field("id", &self.page.id())
            .finish_non_exhaustive()
    }
}

impl Object for PageObject {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let key = key.as_str()?;
        let value = match key {
            "id" => return Some(Value::from(self.page.id())),
            "dir" => return Some(Value::from(self.page.id_dir())),
            "body" => self.page.body().map(Value::from),
            "template" => self.page.template_name().map(Value::from),
            "metadata" => self
                .page
                .metadata()
                .map(|metadata| Value::from_serialize(&metadata)),
            _ => match self.page.metadata() {
                Ok(metadata) => return metadata.get(key).map(Value::from_serialize),
                Err(e) => Err(e),
            },
        };
        // Unreadable pages surface as invalid values, which fail the render.
        Some(value.unwrap_or_else(|e| {
            Value::from(Error::new(
                ErrorKind::InvalidOperation,
                format!("cannot read page {}: {e}", self.page.id()),
            ))
        }))
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Str(PAGE_FIELDS)
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "link" => {
                let (target,): (&str,) = from_args(args)?;
                Ok(Value::from(self.page.link(target)))
            }
            _ => Err(Error::from(ErrorKind::UnknownMethod)),
        }
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.page.id())
    }
}

/// The site in a template context.
///
/// Exposes `title`, `lang`, `ext`, `dir`, `pages` and `embeds`, plus
/// `site.page(id)`.
pub struct SiteObject {
    site: Arc<Site>,
}

impl SiteObject {
    pub fn value(site: Arc<Site>) -> Value {
        Value::from_object(Self { site })
    }
}

impl fmt::Debug for SiteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteObject")
            .field("root", &self.site.root())
            .finish_non_exhaustive()
    }
}

impl Object for SiteObject {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "title" => Some(Value::from(self.site.title())),
            "lang" => Some(Value::from(self.site.lang())),
            "ext" => Some(Value::from(self.site.ext())),
            "dir" => Some(Value::from(self.site.root().display().to_string())),
            "embeds" => Some(Value::from_serialize(&self.site.config().embeds)),
            "pages" => Some(Value::from_iter(
                self.site
                    .pages()
                    .iter()
                    .map(|page| PageObject::value(Arc::clone(page))),
            )),
            _ => None,
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Str(&["title", "lang", "ext", "dir", "pages", "embeds"])
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "page" => {
                let (id,): (&str,) = from_args(args)?;
                Ok(self
                    .site
                    .page(id)
                    .map_or_else(|| Value::from(()), PageObject::value))
            }
            _ => Err(Error::from(ErrorKind::UnknownMethod)),
        }
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.site.title())
    }
}

/// The query store in a template context.
///
/// `database.query(sql, params)` returns rows as maps in column order;
/// `database.columns` lists the schema.
pub struct DatabaseObject {
    store: Arc<QueryStore>,
}

impl DatabaseObject {
    pub fn value(store: Arc<QueryStore>) -> Value {
        Value::from_object(Self { store })
    }
}

impl fmt::Debug for DatabaseObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseObject").finish_non_exhaustive()
    }
}

impl Object for DatabaseObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "columns" => self.store.columns().map(Value::from_serialize),
            _ => None,
        }
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "query" => {
                let (sql, params): (&str, Option<Value>) = from_args(args)?;
                let params = match params {
                    Some(params) => to_params(&params)?,
                    None => Vec::new(),
                };
                let rows = self.store.query(sql, &params).map_err(|e| {
                    Error::new(ErrorKind::InvalidOperation, "query failed").with_source(e)
                })?;
                Ok(Value::from_serialize(&rows))
            }
            _ => Err(Error::from(ErrorKind::UnknownMethod)),
        }
    }
}

/// A date in a template context, as returned by `date_create`.
///
/// Renders as RFC 3339. `d.format('%Y')` formats with strftime syntax.
#[derive(Debug)]
pub struct DateObject(pub DateTime<FixedOffset>);

impl DateObject {
    pub fn value(date: DateTime<FixedOffset>) -> Value {
        Value::from_object(Self(date))
    }
}

impl Object for DateObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let date = &self.0;
        Some(match key.as_str()? {
            "year" => Value::from(date.year()),
            "month" => Value::from(date.month()),
            "day" => Value::from(date.day()),
            "hour" => Value::from(date.hour()),
            "minute" => Value::from(date.minute()),
            "second" => Value::from(date.second()),
            "timestamp" => Value::from(date.timestamp()),
            "offset" => Value::from(date.offset().to_string()),
            _ => return None,
        })
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "format" => {
                let (format,): (&str,) = from_args(args)?;
                format_date(&self.0, format).map(Value::from)
            }
            _ => Err(Error::from(ErrorKind::UnknownMethod)),
        }
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339())
    }
}

/// Format a date with strftime syntax, rejecting invalid specifiers.
pub(crate) fn format_date(date: &DateTime<FixedOffset>, format: &str) -> Result<String, Error> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid date format: {format}"),
        ));
    }
    Ok(date.format_with_items(items.into_iter()).to_string())
}

/// Bind parameters from a template list, inferring each one's kind.
fn to_params(values: &Value) -> Result<Vec<Param>, Error> {
    values.try_iter()?.map(|value| to_param(&value)).collect()
}

fn to_param(value: &Value) -> Result<Param, Error> {
    if value.is_undefined() || value.is_none() {
        return Ok(Param::Null);
    }
    if value.kind() == ValueKind::Bool {
        return Ok(Param::Bool(value.is_true()));
    }
    if value.is_integer() {
        return Ok(Param::Int(i64::try_from(value.clone())?));
    }
    Ok(Param::Text(
        value.as_str().map_or_else(|| value.to_string(), str::to_owned),
    ))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use basil_config::Config;
    use minijinja::{Environment, context};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn site_with_pages(tmp: &TempDir) -> Arc<Site> {
        let content = tmp.path().join("content");
        fs::create_dir_all(content.join("blog")).unwrap();
        fs::write(
            content.join("blog/first.md"),
            "---\ntitle: First post\ntags: [a, b]\n---\nHello",
        )
        .unwrap();
        fs::write(content.join("about.md"), "About us").unwrap();
        Arc::new(Site::new(tmp.path().to_path_buf(), Config::default()))
    }

    fn render(source: &str, ctx: Value) -> String {
        let mut env = Environment::new();
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        env.render_str(source, ctx).unwrap()
    }

    #[test]
    fn test_unreadable_page_fails_render() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.md");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        let page = PageObject::value(Arc::new(Page::new("/broken", path)));

        let env = Environment::new();
        for source in ["{{ page.body }}", "{{ page.title }}", "{{ page.template }}"] {
            let err = env.render_str(source, context! { page => page.clone() }).unwrap_err();
            assert!(err.to_string().contains("cannot read page /broken"), "{err}");
        }
        assert_eq!(render("{{ page.id }}", context! { page }), "/broken");
    }

    #[test]
    fn test_page_fields_and_metadata() {
        let tmp = TempDir::new().unwrap();
        let site = site_with_pages(&tmp);
        let page = PageObject::value(site.page("/blog/first").unwrap());

        assert_eq!(
            render(
                "{{ page.id }}|{{ page.title }}|{{ page.metadata.tags|join(',') }}|{{ page.body }}|{{ page.template }}",
                context! { page },
            ),
            "/blog/first|First post|a,b|Hello|index"
        );
    }

    #[test]
    fn test_page_link() {
        let tmp = TempDir::new().unwrap();
        let site = site_with_pages(&tmp);
        let page = PageObject::value(site.page("/blog/first").unwrap());

        assert_eq!(
            render("{{ page.link('about') }}", context! { page }),
            "../about"
        );
    }

    #[test]
    fn test_missing_metadata_is_strict_error() {
        let tmp = TempDir::new().unwrap();
        let site = site_with_pages(&tmp);
        let page = PageObject::value(site.page("/about").unwrap());

        let mut env = Environment::new();
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        assert!(env.render_str("{{ page.title }}", context! { page }).is_err());
    }

    #[test]
    fn test_site_pages_and_lookup() {
        let tmp = TempDir::new().unwrap();
        let site = SiteObject::value(site_with_pages(&tmp));

        assert_eq!(
            render(
                "{{ site.title }}:{% for p in site.pages %}{{ p.id }};{% endfor %}{{ site.page('about').body }}",
                context! { site },
            ),
            "Untitled site:/about;/blog/first;About us"
        );
    }

    #[test]
    fn test_database_query_with_params() {
        let tmp = TempDir::new().unwrap();
        let site = site_with_pages(&tmp);
        let store = Arc::new(QueryStore::in_memory().unwrap());
        store.ingest(site.pages()).unwrap();
        let database = DatabaseObject::value(store);

        assert_eq!(
            render(
                "{% for row in database.query('SELECT id, title FROM pages WHERE id = ?', ['/blog/first']) %}{{ row.id }}={{ row.title }}{% endfor %}",
                context! { database },
            ),
            "/blog/first=First post"
        );
        assert_eq!(
            render(
                "{{ database.query('SELECT count(*) AS n FROM pages')[0].n }}|{{ database.columns|join(',') }}",
                context! { database },
            ),
            "2|body,id,tags,template,title"
        );
    }

    #[test]
    fn test_date_object() {
        let date = DateTime::parse_from_rfc3339("2024-03-05T14:30:00+01:00").unwrap();
        let d = DateObject::value(date);

        assert_eq!(
            render(
                "{{ d }}|{{ d.year }}-{{ d.month }}|{{ d.format('%d %B %Y') }}",
                context! { d },
            ),
            "2024-03-05T14:30:00+01:00|2024-3|05 March 2024"
        );
        assert!(format_date(&date, "%Q").is_err());
    }

    #[test]
    fn test_to_param_kinds() {
        assert!(matches!(to_param(&Value::from(())).unwrap(), Param::Null));
        assert!(matches!(to_param(&Value::from(true)).unwrap(), Param::Bool(true)));
        assert!(matches!(to_param(&Value::from(42)).unwrap(), Param::Int(42)));
        assert!(matches!(to_param(&Value::from("x")).unwrap(), Param::Text(t) if t == "x"));
        assert!(matches!(to_param(&Value::from(1.5)).unwrap(), Param::Text(t) if t == "1.5"));
    }
}
