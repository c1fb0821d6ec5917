//! Filters and functions registered on every template environment.
//!
//! Filters: `basename`, `dirname`, `md2html`, `md2latex`, `escape_tex`,
//! `escape_csv`, `date`.
//!
//! Functions: `date_create`, `strtotime`, `json_decode`, `get_json`,
//! `get_xml`, `get_feeds`, `tex_url`, `wikidata`, `commons`, `wikipedia`,
//! `wikidata_query`, `commons_query`, `flickr`, `qrcode`.
//!
//! Functions that need the current page read it from the `page` context
//! variable.

use std::collections::BTreeMap;
use std::sync::Arc;

use basil_content::{Page, Site, parse_timestamp};
use basil_enrich::ExternalDataCache;
use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use minijinja::value::ValueKind;
use minijinja::{Environment, Error, ErrorKind, State, Value};
use regex::Regex;

use crate::escape::{escape_csv, escape_tex};
use crate::markdown::html::to_html;
use crate::markdown::latex::{relative_image_path, to_latex};
use crate::markdown::{Embed, Embeddable};
use crate::objects::{DateObject, PageObject, format_date};
use crate::renderer::{CONTEXT_KEYS, render_template};

/// Names of the registered filters.
pub const FILTERS: &[&str] = &[
    "basename",
    "dirname",
    "md2html",
    "md2latex",
    "escape_tex",
    "escape_csv",
    "date",
];

/// Names of the registered functions.
pub const FUNCTIONS: &[&str] = &[
    "date_create",
    "strtotime",
    "json_decode",
    "get_json",
    "get_xml",
    "get_feeds",
    "tex_url",
    "wikidata",
    "commons",
    "wikipedia",
    "wikidata_query",
    "commons_query",
    "flickr",
    "qrcode",
];

/// Default format of the `date` filter.
const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Register all filters and functions on `env`.
pub(crate) fn register(
    env: &mut Environment<'static>,
    site: Arc<Site>,
    data: Arc<ExternalDataCache>,
    embeds: Vec<(String, Regex)>,
) {
    let embeds: Arc<[(String, Regex)]> = embeds.into();

    env.add_filter("basename", basename);
    env.add_filter("dirname", dirname);
    env.add_filter("escape_tex", |value: Value| escape_with(&value, escape_tex));
    env.add_filter("escape_csv", |value: Value| escape_with(&value, escape_csv));
    env.add_filter("date", |value: Value, format: Option<&str>| {
        format_date(&to_date(&value)?, format.unwrap_or(DEFAULT_DATE_FORMAT))
    });

    let md_embeds = Arc::clone(&embeds);
    env.add_filter("md2html", move |state: &State<'_, '_>, input: &str| {
        let page = current_page(state)?;
        let embeds = StateEmbeds {
            patterns: &md_embeds,
            format: "html",
            state,
        };
        to_html(input, &page, &embeds).map(Value::from_safe_string)
    });

    let md_embeds = Arc::clone(&embeds);
    let md_site = site;
    let md_data = Arc::clone(&data);
    env.add_filter("md2latex", move |state: &State<'_, '_>, input: &str| {
        let page = current_page(state)?;
        let embeds = StateEmbeds {
            patterns: &md_embeds,
            format: "tex",
            state,
        };
        let mut image = |url: &str| {
            if url.starts_with("http") {
                md_data.tex_url(url, page.id()).map_err(template_error)
            } else {
                relative_image_path(md_site.root(), page.id(), url).map_err(template_error)
            }
        };
        to_latex(input, &embeds, &mut image).map(Value::from_safe_string)
    });

    env.add_function("date_create", |value: Option<Value>, tz: Option<&str>| {
        let date = match value {
            Some(value) => to_date(&value)?,
            None => Utc::now().fixed_offset(),
        };
        Ok::<_, Error>(DateObject::value(in_timezone(date, tz.unwrap_or("UTC"))?))
    });
    env.add_function("strtotime", |text: &str| {
        let date = if text == "now" {
            Some(Utc::now().fixed_offset())
        } else {
            parse_timestamp(text)
        };
        date.map_or(Value::from(false), |date| Value::from(date.timestamp()))
    });
    env.add_function("json_decode", |text: &str| {
        serde_json::from_str::<serde_json::Value>(text)
            .map(|value| Value::from_serialize(&value))
            .map_err(template_error)
    });

    register_enrichment(env, &data);
}

fn register_enrichment(env: &mut Environment<'static>, data: &Arc<ExternalDataCache>) {
    let d = Arc::clone(data);
    env.add_function("get_json", move |url: &str| {
        d.get_json(url).map(|v| Value::from_serialize(&v)).map_err(template_error)
    });
    let d = Arc::clone(data);
    env.add_function("get_xml", move |url: &str| {
        d.get_xml(url).map(|v| Value::from_serialize(&v)).map_err(template_error)
    });
    let d = Arc::clone(data);
    env.add_function("get_feeds", move |urls: Value| {
        let urls = string_list(&urls)?;
        d.get_feeds(&urls)
            .map(|items| Value::from_serialize(&items))
            .map_err(template_error)
    });
    let d = Arc::clone(data);
    env.add_function("tex_url", move |state: &State<'_, '_>, url: &str| {
        let page = current_page(state)?;
        d.tex_url(url, page.id()).map_err(template_error)
    });
    let d = Arc::clone(data);
    env.add_function("wikidata", move |id: &str| {
        d.wikidata(id).map(|v| Value::from_serialize(&v)).map_err(template_error)
    });
    let d = Arc::clone(data);
    env.add_function("commons", move |name: &str| {
        d.commons(name).map(|v| Value::from_serialize(&v)).map_err(template_error)
    });
    let d = Arc::clone(data);
    env.add_function("wikipedia", move |lang: &str, title: &str| {
        d.wikipedia(lang, title)
            .map(Value::from_safe_string)
            .map_err(template_error)
    });
    let d = Arc::clone(data);
    env.add_function("wikidata_query", move |query: &str| {
        d.wikidata_query(query)
            .map(|rows| Value::from_serialize(&rows))
            .map_err(template_error)
    });
    let d = Arc::clone(data);
    env.add_function("commons_query", move |query: &str| {
        d.commons_query(query)
            .map(|rows| Value::from_serialize(&rows))
            .map_err(template_error)
    });
    let d = Arc::clone(data);
    env.add_function("flickr", move |photo_id: Value| {
        d.flickr(&photo_id.to_string())
            .map(|v| Value::from_serialize(&v))
            .map_err(template_error)
    });
    let d = Arc::clone(data);
    env.add_function("qrcode", move |text: &str| d.qrcode(text).map_err(template_error));
}

/// Embeds rendered through the environment of the calling template.
struct StateEmbeds<'a, 't, 'e> {
    patterns: &'a [(String, Regex)],
    format: &'static str,
    state: &'a State<'t, 'e>,
}

impl Embeddable for StateEmbeds<'_, '_, '_> {
    fn patterns(&self) -> &[(String, Regex)] {
        self.patterns
    }

    fn render(&self, embed: &Embed) -> Result<String, Error> {
        let mut context: BTreeMap<String, Value> = CONTEXT_KEYS
            .iter()
            .filter_map(|key| Some(((*key).to_owned(), self.state.lookup(key)?)))
            .collect();
        context.insert("embed".to_owned(), Value::from_serialize(embed));
        render_template(
            self.state.env(),
            &format!("embeds/{}", embed.name),
            self.format,
            context,
        )
    }
}

/// Wrap an error so the template error names the failing resource.
pub(crate) fn template_error<E>(err: E) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    Error::new(ErrorKind::InvalidOperation, err.to_string()).with_source(err)
}

fn current_page(state: &State<'_, '_>) -> Result<Arc<Page>, Error> {
    state
        .lookup("page")
        .and_then(|value| {
            value
                .downcast_object_ref::<PageObject>()
                .map(|page| Arc::clone(page.page()))
        })
        .ok_or_else(|| Error::new(ErrorKind::UndefinedError, "no page in the template context"))
}

fn basename(path: &str) -> String {
    let path = path.trim_end_matches('/');
    path.rsplit_once('/')
        .map_or(path, |(_, base)| base)
        .to_owned()
}

fn dirname(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.starts_with('/') { "/" } else { "." }.to_owned();
    }
    match trimmed.rsplit_once('/') {
        Some(("", _)) => "/".to_owned(),
        Some((dir, _)) => dir.to_owned(),
        None => ".".to_owned(),
    }
}

fn escape_with(value: &Value, escape: fn(&str) -> String) -> Value {
    if value.is_undefined() || value.is_none() {
        return Value::from_safe_string(String::new());
    }
    let text = value.as_str().map_or_else(|| value.to_string(), str::to_owned);
    Value::from_safe_string(escape(&text))
}

/// Interpret a template value as a date.
fn to_date(value: &Value) -> Result<DateTime<FixedOffset>, Error> {
    if let Some(date) = value.downcast_object_ref::<DateObject>() {
        return Ok(date.0);
    }
    if value.kind() == ValueKind::Number {
        let secs = i64::try_from(value.clone())?;
        return DateTime::from_timestamp(secs, 0)
            .map(|date| date.fixed_offset())
            .ok_or_else(|| invalid_date(&value.to_string()));
    }
    let text = value.as_str().map_or_else(|| value.to_string(), str::to_owned);
    if text == "now" {
        return Ok(Utc::now().fixed_offset());
    }
    parse_timestamp(&text).ok_or_else(|| invalid_date(&text))
}

fn invalid_date(text: &str) -> Error {
    Error::new(ErrorKind::InvalidOperation, format!("Unable to parse date: {text}"))
}

/// Convert `date` to a fixed offset or a named zone such as `Australia/Perth`.
fn in_timezone(date: DateTime<FixedOffset>, tz: &str) -> Result<DateTime<FixedOffset>, Error> {
    if let Ok(offset) = parse_offset(tz) {
        return Ok(date.with_timezone(&offset));
    }
    let zone: Tz = tz
        .parse()
        .map_err(|_| Error::new(ErrorKind::InvalidOperation, format!("Unknown timezone: {tz}")))?;
    Ok(date.with_timezone(&zone).fixed_offset())
}

/// `Z`, `UTC`, `GMT` or a numeric offset such as `+05:30` or `-0800`.
fn parse_offset(tz: &str) -> Result<FixedOffset, Error> {
    let unknown = || Error::new(ErrorKind::InvalidOperation, format!("Unknown timezone: {tz}"));
    if matches!(tz, "Z" | "z" | "UTC" | "GMT") {
        return FixedOffset::east_opt(0).ok_or_else(unknown);
    }
    let (sign, rest) = match tz.as_bytes().first() {
        Some(b'+') => (1, &tz[1..]),
        Some(b'-') => (-1, &tz[1..]),
        _ => return Err(unknown()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(unknown());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| unknown())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| unknown())?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(unknown)
}

fn string_list(value: &Value) -> Result<Vec<String>, Error> {
    if let Some(text) = value.as_str() {
        return Ok(vec![text.to_owned()]);
    }
    value
        .try_iter()?
        .map(|item| Ok(item.as_str().map_or_else(|| item.to_string(), str::to_owned)))
        .collect()
}
