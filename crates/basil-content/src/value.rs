//! Metadata values and the ordered metadata map.
//!
//! Frontmatter is schema-less: every page may carry different keys with
//! different value shapes. [`MetaValue`] is the tagged union those values are
//! normalised into, and [`Metadata`] keeps keys in the order they were written.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// A single frontmatter value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(DateTime<FixedOffset>),
    List(Vec<MetaValue>),
    Map(Metadata),
}

/// YAML 1.1 timestamp shapes: a bare date, or date and time with optional
/// fraction and zone.
static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\d{4}-\d{2}-\d{2}(?:[Tt ]\d{1,2}:\d{2}:\d{2}(?:\.\d+)?\s*(?:Z|[+-]\d{2}(?::?\d{2})?)?)?$",
    )
    .expect("valid timestamp regex")
});

impl MetaValue {
    /// Convert a parsed YAML value.
    ///
    /// Plain strings shaped like YAML timestamps become [`MetaValue::Date`].
    pub fn from_yaml(value: serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Null => Self::Null,
            serde_yaml::Value::Bool(b) => Self::Bool(b),
            serde_yaml::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_yaml::Value::String(s) => match parse_timestamp(&s) {
                Some(date) => Self::Date(date),
                None => Self::String(s),
            },
            serde_yaml::Value::Sequence(items) => {
                Self::List(items.into_iter().map(Self::from_yaml).collect())
            }
            serde_yaml::Value::Mapping(mapping) => Self::Map(Metadata::from_yaml_mapping(mapping)),
            serde_yaml::Value::Tagged(tagged) => Self::from_yaml(tagged.value),
        }
    }

    /// Convert back into a YAML value for writing.
    ///
    /// Dates at UTC midnight are written as bare `YYYY-MM-DD`.
    pub fn to_yaml(&self) -> serde_yaml::Value {
        match self {
            Self::Null => serde_yaml::Value::Null,
            Self::Bool(b) => serde_yaml::Value::Bool(*b),
            Self::Int(i) => serde_yaml::Value::Number((*i).into()),
            Self::Float(f) => serde_yaml::Value::Number((*f).into()),
            Self::String(s) => serde_yaml::Value::String(s.clone()),
            Self::Date(date) => serde_yaml::Value::String(format_date(date)),
            Self::List(items) => {
                serde_yaml::Value::Sequence(items.iter().map(Self::to_yaml).collect())
            }
            Self::Map(map) => serde_yaml::Value::Mapping(map.to_yaml_mapping()),
        }
    }

    /// Text stored in a query column, or `None` for SQL NULL.
    ///
    /// Dates become ISO-8601, lists and maps become JSON, booleans `1`/`0`.
    pub fn to_column_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(if *b { "1" } else { "0" }.to_owned()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::String(s) => Some(s.clone()),
            Self::Date(date) => Some(date.to_rfc3339()),
            Self::List(_) | Self::Map(_) => serde_json::to_string(self).ok(),
        }
    }

    /// Read back a value stored with [`to_column_text`](Self::to_column_text).
    ///
    /// JSON lists and maps are decoded, timestamps become dates and
    /// canonical numbers become numbers. Anything else stays text.
    pub fn from_column_text(text: &str) -> Self {
        if text.starts_with(['[', '{'])
            && let Ok(value) = serde_yaml::from_str::<serde_yaml::Value>(text)
        {
            return Self::from_yaml(value);
        }
        if let Some(date) = parse_timestamp(text) {
            return Self::Date(date);
        }
        if let Ok(i) = text.parse::<i64>()
            && i.to_string() == text
        {
            return Self::Int(i);
        }
        match text.parse::<f64>() {
            Ok(f) if f.is_finite() && f.to_string() == text => Self::Float(f),
            _ => Self::String(text.to_owned()),
        }
    }

    /// Render as a plain string where the value is scalar.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Date(date) => Some(format_date(date)),
            Self::Null | Self::List(_) | Self::Map(_) => None,
        }
    }
}

impl Serialize for MetaValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::Date(date) => serializer.serialize_str(&date.to_rfc3339()),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(map) => map.serialize(serializer),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Parse a YAML timestamp. Zone-less values are taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if !TIMESTAMP.is_match(text) {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Some(Utc.from_utc_datetime(&midnight).fixed_offset());
    }
    if text.len() <= 10 {
        return None;
    }
    // The pattern guarantees ASCII, and byte 10 is the date/time separator.
    let mut normalized = text.to_owned();
    normalized.replace_range(10..11, "T");
    let normalized = normalized.replace(' ', "");
    if let Ok(date) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(date);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%#z"] {
        if let Ok(date) = DateTime::parse_from_str(&normalized, format) {
            return Some(date);
        }
    }
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
}

fn format_date(date: &DateTime<FixedOffset>) -> String {
    let is_midnight_utc = date.offset().local_minus_utc() == 0
        && date.time() == chrono::NaiveTime::MIN;
    if is_midnight_utc {
        date.format("%Y-%m-%d").to_string()
    } else {
        date.to_rfc3339()
    }
}

/// Ordered key/value metadata.
///
/// Inserting an existing key replaces its value in place, so the position of
/// the first occurrence is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    entries: Vec<(String, MetaValue)>,
}

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata every page starts from: `template: index`.
    #[must_use]
    pub fn page_default() -> Self {
        let mut metadata = Self::new();
        metadata.insert("template", MetaValue::from("index"));
        metadata
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Case-insensitive lookup, first match wins.
    pub fn get_ignore_case(&self, key: &str) -> Option<&MetaValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: MetaValue) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Overlay `other` on top of `self`.
    pub fn merge(&mut self, other: Self) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }

    /// Whether both hold the same keys and values, in any order.
    pub fn same_entries(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(key, value)| other.get(key) == Some(value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn from_yaml_mapping(mapping: serde_yaml::Mapping) -> Self {
        mapping
            .into_iter()
            .map(|(key, value)| (yaml_key(key), MetaValue::from_yaml(value)))
            .collect()
    }

    pub(crate) fn to_yaml_mapping(&self) -> serde_yaml::Mapping {
        self.entries
            .iter()
            .map(|(k, v)| (serde_yaml::Value::String(k.clone()), v.to_yaml()))
            .collect()
    }
}

fn yaml_key(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Null => String::new(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim().to_owned())
            .unwrap_or_default(),
    }
}

impl<K: Into<String>> FromIterator<(K, MetaValue)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, MetaValue)>>(iter: I) -> Self {
        let mut metadata = Self::new();
        for (key, value) in iter {
            metadata.insert(key, value);
        }
        metadata
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn yaml(text: &str) -> MetaValue {
        MetaValue::from_yaml(serde_yaml::from_str(text).unwrap())
    }

    #[test]
    fn test_scalars_from_yaml() {
        assert_eq!(yaml("~"), MetaValue::Null);
        assert_eq!(yaml("true"), MetaValue::Bool(true));
        assert_eq!(yaml("404"), MetaValue::Int(404));
        assert_eq!(yaml("1.5"), MetaValue::Float(1.5));
        assert_eq!(yaml("'hello'"), MetaValue::from("hello"));
    }

    #[test]
    fn test_date_strings_become_dates() {
        let MetaValue::Date(date) = yaml("2020-02-29") else {
            panic!("expected a date");
        };
        assert_eq!(date.to_rfc3339(), "2020-02-29T00:00:00+00:00");

        let MetaValue::Date(date) = yaml("2001-12-14t21:59:43.10-05:00") else {
            panic!("expected a date");
        };
        assert_eq!(date.offset().local_minus_utc(), -5 * 3600);

        let MetaValue::Date(date) = yaml("2001-12-14 21:59:43") else {
            panic!("expected a date");
        };
        assert_eq!(date.to_rfc3339(), "2001-12-14T21:59:43+00:00");
    }

    #[test]
    fn test_non_dates_stay_strings() {
        assert_eq!(yaml("2020-13"), MetaValue::from("2020-13"));
        assert_eq!(yaml("'2020-02-30'"), MetaValue::from("2020-02-30"));
        assert_eq!(yaml("Monday 1st"), MetaValue::from("Monday 1st"));
    }

    #[test]
    fn test_nested_mapping_keeps_order() {
        let value = yaml("zeta: 1\nalpha: [a, b]\n3: three");
        let MetaValue::Map(map) = value else {
            panic!("expected a map");
        };
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "3"]);
        assert_eq!(
            map.get("alpha"),
            Some(&MetaValue::List(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn test_column_text() {
        assert_eq!(MetaValue::Null.to_column_text(), None);
        assert_eq!(MetaValue::Bool(true).to_column_text().as_deref(), Some("1"));
        assert_eq!(MetaValue::Int(7).to_column_text().as_deref(), Some("7"));
        assert_eq!(
            yaml("2020-01-02").to_column_text().as_deref(),
            Some("2020-01-02T00:00:00+00:00")
        );
        assert_eq!(
            yaml("[one, 2]").to_column_text().as_deref(),
            Some(r#"["one",2]"#)
        );
        assert_eq!(
            yaml("{a: b}").to_column_text().as_deref(),
            Some(r#"{"a":"b"}"#)
        );
    }

    #[test]
    fn test_from_column_text() {
        assert_eq!(
            MetaValue::from_column_text(r#"["a","b"]"#),
            MetaValue::List(vec!["a".into(), "b".into()])
        );
        assert_eq!(MetaValue::from_column_text("42"), MetaValue::Int(42));
        assert_eq!(MetaValue::from_column_text("007"), MetaValue::from("007"));
        assert_eq!(MetaValue::from_column_text("1.5"), MetaValue::Float(1.5));
        assert_eq!(MetaValue::from_column_text("1.50"), MetaValue::from("1.50"));
        assert_eq!(MetaValue::from_column_text("[draft"), MetaValue::from("[draft"));
        assert!(matches!(
            MetaValue::from_column_text("2024-01-02T00:00:00+00:00"),
            MetaValue::Date(_)
        ));
    }

    #[test]
    fn test_date_writes_back_as_bare_date() {
        assert_eq!(
            yaml("2020-01-02").to_yaml(),
            serde_yaml::Value::String("2020-01-02".to_owned())
        );
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut metadata = Metadata::page_default();
        metadata.insert("title", "A".into());
        metadata.insert("template", "post".into());

        assert_eq!(metadata.keys().collect::<Vec<_>>(), vec!["template", "title"]);
        assert_eq!(metadata.get("template"), Some(&MetaValue::from("post")));
    }

    #[test]
    fn test_get_ignore_case() {
        let metadata: Metadata = [("Title", MetaValue::from("x"))].into_iter().collect();
        assert_eq!(metadata.get("title"), None);
        assert_eq!(metadata.get_ignore_case("title"), Some(&MetaValue::from("x")));
    }

    #[test]
    fn test_serialize_keeps_order() {
        let metadata: Metadata = [
            ("b", MetaValue::Int(1)),
            ("a", MetaValue::List(vec![MetaValue::Null])),
        ]
        .into_iter()
        .collect();
        assert_eq!(serde_json::to_string(&metadata).unwrap(), r#"{"b":1,"a":[null]}"#);
    }
}
