//! XML decoding into generic JSON values.
//!
//! Element children become object keys; repeated children become arrays.
//! Attributes live under [`ATTRIBUTES_KEY`] so they never collide with child
//! element names. An element with neither children nor attributes is its text.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde_json::{Map, Value};

/// Key holding an element's attributes.
pub const ATTRIBUTES_KEY: &str = "_attributes";

/// Key holding text of an element that also has attributes or children.
pub const TEXT_KEY: &str = "_text";

/// Error decoding XML.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("XML parse error: {0}")]
    Parse(#[from] quick_xml::Error),
    #[error("XML encoding error: {0}")]
    Encoding(#[from] quick_xml::encoding::EncodingError),
    #[error("XML has no root element")]
    NoRoot,
}

#[derive(Default)]
struct Node {
    attributes: Map<String, Value>,
    children: Map<String, Value>,
    text: String,
}

impl Node {
    fn add_child(&mut self, name: String, value: Value) {
        match self.children.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                self.children.insert(name, value);
            }
        }
    }

    fn into_value(self) -> Value {
        let text = self.text.trim();
        if self.attributes.is_empty() && self.children.is_empty() {
            return Value::String(text.to_owned());
        }
        let mut object = Map::new();
        if !self.attributes.is_empty() {
            object.insert(ATTRIBUTES_KEY.to_owned(), Value::Object(self.attributes));
        }
        if !text.is_empty() {
            object.insert(TEXT_KEY.to_owned(), Value::String(text.to_owned()));
        }
        for (name, value) in self.children {
            object.insert(name, value);
        }
        Value::Object(object)
    }
}

/// Decode an XML document. The root element's own name is dropped.
pub fn xml_to_value(xml: &str) -> Result<Value, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    // Stack of open elements: (name, node).
    let mut stack: Vec<(String, Node)> = Vec::new();
    let mut root: Option<Value> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let node = Node {
                    attributes: decode_attrs(&reader, &e),
                    ..Node::default()
                };
                stack.push((decode_name(&reader, e.name().as_ref()), node));
            }
            Event::Empty(e) => {
                let node = Node {
                    attributes: decode_attrs(&reader, &e),
                    ..Node::default()
                };
                let name = decode_name(&reader, e.name().as_ref());
                close(&mut stack, &mut root, name, node);
            }
            Event::End(_) => {
                if let Some((name, node)) = stack.pop() {
                    close(&mut stack, &mut root, name, node);
                }
            }
            Event::Text(e) => {
                if let Some((_, node)) = stack.last_mut() {
                    node.text.push_str(&reader.decoder().decode(&e)?);
                }
            }
            Event::GeneralRef(e) => {
                if let Some((_, node)) = stack.last_mut() {
                    let entity = reader.decoder().decode(&e)?.into_owned();
                    node.text.push_str(&decode_entity(&entity));
                }
            }
            Event::CData(e) => {
                if let Some((_, node)) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::Eof => break,
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
        }
    }

    root.ok_or(XmlError::NoRoot)
}

fn close(stack: &mut [(String, Node)], root: &mut Option<Value>, name: String, node: Node) {
    let value = node.into_value();
    match stack.last_mut() {
        Some((_, parent)) => parent.add_child(name, value),
        None => {
            if root.is_none() {
                *root = Some(value);
            }
        }
    }
}

/// Rows of a SPARQL XML results document.
///
/// Each `<binding name="x">` contributes `x` to its row, with the text of its
/// `<literal>` or `<uri>` child.
pub fn sparql_xml_rows(xml: &str) -> Result<Vec<Map<String, Value>>, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut rows = Vec::new();
    let mut row: Option<Map<String, Value>> = None;
    let mut binding: Option<String> = None;
    let mut value: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match local_name(&reader, &e).as_str() {
                "result" => row = Some(Map::new()),
                "binding" => {
                    binding = decode_attrs(&reader, &e)
                        .get("name")
                        .and_then(Value::as_str)
                        .map(str::to_owned);
                }
                "literal" | "uri" => value = Some(String::new()),
                _ => {}
            },
            Event::Text(e) => {
                if let Some(text) = value.as_mut() {
                    text.push_str(&reader.decoder().decode(&e)?);
                }
            }
            Event::GeneralRef(e) => {
                if let Some(text) = value.as_mut() {
                    let entity = reader.decoder().decode(&e)?.into_owned();
                    text.push_str(&decode_entity(&entity));
                }
            }
            Event::End(e) => {
                let name = decode_name(&reader, e.local_name().as_ref());
                match name.as_str() {
                    "literal" | "uri" => {
                        if let (Some(row), Some(name), Some(text)) =
                            (row.as_mut(), binding.as_ref(), value.take())
                        {
                            row.insert(name.clone(), Value::String(text));
                        }
                    }
                    "binding" => binding = None,
                    "result" => rows.extend(row.take()),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(rows)
}

fn local_name(reader: &Reader<&[u8]>, e: &BytesStart) -> String {
    decode_name(reader, e.local_name().as_ref())
}

fn decode_name(reader: &Reader<&[u8]>, name: &[u8]) -> String {
    reader.decoder().decode(name).map_or_else(
        |_| String::from_utf8_lossy(name).into_owned(),
        std::borrow::Cow::into_owned,
    )
}

fn decode_attrs(reader: &Reader<&[u8]>, e: &BytesStart) -> Map<String, Value> {
    let mut attrs = Map::new();
    for attr in e.attributes().flatten() {
        let key = decode_name(reader, attr.key.as_ref());
        if key.starts_with("xmlns") {
            continue;
        }
        let value = attr.unescape_value().map_or_else(
            |_| String::from_utf8_lossy(&attr.value).into_owned(),
            std::borrow::Cow::into_owned,
        );
        attrs.insert(key, Value::String(value));
    }
    attrs
}

/// Decode XML entity references to their character values.
fn decode_entity(entity: &str) -> String {
    match entity {
        "lt" => "<".to_owned(),
        "gt" => ">".to_owned(),
        "amp" => "&".to_owned(),
        "apos" => "'".to_owned(),
        "quot" => "\"".to_owned(),
        s if s.starts_with('#') => {
            let code = if s.starts_with("#x") || s.starts_with("#X") {
                u32::from_str_radix(&s[2..], 16).ok()
            } else {
                s[1..].parse::<u32>().ok()
            };
            code.and_then(char::from_u32)
                .map_or_else(|| format!("&{entity};"), |c| c.to_string())
        }
        _ => format!("&{entity};"),
    }
}
