//! Front matter parsing for source documents.
//!
//! A header is an open mapping of YAML values. It is kept as a
//! [`HeaderValue`] tree so templates see every key, while the loaders use
//! the typed accessors on [`FrontMatter`], which fall back to `None` or an
//! empty value when a key has the wrong shape.

use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Serialize, Serializer, ser::SerializeMap};

/// Front matter delimiter line.
pub const DELIMITER: &str = "---";

/// A single header value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// A scalar that parsed as a date or date-time. `raw` keeps the source text.
    Timestamp {
        raw: String,
        at: DateTime<FixedOffset>,
    },
    Sequence(Vec<HeaderValue>),
    Mapping(BTreeMap<String, HeaderValue>),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Timestamp { raw, .. } => Some(raw),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::Timestamp { at, .. } => Some(*at),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[HeaderValue]> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, HeaderValue>> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Scalar rendered as text, used for list entries and mapping keys.
    fn scalar_text(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Timestamp { raw, .. } => Some(raw.clone()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            _ => None,
        }
    }
}

impl From<serde_yaml::Value> for HeaderValue {
    fn from(value: serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Null => Self::Null,
            serde_yaml::Value::Bool(b) => Self::Bool(b),
            serde_yaml::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            serde_yaml::Value::String(s) => match parse_timestamp(&s) {
                Some(at) => Self::Timestamp { raw: s, at },
                None => Self::String(s),
            },
            serde_yaml::Value::Sequence(items) => {
                Self::Sequence(items.into_iter().map(Self::from).collect())
            }
            serde_yaml::Value::Mapping(map) => Self::Mapping(convert_mapping(map)),
            serde_yaml::Value::Tagged(tagged) => Self::from(tagged.value),
        }
    }
}

impl Serialize for HeaderValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Integer(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::Timestamp { raw, .. } => serializer.serialize_str(raw),
            Self::Sequence(items) => items.serialize(serializer),
            Self::Mapping(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

fn convert_mapping(map: serde_yaml::Mapping) -> BTreeMap<String, HeaderValue> {
    map.into_iter()
        .filter_map(|(key, value)| {
            let key = HeaderValue::from(key).scalar_text()?;
            Some((key, HeaderValue::from(value)))
        })
        .collect()
}

/// Parsed document header.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FrontMatter {
    values: BTreeMap<String, HeaderValue>,
}

impl FrontMatter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: HeaderValue) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &HeaderValue)> {
        self.values.iter()
    }

    /// String value, if the key holds one.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(HeaderValue::as_str)
    }

    /// Non-blank string value.
    pub fn non_empty_str(&self, key: &str) -> Option<&str> {
        self.str(key).filter(|s| !s.trim().is_empty())
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(HeaderValue::as_bool)
    }

    pub fn timestamp(&self, key: &str) -> Option<DateTime<FixedOffset>> {
        self.get(key).and_then(HeaderValue::as_timestamp)
    }

    /// List of strings. A single scalar becomes a one-element list.
    pub fn list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(HeaderValue::Sequence(items)) => {
                items.iter().filter_map(HeaderValue::scalar_text).collect()
            }
            Some(value) => value.scalar_text().into_iter().collect(),
            None => Vec::new(),
        }
    }
}

impl From<BTreeMap<String, HeaderValue>> for FrontMatter {
    fn from(values: BTreeMap<String, HeaderValue>) -> Self {
        Self { values }
    }
}

/// Result of splitting and parsing a document.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub header: FrontMatter,
    pub body: String,
    /// Set when a header block was found but its payload was malformed.
    pub warning: Option<String>,
}

/// Split a document into its header payload and body.
///
/// The first non-blank line must trim to exactly `---`; the next such line
/// closes the block. Returns `None` when either delimiter is missing.
pub fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let mut offset = 0;
    let mut header_start = None;

    for line in content.split_inclusive('\n') {
        let line_end = offset + line.len();
        let trimmed = line.trim();
        match header_start {
            None if trimmed.is_empty() => {}
            None if trimmed == DELIMITER => header_start = Some(line_end),
            None => return None,
            Some(start) if trimmed == DELIMITER => {
                return Some((&content[start..offset], &content[line_end..]));
            }
            Some(_) => {}
        }
        offset = line_end;
    }

    None
}

/// Parse the front matter of `content`.
///
/// Never fails: a malformed payload yields an empty header, the body after
/// the block, and a warning that is also logged against `path`.
pub fn parse_front_matter(content: &str, path: &Path) -> ParsedDocument {
    if content.trim().is_empty() {
        return ParsedDocument::default();
    }

    let Some((payload, body)) = split_frontmatter(content) else {
        return ParsedDocument {
            header: FrontMatter::default(),
            body: content.to_string(),
            warning: None,
        };
    };

    let (header, warning) = match parse_payload(payload) {
        Ok(header) => (header, None),
        Err(message) => {
            tracing::warn!(
                path = %path.display(),
                error = %message,
                "malformed front matter, using empty header"
            );
            (FrontMatter::default(), Some(message))
        }
    };

    ParsedDocument {
        header,
        body: body.to_string(),
        warning,
    }
}

fn parse_payload(payload: &str) -> std::result::Result<FrontMatter, String> {
    if payload.trim().is_empty() {
        return Ok(FrontMatter::default());
    }
    match serde_yaml::from_str::<serde_yaml::Value>(payload) {
        Ok(serde_yaml::Value::Mapping(map)) => Ok(FrontMatter::from(convert_mapping(map))),
        Ok(serde_yaml::Value::Null) => Ok(FrontMatter::default()),
        Ok(_) => Err("front matter is not a mapping".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Parse the date formats accepted in headers and file names.
///
/// Naive values are interpreted in local time.
pub fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if text.len() < 10 || !text.as_bytes()[0].is_ascii_digit() {
        return None;
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at);
    }
    if let Ok(at) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S %z") {
        return Some(at);
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(local(naive));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|date| local(date.and_time(chrono::NaiveTime::MIN)))
}

fn local(naive: NaiveDateTime) -> DateTime<FixedOffset> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|at| at.fixed_offset())
        .unwrap_or_else(|| naive.and_utc().fixed_offset())
}
