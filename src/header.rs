use std::fmt;

use serde::Serialize;
use serde::ser::SerializeMap;

/// A single header value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value as a float; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

/// The text written into the XML box: booleans become `1`/`0`, floats always
/// keep a fractional part or exponent so they read back as floats.
impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => f.write_str(&format_float(*v)),
            Self::Bool(v) => f.write_str(if *v { "1" } else { "0" }),
        }
    }
}

fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if v == v.trunc() {
        if v.abs() < 1e16 {
            format!("{v:.1}")
        } else {
            format!("{v:e}")
        }
    } else {
        format!("{v}")
    }
}

impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for HeaderValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for HeaderValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for HeaderValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Coerce a header string read from XML into a typed value.
///
/// All-digit strings become integers, anything that parses as a float
/// literal becomes a float, everything else stays a string. Booleans are
/// never inferred: `"1"` is the integer 1.
pub fn coerce_value(raw: &str) -> HeaderValue {
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(v) = raw.parse::<i64>() {
            return HeaderValue::Int(v);
        }
    }
    if let Some(v) = parse_float_literal(raw) {
        return HeaderValue::Float(v);
    }
    HeaderValue::Str(raw.to_string())
}

fn parse_float_literal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Ordered FITS-style header mapping with unique keys.
///
/// Raw header cards may repeat a key (multi-line `COMMENT` or `HISTORY`
/// records); [`FileHeader::from_cards`] coalesces those once, so everything
/// downstream only ever sees distinct keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileHeader {
    entries: Vec<(String, HeaderValue)>,
}

impl FileHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a header from raw cards, coalescing repeated keys.
    ///
    /// Repeated string values are joined with `\n` in card order; any other
    /// repeated value replaces the earlier one. The key keeps the position of
    /// its first card.
    pub fn from_cards<I, K, V>(cards: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<HeaderValue>,
    {
        let mut header = Self::new();
        for (key, value) in cards {
            let key = key.into();
            let value = value.into();
            match header.position(&key) {
                Some(idx) => {
                    let slot = &mut header.entries[idx].1;
                    match (slot, value) {
                        (HeaderValue::Str(existing), HeaderValue::Str(more)) => {
                            existing.push('\n');
                            existing.push_str(&more);
                        }
                        (slot, value) => {
                            log::debug!(
                                "Header card {key} repeated with a non-string value, keeping the last"
                            );
                            *slot = value;
                        }
                    }
                }
                None => header.entries.push((key, value)),
            }
        }
        header
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    /// Insert or replace a value. A replaced key keeps its position.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<HeaderValue>,
    ) -> Option<HeaderValue> {
        let key = key.into();
        let value = value.into();
        match self.position(&key) {
            Some(idx) => Some(std::mem::replace(&mut self.entries[idx].1, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.position(key).map(|idx| &self.entries[idx].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut HeaderValue> {
        self.position(key).map(|idx| &mut self.entries[idx].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<HeaderValue> {
        self.position(key).map(|idx| self.entries.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<HeaderValue>> FromIterator<(K, V)> for FileHeader {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_cards(iter)
    }
}

impl Serialize for FileHeader {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
