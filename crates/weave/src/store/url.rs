//! Query-string state behind url variables.

use std::fmt;

use indexmap::IndexMap;
use weave_model::Value;

/// Current query parameters, in the order they first appeared.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Query {
    params: IndexMap<String, String>,
}

impl Query {
    /// Parses `a=1&b=x%20y`; a leading `?` is ignored.
    pub fn parse(query: &str) -> Self {
        let params = query
            .trim_start_matches('?')
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((name, value)) => (decode(name), decode(value)),
                None => (decode(pair), String::new()),
            })
            .collect();
        Self { params }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Typed value of a parameter: JSON when it parses as JSON, text
    /// otherwise. A JSON string literal (`"42"`) reads as its contents.
    pub fn value_of(&self, name: &str) -> Option<Value> {
        let raw = self.get(name)?;
        Some(match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::String(text)) => Value::text(text),
            Ok(json) => Value::from(json),
            Err(_) => Value::text(raw),
        })
    }

    /// Stores `value` under `name`; `Null` removes the parameter.
    /// Returns whether the query changed.
    pub fn set_value(&mut self, name: &str, value: &Value) -> bool {
        let encoded = match value {
            Value::Null => None,
            Value::String(text) => Some(encode_text(text)),
            other => Some(other.to_json().to_string()),
        };
        match encoded {
            Some(encoded) if self.get(name) == Some(encoded.as_str()) => false,
            Some(encoded) => {
                self.params.insert(name.to_string(), encoded);
                true
            }
            None => self.params.shift_remove(name).is_some(),
        }
    }

    /// Names whose values differ between the two queries.
    pub fn changed_names<'a>(&'a self, other: &'a Query) -> impl Iterator<Item = &'a str> {
        let removed = other.params.keys().filter(|name| !self.params.contains_key(*name));
        self.params
            .iter()
            .filter(|(name, value)| other.params.get(*name) != Some(*value))
            .map(|(name, _)| name)
            .chain(removed)
            .map(String::as_str)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (name, value)) in self.params.iter().enumerate() {
            if index > 0 {
                f.write_str("&")?;
            }
            write!(f, "{}={}", encode(name), encode(value))?;
        }
        Ok(())
    }
}

/// Text is written bare unless it would read back as JSON; then it is
/// quoted so [`Query::value_of`] returns the same text.
fn encode_text(text: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(_) => serde_json::Value::from(text).to_string(),
        Err(_) => text.to_string(),
    }
}

fn encode(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char)
            }
            other => encoded.push_str(&format!("%{other:02X}")),
        }
    }
    encoded
}

fn decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'+' => decoded.push(b' '),
            b'%' => match text.get(index + 1..index + 3).map(|hex| u8::from_str_radix(hex, 16)) {
                Some(Ok(byte)) => {
                    decoded.push(byte);
                    index += 2;
                }
                _ => decoded.push(b'%'),
            },
            other => decoded.push(other),
        }
        index += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}
