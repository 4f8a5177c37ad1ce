//! Persistent JSON-like values.
//!
//! Containers are `Arc`-shared, so cloning a [`Value`] is O(1) and a
//! structural update ([`Value::set_at`]) only copies the containers along the
//! updated path. Everything else stays shared with the original tree.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Number;
use smallvec::SmallVec;

use crate::error::PathError;

/// Object fields, kept in insertion order.
pub type Map = IndexMap<Arc<str>, Value>;

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(Arc<str>),
    Array(Arc<Vec<Value>>),
    Object(Arc<Map>),
}

impl Value {
    pub fn int(n: i64) -> Self {
        Self::Number(n.into())
    }

    /// Non-finite floats have no JSON representation and become `Null`.
    pub fn float(n: f64) -> Self {
        Number::from_f64(n).map_or(Self::Null, Self::Number)
    }

    pub fn text(s: impl Into<Arc<str>>) -> Self {
        Self::String(s.into())
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Array(Arc::new(items.into_iter().collect()))
    }

    pub fn object(pairs: impl IntoIterator<Item = (impl Into<Arc<str>>, Value)>) -> Self {
        let map: Map = pairs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::Object(Arc::new(map))
    }

    pub fn empty_object() -> Self {
        Self::Object(Arc::new(Map::new()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Anything that is not an array or an object.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Self::Array(_) | Self::Object(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Self::Object(map) => Some(map.as_ref()),
            _ => None,
        }
    }

    /// Field of an object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object()?.get(key)
    }

    /// The `__typename` discriminant, if this is a tagged object.
    pub fn typename(&self) -> Option<&str> {
        self.get("__typename")?.as_str()
    }

    /// Whether both values are the same allocation.
    ///
    /// Containers compare by pointer; primitives have no identity and
    /// compare by value.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Array(a), Self::Array(b)) => Arc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Array(_) | Self::Object(_), _) | (_, Self::Array(_) | Self::Object(_)) => false,
            (a, b) => a == b,
        }
    }

    pub fn get_at(&self, path: &Path) -> Option<&Value> {
        path.segments()
            .iter()
            .try_fold(self, |value, segment| match value {
                Self::Object(map) => map.get(&*segment.to_key()),
                Self::Array(items) => segment.to_index().and_then(|index| items.get(index)),
                _ => None,
            })
    }

    /// Returns a new tree with `value` stored at `path`.
    ///
    /// Missing (or null) intermediate fields become empty objects. Array
    /// indices must already exist.
    pub fn set_at(&self, path: &Path, value: Value) -> Result<Value, PathError> {
        self.set_segments(path.segments(), value, path, 0)
    }

    fn set_segments(
        &self,
        segments: &[Segment],
        value: Value,
        full: &Path,
        depth: usize,
    ) -> Result<Value, PathError> {
        let Some((head, rest)) = segments.split_first() else {
            return Ok(value);
        };
        match self {
            Self::Object(map) => {
                let key = head.to_key();
                let child = map
                    .get(&*key)
                    .unwrap_or(&Self::Null)
                    .set_segments(rest, value, full, depth + 1)?;
                let mut map = Arc::clone(map);
                Arc::make_mut(&mut map).insert(key, child);
                Ok(Self::Object(map))
            }
            Self::Null => {
                let child = Self::Null.set_segments(rest, value, full, depth + 1)?;
                Ok(Self::object([(head.to_key(), child)]))
            }
            Self::Array(items) => {
                let index = head.to_index().ok_or_else(|| PathError::InvalidIndex {
                    path: full.prefix(depth).to_string(),
                    segment: head.to_string(),
                })?;
                let Some(current) = items.get(index) else {
                    return Err(PathError::IndexOutOfBounds {
                        path: full.prefix(depth).to_string(),
                        index,
                        len: items.len(),
                    });
                };
                let child = current.set_segments(rest, value, full, depth + 1)?;
                let mut items = Arc::clone(items);
                Arc::make_mut(&mut items)[index] = child;
                Ok(Self::Array(items))
            }
            _ => Err(PathError::NotAContainer {
                path: full.prefix(depth).to_string(),
            }),
        }
    }

    /// Reads a chain of object keys. Any miss yields `Null`.
    pub fn resolve_nested<S: AsRef<str>>(&self, keys: &[S]) -> Value {
        let mut current = self;
        for key in keys {
            match current.get(key.as_ref()) {
                Some(next) => current = next,
                None => return Self::Null,
            }
        }
        current.clone()
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Value::Number(n.clone()),
            Self::String(s) => serde_json::Value::String(s.to_string()),
            Self::Array(items) => items.iter().map(Value::to_json).collect(),
            Self::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Strings without quotes, everything else as compact JSON.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::String(s) => s.to_string(),
            other => other.to_json().to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s.into()),
            serde_json::Value::Array(items) => Self::array(items.into_iter().map(Value::from)),
            serde_json::Value::Object(map) => {
                Self::object(map.into_iter().map(|(k, v)| (k, Value::from(v))))
            }
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        value.to_json()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::text(s)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => n.serialize(serializer),
            Self::String(s) => serializer.serialize_str(s),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(map) => {
                let mut fields = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map.iter() {
                    fields.serialize_entry(&**key, value)?;
                }
                fields.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Paths
// ═══════════════════════════════════════════════════════════════════════════

/// One property-access step.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(Arc<str>),
    Index(usize),
}

impl Segment {
    fn to_key(&self) -> Arc<str> {
        match self {
            Self::Key(key) => key.clone(),
            Self::Index(index) => index.to_string().into(),
        }
    }

    fn to_index(&self) -> Option<usize> {
        match self {
            Self::Key(key) => key.parse().ok(),
            Self::Index(index) => Some(*index),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Location inside a [`Value`] tree, displayed dotted (`props.items.0`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Path(SmallVec<[Segment; 8]>);

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a dotted path. Purely numeric segments become indices.
    pub fn parse(dotted: &str) -> Self {
        dotted
            .split('.')
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment.parse::<usize>() {
                Ok(index) => Segment::Index(index),
                Err(_) => Segment::Key(segment.into()),
            })
            .collect()
    }

    pub fn from_keys<S: AsRef<str>>(keys: &[S]) -> Self {
        keys.iter()
            .map(|key| Segment::Key(key.as_ref().into()))
            .collect()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    pub fn pop(&mut self) -> Option<Segment> {
        self.0.pop()
    }

    /// This path extended with object keys.
    pub fn join(&self, keys: &[&str]) -> Self {
        let mut path = self.clone();
        for key in keys {
            path.push(Segment::Key((*key).into()));
        }
        path
    }

    fn prefix(&self, len: usize) -> Self {
        self.0.iter().take(len).cloned().collect()
    }
}

impl FromIterator<Segment> for Path {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
