//! Dependency resolver and normalizer.
//!
//! A derived variable is sent to the backend as a tree of nodes whose leaves
//! are `{__ref}` tokens into one shared lookup table:
//!
//! ```text
//! Derived(sum) ─ variables ─┬─ Plain(A)                  lookup
//!                           └─ Derived(inner) ─ Plain(A)   "Variable:A" → 1
//!
//! {type: derived, uid: sum, values: [{__ref: Variable:A},
//!     {type: derived, uid: inner, values: [{__ref: Variable:A}], force: false}],
//!  force: false}
//! ```
//!
//! Every positional argument is normalized, tracked or not. Invalidation only
//! looks at the tracked ones, through [`DependencySnapshot`].

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use weave_model::{Argument, FilterQuery, Map, Value, Variable};

use crate::error::ResolveError;

/// Key of the reference token emitted in place of a leaf value.
pub const REF_KEY: &str = "__ref";

pub type Lookup = IndexMap<String, Value>;

/// Supplies the runtime state the resolver reads.
pub trait ValueSource {
    /// Raw value of a plain or url variable, before its `nested` accessor
    /// is applied. `None` when the variable has no value in this context.
    fn leaf_value(&self, variable: &Variable) -> Option<Value>;

    /// How many times the node with this uid was triggered.
    fn trigger_count(&self, _uid: &str) -> u64 {
        0
    }
}

/// Raw leaf values by uid.
impl ValueSource for IndexMap<String, Value> {
    fn leaf_value(&self, variable: &Variable) -> Option<Value> {
        self.get(variable.uid()).cloned()
    }
}

/// Lookup key of a leaf: `Variable:<uid>` plus one `:<key>` per nested step.
pub fn ref_key(variable: &Variable) -> String {
    let mut key = format!("Variable:{}", variable.uid());
    for step in variable.nested() {
        key.push(':');
        key.push_str(step);
    }
    key
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Derived,
    DerivedData,
    Data,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DerivedNode {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub uid: String,
    pub values: Vec<ResolvedNode>,
    /// Asks the backend to bypass its own cache for this node.
    pub force: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterQuery>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DataNode {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub uid: String,
    pub filters: Option<FilterQuery>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResolvedNode {
    Ref {
        #[serde(rename = "__ref")]
        key: String,
    },
    Derived(DerivedNode),
    Data(DataNode),
    /// An argument the loop already substituted with a concrete value.
    Literal(Value),
}

impl ResolvedNode {
    pub fn as_derived(&self) -> Option<&DerivedNode> {
        match self {
            Self::Derived(node) => Some(node),
            _ => None,
        }
    }
}

/// The `{data, lookup}` payload of a backend resolution request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NormalizedRequest {
    pub data: ResolvedNode,
    pub lookup: Lookup,
}

impl NormalizedRequest {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).map(Value::from).unwrap_or_default()
    }
}

/// Uids whose next request must carry `force: true`.
pub type Forced = FxHashSet<String>;

/// Normalizes `variable` and everything it depends on.
///
/// Data variables normalize to a single data node; plain and url variables
/// are not resolved by the backend and are rejected.
pub fn normalize(
    variable: &Variable,
    source: &impl ValueSource,
    forced: &Forced,
) -> Result<NormalizedRequest, ResolveError> {
    if variable.is_leaf() {
        return Err(ResolveError::NotDerived {
            uid: variable.uid().to_string(),
        });
    }
    let mut lookup = Lookup::new();
    let data = normalize_variable(variable, source, forced, &mut lookup)?;
    Ok(NormalizedRequest { data, lookup })
}

fn normalize_variable(
    variable: &Variable,
    source: &impl ValueSource,
    forced: &Forced,
    lookup: &mut Lookup,
) -> Result<ResolvedNode, ResolveError> {
    if let Some(derived) = variable.as_derived() {
        let values = derived
            .variables
            .iter()
            .map(|argument| match argument {
                Argument::Variable(inner) => normalize_variable(inner, source, forced, lookup),
                Argument::Literal(value) => Ok(ResolvedNode::Literal(value.clone())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(ResolvedNode::Derived(DerivedNode {
            kind: if derived.is_data {
                NodeKind::DerivedData
            } else {
                NodeKind::Derived
            },
            uid: derived.uid.to_string(),
            values,
            force: forced.contains(derived.uid) || forced.contains(derived.instance_uid()),
            filters: derived.filters.cloned(),
        }));
    }
    match variable {
        Variable::Data(data) => Ok(ResolvedNode::Data(DataNode {
            kind: NodeKind::Data,
            uid: data.uid.clone(),
            filters: data.filters.clone(),
        })),
        leaf => {
            let key = ref_key(leaf);
            if !lookup.contains_key(&key) {
                let value = leaf_value(leaf, source)?;
                lookup.insert(key.clone(), value);
            }
            Ok(ResolvedNode::Ref { key })
        }
    }
}

fn leaf_value(variable: &Variable, source: &impl ValueSource) -> Result<Value, ResolveError> {
    source
        .leaf_value(variable)
        .map(|raw| raw.resolve_nested(variable.nested()))
        .ok_or_else(|| ResolveError::Unresolvable {
            uid: variable.uid().to_string(),
        })
}

// ═══════════════════════════════════════════════════════════════════════════
// Invalidation
// ═══════════════════════════════════════════════════════════════════════════

/// Flat view of everything a cached derived value depends on.
///
/// Built from tracked dependencies only: leaf values by lookup key, trigger
/// counters of every derived node on the tracked tree, and data filters.
/// Two equal snapshots mean the cached value is still current.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DependencySnapshot {
    entries: IndexMap<String, Value>,
}

impl DependencySnapshot {
    pub fn capture(variable: &Variable, source: &impl ValueSource) -> Result<Self, ResolveError> {
        let mut snapshot = Self::default();
        snapshot.track(variable, source)?;
        Ok(snapshot)
    }

    fn track(&mut self, variable: &Variable, source: &impl ValueSource) -> Result<(), ResolveError> {
        if variable.is_leaf() {
            let value = leaf_value(variable, source)?;
            self.entries.insert(ref_key(variable), value);
            return Ok(());
        }
        let instance = variable.instance_uid();
        for uid in [variable.uid(), instance] {
            self.entries.insert(
                format!("trigger:{uid}"),
                Value::from(source.trigger_count(uid) as i64),
            );
        }
        let filters = match variable {
            Variable::Data(data) => data.filters.as_ref(),
            other => other.as_derived().and_then(|derived| derived.filters),
        };
        if let Some(filters) = filters {
            let filters = serde_json::to_value(filters).map(Value::from).unwrap_or_default();
            self.entries.insert(format!("filters:{instance}"), filters);
        }
        if let Some(derived) = variable.as_derived() {
            for dep in derived.tracked().iter().filter_map(Argument::as_variable) {
                self.track(dep, source)?;
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Uids whose trigger counter differs from `previous`.
    pub fn triggered_since<'a>(&'a self, previous: &'a DependencySnapshot) -> impl Iterator<Item = &'a str> {
        self.entries.iter().filter_map(move |(key, count)| {
            let uid = key.strip_prefix("trigger:")?;
            (previous.entries.get(key) != Some(count)).then_some(uid)
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Denormalization
// ═══════════════════════════════════════════════════════════════════════════

/// Replaces every `{__ref}` token in `data` with its lookup entry.
pub fn denormalize(data: &Value, lookup: &Lookup) -> Result<Value, ResolveError> {
    match data {
        Value::Object(map) => {
            if let Some(key) = reference(map) {
                return lookup
                    .get(key)
                    .cloned()
                    .ok_or_else(|| ResolveError::MissingReference { key: key.to_string() });
            }
            let resolved = map
                .iter()
                .map(|(field, value)| Ok((field.clone(), denormalize(value, lookup)?)))
                .collect::<Result<Map, ResolveError>>()?;
            Ok(Value::Object(resolved.into()))
        }
        Value::Array(items) => {
            let resolved = items
                .iter()
                .map(|item| denormalize(item, lookup))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(resolved.into()))
        }
        primitive => Ok(primitive.clone()),
    }
}

fn reference(map: &Map) -> Option<&str> {
    if map.len() != 1 {
        return None;
    }
    map.get(REF_KEY)?.as_str()
}
