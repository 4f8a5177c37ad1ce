//! Variable descriptors.
//!
//! Descriptors arrive from the template producer as JSON objects tagged with
//! `__typename`. They are immutable here: the engine only derives transformed
//! copies of templates and tracks runtime values elsewhere.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::filter::FilterQuery;
use crate::value::Value;

/// Every `__typename` the engine understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Typename {
    Variable,
    UrlVariable,
    DerivedVariable,
    DataVariable,
    DerivedDataVariable,
    LoopVariable,
    ActionImpl,
    ServerComponent,
}

impl Typename {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Variable => "Variable",
            Self::UrlVariable => "UrlVariable",
            Self::DerivedVariable => "DerivedVariable",
            Self::DataVariable => "DataVariable",
            Self::DerivedDataVariable => "DerivedDataVariable",
            Self::LoopVariable => "LoopVariable",
            Self::ActionImpl => "ActionImpl",
            Self::ServerComponent => "ServerComponent",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Variable" => Self::Variable,
            "UrlVariable" => Self::UrlVariable,
            "DerivedVariable" => Self::DerivedVariable,
            "DataVariable" => Self::DataVariable,
            "DerivedDataVariable" => Self::DerivedDataVariable,
            "LoopVariable" => Self::LoopVariable,
            "ActionImpl" => Self::ActionImpl,
            "ServerComponent" => Self::ServerComponent,
            _ => return None,
        })
    }

    /// Classifies a template node by its discriminant.
    pub fn of(value: &Value) -> Option<Self> {
        value.typename().and_then(Self::from_name)
    }

    /// Derived and derived-data variables: the nodes that get a
    /// loop instance uid.
    pub fn is_derived(self) -> bool {
        matches!(self, Self::DerivedVariable | Self::DerivedDataVariable)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    Global,
    Session,
    User,
}

/// Remote persisted store a plain variable is bound to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStoreRef {
    pub uid: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlainVariable {
    pub uid: String,
    #[serde(default)]
    pub default: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<String>,
    #[serde(default)]
    pub persist_value: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<BackendStoreRef>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UrlVariable {
    pub uid: String,
    #[serde(default)]
    pub default: Value,
    /// Query-string parameter name.
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerivedVariable {
    pub uid: String,
    /// Positional arguments of the backend function.
    pub variables: Vec<Argument>,
    /// Tracked subset of `variables`; `None` tracks all of them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deps: Option<Vec<Argument>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CachePolicy>,
    /// Seconds between forced refreshes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_instance_uid: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataVariable {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CachePolicy>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerivedDataVariable {
    pub uid: String,
    pub variables: Vec<Argument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deps: Option<Vec<Argument>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CachePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_instance_uid: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__typename")]
pub enum Variable {
    #[serde(rename = "Variable")]
    Plain(PlainVariable),
    #[serde(rename = "UrlVariable")]
    Url(UrlVariable),
    #[serde(rename = "DerivedVariable")]
    Derived(DerivedVariable),
    #[serde(rename = "DataVariable")]
    Data(DataVariable),
    #[serde(rename = "DerivedDataVariable")]
    DerivedData(DerivedDataVariable),
}

/// Positional argument of a derived variable.
///
/// Loop substitution may replace a placeholder argument with the concrete
/// item value, so arguments are either descriptors or literals. Anything
/// that does not parse as a descriptor is kept as a literal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Argument {
    Variable(Variable),
    Literal(Value),
}

impl Argument {
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Self::Variable(variable) => Some(variable),
            Self::Literal(_) => None,
        }
    }
}

impl From<Variable> for Argument {
    fn from(variable: Variable) -> Self {
        Self::Variable(variable)
    }
}

/// The parts derived and derived-data variables have in common.
#[derive(Clone, Copy, Debug)]
pub struct DerivedView<'a> {
    pub uid: &'a str,
    pub variables: &'a [Argument],
    pub deps: Option<&'a [Argument]>,
    pub filters: Option<&'a FilterQuery>,
    pub polling_interval: Option<u64>,
    pub loop_instance_uid: Option<&'a str>,
    pub is_data: bool,
}

impl<'a> DerivedView<'a> {
    /// Arguments whose changes invalidate the cached value.
    pub fn tracked(&self) -> &'a [Argument] {
        self.deps.unwrap_or(self.variables)
    }

    pub fn instance_uid(&self) -> &'a str {
        self.loop_instance_uid.unwrap_or(self.uid)
    }
}

impl Variable {
    pub fn from_value(value: &Value) -> Result<Self, ModelError> {
        serde_json::from_value(value.to_json()).map_err(|source| ModelError::InvalidDescriptor {
            kind: "variable",
            source,
        })
    }

    pub fn to_value(&self) -> Result<Value, ModelError> {
        serde_json::to_value(self)
            .map(Value::from)
            .map_err(|source| ModelError::InvalidDescriptor {
                kind: "variable",
                source,
            })
    }

    pub fn uid(&self) -> &str {
        match self {
            Self::Plain(v) => &v.uid,
            Self::Url(v) => &v.uid,
            Self::Derived(v) => &v.uid,
            Self::Data(v) => &v.uid,
            Self::DerivedData(v) => &v.uid,
        }
    }

    /// Identity of the runtime instance: the loop instance uid for
    /// loop-scoped copies, the definition uid otherwise.
    pub fn instance_uid(&self) -> &str {
        match self {
            Self::Derived(DerivedVariable {
                loop_instance_uid: Some(instance),
                ..
            })
            | Self::DerivedData(DerivedDataVariable {
                loop_instance_uid: Some(instance),
                ..
            }) => instance.as_str(),
            other => other.uid(),
        }
    }

    pub fn typename(&self) -> Typename {
        match self {
            Self::Plain(_) => Typename::Variable,
            Self::Url(_) => Typename::UrlVariable,
            Self::Derived(_) => Typename::DerivedVariable,
            Self::Data(_) => Typename::DataVariable,
            Self::DerivedData(_) => Typename::DerivedDataVariable,
        }
    }

    pub fn nested(&self) -> &[String] {
        match self {
            Self::Plain(v) => &v.nested,
            Self::Url(v) => &v.nested,
            Self::Derived(v) => &v.nested,
            Self::Data(_) | Self::DerivedData(_) => &[],
        }
    }

    /// Plain and URL variables hold values directly on the client.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Plain(_) | Self::Url(_))
    }

    pub fn as_derived(&self) -> Option<DerivedView<'_>> {
        match self {
            Self::Derived(v) => Some(DerivedView {
                uid: &v.uid,
                variables: &v.variables,
                deps: v.deps.as_deref(),
                filters: None,
                polling_interval: v.polling_interval,
                loop_instance_uid: v.loop_instance_uid.as_deref(),
                is_data: false,
            }),
            Self::DerivedData(v) => Some(DerivedView {
                uid: &v.uid,
                variables: &v.variables,
                deps: v.deps.as_deref(),
                filters: v.filters.as_ref(),
                polling_interval: v.polling_interval,
                loop_instance_uid: v.loop_instance_uid.as_deref(),
                is_data: true,
            }),
            Self::Plain(_) | Self::Url(_) | Self::Data(_) => None,
        }
    }

    /// Checks that every dependency is one of the positional variables,
    /// recursively.
    pub fn validate(&self) -> Result<(), ModelError> {
        let Some(derived) = self.as_derived() else {
            return Ok(());
        };
        let variables = || derived.variables.iter().filter_map(Argument::as_variable);
        for dep in derived.deps.unwrap_or_default().iter().filter_map(Argument::as_variable) {
            if !variables().any(|v| v.uid() == dep.uid()) {
                return Err(ModelError::DepNotInVariables {
                    uid: derived.uid.to_string(),
                    dep: dep.uid().to_string(),
                });
            }
        }
        variables().try_for_each(Variable::validate)
    }
}

/// Loop placeholder, replaced by (a field of) the current loop item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopVariable {
    pub uid: String,
    #[serde(default)]
    pub nested: Vec<String>,
}

impl LoopVariable {
    /// Reads a placeholder straight off a template node.
    pub fn from_value(value: &Value) -> Option<Self> {
        if Typename::of(value) != Some(Typename::LoopVariable) {
            return None;
        }
        let uid = value.get("uid")?.as_str()?.to_string();
        let nested = value
            .get("nested")
            .and_then(Value::as_array)
            .map(|keys| {
                keys.iter()
                    .filter_map(|key| key.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Some(Self { uid, nested })
    }

    pub fn is_placeholder(value: &Value) -> bool {
        Typename::of(value) == Some(Typename::LoopVariable)
    }
}
