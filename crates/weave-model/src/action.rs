//! Action instances embedded in templates.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::value::Value;
use crate::variable::{PlainVariable, Variable};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionImpl {
    pub uid: String,
    #[serde(default)]
    pub definition_uid: String,
    /// Flag variable set while the action runs. Loop copies get a fresh uid
    /// so every item tracks its own loading state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loading: Option<PlainVariable>,
    pub action: ActionKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ActionKind {
    UpdateVariable {
        variable: Variable,
        value: UpdateValue,
    },
    TriggerVariable {
        variable: Variable,
        #[serde(default)]
        force: bool,
    },
    /// Handler registered by the host application.
    Custom {
        handler: String,
        #[serde(default)]
        kwargs: Value,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateValue {
    /// Negate the current boolean.
    Toggle,
    /// Use the value supplied by the triggering input.
    Input,
    Literal(Value),
}

impl ActionImpl {
    pub fn from_value(value: &Value) -> Result<Self, ModelError> {
        serde_json::from_value(value.to_json()).map_err(|source| ModelError::InvalidDescriptor {
            kind: "action",
            source,
        })
    }

    /// Human-readable name used in error reports.
    pub fn name(&self) -> &str {
        match &self.action {
            ActionKind::UpdateVariable { .. } => "update_variable",
            ActionKind::TriggerVariable { .. } => "trigger_variable",
            ActionKind::Custom { handler, .. } => handler.as_str(),
        }
    }
}
