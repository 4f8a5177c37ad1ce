//! Filter queries attached to data variables.
//!
//! The client never evaluates these; they are carried to the backend as-is.

use serde::{Deserialize, Serialize};

use crate::value::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterQuery {
    Clause {
        combinator: Combinator,
        clauses: Vec<FilterQuery>,
    },
    Leaf {
        column: String,
        operator: Operator,
        value: Value,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    Eq,
    Contains,
    Lt,
    Gt,
    /// Between; `value` is a two-element array.
    Bt,
    Ne,
}

impl FilterQuery {
    pub fn leaf(column: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self::Leaf {
            column: column.into(),
            operator,
            value,
        }
    }

    pub fn all(clauses: impl IntoIterator<Item = FilterQuery>) -> Self {
        Self::Clause {
            combinator: Combinator::And,
            clauses: clauses.into_iter().collect(),
        }
    }

    pub fn any(clauses: impl IntoIterator<Item = FilterQuery>) -> Self {
        Self::Clause {
            combinator: Combinator::Or,
            clauses: clauses.into_iter().collect(),
        }
    }
}
