//! Descriptors for the weave reactive core.
//!
//! Everything here is an immutable value object produced by the template
//! producer: the persistent [`Value`] tree templates are made of, the
//! [`Variable`] sum type, loop placeholders, actions and filter queries.

pub mod action;
pub mod error;
pub mod filter;
pub mod value;
pub mod variable;

pub use action::{ActionImpl, ActionKind, UpdateValue};
pub use error::{ModelError, PathError};
pub use filter::{Combinator, FilterQuery, Operator};
pub use value::{Map, Path, Segment, Value};
pub use variable::{
    Argument, BackendStoreRef, CachePolicy, DataVariable, DerivedDataVariable, DerivedVariable, DerivedView,
    LoopVariable, PlainVariable, Typename, UrlVariable, Variable,
};
