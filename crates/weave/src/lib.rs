//! Reactivity core of the weave UI runtime.
//!
//! Templates arrive as JSON trees of variable, action and component
//! descriptors. This crate finds the loop markers in them, normalizes
//! derived variables for the backend, keeps resolved values in a reactive
//! [`Store`] and renders `For` loops with per-item isolated copies.

pub mod actions;
pub mod config;
pub mod error;
pub mod for_loop;
pub mod markers;
pub mod resolver;
pub mod store;

pub use actions::{ActionExecutor, ActionFailure, ActionRegistry, ActionTrigger, ErrorPage, Notification};
pub use config::{BuildMode, RuntimeConfig};
pub use error::{ActionError, ConfigError, ResolveError, StoreError, TransportError};
pub use for_loop::{ForLoop, ForProps, ForRender, Suspend, Viewport};
pub use markers::{ItemKey, Marker, apply_markers, get_injection_markers, has_markers};
pub use resolver::{DependencySnapshot, NormalizedRequest, denormalize, normalize};
pub use store::{Backend, RequestExtras, Resolution, Store, Subscription};
pub use weave_model;
