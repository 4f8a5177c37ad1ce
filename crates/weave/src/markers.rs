//! Loop markers.
//!
//! A loop template is walked once to find every place that depends on the
//! current item ([`get_injection_markers`]). The markers are then applied to
//! each item ([`apply_markers`]) as structural updates, so the per-item cost
//! is proportional to the number of markers and not to the template size.
//!
//! ```text
//! template ──get_injection_markers──▶ [Marker] (once, memoized)
//!                                         │
//! item, key ──────────apply_markers───────┴──▶ per-item renderer
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use serde::Serialize;
use ulid::Ulid;
use weave_model::{LoopVariable, Path, PathError, Segment, Typename, Value};

/// One substitution point inside a template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Marker {
    /// Replace the placeholder at `path` with `nested` read off the item.
    LoopVar { path: Path, nested: Vec<String> },
    /// Give the action at `path` its own loading flag.
    Action { path: Path },
    /// Scope the derived variable at `path` to the item.
    DerivedVar {
        path: Path,
        loop_instance_uid: String,
    },
    /// Scope the server component at `path` to the item.
    ServerComponent {
        path: Path,
        loop_instance_uid: String,
    },
}

/// Render-list identity of a loop item.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ItemKey {
    Index(usize),
    Value(Arc<str>),
    /// Index used when the keyed value was not a primitive. Displayed as
    /// `#<index>` so it never matches a numeric key of another item.
    Fallback(usize),
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Value(value) => f.write_str(value),
            Self::Fallback(index) => write!(f, "#{index}"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Extraction
// ═══════════════════════════════════════════════════════════════════════════

/// Enclosing nodes seen on the current branch. Each kind is captured once:
/// the first (outermost) match on a branch wins.
#[derive(Clone, Default)]
struct Scope<'a> {
    action: Option<Path>,
    derived_var: Option<(Path, &'a str)>,
    server_component: Option<(Path, &'a str)>,
}

impl<'a> Scope<'a> {
    /// The scope for the children of `node`, if entering it captures anything.
    fn enter(&self, node: &'a Value, path: &Path) -> Option<Scope<'a>> {
        let uid = move || node.get("uid").and_then(Value::as_str);
        match Typename::of(node)? {
            Typename::ActionImpl if self.action.is_none() => Some(Scope {
                action: Some(path.clone()),
                ..self.clone()
            }),
            typename if typename.is_derived() && self.derived_var.is_none() => Some(Scope {
                derived_var: Some((path.clone(), uid()?)),
                ..self.clone()
            }),
            Typename::ServerComponent if self.server_component.is_none() => Some(Scope {
                server_component: Some((path.clone(), uid()?)),
                ..self.clone()
            }),
            _ => None,
        }
    }
}

/// Finds every marker in `renderer`, in traversal order (object key order,
/// then array index order).
pub fn get_injection_markers(renderer: &Value) -> Vec<Marker> {
    let mut markers = Vec::new();
    let mut path = Path::root();
    traverse(renderer, &mut path, &Scope::default(), &mut markers);
    markers
}

fn traverse<'a>(node: &'a Value, path: &mut Path, scope: &Scope<'a>, markers: &mut Vec<Marker>) {
    match node {
        Value::Object(map) => {
            for (key, child) in map.iter() {
                path.push(Segment::Key(key.clone()));
                visit(child, path, scope, markers);
                path.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                path.push(Segment::Index(index));
                visit(child, path, scope, markers);
                path.pop();
            }
        }
        _ => {}
    }
}

fn visit<'a>(node: &'a Value, path: &mut Path, scope: &Scope<'a>, markers: &mut Vec<Marker>) {
    if let Some(placeholder) = LoopVariable::from_value(node) {
        markers.push(Marker::LoopVar {
            path: path.clone(),
            nested: placeholder.nested,
        });
        if let Some(action) = &scope.action {
            markers.push(Marker::Action {
                path: action.clone(),
            });
        }
        if let Some((derived, uid)) = &scope.derived_var {
            markers.push(Marker::DerivedVar {
                path: derived.clone(),
                loop_instance_uid: uid.to_string(),
            });
        }
        if let Some((component, uid)) = &scope.server_component {
            markers.push(Marker::ServerComponent {
                path: component.clone(),
                loop_instance_uid: uid.to_string(),
            });
        }
        return;
    }
    if node.is_primitive() {
        return;
    }
    match scope.enter(node, path) {
        Some(inner) => traverse(node, path, &inner, markers),
        None => traverse(node, path, scope, markers),
    }
}

/// First top-level prop holding a loop placeholder. Only looks one level
/// deep; use it as a cheap guard before [`get_injection_markers`].
pub fn has_markers(component: &Value) -> Option<&str> {
    component
        .get("props")?
        .as_object()?
        .iter()
        .find(|(_, value)| LoopVariable::is_placeholder(value))
        .map(|(key, _)| &**key)
}

// ═══════════════════════════════════════════════════════════════════════════
// Application
// ═══════════════════════════════════════════════════════════════════════════

/// Per-item renderer for `loop_value`.
///
/// Without markers the very same tree is returned (`ptr_eq` holds). A marker
/// that does not fit the tree is logged and the unmodified template is
/// rendered instead, so one bad item never breaks its siblings.
pub fn apply_markers(
    renderer: &Value,
    markers: &[Marker],
    loop_value: &Value,
    item_key: &ItemKey,
) -> Value {
    if markers.is_empty() {
        return renderer.clone();
    }
    match try_apply_markers(renderer, markers, loop_value, item_key) {
        Ok(applied) => applied,
        Err(error) => {
            log::warn!("loop item '{item_key}' rendered without substitution: {error}");
            renderer.clone()
        }
    }
}

/// Like [`apply_markers`] but reports the failure.
pub fn try_apply_markers(
    renderer: &Value,
    markers: &[Marker],
    loop_value: &Value,
    item_key: &ItemKey,
) -> Result<Value, PathError> {
    markers
        .iter()
        .try_fold(renderer.clone(), |tree, marker| match marker {
            Marker::LoopVar { path, nested } => tree.set_at(path, loop_value.resolve_nested(nested)),
            Marker::Action { path } => tree.set_at(
                &path.join(&["loading", "uid"]),
                Value::text(Ulid::new().to_string()),
            ),
            Marker::DerivedVar {
                path,
                loop_instance_uid,
            }
            | Marker::ServerComponent {
                path,
                loop_instance_uid,
            } => tree.set_at(
                &path.join(&["loop_instance_uid"]),
                Value::text(format!("{loop_instance_uid}:{item_key}")),
            ),
        })
}

/// Markers of the last template seen, keyed by template identity.
#[derive(Default)]
pub struct MarkerCache {
    entry: RefCell<Option<(Value, Rc<[Marker]>)>>,
}

impl MarkerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn markers_for(&self, template: &Value) -> Rc<[Marker]> {
        if let Some((cached, markers)) = &*self.entry.borrow() {
            if cached.ptr_eq(template) {
                return markers.clone();
            }
        }
        let markers: Rc<[Marker]> = get_injection_markers(template).into();
        *self.entry.borrow_mut() = Some((template.clone(), markers.clone()));
        markers
    }
}
