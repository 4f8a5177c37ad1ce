//! The `For` component.
//!
//! Renders one child per element of an array-valued variable. Each child is
//! the renderer template with loop markers applied for its item, so nested
//! derived variables and actions get per-item identities.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use weave_model::{ModelError, Value, Variable};

use crate::error::ResolveError;
use crate::markers::{ItemKey, MarkerCache, apply_markers};
use crate::store::{RequestExtras, Resolution, Store};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Vertical,
    Horizontal,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Virtualization {
    /// Extent of one item along `direction`, in pixels.
    pub size: f64,
    #[serde(default)]
    pub direction: Direction,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ForProps {
    pub items: Variable,
    pub renderer: Value,
    /// Dotted path read off each item for its key. Keys must be unique
    /// across the list; duplicates are a caller error.
    #[serde(default)]
    pub key_accessor: Option<String>,
    #[serde(default)]
    pub virtualization: Option<Virtualization>,
}

impl ForProps {
    pub fn from_value(value: &Value) -> Result<Self, ModelError> {
        serde_json::from_value(value.to_json()).map_err(|source| ModelError::InvalidDescriptor {
            kind: "for props",
            source,
        })
    }
}

/// Scrolled region of the loop's container, along its direction.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub offset: f64,
    pub extent: f64,
}

/// Whether a subtree shows a fallback while something inside it loads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Suspend {
    #[default]
    Off,
    On,
    /// Suspend only once loading takes longer than this many milliseconds.
    Threshold(u64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderedItem {
    pub index: usize,
    pub key: ItemKey,
    pub renderer: Value,
    /// Inherited from the loop's parent.
    pub suspend: Suspend,
}

/// Materialized slice of a virtualized list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Window {
    pub start: usize,
    pub end: usize,
    /// Leading space before the first materialized item.
    pub offset: f64,
    pub content_size: f64,
    pub direction: Direction,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderedList {
    pub items: Vec<RenderedItem>,
    /// Always `Off`: one loading item never suspends the whole list.
    pub suspend: Suspend,
    pub total: usize,
    pub window: Option<Window>,
}

#[derive(Clone, Debug)]
pub enum ForRender {
    Pending,
    Failed(Rc<ResolveError>),
    Items(RenderedList),
}

impl ForRender {
    pub fn items(&self) -> &[RenderedItem] {
        match self {
            Self::Items(list) => &list.items,
            Self::Pending | Self::Failed(_) => &[],
        }
    }
}

pub struct ForLoop {
    props: ForProps,
    markers: MarkerCache,
    /// Last renderer produced per key, with the item it was produced for.
    recycled: RefCell<FxHashMap<ItemKey, (Value, Value)>>,
}

impl ForLoop {
    pub fn new(props: ForProps) -> Self {
        Self {
            props,
            markers: MarkerCache::new(),
            recycled: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn props(&self) -> &ForProps {
        &self.props
    }

    /// Renders the children for the current value of `items`.
    ///
    /// `viewport` is only used when virtualization is configured; without
    /// it every item is materialized.
    pub fn render(
        &self,
        store: &Store,
        extras: &RequestExtras,
        parent_suspend: Suspend,
        viewport: Option<Viewport>,
    ) -> ForRender {
        let items = match store.read(&self.props.items, extras) {
            Resolution::Ready(items) | Resolution::Refreshing(items) => items,
            Resolution::Pending => return ForRender::Pending,
            Resolution::Failed(error) => return ForRender::Failed(error),
        };
        let items: &[Value] = match &items {
            Value::Array(items) => items.as_slice(),
            Value::Null => &[],
            other => {
                log::warn!("loop over '{}' got a non-array value: {other}", self.props.items.uid());
                &[]
            }
        };

        let template = &self.props.renderer;
        let markers = self.markers.markers_for(template);
        let keys: Vec<ItemKey> = items
            .iter()
            .enumerate()
            .map(|(index, item)| self.item_key(index, item))
            .collect();

        let window = match (self.props.virtualization, viewport) {
            (Some(virtualization), Some(viewport)) => Some(visible_window(
                items.len(),
                virtualization,
                viewport,
                store.config().overscan,
            )),
            _ => None,
        };
        let range = window.map_or(0..items.len(), |window| window.start..window.end);

        let mut recycled = self.recycled.borrow_mut();
        let rendered = range
            .map(|index| {
                let key = keys[index].clone();
                let item = &items[index];
                let renderer = match recycled.get(&key) {
                    Some((previous, renderer)) if previous == item => renderer.clone(),
                    _ => {
                        let renderer = apply_markers(template, &markers, item, &key);
                        recycled.insert(key.clone(), (item.clone(), renderer.clone()));
                        renderer
                    }
                };
                RenderedItem {
                    index,
                    key,
                    renderer,
                    suspend: parent_suspend,
                }
            })
            .collect();
        let live: FxHashSet<&ItemKey> = keys.iter().collect();
        recycled.retain(|key, _| live.contains(key));

        ForRender::Items(RenderedList {
            items: rendered,
            suspend: Suspend::Off,
            total: items.len(),
            window,
        })
    }

    fn item_key(&self, index: usize, item: &Value) -> ItemKey {
        let Some(accessor) = &self.props.key_accessor else {
            return ItemKey::Index(index);
        };
        let path: Vec<&str> = accessor.split('.').collect();
        match item.resolve_nested(&path) {
            Value::String(text) => ItemKey::Value(text),
            Value::Number(number) => ItemKey::Value(number.to_string().into()),
            Value::Bool(flag) => ItemKey::Value(flag.to_string().into()),
            other => {
                log::warn!("key '{accessor}' of item {index} is not a primitive ({other}); keying by index");
                ItemKey::Fallback(index)
            }
        }
    }
}

fn visible_window(total: usize, virtualization: Virtualization, viewport: Viewport, overscan: usize) -> Window {
    let size = virtualization.size;
    let content_size = total as f64 * size;
    let (start, end) = if size > 0.0 {
        let first = (viewport.offset.max(0.0) / size).floor() as usize;
        let visible = (viewport.extent.max(0.0) / size).ceil() as usize;
        (
            first.saturating_sub(overscan).min(total),
            first.saturating_add(visible).saturating_add(overscan).min(total),
        )
    } else {
        (0, total)
    };
    Window {
        start,
        end,
        offset: start as f64 * size,
        content_size,
        direction: virtualization.direction,
    }
}
