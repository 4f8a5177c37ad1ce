//! Reactive value store.
//!
//! One cell per `(uid, extras)` pair. Plain variables live in leaf cells
//! that stay synchronized across contexts; url variables read the current
//! query; everything else is resolved by the [`Backend`] into derived cells:
//!
//! ```text
//!            read / subscribe
//!                  │
//!   Unresolved ──▶ Resolving ──▶ Resolved
//!                     ▲              │
//!                     └── dependency change, trigger, poll
//! ```
//!
//! Every request carries the cell's generation token. A response whose
//! token is no longer current is dropped, so a slow first request never
//! overwrites a fast second one.
//!
//! The store is single-threaded: state sits behind a `RefCell`, async work
//! runs on an injected [`LocalSpawn`], and callbacks only run after the
//! state borrow is released.

mod backend;
mod cell;
mod clock;
mod extras;
mod subscription;
mod url;

pub use backend::{Backend, DerivedRequest, DerivedResponse, StoreMessage, persist_body, store_path};
pub use cell::{Outcome, Phase};
pub use clock::{Clock, SystemClock, TestClock};
pub use extras::{CellKey, ExtrasKey, RequestExtras};
pub use subscription::{Notify, Subscription};
pub use url::Query;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use futures::future::LocalBoxFuture;
use futures::task::{LocalSpawn, LocalSpawnExt};
use futures::{FutureExt, StreamExt};
use futures_channel::mpsc::UnboundedReceiver;
use futures_channel::oneshot;
use rustc_hash::{FxHashMap, FxHashSet};
use weave_model::{Path, PlainVariable, UrlVariable, Value, Variable};

use crate::config::RuntimeConfig;
use crate::error::{ResolveError, StoreError};
use crate::resolver::{DependencySnapshot, Forced, ValueSource, normalize};
use cell::{DerivedCell, LeafCell, Waiter};
use subscription::{Subscribers, Topic};

/// What a read observed.
#[derive(Clone, Debug)]
pub enum Resolution {
    Ready(Value),
    /// The last value, while a newer one is being resolved.
    Refreshing(Value),
    /// Nothing to show yet; render a fallback.
    Pending,
    Failed(Rc<ResolveError>),
}

impl Resolution {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Ready(value) | Self::Refreshing(value) => Some(value),
            Self::Pending | Self::Failed(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

#[derive(Default)]
struct State {
    leaves: FxHashMap<Arc<str>, FxHashMap<ExtrasKey, LeafCell>>,
    derived: FxHashMap<CellKey, DerivedCell>,
    query: Query,
    /// Query parameter of every url variable seen so far, by uid.
    url_params: FxHashMap<Arc<str>, String>,
    triggers: FxHashMap<String, u64>,
    /// Uids whose latest trigger asked the backend to skip its cache.
    forced: FxHashSet<String>,
    /// Plain variable uids bound to each backend store.
    store_bindings: FxHashMap<String, Vec<Arc<str>>>,
    subscribers: Subscribers,
}

impl State {
    fn leaf_cell(&mut self, plain: &PlainVariable, extras: &ExtrasKey) -> &mut LeafCell {
        let group = self.leaves.entry(plain.uid.as_str().into()).or_default();
        let synced = group.values().next().map(|cell| cell.value.clone());
        group
            .entry(extras.clone())
            .or_insert_with(|| LeafCell::new(synced.unwrap_or_else(|| plain.default.clone())))
    }

    /// Overwrites the raw value of `uid` in every context.
    fn set_leaf(&mut self, uid: &str, value: &Value) {
        if let Some(group) = self.leaves.get_mut(uid) {
            for cell in group.values_mut() {
                cell.value = value.clone();
            }
        }
    }

    fn url_value(&self, url: &UrlVariable) -> Value {
        self.query
            .value_of(&url.query)
            .unwrap_or_else(|| url.default.clone())
    }

    fn source<'a>(&'a self, extras: &'a ExtrasKey) -> StateSource<'a> {
        StateSource { state: self, extras }
    }
}

struct StateSource<'a> {
    state: &'a State,
    extras: &'a ExtrasKey,
}

impl ValueSource for StateSource<'_> {
    fn leaf_value(&self, variable: &Variable) -> Option<Value> {
        match variable {
            Variable::Plain(plain) => {
                let group = self.state.leaves.get(plain.uid.as_str());
                let cell = group.and_then(|group| group.get(self.extras).or_else(|| group.values().next()));
                Some(cell.map_or_else(|| plain.default.clone(), |cell| cell.value.clone()))
            }
            Variable::Url(url) => Some(self.state.url_value(url)),
            _ => None,
        }
    }

    fn trigger_count(&self, uid: &str) -> u64 {
        self.state.triggers.get(uid).copied().unwrap_or(0)
    }
}

pub(crate) struct Shared {
    backend: Rc<dyn Backend>,
    spawner: Rc<dyn LocalSpawn>,
    clock: Rc<dyn Clock>,
    config: RuntimeConfig,
    state: RefCell<State>,
}

impl Shared {
    fn unsubscribe(&self, id: u64) {
        let Ok(mut state) = self.state.try_borrow_mut() else {
            log::warn!("subscription {id} dropped while the store was busy");
            return;
        };
        let Some(Topic::Cell(key)) = state.subscribers.remove(id) else {
            return;
        };
        if state.subscribers.has_cell(&key) {
            return;
        }
        let evicted = state.derived.remove(&key);
        drop(state);
        if evicted.is_some() {
            log::debug!("evicted unreferenced cell '{key}'");
        }
    }
}

pub struct StoreBuilder {
    backend: Rc<dyn Backend>,
    spawner: Rc<dyn LocalSpawn>,
    clock: Rc<dyn Clock>,
    config: RuntimeConfig,
    query: Query,
}

impl StoreBuilder {
    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Initial query string for url variables.
    pub fn query(mut self, query: &str) -> Self {
        self.query = Query::parse(query);
        self
    }

    pub fn build(self) -> Store {
        let state = State {
            query: self.query,
            ..State::default()
        };
        Store {
            shared: Rc::new(Shared {
                backend: self.backend,
                spawner: self.spawner,
                clock: self.clock,
                config: self.config,
                state: RefCell::new(state),
            }),
        }
    }
}

/// Handle to the shared value cells. Clones share state.
#[derive(Clone)]
pub struct Store {
    shared: Rc<Shared>,
}

impl Store {
    pub fn new(backend: Rc<dyn Backend>, spawner: Rc<dyn LocalSpawn>) -> Self {
        Self::builder(backend, spawner).build()
    }

    pub fn builder(backend: Rc<dyn Backend>, spawner: Rc<dyn LocalSpawn>) -> StoreBuilder {
        StoreBuilder {
            backend,
            spawner,
            clock: Rc::new(SystemClock),
            config: RuntimeConfig::default(),
            query: Query::default(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    pub fn query(&self) -> Query {
        self.shared.state.borrow().query.clone()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════════

    /// Current value of `variable` in the `extras` context.
    ///
    /// Leaves answer synchronously. Backend-resolved variables answer from
    /// their cell and start a request when the cell is stale.
    pub fn read(&self, variable: &Variable, extras: &RequestExtras) -> Resolution {
        match variable {
            Variable::Plain(plain) => {
                let mut state = self.shared.state.borrow_mut();
                state.leaf_cell(plain, &extras.key()).resolution(&plain.nested)
            }
            Variable::Url(url) => {
                let mut state = self.shared.state.borrow_mut();
                state.url_params.insert(url.uid.as_str().into(), url.query.clone());
                Resolution::Ready(state.url_value(url).resolve_nested(&url.nested))
            }
            _ => self.read_derived(variable, extras),
        }
    }

    fn read_derived(&self, variable: &Variable, extras: &RequestExtras) -> Resolution {
        let key = CellKey::new(variable.instance_uid(), extras);
        let now = self.shared.clock.now_ms();
        let stale = {
            let mut state = self.shared.state.borrow_mut();
            let snapshot = match DependencySnapshot::capture(variable, &state.source(&key.extras)) {
                Ok(snapshot) => snapshot,
                Err(error) => return Resolution::Failed(Rc::new(error)),
            };
            let cell = state
                .derived
                .entry(key.clone())
                .or_insert_with(|| DerivedCell::new(variable.clone(), extras.clone()));
            if cell.variable != *variable {
                cell.variable = variable.clone();
            }
            cell.is_stale(&snapshot, now).then_some(snapshot)
        };
        if let Some(snapshot) = stale {
            self.start_resolution(&key, snapshot);
        }
        let state = self.shared.state.borrow();
        state
            .derived
            .get(&key)
            .map_or(Resolution::Pending, |cell| cell.resolution(variable.nested()))
    }

    /// Waits for the next settled value of `variable`.
    ///
    /// Settles immediately when the cell already holds a current value.
    pub fn resolve(&self, variable: &Variable, extras: &RequestExtras) -> LocalBoxFuture<'static, Outcome> {
        let waiter = match self.read(variable, extras) {
            Resolution::Ready(value) => return async move { Ok(value) }.boxed_local(),
            Resolution::Failed(error) => return async move { Err(error) }.boxed_local(),
            Resolution::Pending | Resolution::Refreshing(_) => self.wait_for(variable, extras),
        };
        let nested = variable.nested().to_vec();
        let uid = variable.instance_uid().to_string();
        async move {
            match waiter.await {
                Ok(outcome) => outcome.map(|value| value.resolve_nested(&nested)),
                Err(oneshot::Canceled) => Err(Rc::new(ResolveError::Cancelled { uid })),
            }
        }
        .boxed_local()
    }

    fn wait_for(&self, variable: &Variable, extras: &RequestExtras) -> oneshot::Receiver<Outcome> {
        let (sender, receiver) = oneshot::channel();
        let mut state = self.shared.state.borrow_mut();
        let waiters: Option<&mut Vec<Waiter>> = match variable {
            Variable::Plain(plain) => Some(&mut state.leaf_cell(plain, &extras.key()).waiters),
            Variable::Url(_) => None,
            other => state
                .derived
                .get_mut(&CellKey::new(other.instance_uid(), extras))
                .map(|cell| &mut cell.waiters),
        };
        if let Some(waiters) = waiters {
            waiters.push(sender);
        }
        receiver
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Resolution
    // ═══════════════════════════════════════════════════════════════════════

    fn start_resolution(&self, key: &CellKey, snapshot: DependencySnapshot) {
        let (request, extras, generation) = {
            let mut state = self.shared.state.borrow_mut();
            let state = &mut *state;
            let Some(cell) = state.derived.get(key) else {
                return;
            };
            let forced: Forced = match &cell.snapshot {
                Some(previous) => snapshot
                    .triggered_since(previous)
                    .filter(|uid| state.forced.contains(*uid))
                    .map(str::to_string)
                    .collect(),
                None => Forced::default(),
            };
            let request = normalize(&cell.variable, &state.source(&key.extras), &forced);
            let Some(cell) = state.derived.get_mut(key) else {
                return;
            };
            let generation = cell.begin(snapshot);
            let request = request.map(|values| DerivedRequest {
                uid: cell.variable.uid().to_string(),
                values,
                ws_channel: self.shared.config.ws_channel.clone(),
            });
            (request, cell.extras.clone(), generation)
        };
        let request = match request {
            Ok(request) => request,
            Err(error) => {
                self.settle(key, generation, Err(Rc::new(error)));
                return;
            }
        };

        log::debug!("resolving '{key}' (generation {generation})");
        let response = self.shared.backend.resolve_derived(request, &extras);
        let store = Rc::downgrade(&self.shared);
        let task_key = key.clone();
        let task = async move {
            let outcome = match response.await {
                Ok(response) => response.into_value(),
                Err(error) => Err(error.into()),
            };
            if let Some(shared) = store.upgrade() {
                Store { shared }.settle(&task_key, generation, outcome.map_err(Rc::new));
            }
        };
        if let Err(error) = self.shared.spawner.spawn_local(task) {
            log::error!("could not spawn resolution of '{key}': {error}");
            let uid = key.uid.to_string();
            self.settle(key, generation, Err(Rc::new(ResolveError::Cancelled { uid })));
        }
    }

    fn settle(&self, key: &CellKey, generation: u64, outcome: Outcome) {
        let now = self.shared.clock.now_ms();
        let (waiters, notify) = {
            let mut state = self.shared.state.borrow_mut();
            let Some(cell) = state.derived.get_mut(key) else {
                log::debug!("dropping response for evicted cell '{key}'");
                return;
            };
            if cell.generation != generation {
                log::debug!(
                    "discarding stale response for '{key}' (generation {generation}, current {})",
                    cell.generation
                );
                return;
            }
            if let Err(error) = &outcome {
                log::warn!("resolution of '{key}' failed: {error}");
            }
            let waiters = cell.settle(outcome.clone(), now);
            (waiters, state.subscribers.for_cell(key))
        };
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
        notify.iter().for_each(|notify| notify());
    }

    /// Restarts every subscribed cell whose dependencies moved on and
    /// returns the callbacks to run once the caller is done.
    fn propagate(&self) -> Vec<Notify> {
        let now = self.shared.clock.now_ms();
        let stale: Vec<(CellKey, DependencySnapshot)> = {
            let state = self.shared.state.borrow();
            state
                .subscribers
                .watched_cells()
                .into_iter()
                .filter_map(|key| {
                    let cell = state.derived.get(&key)?;
                    match DependencySnapshot::capture(&cell.variable, &state.source(&key.extras)) {
                        Ok(snapshot) => cell.is_stale(&snapshot, now).then_some((key, snapshot)),
                        Err(error) => {
                            log::warn!("cannot track dependencies of '{key}': {error}");
                            None
                        }
                    }
                })
                .collect()
        };
        let mut notify = Vec::new();
        for (key, snapshot) in stale {
            self.start_resolution(&key, snapshot);
            notify.extend(self.shared.state.borrow().subscribers.for_cell(&key));
        }
        notify
    }

    fn changed(&self, uids: &[Arc<str>]) {
        let mut notify: Vec<Notify> = {
            let state = self.shared.state.borrow();
            uids.iter()
                .flat_map(|uid| state.subscribers.for_leaf(uid))
                .collect()
        };
        notify.extend(self.propagate());
        notify.iter().for_each(|notify| notify());
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Writes
    // ═══════════════════════════════════════════════════════════════════════

    /// Sets the value of `variable` at its nested path.
    ///
    /// Every context of the same uid sees the new value. A backend-store
    /// binding persists it with the writer's `extras` only.
    pub fn write(&self, variable: &Variable, extras: &RequestExtras, value: Value) -> Result<(), StoreError> {
        let nested = Path::from_keys(variable.nested());
        let uid: Arc<str> = variable.uid().into();
        let at_path = |current: &Value| {
            if nested.is_empty() {
                Ok(value.clone())
            } else {
                current.set_at(&nested, value.clone()).map_err(|source| StoreError::Path {
                    uid: uid.to_string(),
                    source,
                })
            }
        };
        match variable {
            Variable::Plain(plain) => {
                let raw = {
                    let mut state = self.shared.state.borrow_mut();
                    let raw = at_path(&state.leaf_cell(plain, &extras.key()).value)?;
                    state.set_leaf(&plain.uid, &raw);
                    raw
                };
                if let Some(store) = &plain.store {
                    self.persist(&store.uid, raw, extras);
                }
            }
            Variable::Url(url) => {
                let changed = {
                    let mut state = self.shared.state.borrow_mut();
                    state.url_params.insert(uid.clone(), url.query.clone());
                    let raw = at_path(&state.url_value(url))?;
                    state.query.set_value(&url.query, &raw)
                };
                if !changed {
                    return Ok(());
                }
            }
            other => {
                return Err(StoreError::NotWritable {
                    uid: other.uid().to_string(),
                });
            }
        }
        self.changed(&[uid]);
        Ok(())
    }

    /// Negates the boolean at the variable's nested path. Anything that is
    /// not `true` counts as `false`.
    pub fn toggle(&self, variable: &Variable, extras: &RequestExtras) -> Result<(), StoreError> {
        let current = self
            .read(variable, extras)
            .value()
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.write(variable, extras, Value::Bool(!current))
    }

    /// Overwrites the value at the nested path with input from the page.
    pub fn sync(&self, variable: &Variable, extras: &RequestExtras, input: Value) -> Result<(), StoreError> {
        self.write(variable, extras, input)
    }

    fn persist(&self, store_uid: &str, value: Value, extras: &RequestExtras) {
        let request = self.shared.backend.persist_store(store_uid, value, extras);
        let store_uid = store_uid.to_string();
        let task = async move {
            if let Err(error) = request.await {
                log::error!("could not persist backend store '{store_uid}': {error}");
            }
        };
        if let Err(error) = self.shared.spawner.spawn_local(task) {
            log::error!("could not spawn backend store write: {error}");
        }
    }

    /// Forces one recomputation of every subscribed cell whose tracked tree
    /// contains `variable`. With `force`, the backend is asked to skip its
    /// cache for that node alone.
    pub fn trigger(&self, variable: &Variable, force: bool) {
        let uid = variable.instance_uid().to_string();
        {
            let mut state = self.shared.state.borrow_mut();
            *state.triggers.entry(uid.clone()).or_default() += 1;
            if force {
                state.forced.insert(uid.clone());
            } else {
                state.forced.remove(&uid);
            }
        }
        log::debug!("triggered '{uid}' (force: {force})");
        self.changed(&[]);
    }

    /// Restarts subscribed cells whose polling interval elapsed.
    pub fn poll(&self) {
        self.changed(&[]);
    }

    /// Replaces the query string, as after a navigation.
    pub fn navigate(&self, query: &str) {
        let next = Query::parse(query);
        let uids: Vec<Arc<str>> = {
            let mut state = self.shared.state.borrow_mut();
            let uids = {
                let changed: FxHashSet<&str> = next.changed_names(&state.query).collect();
                state
                    .url_params
                    .iter()
                    .filter(|(_, name)| changed.contains(name.as_str()))
                    .map(|(uid, _)| uid.clone())
                    .collect()
            };
            state.query = next;
            uids
        };
        self.changed(&uids);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Backend stores
    // ═══════════════════════════════════════════════════════════════════════

    /// Loads the persisted value of a backend-store variable. Reads in this
    /// context stay pending until the fetch completes.
    pub async fn mount_backend_variable(&self, variable: &Variable, extras: &RequestExtras) -> Result<(), StoreError> {
        let (plain, store_uid) = match variable {
            Variable::Plain(plain @ PlainVariable { store: Some(store), .. }) => (plain, store.uid.clone()),
            other => {
                return Err(StoreError::NoBackendStore {
                    uid: other.uid().to_string(),
                });
            }
        };
        let key = extras.key();
        {
            let mut state = self.shared.state.borrow_mut();
            state.leaf_cell(plain, &key).loading = true;
            let bound = state.store_bindings.entry(store_uid.clone()).or_default();
            if !bound.iter().any(|uid| **uid == *plain.uid) {
                bound.push(plain.uid.as_str().into());
            }
        }

        let fetched = self.shared.backend.fetch_store(&store_uid, extras).await;

        let (waiters, value) = {
            let mut state = self.shared.state.borrow_mut();
            if let Ok(remote) = &fetched {
                if !remote.is_null() {
                    state.set_leaf(&plain.uid, remote);
                }
            }
            let cell = state.leaf_cell(plain, &key);
            cell.loading = false;
            (std::mem::take(&mut cell.waiters), cell.value.clone())
        };
        for waiter in waiters {
            let _ = waiter.send(Ok(value.clone()));
        }
        self.changed(&[plain.uid.as_str().into()]);
        fetched.map(drop).map_err(|error| {
            log::error!("could not fetch backend store '{store_uid}': {error}");
            error.into()
        })
    }

    /// Applies a push notification to every variable bound to its store.
    pub fn apply_store_message(&self, message: StoreMessage) {
        let uids = {
            let mut state = self.shared.state.borrow_mut();
            let Some(uids) = state.store_bindings.get(&message.store_uid).cloned() else {
                log::debug!("ignoring message for unbound store '{}'", message.store_uid);
                return;
            };
            for uid in &uids {
                state.set_leaf(uid, &message.value);
            }
            uids
        };
        self.changed(&uids);
    }

    /// Applies every message received on `messages` until the channel closes
    /// or the store is dropped.
    pub fn listen(&self, mut messages: UnboundedReceiver<StoreMessage>) {
        let store = Rc::downgrade(&self.shared);
        let task = async move {
            while let Some(message) = messages.next().await {
                let Some(shared) = store.upgrade() else {
                    break;
                };
                Store { shared }.apply_store_message(message);
            }
        };
        if let Err(error) = self.shared.spawner.spawn_local(task) {
            log::error!("could not spawn store listener: {error}");
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Calls `notify` whenever the value read for `variable` may have
    /// changed. Dropping the guard unsubscribes.
    pub fn subscribe(&self, variable: &Variable, extras: &RequestExtras, notify: impl Fn() + 'static) -> Subscription {
        let topic = match variable {
            Variable::Plain(_) | Variable::Url(_) => Topic::Leaf(variable.uid().into()),
            other => Topic::Cell(CellKey::new(other.instance_uid(), extras)),
        };
        let mut state = self.shared.state.borrow_mut();
        if let Variable::Url(url) = variable {
            state.url_params.insert(url.uid.as_str().into(), url.query.clone());
        }
        let id = state.subscribers.insert(topic, Rc::new(notify));
        Subscription::new(id, Rc::downgrade(&self.shared))
    }

    /// Lifecycle phase of the cell backing `variable`, if it has one.
    pub fn phase(&self, variable: &Variable, extras: &RequestExtras) -> Option<Phase> {
        let state = self.shared.state.borrow();
        let cell = state.derived.get(&CellKey::new(variable.instance_uid(), extras))?;
        Some(cell.phase)
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.state.borrow().subscribers.len()
    }

    /// Whether a cell exists for `variable` in this context.
    pub fn has_cell(&self, variable: &Variable, extras: &RequestExtras) -> bool {
        let state = self.shared.state.borrow();
        match variable {
            Variable::Plain(plain) => state
                .leaves
                .get(plain.uid.as_str())
                .is_some_and(|group| group.contains_key(&extras.key())),
            Variable::Url(_) => false,
            other => state
                .derived
                .contains_key(&CellKey::new(other.instance_uid(), extras)),
        }
    }

    /// Evicts derived cells that nothing subscribes to or waits on, and
    /// returns how many were dropped. Cells created by plain reads (a loop
    /// over changing keys, say) are otherwise kept until [`Store::clear`].
    pub fn sweep(&self) -> usize {
        let mut state = self.shared.state.borrow_mut();
        let state = &mut *state;
        let before = state.derived.len();
        let subscribers = &state.subscribers;
        state
            .derived
            .retain(|key, cell| subscribers.has_cell(key) || !cell.waiters.is_empty());
        let evicted = before - state.derived.len();
        if evicted > 0 {
            log::debug!("swept {evicted} unreferenced cells");
        }
        evicted
    }

    /// Drops every cell, subscription and trigger. Pending `resolve` calls
    /// fail with [`ResolveError::Cancelled`]. The query string is kept, so
    /// url variables still read the current location.
    pub fn clear(&self) {
        let previous = {
            let mut state = self.shared.state.borrow_mut();
            let kept = State {
                query: state.query.clone(),
                url_params: state.url_params.clone(),
                ..State::default()
            };
            std::mem::replace(&mut *state, kept)
        };
        log::debug!(
            "cleared store ({} leaf groups, {} derived cells)",
            previous.leaves.len(),
            previous.derived.len()
        );
        drop(previous);
    }
}
