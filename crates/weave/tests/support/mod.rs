//! Shared harness: a backend whose responses are completed by hand and a
//! local pool to drive the store's tasks.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures::FutureExt;
use futures::executor::LocalPool;
use futures::future::LocalBoxFuture;
use futures_channel::oneshot;
use weave::store::{Backend, DerivedRequest, DerivedResponse, TestClock};
use weave::weave_model::{Value, Variable};
use weave::{RequestExtras, RuntimeConfig, Store, TransportError};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn value(json: serde_json::Value) -> Value {
    Value::from(json)
}

pub fn variable(json: serde_json::Value) -> Variable {
    Variable::from_value(&Value::from(json)).expect("valid descriptor")
}

type Reply<T> = oneshot::Sender<Result<T, TransportError>>;

struct Pending {
    request: DerivedRequest,
    extras: RequestExtras,
    reply: Option<Reply<DerivedResponse>>,
}

#[derive(Default)]
struct Inner {
    derived: Vec<Pending>,
    stores: HashMap<String, Value>,
    fetches: Vec<(String, RequestExtras)>,
    held_fetches: Vec<(String, Reply<Value>)>,
    hold_fetches: bool,
    persisted: Vec<(String, Value, RequestExtras)>,
}

/// Records every call. Derived requests stay pending until answered with
/// [`FakeBackend::respond`] or [`FakeBackend::fail`].
#[derive(Default)]
pub struct FakeBackend {
    inner: RefCell<Inner>,
}

impl FakeBackend {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn request_count(&self) -> usize {
        self.inner.borrow().derived.len()
    }

    pub fn request(&self, index: usize) -> DerivedRequest {
        self.inner.borrow().derived[index].request.clone()
    }

    /// The request as it would go over the wire.
    pub fn request_json(&self, index: usize) -> serde_json::Value {
        serde_json::to_value(self.request(index)).expect("serializable request")
    }

    pub fn request_extras(&self, index: usize) -> RequestExtras {
        self.inner.borrow().derived[index].extras.clone()
    }

    pub fn respond(&self, index: usize, value: Value) {
        self.reply(index, Ok(DerivedResponse::Value(value)));
    }

    pub fn respond_with(&self, index: usize, response: DerivedResponse) {
        self.reply(index, Ok(response));
    }

    pub fn fail(&self, index: usize, error: TransportError) {
        self.reply(index, Err(error));
    }

    fn reply(&self, index: usize, result: Result<DerivedResponse, TransportError>) {
        let reply = self.inner.borrow_mut().derived[index]
            .reply
            .take()
            .expect("request answered twice");
        let _ = reply.send(result);
    }

    pub fn set_store(&self, store_uid: &str, value: Value) {
        self.inner.borrow_mut().stores.insert(store_uid.to_string(), value);
    }

    /// Keeps store fetches pending until [`FakeBackend::release_fetches`].
    pub fn hold_fetches(&self) {
        self.inner.borrow_mut().hold_fetches = true;
    }

    pub fn release_fetches(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.hold_fetches = false;
        let held = std::mem::take(&mut inner.held_fetches);
        for (store_uid, reply) in held {
            let value = inner.stores.get(&store_uid).cloned().unwrap_or_default();
            let _ = reply.send(Ok(value));
        }
    }

    pub fn fetches(&self) -> Vec<(String, RequestExtras)> {
        self.inner.borrow().fetches.clone()
    }

    pub fn persisted(&self) -> Vec<(String, Value, RequestExtras)> {
        self.inner.borrow().persisted.clone()
    }
}

impl Backend for FakeBackend {
    fn resolve_derived(
        &self,
        request: DerivedRequest,
        extras: &RequestExtras,
    ) -> LocalBoxFuture<'static, Result<DerivedResponse, TransportError>> {
        let (reply, response) = oneshot::channel();
        self.inner.borrow_mut().derived.push(Pending {
            request,
            extras: extras.clone(),
            reply: Some(reply),
        });
        async move {
            response
                .await
                .unwrap_or_else(|_| Err(TransportError::Network("request dropped".into())))
        }
        .boxed_local()
    }

    fn fetch_store(&self, store_uid: &str, extras: &RequestExtras) -> LocalBoxFuture<'static, Result<Value, TransportError>> {
        let mut inner = self.inner.borrow_mut();
        inner.fetches.push((store_uid.to_string(), extras.clone()));
        if inner.hold_fetches {
            let (reply, response) = oneshot::channel();
            inner.held_fetches.push((store_uid.to_string(), reply));
            return async move {
                response
                    .await
                    .unwrap_or_else(|_| Err(TransportError::Network("fetch dropped".into())))
            }
            .boxed_local();
        }
        let value = inner.stores.get(store_uid).cloned().unwrap_or_default();
        async move { Ok(value) }.boxed_local()
    }

    fn persist_store(
        &self,
        store_uid: &str,
        value: Value,
        extras: &RequestExtras,
    ) -> LocalBoxFuture<'static, Result<(), TransportError>> {
        let mut inner = self.inner.borrow_mut();
        inner.stores.insert(store_uid.to_string(), value.clone());
        inner.persisted.push((store_uid.to_string(), value, extras.clone()));
        async { Ok(()) }.boxed_local()
    }
}

pub struct Harness {
    pub pool: LocalPool,
    pub backend: Rc<FakeBackend>,
    pub clock: Rc<TestClock>,
    pub store: Store,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(RuntimeConfig::default(), "")
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::build(config, "")
    }

    pub fn with_query(query: &str) -> Self {
        Self::build(RuntimeConfig::default(), query)
    }

    fn build(config: RuntimeConfig, query: &str) -> Self {
        init_logging();
        let pool = LocalPool::new();
        let backend = FakeBackend::new();
        let clock = Rc::new(TestClock::new());
        let store = Store::builder(backend.clone(), Rc::new(pool.spawner()))
            .clock(clock.clone())
            .config(config)
            .query(query)
            .build();
        Self {
            pool,
            backend,
            clock,
            store,
        }
    }

    /// Runs every spawned task until none can make progress.
    pub fn settle(&mut self) {
        self.pool.run_until_stalled();
    }
}

/// Counts how often a subscription callback fired.
#[derive(Clone, Default)]
pub struct Counter(Rc<std::cell::Cell<usize>>);

impl Counter {
    pub fn get(&self) -> usize {
        self.0.get()
    }

    pub fn callback(&self) -> impl Fn() + 'static {
        let count = self.0.clone();
        move || count.set(count.get() + 1)
    }
}
