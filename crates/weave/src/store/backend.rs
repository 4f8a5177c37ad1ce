//! The transport seam.
//!
//! The store never talks HTTP itself. A [`Backend`] sends requests and hands
//! back typed responses; the helpers here fix the endpoint shapes so every
//! implementation agrees on them.

use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use weave_model::Value;

use super::extras::RequestExtras;
use crate::error::{ResolveError, TransportError};
use crate::resolver::{Lookup, NormalizedRequest, denormalize};

/// Body of a derived-variable resolution request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DerivedRequest {
    pub uid: String,
    pub values: NormalizedRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_channel: Option<String>,
}

/// A resolved value, either plain or normalized like the request was.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DerivedResponse {
    Normalized { data: Value, lookup: Lookup },
    Value(Value),
}

impl DerivedResponse {
    pub fn into_value(self) -> Result<Value, ResolveError> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Normalized { data, lookup } => denormalize(&data, &lookup),
        }
    }
}

/// Push notification for a backend-store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreMessage {
    pub store_uid: String,
    pub value: Value,
}

/// Everything the store needs from the server.
///
/// Futures are `'static` so implementations clone what they need up front;
/// the store drives them on its local spawner.
pub trait Backend {
    fn resolve_derived(
        &self,
        request: DerivedRequest,
        extras: &RequestExtras,
    ) -> LocalBoxFuture<'static, Result<DerivedResponse, TransportError>>;

    /// `GET /store/{store_uid}`; `Null` when nothing was persisted yet.
    fn fetch_store(
        &self,
        store_uid: &str,
        extras: &RequestExtras,
    ) -> LocalBoxFuture<'static, Result<Value, TransportError>>;

    /// `POST /store` with [`persist_body`].
    fn persist_store(
        &self,
        store_uid: &str,
        value: Value,
        extras: &RequestExtras,
    ) -> LocalBoxFuture<'static, Result<(), TransportError>>;
}

pub fn store_path(store_uid: &str) -> String {
    format!("/store/{store_uid}")
}

pub fn persist_body(store_uid: &str, value: Value) -> Value {
    Value::object([(store_uid, value)])
}
