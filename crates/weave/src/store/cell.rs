//! Value cells.

use std::rc::Rc;

use futures_channel::oneshot;
use weave_model::{Value, Variable};

use super::Resolution;
use super::extras::RequestExtras;
use crate::error::ResolveError;
use crate::resolver::DependencySnapshot;

/// Settled result of a resolution. Errors are shared between every reader
/// of the cell.
pub type Outcome = Result<Value, Rc<ResolveError>>;

pub(super) type Waiter = oneshot::Sender<Outcome>;

/// Holds the raw value of a plain variable in one request context.
#[derive(Debug)]
pub(super) struct LeafCell {
    pub value: Value,
    /// A backend-store fetch for this context is outstanding.
    pub loading: bool,
    pub waiters: Vec<Waiter>,
}

impl LeafCell {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            loading: false,
            waiters: Vec::new(),
        }
    }

    pub fn resolution(&self, nested: &[String]) -> Resolution {
        if self.loading {
            Resolution::Pending
        } else {
            Resolution::Ready(self.value.resolve_nested(nested))
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Unresolved,
    Resolving,
    Resolved,
}

/// Backend-resolved value of a derived, derived-data or data variable.
#[derive(Debug)]
pub(super) struct DerivedCell {
    pub variable: Variable,
    pub extras: RequestExtras,
    pub phase: Phase,
    pub outcome: Option<Outcome>,
    /// Token of the latest request; responses carrying another are stale.
    pub generation: u64,
    /// Dependencies the latest request was built from.
    pub snapshot: Option<DependencySnapshot>,
    pub resolved_at_ms: Option<u64>,
    pub waiters: Vec<Waiter>,
}

impl DerivedCell {
    pub fn new(variable: Variable, extras: RequestExtras) -> Self {
        Self {
            variable,
            extras,
            phase: Phase::Unresolved,
            outcome: None,
            generation: 0,
            snapshot: None,
            resolved_at_ms: None,
            waiters: Vec::new(),
        }
    }

    /// Whether a new request is needed to serve `snapshot` at `now_ms`.
    /// An in-flight request for the same snapshot is reused.
    pub fn is_stale(&self, snapshot: &DependencySnapshot, now_ms: u64) -> bool {
        self.phase == Phase::Unresolved
            || self.snapshot.as_ref() != Some(snapshot)
            || self.poll_due(now_ms)
    }

    fn poll_due(&self, now_ms: u64) -> bool {
        match (self.phase, self.variable.as_derived(), self.resolved_at_ms) {
            (Phase::Resolved, Some(derived), Some(resolved_at)) => derived
                .polling_interval
                .is_some_and(|seconds| now_ms >= resolved_at + seconds * 1000),
            _ => false,
        }
    }

    /// Starts a new request and returns its token.
    pub fn begin(&mut self, snapshot: DependencySnapshot) -> u64 {
        self.generation += 1;
        self.phase = Phase::Resolving;
        self.snapshot = Some(snapshot);
        self.generation
    }

    /// Stores the outcome and hands back the callers waiting for it.
    pub fn settle(&mut self, outcome: Outcome, now_ms: u64) -> Vec<Waiter> {
        self.phase = Phase::Resolved;
        self.outcome = Some(outcome);
        self.resolved_at_ms = Some(now_ms);
        std::mem::take(&mut self.waiters)
    }

    pub fn resolution(&self, nested: &[String]) -> Resolution {
        match (self.phase, &self.outcome) {
            (Phase::Resolved, Some(Ok(value))) => Resolution::Ready(value.resolve_nested(nested)),
            (Phase::Resolved, Some(Err(error))) => Resolution::Failed(error.clone()),
            (Phase::Resolving, Some(Ok(stale))) => Resolution::Refreshing(stale.resolve_nested(nested)),
            _ => Resolution::Pending,
        }
    }
}
