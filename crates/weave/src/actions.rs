//! Action execution.
//!
//! Built-in actions update or trigger variables through the [`Store`];
//! anything else is looked up in the [`ActionRegistry`]. How a failure is
//! surfaced depends on what started the action: a user interaction gets a
//! notification, a page load gets a route-level error page.

use std::error::Error;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use rustc_hash::FxHashMap;
use weave_model::{ActionImpl, ActionKind, UpdateValue, Value, Variable};

use crate::config::BuildMode;
use crate::error::ActionError;
use crate::store::{RequestExtras, Store};

pub type HandlerError = Box<dyn Error>;

/// Everything a custom handler gets to work with.
#[derive(Clone)]
pub struct ActionContext {
    pub store: Store,
    pub extras: RequestExtras,
    /// Value supplied by the triggering input, `Null` if none.
    pub input: Value,
    pub kwargs: Value,
}

pub type Handler = Rc<dyn Fn(ActionContext) -> LocalBoxFuture<'static, Result<(), HandlerError>>>;

/// Custom action handlers by name.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    handlers: FxHashMap<String, Handler>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(ActionContext) -> LocalBoxFuture<'static, Result<(), HandlerError>> + 'static,
    {
        self.handlers.insert(name.into(), Rc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).cloned()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionTrigger {
    /// Ran while the page was loading, before content was ready.
    PageLoad,
    User,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

/// Full-page error shown by the route boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorPage {
    pub title: String,
    pub description: String,
    /// Error chain, development builds only.
    pub details: Option<String>,
}

impl ErrorPage {
    pub fn for_action(name: &str, error: &ActionError, mode: BuildMode) -> Self {
        match mode {
            BuildMode::Development => Self {
                title: format!("Error executing action '{name}'"),
                description: error.to_string(),
                details: Some(error_chain(error)),
            },
            BuildMode::Production => Self {
                title: "Something went wrong".to_string(),
                description: "This page could not be loaded. Please contact the application owner.".to_string(),
                details: None,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionFailure {
    Notify(Notification),
    RouteError(ErrorPage),
}

fn error_chain(error: &dyn Error) -> String {
    let mut chain = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str("\ncaused by: ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

pub struct ActionExecutor {
    store: Store,
    registry: Rc<ActionRegistry>,
}

impl ActionExecutor {
    pub fn new(store: Store, registry: Rc<ActionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Runs `action`, holding its loading flag `true` meanwhile.
    pub async fn execute(&self, action: &ActionImpl, extras: &RequestExtras, input: Value) -> Result<(), ActionError> {
        let loading = action.loading.clone().map(Variable::Plain);
        if let Some(loading) = &loading {
            self.store.write(loading, extras, Value::Bool(true))?;
        }
        log::debug!("running action '{}' ({})", action.name(), action.uid);
        let result = self.run(action, extras, input).await;
        if let Some(loading) = &loading {
            if let Err(error) = self.store.write(loading, extras, Value::Bool(false)) {
                log::warn!("could not reset loading flag of '{}': {error}", action.uid);
            }
        }
        result
    }

    async fn run(&self, action: &ActionImpl, extras: &RequestExtras, input: Value) -> Result<(), ActionError> {
        match &action.action {
            ActionKind::UpdateVariable { variable, value } => match value {
                UpdateValue::Toggle => self.store.toggle(variable, extras)?,
                UpdateValue::Input => self.store.sync(variable, extras, input)?,
                UpdateValue::Literal(literal) => self.store.write(variable, extras, literal.clone())?,
            },
            ActionKind::TriggerVariable { variable, force } => self.store.trigger(variable, *force),
            ActionKind::Custom { handler, kwargs } => {
                let Some(run) = self.registry.get(handler) else {
                    return Err(ActionError::UnknownAction { name: handler.clone() });
                };
                let context = ActionContext {
                    store: self.store.clone(),
                    extras: extras.clone(),
                    input,
                    kwargs: kwargs.clone(),
                };
                run(context).await.map_err(|source| ActionError::Handler {
                    name: handler.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// Runs `action` and turns a failure into what the page should show.
    pub async fn dispatch(
        &self,
        action: &ActionImpl,
        extras: &RequestExtras,
        input: Value,
        trigger: ActionTrigger,
    ) -> Result<(), ActionFailure> {
        self.execute(action, extras, input)
            .await
            .map_err(|error| self.escalate(action, &error, trigger))
    }

    /// Runs page-load actions in order, stopping at the first failure.
    pub async fn run_on_load(&self, actions: &[ActionImpl], extras: &RequestExtras) -> Result<(), ActionFailure> {
        for action in actions {
            self.dispatch(action, extras, Value::Null, ActionTrigger::PageLoad)
                .await?;
        }
        Ok(())
    }

    pub fn escalate(&self, action: &ActionImpl, error: &ActionError, trigger: ActionTrigger) -> ActionFailure {
        let name = action.name();
        log::error!("action '{name}' failed: {error}");
        let mode = self.store.config().mode;
        match trigger {
            ActionTrigger::PageLoad => ActionFailure::RouteError(ErrorPage::for_action(name, error, mode)),
            ActionTrigger::User => ActionFailure::Notify(Notification {
                title: format!("Action '{name}' failed"),
                message: match mode {
                    BuildMode::Development => error_chain(error),
                    BuildMode::Production => "Please try again or contact the application owner.".to_string(),
                },
            }),
        }
    }
}
