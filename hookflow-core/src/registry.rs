//! Handler registries.
//!
//! Every hook a definition names is resolved by name in one of five tables.
//! Closures with the matching signature implement the handler traits, so most
//! callers register plain closures or functions:
//!
//! ```ignore
//! registry.add_check("auth", |order: &Order, args: &[String]| {
//!     Ok(args.iter().any(|a| order.authorization.contains(a)))
//! });
//! ```

use crate::error::{BoxError, HandlerKind};
use std::collections::HashMap;
use std::sync::Arc;

/// Result returned by user handlers.
pub type HandlerResult<T> = Result<T, BoxError>;

/// A check, on-success or on-error hook.
///
/// Returns whether the hook succeeded. `Ok(false)` is a reported non-success,
/// distinct from an error.
pub trait Handler<S>: Send + Sync {
    fn call(&self, subject: &S, args: &[String]) -> HandlerResult<bool>;
}

impl<S, F> Handler<S> for F
where
    F: Fn(&S, &[String]) -> HandlerResult<bool> + Send + Sync,
{
    fn call(&self, subject: &S, args: &[String]) -> HandlerResult<bool> {
        self(subject, args)
    }
}

/// Expands one subject into the subjects an on-success entry fans out over.
pub trait Adapter<S>: Send + Sync {
    fn adapt(&self, subject: &S) -> HandlerResult<Vec<S>>;
}

impl<S, F> Adapter<S> for F
where
    F: Fn(&S) -> HandlerResult<Vec<S>> + Send + Sync,
{
    fn adapt(&self, subject: &S) -> HandlerResult<Vec<S>> {
        self(subject)
    }
}

/// Narrows or reorders the fan-out list.
pub trait Filter<S>: Send + Sync {
    fn filter(&self, subjects: Vec<S>) -> HandlerResult<Vec<S>>;
}

impl<S, F> Filter<S> for F
where
    F: Fn(Vec<S>) -> HandlerResult<Vec<S>> + Send + Sync,
{
    fn filter(&self, subjects: Vec<S>) -> HandlerResult<Vec<S>> {
        self(subjects)
    }
}

/// Performs the state change itself.
pub trait Execute<S>: Send + Sync {
    fn execute(&self, target: &str, subject: &S) -> HandlerResult<()>;
}

impl<S, F> Execute<S> for F
where
    F: Fn(&str, &S) -> HandlerResult<()> + Send + Sync,
{
    fn execute(&self, target: &str, subject: &S) -> HandlerResult<()> {
        self(target, subject)
    }
}

/// Reports the state a subject is currently in.
pub trait CurrentState<S>: Send + Sync {
    fn current_state(&self, subject: &S) -> HandlerResult<String>;
}

impl<S, F> CurrentState<S> for F
where
    F: Fn(&S) -> HandlerResult<String> + Send + Sync,
{
    fn current_state(&self, subject: &S) -> HandlerResult<String> {
        self(subject)
    }
}

/// Name-indexed handler tables plus the execute and current-state slots.
///
/// Registering under an existing name replaces the previous handler.
pub struct HandlerRegistry<S> {
    check: HashMap<String, Arc<dyn Handler<S>>>,
    on_success: HashMap<String, Arc<dyn Handler<S>>>,
    on_error: HashMap<String, Arc<dyn Handler<S>>>,
    adapters: HashMap<String, Arc<dyn Adapter<S>>>,
    filters: HashMap<String, Arc<dyn Filter<S>>>,
    execute: Option<Arc<dyn Execute<S>>>,
    current_state: Option<Arc<dyn CurrentState<S>>>,
}

impl<S> Default for HandlerRegistry<S> {
    fn default() -> Self {
        Self {
            check: HashMap::new(),
            on_success: HashMap::new(),
            on_error: HashMap::new(),
            adapters: HashMap::new(),
            filters: HashMap::new(),
            execute: None,
            current_state: None,
        }
    }
}

impl<S> HandlerRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_check<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&S, &[String]) -> HandlerResult<bool> + Send + Sync + 'static,
    {
        self.check.insert(name.into(), Arc::new(handler));
    }

    pub fn add_on_success<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&S, &[String]) -> HandlerResult<bool> + Send + Sync + 'static,
    {
        self.on_success.insert(name.into(), Arc::new(handler));
    }

    pub fn add_on_error<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&S, &[String]) -> HandlerResult<bool> + Send + Sync + 'static,
    {
        self.on_error.insert(name.into(), Arc::new(handler));
    }

    pub fn add_adapter<F>(&mut self, name: impl Into<String>, adapter: F)
    where
        F: Fn(&S) -> HandlerResult<Vec<S>> + Send + Sync + 'static,
    {
        self.adapters.insert(name.into(), Arc::new(adapter));
    }

    pub fn add_filter<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(Vec<S>) -> HandlerResult<Vec<S>> + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    pub fn set_execute<F>(&mut self, execute: F)
    where
        F: Fn(&str, &S) -> HandlerResult<()> + Send + Sync + 'static,
    {
        self.execute = Some(Arc::new(execute));
    }

    pub fn set_current_state<F>(&mut self, resolver: F)
    where
        F: Fn(&S) -> HandlerResult<String> + Send + Sync + 'static,
    {
        self.current_state = Some(Arc::new(resolver));
    }

    /// Registers a check, on-success or on-error hook implemented as a type
    /// rather than a closure. Other kinds are ignored.
    pub fn insert_handler(
        &mut self,
        kind: HandlerKind,
        name: impl Into<String>,
        handler: Arc<dyn Handler<S>>,
    ) {
        let table = match kind {
            HandlerKind::Check => &mut self.check,
            HandlerKind::OnSuccess => &mut self.on_success,
            HandlerKind::OnError => &mut self.on_error,
            _ => return,
        };
        table.insert(name.into(), handler);
    }

    /// Looks up a check, on-success or on-error handler.
    ///
    /// Returns `None` for the other kinds.
    pub fn handler(&self, kind: HandlerKind, name: &str) -> Option<&dyn Handler<S>> {
        let table = match kind {
            HandlerKind::Check => &self.check,
            HandlerKind::OnSuccess => &self.on_success,
            HandlerKind::OnError => &self.on_error,
            _ => return None,
        };
        table.get(name).map(|h| h.as_ref())
    }

    pub fn adapter(&self, name: &str) -> Option<&dyn Adapter<S>> {
        self.adapters.get(name).map(|a| a.as_ref())
    }

    pub fn filter(&self, name: &str) -> Option<&dyn Filter<S>> {
        self.filters.get(name).map(|f| f.as_ref())
    }

    pub fn execute(&self) -> Option<&dyn Execute<S>> {
        self.execute.as_deref()
    }

    pub fn current_state(&self) -> Option<&dyn CurrentState<S>> {
        self.current_state.as_deref()
    }

    /// Returns whether a name is registered for the given kind.
    pub fn contains(&self, kind: HandlerKind, name: &str) -> bool {
        match kind {
            HandlerKind::Check => self.check.contains_key(name),
            HandlerKind::OnSuccess => self.on_success.contains_key(name),
            HandlerKind::OnError => self.on_error.contains_key(name),
            HandlerKind::Adapter => self.adapters.contains_key(name),
            HandlerKind::Filter => self.filters.contains_key(name),
            HandlerKind::Execute => self.execute.is_some(),
            HandlerKind::CurrentState => self.current_state.is_some(),
        }
    }
}
