//! Transition engine - resolves handlers for a transition and runs them.
//!
//! A call to [`TransitionProcessor::process_transition`] goes through these
//! phases, in order:
//!
//! 1. resolve the subject's current state
//! 2. look up the handlers compiled for `(current, target)`
//! 3. run the check chain
//! 4. run execute
//! 5. run the on-success chain, fanning out through adapters, filters and
//!    nested engines
//!
//! An unignored error from a check or from execute runs the on-error chain,
//! whose outcome becomes the result of the call. Errors from the on-success
//! chain are returned as they are.

use crate::definition::{
    CheckEntry, Definition, DefinitionFormat, Handlers, OnErrorEntry, OnSuccessEntry,
    TransitionTable,
};
use crate::error::{CoreError, HandlerKind};
use crate::registry::{HandlerRegistry, HandlerResult};
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Anything that can run a transition for a subject.
///
/// `Ok(true)` means the transition ran to completion, `Ok(false)` that a
/// handler reported non-success and the transition did not proceed.
pub trait TransitionProcessor<S>: Send + Sync {
    /// Name other engines use to trigger this one.
    fn name(&self) -> &str;

    fn process_transition(&self, target: &str, subject: &S) -> Result<bool, CoreError>;
}

/// A compiled handler that is missing from its registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnresolvedHandler {
    pub from: String,
    pub to: String,
    pub kind: HandlerKind,
    pub name: String,
    pub nested_engine: bool,
}

/// Outcome of one handler call after its ignore flags are applied.
enum Gate {
    Pass(bool),
    Reject,
    Fail(CoreError),
}

fn gate(result: Result<bool, CoreError>, ignore_error: bool, ignore_no_success: bool) -> Gate {
    let success = match result {
        Ok(success) => success,
        Err(err) if ignore_error => {
            tracing::warn!("Ignoring handler error: {}", err);
            false
        }
        Err(err) => return Gate::Fail(err),
    };

    if !success && !ignore_no_success {
        return Gate::Reject;
    }
    Gate::Pass(success)
}

/// Result of the check chain.
enum CheckVerdict {
    /// Every check ran; carries the last check's result.
    Passed(bool),
    Rejected,
    Failed(CoreError),
}

/// The transition engine.
pub struct Engine<S> {
    /// Name used in diagnostics and for nested triggering.
    name: String,

    /// Compiled handlers indexed by (current, target).
    table: TransitionTable,

    /// Registered hooks.
    registry: HandlerRegistry<S>,

    /// Engines reachable from on-success entries, by name.
    nested: HashMap<String, Arc<dyn TransitionProcessor<S>>>,

    /// Checksum of the last loaded definition.
    checksum: Option<String>,
}

impl<S> Default for Engine<S> {
    fn default() -> Self {
        Self {
            name: String::new(),
            table: TransitionTable::new(),
            registry: HandlerRegistry::new(),
            nested: HashMap::new(),
            checksum: None,
        }
    }
}

impl<S: Clone> Engine<S> {
    /// Creates an empty engine. The name comes from the first loaded
    /// definition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty engine with the given name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    // =========================================================================
    // Definition Loading
    // =========================================================================

    /// Loads and compiles a definition file (`.json`, `.yaml` or `.yml`).
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<usize, CoreError> {
        let definition = Definition::from_file(path.as_ref())?;
        self.load_definition(&definition)
    }

    /// Loads and compiles a definition from a string.
    pub fn load_str(
        &mut self,
        content: &str,
        format: DefinitionFormat,
    ) -> Result<usize, CoreError> {
        let definition = Definition::from_str(content, format)?;
        self.load_definition(&definition)
    }

    /// Compiles a parsed definition into the transition table.
    ///
    /// Returns the number of transitions compiled. Transitions already in the
    /// table for the same `(current, target)` pair are replaced.
    pub fn load_definition(&mut self, definition: &Definition) -> Result<usize, CoreError> {
        let checksum = definition.checksum()?;

        if !definition.name.is_empty() {
            self.name = definition.name.clone();
        }
        let compiled = self.table.compile(definition);

        tracing::info!(
            "Loaded state machine '{}': {} transitions, checksum {}",
            self.name,
            compiled,
            checksum
        );
        self.checksum = Some(checksum);

        Ok(compiled)
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    pub fn add_check<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&S, &[String]) -> HandlerResult<bool> + Send + Sync + 'static,
    {
        self.registry.add_check(name, handler);
        self
    }

    pub fn add_on_success<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&S, &[String]) -> HandlerResult<bool> + Send + Sync + 'static,
    {
        self.registry.add_on_success(name, handler);
        self
    }

    pub fn add_on_error<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&S, &[String]) -> HandlerResult<bool> + Send + Sync + 'static,
    {
        self.registry.add_on_error(name, handler);
        self
    }

    pub fn add_adapter<F>(&mut self, name: impl Into<String>, adapter: F) -> &mut Self
    where
        F: Fn(&S) -> HandlerResult<Vec<S>> + Send + Sync + 'static,
    {
        self.registry.add_adapter(name, adapter);
        self
    }

    pub fn add_filter<F>(&mut self, name: impl Into<String>, filter: F) -> &mut Self
    where
        F: Fn(Vec<S>) -> HandlerResult<Vec<S>> + Send + Sync + 'static,
    {
        self.registry.add_filter(name, filter);
        self
    }

    pub fn set_execute<F>(&mut self, execute: F) -> &mut Self
    where
        F: Fn(&str, &S) -> HandlerResult<()> + Send + Sync + 'static,
    {
        self.registry.set_execute(execute);
        self
    }

    pub fn set_current_state<F>(&mut self, resolver: F) -> &mut Self
    where
        F: Fn(&S) -> HandlerResult<String> + Send + Sync + 'static,
    {
        self.registry.set_current_state(resolver);
        self
    }

    /// Attaches an engine that on-success entries can trigger by its name.
    pub fn add_engine_to_trigger(
        &mut self,
        engine: Arc<dyn TransitionProcessor<S>>,
    ) -> &mut Self {
        self.nested.insert(engine.name().to_string(), engine);
        self
    }

    /// Mutable access to the handler registry.
    pub fn registry_mut(&mut self) -> &mut HandlerRegistry<S> {
        &mut self.registry
    }

    pub fn registry(&self) -> &HandlerRegistry<S> {
        &self.registry
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    /// Checksum of the last loaded definition.
    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// Returns the compiled handlers for a transition.
    pub fn handlers(&self, current: &str, target: &str) -> Option<&Handlers> {
        self.table.get(current, target)
    }

    /// Returns the target states reachable from `current`.
    pub fn transitions_from(&self, current: &str) -> Vec<&str> {
        self.table.targets_from(current)
    }

    /// Lists compiled names with nothing registered under them, sorted.
    ///
    /// Names are resolved lazily when a transition runs; this lets
    /// applications catch wiring mistakes before serving requests.
    pub fn unresolved_handlers(&self) -> Vec<UnresolvedHandler> {
        let mut missing = Vec::new();
        let mut push = |from: &str, to: &str, kind, name: &str, nested_engine| {
            missing.push(UnresolvedHandler {
                from: from.to_string(),
                to: to.to_string(),
                kind,
                name: name.to_string(),
                nested_engine,
            })
        };

        for (from, to, handlers) in self.table.iter() {
            for entry in &handlers.check {
                if !self.registry.contains(HandlerKind::Check, &entry.func.name) {
                    push(from, to, HandlerKind::Check, entry.func.name.as_str(), false);
                }
            }
            for entry in &handlers.on_success {
                if entry.is_nested_engine {
                    if !self.nested.contains_key(&entry.func.name) {
                        push(from, to, HandlerKind::OnSuccess, entry.func.name.as_str(), true);
                    }
                } else if !self.registry.contains(HandlerKind::OnSuccess, &entry.func.name) {
                    push(from, to, HandlerKind::OnSuccess, entry.func.name.as_str(), false);
                }
                if let Some(adapter) = &entry.adapter {
                    if !self.registry.contains(HandlerKind::Adapter, adapter) {
                        push(from, to, HandlerKind::Adapter, adapter.as_str(), false);
                    }
                }
                if let Some(filter) = &entry.filter {
                    if !self.registry.contains(HandlerKind::Filter, filter) {
                        push(from, to, HandlerKind::Filter, filter.as_str(), false);
                    }
                }
            }
            for entry in &handlers.on_error {
                if !self.registry.contains(HandlerKind::OnError, &entry.func.name) {
                    push(from, to, HandlerKind::OnError, entry.func.name.as_str(), false);
                }
            }
        }

        missing.sort();
        missing
    }

    // =========================================================================
    // Handler Chains
    // =========================================================================

    fn call_handler(
        &self,
        kind: HandlerKind,
        name: &str,
        subject: &S,
        args: &[String],
    ) -> Result<Result<bool, CoreError>, CoreError> {
        let handler =
            self.registry
                .handler(kind, name)
                .ok_or_else(|| CoreError::HandlerNotRegistered {
                    kind,
                    name: name.to_string(),
                })?;

        tracing::trace!("Calling {} handler '{}' with {:?}", kind, name, args);
        Ok(handler
            .call(subject, args)
            .map_err(|source| CoreError::Handler {
                kind,
                name: name.to_string(),
                source,
            }))
    }

    /// Runs the check chain.
    ///
    /// The value carried by `Passed` is the last check's own result, not the
    /// conjunction of all results. With no checks it is `true`.
    fn run_check(&self, entries: &[CheckEntry], subject: &S) -> Result<CheckVerdict, CoreError> {
        let mut success = true;

        for entry in entries {
            let result =
                self.call_handler(HandlerKind::Check, &entry.func.name, subject, &entry.func.args)?;

            match gate(result, entry.ignore_error, entry.ignore_no_success) {
                Gate::Pass(s) => success = s,
                Gate::Reject => {
                    tracing::debug!("Check '{}' rejected the transition", entry.func.name);
                    return Ok(CheckVerdict::Rejected);
                }
                Gate::Fail(err) => return Ok(CheckVerdict::Failed(err)),
            }
        }

        Ok(CheckVerdict::Passed(success))
    }

    /// Runs the on-error chain. Handlers receive the subject only.
    fn run_on_error(&self, entries: &[OnErrorEntry], subject: &S) -> Result<bool, CoreError> {
        for entry in entries {
            let result = self.call_handler(HandlerKind::OnError, &entry.func.name, subject, &[])?;

            match gate(result, entry.ignore_error, entry.ignore_no_success) {
                Gate::Pass(_) => {}
                Gate::Reject => return Ok(false),
                Gate::Fail(err) => return Err(err),
            }
        }

        Ok(true)
    }

    /// Replaces a check or execute failure with the outcome of the on-error
    /// chain.
    fn recover(
        &self,
        handlers: &Handlers,
        subject: &S,
        cause: CoreError,
    ) -> Result<bool, CoreError> {
        tracing::debug!(
            "Running {} on-error handler(s) in '{}' after: {}",
            handlers.on_error.len(),
            self.name,
            cause
        );
        self.run_on_error(&handlers.on_error, subject)
    }

    /// Runs the on-success chain.
    ///
    /// Returns `Ok(true)` once every entry has run for every fanned-out item,
    /// whatever the individual handlers reported.
    fn run_on_success(&self, entries: &[OnSuccessEntry], subject: &S) -> Result<bool, CoreError> {
        for entry in entries {
            let items = self.fan_out(entry, subject)?;

            for item in items.iter() {
                let result = if entry.is_nested_engine {
                    let Some(engine) = self.nested.get(&entry.func.name) else {
                        tracing::warn!(
                            "State machine '{}' is not attached to '{}', skipping",
                            entry.func.name,
                            self.name
                        );
                        continue;
                    };
                    let target =
                        entry
                            .nested_target()
                            .ok_or_else(|| CoreError::MissingNestedTarget {
                                name: entry.func.name.clone(),
                            })?;

                    tracing::debug!(
                        "Triggering '{}' -> '{}' from '{}'",
                        entry.func.name,
                        target,
                        self.name
                    );
                    engine.process_transition(target, item)
                } else {
                    self.call_handler(
                        HandlerKind::OnSuccess,
                        &entry.func.name,
                        item,
                        &entry.func.args,
                    )?
                };

                match gate(result, entry.ignore_error, entry.ignore_no_success) {
                    Gate::Pass(_) => {}
                    Gate::Reject => return Ok(false),
                    Gate::Fail(err) => return Err(err),
                }
            }
        }

        Ok(true)
    }

    /// Builds the working set of an on-success entry.
    ///
    /// Adapter and filter errors abort regardless of the entry's ignore flags.
    /// Names that resolve to nothing leave the set unchanged.
    fn fan_out<'a>(
        &self,
        entry: &OnSuccessEntry,
        subject: &'a S,
    ) -> Result<Cow<'a, [S]>, CoreError> {
        let mut items = Cow::Borrowed(std::slice::from_ref(subject));

        if let Some(name) = entry.adapter.as_deref() {
            if let Some(adapter) = self.registry.adapter(name) {
                let adapted = adapter
                    .adapt(subject)
                    .map_err(|source| CoreError::Handler {
                        kind: HandlerKind::Adapter,
                        name: name.to_string(),
                        source,
                    })?;
                items = Cow::Owned(adapted);
            }
        }

        if let Some(name) = entry.filter.as_deref() {
            if let Some(filter) = self.registry.filter(name) {
                let filtered =
                    filter
                        .filter(items.into_owned())
                        .map_err(|source| CoreError::Handler {
                            kind: HandlerKind::Filter,
                            name: name.to_string(),
                            source,
                        })?;
                items = Cow::Owned(filtered);
            }
        }

        tracing::trace!("'{}' fans out over {} item(s)", entry.func.name, items.len());
        Ok(items)
    }
}

impl<S: Clone> TransitionProcessor<S> for Engine<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn process_transition(&self, target: &str, subject: &S) -> Result<bool, CoreError> {
        let execute = self
            .registry
            .execute()
            .ok_or_else(|| CoreError::NotConfigured {
                engine: self.name.clone(),
                kind: HandlerKind::Execute,
            })?;
        let resolver = self
            .registry
            .current_state()
            .ok_or_else(|| CoreError::NotConfigured {
                engine: self.name.clone(),
                kind: HandlerKind::CurrentState,
            })?;

        let current = resolver
            .current_state(subject)
            .map_err(CoreError::CurrentState)?;

        let handlers =
            self.table
                .get(&current, target)
                .ok_or_else(|| CoreError::TransitionNotFound {
                    current: current.clone(),
                    target: target.to_string(),
                    engine: self.name.clone(),
                })?;

        tracing::debug!(
            "Processing '{}' -> '{}' in '{}' ({} check, {} on-success, {} on-error)",
            current,
            target,
            self.name,
            handlers.check.len(),
            handlers.on_success.len(),
            handlers.on_error.len()
        );

        match self.run_check(&handlers.check, subject)? {
            CheckVerdict::Passed(true) => {}
            CheckVerdict::Passed(false) | CheckVerdict::Rejected => return Ok(false),
            CheckVerdict::Failed(err) => return self.recover(handlers, subject, err),
        }

        if let Err(source) = execute.execute(target, subject) {
            let err = CoreError::Handler {
                kind: HandlerKind::Execute,
                name: target.to_string(),
                source,
            };
            return self.recover(handlers, subject, err);
        }

        self.run_on_success(&handlers.on_success, subject)
    }
}
