//! # hookflow-core
//!
//! Transition engine for hookflow.
//!
//! This crate provides:
//! - Handler reference parsing (`name` / `name(arg, ...)`)
//! - Definition loading and compilation into a transition table
//! - Name-indexed handler registries
//! - Transition execution with check, execute, on-success and on-error phases
//! - Nested engine triggering

pub mod definition;
pub mod engine;
pub mod error;
pub mod funcspec;
pub mod registry;

pub use definition::{Definition, DefinitionFormat, Handlers, TransitionTable};
pub use engine::{Engine, TransitionProcessor, UnresolvedHandler};
pub use error::{BoxError, CoreError, HandlerKind};
pub use funcspec::FuncSpec;
pub use registry::{
    Adapter, CurrentState, Execute, Filter, Handler, HandlerRegistry, HandlerResult,
};
