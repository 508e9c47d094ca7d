//! State machine definition types.
//!
//! Definitions are JSON or YAML documents:
//!
//! ```json
//! {
//!   "name": "order",
//!   "states": [
//!     {
//!       "name": "being-processed",
//!       "transitions": [
//!         {
//!           "name": "ready-for-pickup",
//!           "check": [{"func": "auth(AUTH_1)"}],
//!           "on_success": [
//!             {
//!               "func": "order-item(_, ready-for-shipment)",
//!               "adapter": "order_items",
//!               "is_state_machine": true
//!             }
//!           ],
//!           "on_error": [{"func": "rollback"}]
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! A state's `transitions[].name` is the target state. Compiling a definition
//! turns every handler literal into a [`FuncSpec`] and indexes the handlers by
//! `(current state, target state)`.
//!
//! An on-success entry's `func_arg` list is used only when `func` carries no
//! arguments of its own; arguments written in the call form take precedence.

use crate::error::CoreError;
use crate::funcspec::FuncSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Source format of a definition document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Json,
    Yaml,
}

impl DefinitionFormat {
    /// Picks the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(DefinitionFormat::Json),
            "yaml" | "yml" => Some(DefinitionFormat::Yaml),
            _ => None,
        }
    }
}

/// Raw definition as read from a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    /// State machine name.
    #[serde(default)]
    pub name: String,

    /// States with their outgoing transitions.
    #[serde(default)]
    pub states: Vec<StateSpec>,
}

/// A state and its outgoing transitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSpec {
    pub name: String,

    #[serde(default)]
    pub transitions: Vec<TransitionSpec>,
}

/// A transition to the state named `name`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionSpec {
    /// Target state.
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub check: Vec<CheckSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_success: Vec<OnSuccessSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_error: Vec<OnErrorSpec>,
}

/// A check handler reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckSpec {
    pub func: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_error: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_no_success: bool,
}

/// An on-success handler reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnSuccessSpec {
    pub func: String,

    /// Arguments used when `func` has no argument list of its own.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub func_arg: Vec<String>,

    /// Adapter expanding the subject into a list of subjects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,

    /// Filter narrowing the adapted list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// `func` names a nested engine instead of a handler.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_state_machine: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_error: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_no_success: bool,
}

/// An on-error handler reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnErrorSpec {
    pub func: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_error: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_no_success: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Definition {
    /// Parses a definition from a string in the given format.
    pub fn from_str(content: &str, format: DefinitionFormat) -> Result<Self, CoreError> {
        let def = match format {
            DefinitionFormat::Json => serde_json::from_str(content)?,
            DefinitionFormat::Yaml => serde_yaml::from_str(content)?,
        };
        Ok(def)
    }

    /// Reads and parses a definition file. The format follows the extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let format =
            DefinitionFormat::from_path(path).ok_or_else(|| CoreError::UnsupportedFormat {
                path: path.to_path_buf(),
            })?;
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&content, format)
    }

    /// Parses a definition from a JSON value.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, CoreError> {
        Ok(serde_json::from_value(json.clone())?)
    }

    /// Checksum of the canonical JSON encoding.
    pub fn checksum(&self) -> Result<String, CoreError> {
        let json_bytes = serde_json::to_vec(self)?;
        Ok(format!("{:08x}", crc32c::crc32c(&json_bytes)))
    }

    /// Returns the number of transitions declared across all states.
    pub fn transition_count(&self) -> usize {
        self.states.iter().map(|s| s.transitions.len()).sum()
    }
}

/// A compiled check entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckEntry {
    pub func: FuncSpec,
    pub ignore_error: bool,
    pub ignore_no_success: bool,
}

/// A compiled on-success entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnSuccessEntry {
    pub func: FuncSpec,
    pub adapter: Option<String>,
    pub filter: Option<String>,
    pub is_nested_engine: bool,
    pub ignore_error: bool,
    pub ignore_no_success: bool,
}

impl OnSuccessEntry {
    /// Target state handed to a nested engine.
    pub fn nested_target(&self) -> Option<&str> {
        self.func.args.get(1).map(String::as_str)
    }
}

/// A compiled on-error entry.
///
/// Arguments are kept for introspection; error handlers are always invoked
/// with the subject alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnErrorEntry {
    pub func: FuncSpec,
    pub ignore_error: bool,
    pub ignore_no_success: bool,
}

/// Handlers attached to one `(current, target)` transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Handlers {
    pub check: Vec<CheckEntry>,
    pub on_success: Vec<OnSuccessEntry>,
    pub on_error: Vec<OnErrorEntry>,
}

impl Handlers {
    /// Compiles the handler lists of a single transition.
    pub fn compile(spec: &TransitionSpec) -> Self {
        let check = spec
            .check
            .iter()
            .map(|c| CheckEntry {
                func: FuncSpec::parse(&c.func),
                ignore_error: c.ignore_error,
                ignore_no_success: c.ignore_no_success,
            })
            .collect();

        let on_success = spec
            .on_success
            .iter()
            .map(|s| {
                let mut func = FuncSpec::parse(&s.func);
                if !func.has_args() {
                    func.args = s.func_arg.clone();
                }
                OnSuccessEntry {
                    func,
                    adapter: non_empty(&s.adapter),
                    filter: non_empty(&s.filter),
                    is_nested_engine: s.is_state_machine,
                    ignore_error: s.ignore_error,
                    ignore_no_success: s.ignore_no_success,
                }
            })
            .collect();

        let on_error = spec
            .on_error
            .iter()
            .map(|e| OnErrorEntry {
                func: FuncSpec::parse(&e.func),
                ignore_error: e.ignore_error,
                ignore_no_success: e.ignore_no_success,
            })
            .collect();

        Self {
            check,
            on_success,
            on_error,
        }
    }
}

fn non_empty(name: &Option<String>) -> Option<String> {
    name.as_ref().filter(|n| !n.is_empty()).cloned()
}

/// Compiled handlers indexed by current state, then target state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionTable {
    states: HashMap<String, HashMap<String, Handlers>>,
}

impl TransitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles every transition of `definition` into the table.
    ///
    /// A pair that is already present is replaced. Pairs the definition does
    /// not mention are left untouched.
    pub fn compile(&mut self, definition: &Definition) -> usize {
        let mut compiled = 0;
        for state in &definition.states {
            let targets = self.states.entry(state.name.clone()).or_default();
            for transition in &state.transitions {
                targets.insert(transition.name.clone(), Handlers::compile(transition));
                compiled += 1;
            }
        }
        compiled
    }

    /// Looks up the handlers for a transition.
    pub fn get(&self, current: &str, target: &str) -> Option<&Handlers> {
        self.states.get(current)?.get(target)
    }

    /// Returns the target states reachable from `current`, sorted.
    pub fn targets_from(&self, current: &str) -> Vec<&str> {
        let mut targets: Vec<&str> = self
            .states
            .get(current)
            .map(|t| t.keys().map(String::as_str).collect())
            .unwrap_or_default();
        targets.sort_unstable();
        targets
    }

    /// Returns all source states, sorted.
    pub fn states(&self) -> Vec<&str> {
        let mut states: Vec<&str> = self.states.keys().map(String::as_str).collect();
        states.sort_unstable();
        states
    }

    /// Iterates over every compiled transition.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Handlers)> {
        self.states.iter().flat_map(|(current, targets)| {
            targets
                .iter()
                .map(move |(target, handlers)| (current.as_str(), target.as_str(), handlers))
        })
    }

    /// Number of compiled transitions.
    pub fn len(&self) -> usize {
        self.states.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
