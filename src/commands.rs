//! Command execution.

use crate::config::OutputFormat;
use crate::Commands;
use colored::Colorize;
use hookflow_core::{
    Definition, Engine, FuncSpec, Handlers, TransitionProcessor, TransitionTable,
};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

type CommandResult = Result<String, Box<dyn std::error::Error>>;

/// Executes a command and returns the formatted output.
pub fn execute(cmd: Commands, format: OutputFormat) -> CommandResult {
    match cmd {
        Commands::Validate { file } => validate(&file, format),
        Commands::Inspect { file, from } => inspect(&file, from.as_deref(), format),
        Commands::Parse { literal } => parse(&literal, format),
    }
}

#[derive(Debug, Serialize)]
struct ValidationReport {
    name: String,
    transitions: usize,
    source_states: usize,
    checksum: String,
    warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TransitionView<'a> {
    from: &'a str,
    to: &'a str,
    #[serde(flatten)]
    handlers: &'a Handlers,
}

type Compiled = (Definition, Engine<serde_json::Value>);

/// Compiles a definition file into a throwaway engine.
fn compile(path: &Path) -> Result<Compiled, Box<dyn std::error::Error>> {
    tracing::debug!("Compiling definition {}", path.display());
    let definition = Definition::from_file(path)?;
    let mut engine = Engine::new();
    let compiled = engine.load_definition(&definition)?;
    tracing::debug!(
        "Compiled {} of {} declared transitions from {}",
        engine.table().len(),
        compiled,
        path.display()
    );
    Ok((definition, engine))
}

fn display_name(engine: &Engine<serde_json::Value>) -> String {
    match engine.name() {
        "" => "<unnamed>".to_string(),
        name => name.to_string(),
    }
}

fn validate(path: &Path, format: OutputFormat) -> CommandResult {
    let (definition, engine) = compile(path)?;

    let report = ValidationReport {
        name: display_name(&engine),
        transitions: engine.table().len(),
        source_states: engine.table().states().len(),
        checksum: engine.checksum().unwrap_or_default().to_string(),
        warnings: lint(&definition, engine.table()),
    };

    if format != OutputFormat::Text {
        return render(&report, format);
    }

    let mut output = format!(
        "{} state machine {} ({} transitions from {} states, checksum: {})",
        "Valid".green(),
        report.name.cyan(),
        report.transitions,
        report.source_states,
        report.checksum
    );
    for warning in &report.warnings {
        output.push_str(&format!("\n  {}: {}", "warning".yellow(), warning));
    }
    Ok(output)
}

/// Reports definition problems that only surface when a transition runs.
fn lint(definition: &Definition, table: &TransitionTable) -> Vec<String> {
    let mut warnings = Vec::new();

    for state in &definition.states {
        let mut seen = HashSet::new();
        for transition in &state.transitions {
            if !seen.insert(transition.name.as_str()) {
                warnings.push(format!(
                    "{} -> {}: declared more than once, the last declaration wins",
                    state.name, transition.name
                ));
            }
        }
    }

    for (from, to, handlers) in table.iter() {
        for entry in &handlers.on_success {
            if entry.is_nested_engine && entry.nested_target().is_none() {
                warnings.push(format!(
                    "{} -> {}: state machine entry '{}' declares no target state",
                    from, to, entry.func.name
                ));
            }
        }

        let names = handlers
            .check
            .iter()
            .map(|e| &e.func)
            .chain(handlers.on_success.iter().map(|e| &e.func))
            .chain(handlers.on_error.iter().map(|e| &e.func));
        for func in names {
            if func.name.is_empty() {
                warnings.push(format!("{} -> {}: empty handler name", from, to));
            }
        }
    }

    warnings.sort();
    warnings.dedup();
    warnings
}

fn inspect(path: &Path, from: Option<&str>, format: OutputFormat) -> CommandResult {
    let (_, engine) = compile(path)?;

    let mut views: Vec<TransitionView<'_>> = engine
        .table()
        .iter()
        .filter(|(current, _, _)| from.map_or(true, |f| f == *current))
        .map(|(from, to, handlers)| TransitionView { from, to, handlers })
        .collect();
    views.sort_by(|a, b| (a.from, a.to).cmp(&(b.from, b.to)));

    if format != OutputFormat::Text {
        return render(&views, format);
    }

    if views.is_empty() {
        return Ok(match from {
            Some(state) => format!("No transitions from '{}'", state).yellow().to_string(),
            None => "No transitions defined".yellow().to_string(),
        });
    }

    let mut output = format!(
        "{} ({} transitions)",
        display_name(&engine).bold(),
        views.len()
    );
    for view in &views {
        output.push_str(&format!("\n{} -> {}", view.from.cyan(), view.to.cyan()));
        for entry in &view.handlers.check {
            output.push_str(&handler_line(
                "check",
                &entry.func,
                &flags(entry.ignore_error, entry.ignore_no_success, Vec::new()),
            ));
        }
        for entry in &view.handlers.on_success {
            let mut extra = Vec::new();
            if entry.is_nested_engine {
                extra.push("state machine".to_string());
            }
            if let Some(adapter) = &entry.adapter {
                extra.push(format!("adapter={}", adapter));
            }
            if let Some(filter) = &entry.filter {
                extra.push(format!("filter={}", filter));
            }
            output.push_str(&handler_line(
                "on_success",
                &entry.func,
                &flags(entry.ignore_error, entry.ignore_no_success, extra),
            ));
        }
        for entry in &view.handlers.on_error {
            output.push_str(&handler_line(
                "on_error",
                &entry.func,
                &flags(entry.ignore_error, entry.ignore_no_success, Vec::new()),
            ));
        }
    }
    Ok(output)
}

fn flags(ignore_error: bool, ignore_no_success: bool, mut extra: Vec<String>) -> Vec<String> {
    if ignore_error {
        extra.push("ignore_error".to_string());
    }
    if ignore_no_success {
        extra.push("ignore_no_success".to_string());
    }
    extra
}

fn handler_line(phase: &str, func: &FuncSpec, flags: &[String]) -> String {
    let mut line = format!("\n  {} {}", format!("{:<10}", phase).dimmed(), func);
    if !flags.is_empty() {
        line.push_str(&format!(" [{}]", flags.join(", ")));
    }
    line
}

fn parse(literal: &str, format: OutputFormat) -> CommandResult {
    let spec = FuncSpec::parse(literal);

    if format != OutputFormat::Text {
        return render(&spec, format);
    }

    let args = if spec.has_args() {
        spec.args.join(", ")
    } else {
        "(none)".dimmed().to_string()
    };
    Ok(format!(
        "{} {}\n{} {}",
        "name:".bold(),
        spec.name.cyan(),
        "args:".bold(),
        args
    ))
}

fn render<T: Serialize>(value: &T, format: OutputFormat) -> CommandResult {
    let output = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
        OutputFormat::Text => unreachable!("text output is rendered by each command"),
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER: &str = r#"{
        "name": "order",
        "states": [
            {
                "name": "created",
                "transitions": [
                    {"name": "paid", "check": [{"func": "auth(AUTH_1)"}]},
                    {"name": "cancelled", "on_error": [{"func": "log_failure"}]}
                ]
            },
            {
                "name": "paid",
                "transitions": [{
                    "name": "shipped",
                    "on_success": [
                        {"func": "order-item", "is_state_machine": true, "adapter": "items"},
                        {"func": "notify(email)", "ignore_error": true}
                    ]
                }]
            }
        ]
    }"#;

    fn write_definition(
        dir: &tempfile::TempDir,
        name: &str,
        content: &str,
    ) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_validate_text() {
        plain();
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_definition(&dir, "order.json", ORDER);

        let output = validate(&path, OutputFormat::Text).unwrap();
        assert!(output.starts_with("Valid state machine order (3 transitions from 2 states"));
        assert!(output.contains(
            "warning: paid -> shipped: state machine entry 'order-item' declares no target state"
        ));
    }

    #[test]
    fn test_validate_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_definition(&dir, "order.json", ORDER);

        let output = validate(&path, OutputFormat::Json).unwrap();
        let report: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(report["name"], "order");
        assert_eq!(report["transitions"], 3);
        assert_eq!(report["warnings"].as_array().unwrap().len(), 1);
        assert_eq!(report["checksum"].as_str().unwrap().len(), 8);
    }

    #[test]
    fn test_validate_duplicate_transition() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_definition(
            &dir,
            "dup.yaml",
            "name: dup\nstates:\n  - name: a\n    transitions:\n      - name: b\n      - name: b\n",
        );

        let output = validate(&path, OutputFormat::Json).unwrap();
        let report: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(report["transitions"], 1);
        assert_eq!(
            report["warnings"][0],
            "a -> b: declared more than once, the last declaration wins"
        );
    }

    #[test]
    fn test_validate_errors() {
        let dir = tempfile::TempDir::new().unwrap();

        let path = write_definition(&dir, "order.toml", "name = 'order'");
        let err = validate(&path, OutputFormat::Text).unwrap_err();
        assert!(err.to_string().contains("unsupported definition format"));

        let path = write_definition(&dir, "broken.json", "{ \"states\": 3 }");
        assert!(validate(&path, OutputFormat::Text).is_err());

        let missing = dir.path().join("missing.json");
        assert!(validate(&missing, OutputFormat::Text).is_err());
    }

    #[test]
    fn test_inspect_text() {
        plain();
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_definition(&dir, "order.json", ORDER);

        let output = inspect(&path, None, OutputFormat::Text).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "order (3 transitions)");
        assert_eq!(lines[1], "created -> cancelled");
        assert_eq!(
            lines[2].split_whitespace().collect::<Vec<_>>(),
            ["on_error", "log_failure"]
        );
        assert_eq!(lines[3], "created -> paid");
        assert!(output.contains("order-item [state machine, adapter=items]"));
        assert!(output.contains("notify(email) [ignore_error]"));
    }

    #[test]
    fn test_inspect_from_state() {
        plain();
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_definition(&dir, "order.json", ORDER);

        let output = inspect(&path, Some("paid"), OutputFormat::Json).unwrap();
        let views: serde_json::Value = serde_json::from_str(&output).unwrap();
        let views = views.as_array().unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0]["to"], "shipped");
        assert_eq!(views[0]["on_success"][0]["func"]["name"], "order-item");
        assert_eq!(views[0]["on_success"][1]["func"]["args"][0], "email");

        let output = inspect(&path, Some("shipped"), OutputFormat::Text).unwrap();
        assert_eq!(output, "No transitions from 'shipped'");
    }

    #[test]
    fn test_parse_command() {
        plain();
        let output = parse("auth(AUTH_1, AUTH_2)", OutputFormat::Text).unwrap();
        assert_eq!(output, "name: auth\nargs: AUTH_1, AUTH_2");

        let output = parse("auth(", OutputFormat::Text).unwrap();
        assert_eq!(output, "name: auth(\nargs: (none)");

        let output = parse("ship(_, done)", OutputFormat::Yaml).unwrap();
        let spec: serde_yaml::Value = serde_yaml::from_str(&output).unwrap();
        assert_eq!(spec["name"], serde_yaml::Value::from("ship"));
        assert_eq!(spec["args"][1], serde_yaml::Value::from("done"));
    }
}
