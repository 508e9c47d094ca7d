//! Handler reference parsing.
//!
//! Definitions refer to handlers by name, optionally with arguments:
//!
//! - `auth` - bare function name, no arguments
//! - `auth(AUTH_1)` - one argument
//! - `charge(amount, currency)` - arguments are comma separated and trimmed
//!
//! Names and arguments are made of ASCII letters, digits, `_` and `-`.
//! Anything else is not rejected: the whole literal is used as the function
//! name and the argument list is empty.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

static CALL_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+\(\s*(?:[A-Za-z0-9_-]+(?:\s*,\s*[A-Za-z0-9_-]+)*)?\s*\)$")
        .expect("call form pattern is valid")
});

/// A parsed handler reference.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FuncSpec {
    /// Function name to resolve in a registry.
    pub name: String,
    /// Arguments passed to the handler, in declared order.
    pub args: Vec<String>,
}

impl FuncSpec {
    /// Parses a handler literal. Never fails.
    pub fn parse(input: &str) -> Self {
        if !CALL_FORM.is_match(input) {
            return Self {
                name: input.to_string(),
                args: Vec::new(),
            };
        }

        // The pattern guarantees exactly one '(' and a trailing ')'.
        let (name, rest) = input.split_once('(').unwrap_or((input, ""));
        let inner = rest.strip_suffix(')').unwrap_or(rest).trim();

        let args = if inner.is_empty() {
            Vec::new()
        } else {
            inner.split(',').map(|arg| arg.trim().to_string()).collect()
        };

        Self {
            name: name.to_string(),
            args,
        }
    }

    /// Returns true if the literal carried an argument list with at least one
    /// argument.
    pub fn has_args(&self) -> bool {
        !self.args.is_empty()
    }
}

impl fmt::Display for FuncSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}({})", self.name, self.args.join(", "))
        }
    }
}

impl From<&str> for FuncSpec {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bare_name() {
        let spec = FuncSpec::parse("auth");
        assert_eq!(spec.name, "auth");
        assert!(spec.args.is_empty());
    }

    #[test]
    fn test_call_with_args() {
        let spec = FuncSpec::parse("charge(amount, currency)");
        assert_eq!(spec.name, "charge");
        assert_eq!(spec.args, vec!["amount", "currency"]);
    }

    #[test]
    fn test_single_arg() {
        let spec = FuncSpec::parse("auth(AUTH_1)");
        assert_eq!(spec.name, "auth");
        assert_eq!(spec.args, vec!["AUTH_1"]);
    }

    #[test]
    fn test_hyphenated_segments() {
        let spec = FuncSpec::parse("item-state-machine(_, ready-for-shipment)");
        assert_eq!(spec.name, "item-state-machine");
        assert_eq!(spec.args, vec!["_", "ready-for-shipment"]);
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let spec = FuncSpec::parse("notify( email ,sms )");
        assert_eq!(spec.name, "notify");
        assert_eq!(spec.args, vec!["email", "sms"]);
    }

    #[test]
    fn test_more_than_two_args() {
        let spec = FuncSpec::parse("route(a, b, c)");
        assert_eq!(spec.name, "route");
        assert_eq!(spec.args, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_parens() {
        let spec = FuncSpec::parse("ping()");
        assert_eq!(spec.name, "ping");
        assert!(spec.args.is_empty());
    }

    #[test]
    fn test_malformed_falls_back_to_name() {
        for input in ["weird!!", "f(a,,b)", "f(a b)", "f(a", "(a)", "f(a)x", " f(a)", ""] {
            let spec = FuncSpec::parse(input);
            assert_eq!(spec.name, input, "input {:?}", input);
            assert!(spec.args.is_empty(), "input {:?}", input);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(FuncSpec::parse("auth").to_string(), "auth");
        assert_eq!(
            FuncSpec::parse("charge(amount,currency)").to_string(),
            "charge(amount, currency)"
        );
    }

    proptest! {
        #[test]
        fn prop_parse_never_panics(input in ".*") {
            let _ = FuncSpec::parse(&input);
        }

        #[test]
        fn prop_call_form_recovers_parts(
            name in "[A-Za-z0-9_-]{1,12}",
            args in proptest::collection::vec("[A-Za-z0-9_-]{1,8}", 1..5),
        ) {
            let literal = format!("{}({})", name, args.join(", "));
            let spec = FuncSpec::parse(&literal);
            prop_assert_eq!(spec.name, name);
            prop_assert_eq!(spec.args, args);
        }

        #[test]
        fn prop_bad_chars_keep_literal(prefix in "[a-z]{1,6}", bad in "[!@#$%^&*+=.]{1,3}") {
            let literal = format!("{}{}", prefix, bad);
            let spec = FuncSpec::parse(&literal);
            prop_assert_eq!(spec.name, literal);
            prop_assert!(spec.args.is_empty());
        }
    }
}
