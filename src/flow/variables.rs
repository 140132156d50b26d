//! Variable Resolution
//!
//! Builds the initial variable bag of a run from declared defaults and
//! caller arguments, checks declared rules, and strips sensitive values
//! before anything leaves the engine.

use std::collections::HashSet;

use log::debug;
use regex::Regex;
use serde_json::Value;

use super::model::{Flow, VariableDef, Variables};

/// Placeholder shown instead of a sensitive value.
pub const MASK: &str = "***";

/// Seeds a variable bag: declared defaults first, then caller arguments.
pub fn initial_variables(flow: &Flow, args: &Variables) -> Variables {
    let mut vars = Variables::new();

    for def in &flow.variables {
        if let Some(default) = &def.default {
            vars.insert(def.key.clone(), default.clone());
        }
    }

    for (key, value) in args {
        vars.insert(key.clone(), value.clone());
    }

    debug!("Initial variables: {:?}", masked(flow, &vars));
    vars
}

/// Required variables that are absent, `null` or an empty string.
pub fn missing_required<'a>(flow: &'a Flow, vars: &Variables) -> Vec<&'a VariableDef> {
    flow.variables
        .iter()
        .filter(|def| def.required)
        .filter(|def| match vars.get(&def.key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        })
        .collect()
}

/// Checks declared rules, returning one message per violation.
///
/// Violations never stop a run; the caller records them as warnings.
/// Messages name the variable but never include its value.
pub fn check_rules(flow: &Flow, vars: &Variables) -> Vec<String> {
    let mut violations = Vec::new();

    for def in &flow.variables {
        let value = match vars.get(&def.key) {
            Some(Value::Null) | None => {
                if def.required {
                    violations.push(format!("Variable '{}' is required but has no value", def.key));
                }
                continue;
            }
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        violations.extend(check_value(def, &value));
    }

    violations
}

fn check_value(def: &VariableDef, value: &str) -> Vec<String> {
    let rules = &def.rules;
    let mut violations = Vec::new();
    let length = value.chars().count();

    if let Some(min) = rules.min_length {
        if length < min {
            violations.push(format!(
                "Variable '{}' is shorter than {} characters",
                def.key, min
            ));
        }
    }

    if let Some(max) = rules.max_length {
        if length > max {
            violations.push(format!(
                "Variable '{}' is longer than {} characters",
                def.key, max
            ));
        }
    }

    if let Some(pattern) = &rules.pattern {
        match Regex::new(pattern) {
            Ok(re) if !re.is_match(value) => violations.push(format!(
                "Variable '{}' does not match pattern '{}'",
                def.key, pattern
            )),
            Ok(_) => {}
            Err(e) => violations.push(format!(
                "Variable '{}' has an invalid pattern: {}",
                def.key, e
            )),
        }
    }

    if !rules.options.is_empty() && !rules.options.iter().any(|o| o == value) {
        violations.push(format!(
            "Variable '{}' is not one of the allowed options",
            def.key
        ));
    }

    violations
}

/// Copy of the bag without sensitive keys, safe to return to callers.
pub fn public_outputs(flow: &Flow, vars: &Variables) -> Variables {
    let sensitive: HashSet<&str> = flow.sensitive_keys().into_iter().collect();
    vars.iter()
        .filter(|(key, _)| !sensitive.contains(key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Copy of the bag with sensitive values replaced by [`MASK`], for logging.
pub fn masked(flow: &Flow, vars: &Variables) -> Variables {
    let sensitive: HashSet<&str> = flow.sensitive_keys().into_iter().collect();
    vars.iter()
        .map(|(key, value)| {
            let shown = if sensitive.contains(key.as_str()) {
                Value::String(MASK.to_string())
            } else {
                value.clone()
            };
            (key.clone(), shown)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::model::VariableRules;
    use serde_json::json;

    fn args(value: Value) -> Variables {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_args_override_defaults() {
        let flow = Flow::new("f", "f")
            .with_variable(VariableDef::new("a").with_default(json!(1)))
            .with_variable(VariableDef::new("b").with_default(json!(2)));

        let vars = initial_variables(&flow, &args(json!({"b": 20, "c": 30})));
        assert_eq!(vars["a"], json!(1));
        assert_eq!(vars["b"], json!(20));
        assert_eq!(vars["c"], json!(30));
    }

    #[test]
    fn test_missing_required() {
        let flow = Flow::new("f", "f")
            .with_variable(VariableDef::new("email").required())
            .with_variable(VariableDef::new("name").required())
            .with_variable(VariableDef::new("note"));

        let vars = args(json!({"email": "", "name": "ada"}));
        let missing: Vec<_> = missing_required(&flow, &vars)
            .into_iter()
            .map(|d| d.key.as_str())
            .collect();
        assert_eq!(missing, vec!["email"]);
    }

    #[test]
    fn test_rule_violations() {
        let flow = Flow::new("f", "f")
            .with_variable(VariableDef::new("code").with_rules(VariableRules {
                min_length: Some(4),
                pattern: Some("^[0-9]+$".to_string()),
                ..VariableRules::default()
            }))
            .with_variable(VariableDef::new("size").with_rules(VariableRules {
                options: vec!["s".into(), "m".into()],
                ..VariableRules::default()
            }))
            .with_variable(VariableDef::new("bad").with_rules(VariableRules {
                pattern: Some("(".to_string()),
                ..VariableRules::default()
            }));

        let vars = args(json!({"code": "ab", "size": "xl", "bad": "x"}));
        let violations = check_rules(&flow, &vars);

        assert_eq!(violations.len(), 4);
        assert!(violations.iter().any(|v| v.contains("shorter")));
        assert!(violations.iter().any(|v| v.contains("pattern '^[0-9]+$'")));
        assert!(violations.iter().any(|v| v.contains("allowed options")));
        assert!(violations.iter().any(|v| v.contains("invalid pattern")));
    }

    #[test]
    fn test_rules_pass() {
        let rules = VariableRules {
            max_length: Some(3),
            ..VariableRules::default()
        };
        let flow = Flow::new("f", "f").with_variable(VariableDef::new("n").with_rules(rules));
        assert!(check_rules(&flow, &args(json!({"n": 123}))).is_empty());
    }

    #[test]
    fn test_sensitive_values_never_leak() {
        let flow = Flow::new("f", "f")
            .with_variable(VariableDef::new("password").sensitive())
            .with_variable(VariableDef::new("user"));
        let vars = args(json!({"password": "hunter2", "user": "ada"}));

        let outputs = public_outputs(&flow, &vars);
        assert!(!outputs.contains_key("password"));
        assert_eq!(outputs["user"], json!("ada"));

        let shown = masked(&flow, &vars);
        assert_eq!(shown["password"], json!(MASK));
    }
}
