//! Running declared methods.
//!
//! Each step of a method is a template. After substitution a step is either a nested call
//! (`configure(level=2)`), which runs another method of the same instrument, or a command
//! that is written or queried. Query responses and non-empty nested results make up the
//! returned list.

use std::{collections::HashMap, sync::LazyLock};

use regex::Regex;
use strfmt::strfmt;
use tracing::debug;

use super::Instrument;
use crate::{
    error::{Error, Result},
    spec::{CommandKind, CommandTemplate},
    value::{Kwargs, Value},
};

pub const MAX_NESTING: usize = 16;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\{([A-Za-z_][A-Za-z0-9_]*)(?:[:!][^}]*)?\}").expect("placeholder pattern")
});

static CALL_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[A-Za-z_][\w.]*\(").expect("call start pattern"));

static CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*([A-Za-z_][\w.]*)\((.*)\)\s*$").expect("call pattern")
});

static IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_]\w*$").expect("identifier pattern"));

/// Placeholder names of a template, in order of appearance. `{{` is a literal brace.
pub fn placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Fills `template` from `kwargs`. Every placeholder needs an argument.
pub fn substitute(method: &str, template: &str, kwargs: &Kwargs) -> Result<String> {
    let mut vars = HashMap::new();
    for name in placeholders(template) {
        let value = kwargs.get(name).ok_or_else(|| Error::MissingParameter {
            method: method.to_string(),
            parameter: name.to_string(),
        })?;
        vars.insert(name.to_string(), value.to_string());
    }
    strfmt(template, &vars).map_err(|e| Error::TemplateFormat {
        method: method.to_string(),
        template: template.to_string(),
        reason: e.to_string(),
    })
}

/// A step that invokes another method.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedCall {
    pub method: String,
    pub kwargs: Kwargs,
}

impl NestedCall {
    /// `Ok(None)` for plain commands. Text that starts like a call but is not
    /// `name(key=value, ...)` is an error rather than a command.
    pub fn parse(text: &str) -> Result<Option<NestedCall>> {
        if !CALL_START.is_match(text) {
            return Ok(None);
        }
        let invalid = || Error::InvalidNestedCallSyntax(text.trim().to_string());
        let caps = CALL.captures(text).ok_or_else(invalid)?;
        let name = &caps[1];
        let method = name.strip_prefix("self.").unwrap_or(name);
        if method.is_empty() || method.ends_with('.') {
            return Err(invalid());
        }

        let mut kwargs = Kwargs::new();
        let body = caps[2].trim();
        if !body.is_empty() {
            for part in split_args(body).ok_or_else(invalid)? {
                let (key, value) = part.split_once('=').ok_or_else(invalid)?;
                let key = key.trim();
                if !IDENT.is_match(key) {
                    return Err(invalid());
                }
                kwargs.insert(key, Value::parse_literal(value));
            }
        }
        Ok(Some(NestedCall {
            method: method.to_string(),
            kwargs,
        }))
    }
}

/// Splits on commas outside quotes. `None` on an unterminated quote.
fn split_args(body: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut quote = None;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, ',') => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if quote.is_some() {
        return None;
    }
    parts.push(&body[start..]);
    Some(parts)
}

struct DepthGuard<'a>(&'a Instrument);

impl<'a> DepthGuard<'a> {
    fn enter(instrument: &'a Instrument) -> Result<Self> {
        let depth = instrument.depth.get();
        if depth >= MAX_NESTING {
            return Err(Error::NestingTooDeep(MAX_NESTING));
        }
        instrument.depth.set(depth + 1);
        Ok(DepthGuard(instrument))
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.depth.set(self.0.depth.get().saturating_sub(1));
    }
}

impl Instrument {
    /// Runs the declared method `name` and returns the list of its results.
    ///
    /// All placeholders of all steps are checked before the first command goes out.
    pub fn execute_declared(&self, name: &str, kwargs: &Kwargs) -> Result<Value> {
        let steps: Vec<CommandTemplate> = self
            .specification()
            .get(name)
            .ok_or_else(|| Error::SpecMethodNotFound(name.to_string()))?
            .to_vec();
        for step in &steps {
            if let Some(parameter) = placeholders(step.text())
                .into_iter()
                .find(|p| !kwargs.contains(p))
            {
                return Err(Error::MissingParameter {
                    method: name.to_string(),
                    parameter: parameter.to_string(),
                });
            }
        }

        let _guard = DepthGuard::enter(self)?;
        debug!(instrument = %self.name(), "running '{}' ({} steps)", name, steps.len());
        let mut results = Vec::new();
        for step in &steps {
            let text = substitute(name, step.text(), kwargs)?;
            if let Some(call) = NestedCall::parse(&text)? {
                let value = self.call_nested(&call)?;
                if !value.is_empty_result() {
                    results.push(value);
                }
                continue;
            }
            let command = text.trim();
            match step.kind() {
                CommandKind::Query => results.push(Value::Str(self.query(command)?)),
                CommandKind::Write => self.write(command)?,
            }
        }
        Ok(Value::List(results))
    }

    fn call_nested(&self, call: &NestedCall) -> Result<Value> {
        if let Some(method) = self.native(&call.method) {
            let _guard = DepthGuard::enter(self)?;
            return method(self, &call.kwargs);
        }
        self.execute_declared(&call.method, &call.kwargs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_placeholders_but_not_escaped_braces() {
        assert_eq!(placeholders(":SOUR:VOLT {voltage}"), vec!["voltage"]);
        assert_eq!(placeholders("{a:.3},{b}"), vec!["a", "b"]);
        assert!(placeholders("{{literal}}").is_empty());
    }

    #[test]
    fn substitution_reports_missing_names() {
        let kwargs = Kwargs::new().with("x", 3);
        assert_eq!(substitute("foo", "BAR:BAZ {x}", &kwargs).unwrap(), "BAR:BAZ 3");
        match substitute("foo", "BAR {x},{y}", &kwargs) {
            Err(Error::MissingParameter { method, parameter }) => {
                assert_eq!(method, "foo");
                assert_eq!(parameter, "y");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_nested_calls() {
        let call = NestedCall::parse("configure(level=2, mode='front', limit=1e-3)")
            .unwrap()
            .unwrap();
        assert_eq!(call.method, "configure");
        assert_eq!(call.kwargs.get("level"), Some(&Value::Int(2)));
        assert_eq!(call.kwargs.get("mode"), Some(&Value::Str("front".into())));
        assert_eq!(call.kwargs.get("limit"), Some(&Value::Float(1e-3)));

        let call = NestedCall::parse("self.reset()").unwrap().unwrap();
        assert_eq!(call.method, "reset");
        assert!(call.kwargs.is_empty());
    }

    #[test]
    fn quoted_commas_stay_in_one_argument() {
        let call = NestedCall::parse("label(text='a,b')").unwrap().unwrap();
        assert_eq!(call.kwargs.get("text"), Some(&Value::Str("a,b".into())));
    }

    #[test]
    fn parentheses_inside_a_command_are_not_calls() {
        assert_eq!(NestedCall::parse("ROUT:CLOS (@101)").unwrap(), None);
        assert_eq!(NestedCall::parse(":SENS:FUNC 'VOLT'").unwrap(), None);
        assert_eq!(NestedCall::parse("*RST").unwrap(), None);
    }

    #[test]
    fn malformed_calls_are_rejected() {
        for text in ["configure(level)", "configure(level=2", "configure(2=x)", "f(a='b)"] {
            assert!(
                matches!(NestedCall::parse(text), Err(Error::InvalidNestedCallSyntax(_))),
                "{}",
                text
            );
        }
    }
}
