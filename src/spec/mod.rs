//! Declarative method specifications.
//!
//! A specification file is a YAML document whose top-level `methods` key maps method names to
//! command sequences:
//!
//! ```yaml
//! methods:
//!   source_voltage:
//!     - ":SOUR:FUNC VOLT"
//!     - ":SOUR:VOLT {voltage}"
//!     - { type: query, cmd: ":READ?" }
//!   measure:
//!     commands:
//!       - "configure(level={lvl})"
//!       - ":MEAS:VOLT?"
//! ```
//!
//! Other top-level keys are ignored; a document without `methods` declares nothing.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::{Error, Result};

pub mod loader;

pub use self::loader::SpecLoader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Write,
    Query,
}

/// One step of a declared method: a format string with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    text: String,
    kind: Option<CommandKind>,
}

impl CommandTemplate {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            kind: None,
        }
    }

    pub fn tagged(text: &str, kind: CommandKind) -> Self {
        Self {
            text: text.to_string(),
            kind: Some(kind),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The explicit tag, else a query when the template or its first word ends in `?`.
    pub fn kind(&self) -> CommandKind {
        if let Some(kind) = self.kind {
            return kind;
        }
        let first_word_queries = self
            .text
            .split_whitespace()
            .next()
            .map_or(false, |word| word.ends_with('?'));
        if self.text.trim().ends_with('?') || first_word_queries {
            CommandKind::Query
        } else {
            CommandKind::Write
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTemplate {
    Text(String),
    Tagged {
        #[serde(rename = "type", default)]
        kind: Option<CommandKind>,
        cmd: String,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMethod {
    Sequence(Vec<RawTemplate>),
    Object { commands: Vec<RawTemplate> },
}

#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    methods: Option<BTreeMap<String, RawMethod>>,
}

impl From<RawTemplate> for CommandTemplate {
    fn from(raw: RawTemplate) -> Self {
        match raw {
            RawTemplate::Text(text) => CommandTemplate { text, kind: None },
            RawTemplate::Tagged { kind, cmd } => CommandTemplate { text: cmd, kind },
        }
    }
}

/// Method name → ordered command templates. Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Specification {
    source: Option<PathBuf>,
    methods: BTreeMap<String, Vec<CommandTemplate>>,
}

impl Specification {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(text: &str, source: &Path) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self {
                source: Some(source.to_path_buf()),
                methods: BTreeMap::new(),
            });
        }
        let doc: Option<RawDocument> = serde_yaml::from_str(text).map_err(|e| Error::SpecParse {
            path: source.to_path_buf(),
            source: e,
        })?;
        let methods = doc
            .and_then(|d| d.methods)
            .unwrap_or_default()
            .into_iter()
            .map(|(name, method)| {
                let steps = match method {
                    RawMethod::Sequence(steps) | RawMethod::Object { commands: steps } => steps,
                };
                (name, steps.into_iter().map(CommandTemplate::from).collect())
            })
            .collect();
        Ok(Self {
            source: Some(source.to_path_buf()),
            methods,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text, path)
    }

    /// Builds a specification in code, mostly for tests and ad-hoc drivers.
    pub fn from_methods<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<CommandTemplate>)>,
        S: Into<String>,
    {
        Self {
            source: None,
            methods: methods.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn get(&self, method: &str) -> Option<&[CommandTemplate]> {
        self.methods.get(method).map(Vec::as_slice)
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Names from `required` without an entry, in the order given.
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|name| !self.contains(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Specification {
        Specification::from_yaml_str(text, Path::new("test.yml")).unwrap()
    }

    #[test]
    fn both_method_shapes_and_both_template_shapes() {
        let spec = parse(
            r#"
methods:
  source_voltage:
    - ":SOUR:FUNC VOLT"
    - { type: query, cmd: ":READ" }
  measure:
    commands:
      - ":MEAS:VOLT?"
      - cmd: "*WAI"
"#,
        );
        let steps = spec.get("source_voltage").unwrap();
        assert_eq!(steps[0].kind(), CommandKind::Write);
        assert_eq!(steps[1].kind(), CommandKind::Query);
        assert_eq!(steps[1].text(), ":READ");
        let steps = spec.get("measure").unwrap();
        assert_eq!(steps[0].kind(), CommandKind::Query);
        assert_eq!(steps[1].kind(), CommandKind::Write);
    }

    #[test]
    fn query_inferred_from_first_word() {
        assert_eq!(CommandTemplate::new(":SENS:FUNC? 'VOLT'").kind(), CommandKind::Query);
        assert_eq!(CommandTemplate::new("BAR:BAZ? ").kind(), CommandKind::Query);
        assert_eq!(CommandTemplate::new("BAR:BAZ {x}").kind(), CommandKind::Write);
    }

    #[test]
    fn missing_methods_key_is_empty() {
        assert!(parse("parameters:\n  points: 201\n").is_empty());
        assert!(parse("").is_empty());
    }

    #[test]
    fn malformed_method_is_a_parse_error() {
        let err = Specification::from_yaml_str("methods:\n  foo: 3\n", Path::new("bad.yml"));
        assert!(matches!(err, Err(Error::SpecParse { .. })));
    }

    #[test]
    fn reports_only_absent_required_names() {
        let spec = parse("methods:\n  a: [\"A\"]\n  c: [\"C\"]\n");
        assert_eq!(spec.missing(&["a", "b", "c"]), vec!["b"]);
    }
}
