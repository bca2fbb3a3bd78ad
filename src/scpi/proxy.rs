//! Command paths built from chained attribute access.
//!
//! `inst.scpi().attr("sour").attr("volt").set(1.0)` writes `SOUR:VOLT 1`;
//! `.get()` on the same proxy queries `SOUR:VOLT?`. Every step returns a new proxy.

use std::fmt::{self, Display};

use crate::{
    error::{Error, Result},
    instruments::Instrument,
    spec::CommandKind,
};

/// Argument of a proxied command.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i64),
    Float(f64),
    /// Sent in single quotes.
    Str(String),
    /// Sent as bare text, e.g. `ON` or `VOLT`.
    Unquoted(String),
    /// As first argument, turns the call into `PATH? args`.
    Query,
}

/// The force-query marker.
pub const Q: Arg = Arg::Query;

pub fn no_quote<S: ToString>(text: S) -> Arg {
    Arg::Unquoted(text.to_string())
}

impl Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int(i) => write!(f, "{}", i),
            Arg::Float(x) => write!(f, "{}", x),
            Arg::Str(s) => write!(f, "'{}'", s),
            Arg::Unquoted(s) => write!(f, "{}", s),
            Arg::Query => write!(f, "?"),
        }
    }
}

macro_rules! arg_from {
    ($($t:ty => $variant:ident as $conv:ty),* $(,)?) => {
        $(impl From<$t> for Arg {
            fn from(v: $t) -> Self {
                Arg::$variant(v as $conv)
            }
        })*
    };
}

arg_from! {
    i32 => Int as i64,
    i64 => Int as i64,
    u32 => Int as i64,
    usize => Int as i64,
    f32 => Float as f64,
    f64 => Float as f64,
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::Str(v.to_string())
    }
}
impl From<String> for Arg {
    fn from(v: String) -> Self {
        Arg::Str(v)
    }
}

/// Wire form of `path` called with `args`.
pub fn render(path: &[String], args: &[Arg]) -> Result<(CommandKind, String)> {
    if path.is_empty() {
        return Err(Error::InvalidState("no command path to call".to_string()));
    }
    let base = path.join(":");
    if path.iter().any(|segment| segment.trim().is_empty()) {
        return Err(Error::InvalidState(format!(
            "empty segment in command path '{}'",
            base
        )));
    }
    let (kind, args) = match args.split_first() {
        None => return Ok((CommandKind::Query, format!("{}?", base))),
        Some((Arg::Query, rest)) => (CommandKind::Query, rest),
        Some(_) => (CommandKind::Write, args),
    };
    if args.iter().any(|a| *a == Arg::Query) {
        return Err(Error::InvalidState(format!(
            "query marker must be the first argument of '{}'",
            base
        )));
    }
    let list = args.iter().map(Arg::to_string).collect::<Vec<_>>().join(",");
    let command = match (kind, list.is_empty()) {
        (CommandKind::Query, true) => format!("{}?", base),
        (CommandKind::Query, false) => format!("{}? {}", base, list),
        (CommandKind::Write, _) => format!("{} {}", base, list),
    };
    Ok((kind, command))
}

#[derive(Clone)]
pub struct CommandProxy<'a> {
    instrument: &'a Instrument,
    path: Vec<String>,
}

impl<'a> CommandProxy<'a> {
    pub(crate) fn new(instrument: &'a Instrument, path: Vec<String>) -> Self {
        Self { instrument, path }
    }

    /// One more path segment, upper-cased. An empty name leaves a path that cannot be called.
    pub fn attr(&self, name: &str) -> CommandProxy<'a> {
        let mut path = self.path.clone();
        path.push(name.to_uppercase());
        CommandProxy::new(self.instrument, path)
    }

    /// Suffixes the last segment: `output[2]` is `OUTPUT2`, not `OUTPUT:2`.
    pub fn index<K: Display>(&self, key: K) -> Result<CommandProxy<'a>> {
        let mut path = self.path.clone();
        match path.last_mut() {
            Some(last) => last.push_str(&key.to_string()),
            None => {
                return Err(Error::InvalidState(format!(
                    "cannot index an empty command path with '{}'",
                    key
                )))
            }
        }
        Ok(CommandProxy::new(self.instrument, path))
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn command(&self) -> String {
        self.path.join(":")
    }

    /// Queries without arguments, queries with the [`Q`] marker first, writes otherwise.
    /// Returns the response of a query and `None` for a write.
    pub fn call(&self, args: &[Arg]) -> Result<Option<String>> {
        match render(&self.path, args)? {
            (CommandKind::Query, command) => self.instrument.query(&command).map(Some),
            (CommandKind::Write, command) => self.instrument.write(&command).map(|_| None),
        }
    }

    pub fn get(&self) -> Result<String> {
        self.instrument.query(&render(&self.path, &[])?.1)
    }

    pub fn set<A: Into<Arg>>(&self, arg: A) -> Result<()> {
        let arg = arg.into();
        if arg == Arg::Query {
            return Err(Error::InvalidState("set() cannot take the query marker".to_string()));
        }
        self.call(&[arg]).map(|_| ())
    }
}

impl fmt::Debug for CommandProxy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandProxy")
            .field("instrument", &self.instrument.name())
            .field("path", &self.path)
            .finish()
    }
}
