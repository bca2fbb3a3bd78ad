//! Name resolution: native methods first, then declared methods, then a command path.

use std::fmt;

use super::{Instrument, NativeMethod};
use crate::{
    error::{Error, Result},
    scpi::CommandProxy,
    value::{Kwargs, Value},
};

/// A bound native method.
#[derive(Clone, Copy)]
pub struct NativeCall<'a> {
    instrument: &'a Instrument,
    name: &'a str,
    method: NativeMethod,
}

impl NativeCall<'_> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn call(&self, kwargs: &Kwargs) -> Result<Value> {
        (self.method)(self.instrument, kwargs)
    }
}

/// A bound declared method.
#[derive(Clone, Copy)]
pub struct DeclaredCall<'a> {
    instrument: &'a Instrument,
    name: &'a str,
}

impl DeclaredCall<'_> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn call(&self, kwargs: &Kwargs) -> Result<Value> {
        self.instrument.execute_declared(self.name, kwargs)
    }
}

pub enum Resolved<'a> {
    Native(NativeCall<'a>),
    Declared(DeclaredCall<'a>),
    Proxy(CommandProxy<'a>),
}

impl Resolved<'_> {
    pub fn is_proxy(&self) -> bool {
        matches!(self, Resolved::Proxy(_))
    }
}

impl fmt::Debug for Resolved<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolved::Native(c) => f.debug_tuple("Native").field(&c.name).finish(),
            Resolved::Declared(c) => f.debug_tuple("Declared").field(&c.name).finish(),
            Resolved::Proxy(p) => f.debug_tuple("Proxy").field(&p.command()).finish(),
        }
    }
}

/// Method names an instrument answers to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AvailableMethods {
    pub spec: Vec<String>,
    pub native: Vec<String>,
    /// Union of both, sorted, without duplicates.
    pub all: Vec<String>,
}

impl Instrument {
    /// Resolves `name` to something callable. Never fails: unknown names become the first
    /// segment of a command path.
    pub fn resolve<'a>(&'a self, name: &'a str) -> Resolved<'a> {
        if let Some(method) = self.native(name) {
            return Resolved::Native(NativeCall {
                instrument: self,
                name,
                method,
            });
        }
        if self.specification().contains(name) {
            return Resolved::Declared(DeclaredCall {
                instrument: self,
                name,
            });
        }
        Resolved::Proxy(self.scpi().attr(name))
    }

    /// Calls a native or declared method by name.
    pub fn call(&self, name: &str, kwargs: &Kwargs) -> Result<Value> {
        match self.resolve(name) {
            Resolved::Native(m) => m.call(kwargs),
            Resolved::Declared(m) => m.call(kwargs),
            Resolved::Proxy(_) => Err(Error::SpecMethodNotFound(name.to_string())),
        }
    }

    pub fn available_methods(&self) -> AvailableMethods {
        let spec: Vec<String> = self.specification().names().map(str::to_string).collect();
        let native: Vec<String> = self.native_names().map(str::to_string).collect();
        let mut all: Vec<String> = spec.iter().chain(native.iter()).cloned().collect();
        all.sort();
        all.dedup();
        AvailableMethods { spec, native, all }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Settings,
        protocols::MockTransport,
        spec::{CommandTemplate, Specification},
    };

    fn ping(_: &Instrument, _: &Kwargs) -> Result<Value> {
        Ok(Value::from("pong"))
    }

    fn instrument() -> Instrument {
        let spec = Specification::from_methods([
            ("measure", vec![CommandTemplate::new(":MEAS?")]),
            ("ping", vec![CommandTemplate::new("*CLS")]),
        ]);
        Instrument::builder("smu", "mock")
            .transport(MockTransport::new())
            .specification(spec)
            .native("ping", ping)
            .settings(Settings::default())
            .build()
            .unwrap()
    }

    #[test]
    fn natives_shadow_declared_methods() {
        let inst = instrument();
        assert!(matches!(inst.resolve("ping"), Resolved::Native(_)));
        assert!(matches!(inst.resolve("measure"), Resolved::Declared(_)));
        assert_eq!(inst.call("ping", &Kwargs::new()).unwrap(), Value::from("pong"));
    }

    #[test]
    fn unknown_names_become_command_paths() {
        let inst = instrument();
        match inst.resolve("sour") {
            Resolved::Proxy(p) => assert_eq!(p.command(), "SOUR"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            inst.call("sour", &Kwargs::new()),
            Err(Error::SpecMethodNotFound(_))
        ));
    }

    #[test]
    fn available_methods_are_merged() {
        let methods = instrument().available_methods();
        assert_eq!(methods.spec, vec!["measure", "ping"]);
        assert_eq!(methods.native, vec!["ping"]);
        assert_eq!(methods.all, vec!["measure", "ping"]);
    }
}
