use std::path::PathBuf;

use thiserror::Error;

use crate::{protocols::protocol_error::ProtocolError, scpi::error::ScpiError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not connect to '{address}': {reason}")]
    ConnectionFailed { address: String, reason: String },
    #[error("instrument '{0}' is not connected")]
    NotConnected(String),
    #[error("specification file '{file}' not found in any of: {searched:?}")]
    SpecFileNotFound { file: String, searched: Vec<PathBuf> },
    #[error("failed to parse specification '{path}': {source}")]
    SpecParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("method '{0}' is not defined in the specification")]
    SpecMethodNotFound(String),
    #[error("method '{method}' needs parameter '{parameter}'")]
    MissingParameter { method: String, parameter: String },
    #[error("methods {missing:?} are marked as specification-required but have no implementation in '{file}'")]
    MissingSpecImplementation { file: String, missing: Vec<String> },
    #[error("transient I/O failure: {0}")]
    TransientIo(String),
    #[error("failed to query '{command}' after {attempts} attempts")]
    ConnectionError { command: String, attempts: u32 },
    #[error("cannot format template '{template}' of '{method}': {reason}")]
    TemplateFormat {
        method: String,
        template: String,
        reason: String,
    },
    #[error("invalid nested method call '{0}'")]
    InvalidNestedCallSyntax(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("nested method calls deeper than {0} levels")]
    NestingTooDeep(usize),
    #[error("invalid settings: {0}")]
    Config(#[from] Box<figment::Error>),
    #[error("transfer layer error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("scpi error: {0}")]
    Scpi(#[from] ScpiError),
    #[error("{0}")]
    Other(#[from] OtherError),
}

impl Error {
    /// Whether the failure is worth another attempt at the query boundary.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::TransientIo(_) => true,
            Error::Io(e) => is_transient_kind(e.kind()),
            Error::Protocol(ProtocolError::TcpError(e)) => is_transient_kind(e.kind()),
            _ => false,
        }
    }
}

pub(crate) fn is_transient_kind(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind::*;
    matches!(kind, TimedOut | WouldBlock | Interrupted)
}

#[derive(Debug)]
pub struct OtherError(String);

impl std::fmt::Display for OtherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error: {}", self.0)
    }
}

impl std::error::Error for OtherError {}
impl<'a> From<&'a str> for OtherError {
    fn from(s: &'a str) -> Self {
        Self(s.to_string())
    }
}
impl From<String> for OtherError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl<'a> From<&'a str> for Error {
    fn from(s: &'a str) -> Self {
        Error::Other(OtherError::from(s))
    }
}
impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(OtherError::from(s))
    }
}

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self {
        Error::Config(Box::new(e))
    }
}

impl From<serial::Error> for Error {
    fn from(s: serial::Error) -> Self {
        Error::Protocol(s.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_transient() {
        let e: Error = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into();
        assert!(e.is_transient());
        assert!(Error::TransientIo("busy".into()).is_transient());
    }

    #[test]
    fn configuration_problems_are_not_transient() {
        assert!(!Error::NotConnected("smu".into()).is_transient());
        assert!(!Error::SpecMethodNotFound("foo".into()).is_transient());
        let e: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(!e.is_transient());
    }

    #[test]
    fn missing_implementation_lists_every_name() {
        let e = Error::MissingSpecImplementation {
            file: "smu.yml".into(),
            missing: vec!["a".into(), "b".into()],
        };
        let text = e.to_string();
        assert!(text.contains("\"a\"") && text.contains("\"b\""));
    }

    #[test]
    fn free_form_messages() {
        let e: Error = "no instrument on the bus".into();
        assert_eq!(e.to_string(), "error: no instrument on the bus");
    }
}
