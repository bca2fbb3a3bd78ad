use thiserror::Error;

/// Errors an instrument reports through its standard event status register, plus responses
/// that do not have the shape a common command promises.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScpiError {
    #[error("command error")]
    CommandError,
    #[error("execution error")]
    ExecutionError,
    #[error("device-dependent error")]
    DevDependError,
    #[error("query error")]
    QueryError,
    #[error("malformed response to '{command}': '{response}'")]
    MalformedResponse { command: String, response: String },
}
