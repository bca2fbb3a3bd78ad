use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("serial protocol error: {0}")]
    SerialError(#[from] serial::Error),
    #[error("tcp protocol error: {0}")]
    TcpError(#[from] std::io::Error),
    #[error("unrecognised resource address '{0}'")]
    InvalidAddress(String),
    #[error("stream closed by the instrument")]
    Closed,
}
