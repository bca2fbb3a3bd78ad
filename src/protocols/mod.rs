//! Transports: how command strings reach an instrument.
//!
//! The core only speaks to the [`Transport`] contract. [`StreamTransport`] is the default,
//! line-oriented implementation over any stream a [`Protocol`] can open; [`MockTransport`]
//! stands in for hardware.

use std::{
    io::{BufRead, BufReader, Read, Write},
    time::Duration,
};

use tracing::debug;

use crate::error::{Error, Result};

pub mod mock;
pub mod protocol_error;
pub mod serial;
pub mod tcp;

pub use self::mock::{MockHandle, MockTransport, Traffic};
pub use self::protocol_error::ProtocolError;
pub use self::serial::Serial;
pub use self::tcp::Tcp;

/// Transport-specific connection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    pub timeout: Duration,
    pub read_termination: u8,
    pub write_termination: String,
    pub baud_rate: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2000),
            read_termination: b'\n',
            write_termination: "\n".to_string(),
            baud_rate: 9600,
        }
    }
}

/// Read/write/query capability over an addressable resource.
///
/// `write`, `read` and `query` fail with [`Error::NotConnected`] while disconnected.
/// `disconnect` must be safe to call any number of times.
pub trait Transport: Send {
    fn connect(&mut self, address: &str, options: &ConnectOptions) -> Result<bool>;
    fn disconnect(&mut self) -> Result<()>;
    fn write(&mut self, command: &str) -> Result<()>;
    fn read(&mut self) -> Result<String>;
    fn query(&mut self, command: &str) -> Result<String> {
        self.write(command)?;
        self.read()
    }
    /// Drops input already received but not yet read, e.g. a late reply to a timed-out query.
    fn discard_input(&mut self) -> Result<()> {
        Ok(())
    }
    fn is_connected(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self, address: &str, options: &ConnectOptions) -> Result<bool> {
        (**self).connect(address, options)
    }
    fn disconnect(&mut self) -> Result<()> {
        (**self).disconnect()
    }
    fn write(&mut self, command: &str) -> Result<()> {
        (**self).write(command)
    }
    fn read(&mut self) -> Result<String> {
        (**self).read()
    }
    fn query(&mut self, command: &str) -> Result<String> {
        (**self).query(command)
    }
    fn discard_input(&mut self) -> Result<()> {
        (**self).discard_input()
    }
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

/// Opens a byte stream to the resource named by an address string.
pub trait Protocol {
    type IO: Read + Write + Send;
    fn open(&self, address: &str, options: &ConnectOptions) -> std::result::Result<Self::IO, ProtocolError>;
}

/// Picks the protocol from the shape of the address: serial port names and `ASRL` resources
/// go to [`Serial`], everything else to [`Tcp`].
pub fn default_transport(address: &str) -> Box<dyn Transport> {
    if serial::Serial::accepts(address) {
        Box::new(StreamTransport::new(Serial::default()))
    } else {
        Box::new(StreamTransport::new(Tcp))
    }
}

/// Text transport over a [`Protocol`] stream, one response per terminated line.
pub struct StreamTransport<P: Protocol> {
    protocol: P,
    stream: Option<BufReader<P::IO>>,
    options: ConnectOptions,
    buf: Vec<u8>,
}

impl<P: Protocol> StreamTransport<P> {
    pub fn new(protocol: P) -> Self {
        Self {
            protocol,
            stream: None,
            options: ConnectOptions::default(),
            buf: Vec::new(),
        }
    }

    fn stream(&mut self) -> Result<&mut BufReader<P::IO>> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::NotConnected("stream transport".to_string()))
    }
}

fn io_error(e: std::io::Error) -> Error {
    if crate::error::is_transient_kind(e.kind()) {
        Error::TransientIo(e.to_string())
    } else {
        Error::Io(e)
    }
}

impl<P: Protocol + Send> Transport for StreamTransport<P> {
    fn connect(&mut self, address: &str, options: &ConnectOptions) -> Result<bool> {
        self.disconnect()?;
        let io = self.protocol.open(address, options)?;
        self.stream = Some(BufReader::new(io));
        self.options = options.clone();
        Ok(true)
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            // dropping the stream closes it; a failed flush must not keep it open
            if let Err(e) = stream.get_mut().flush() {
                debug!("flush on disconnect failed: {}", e);
            }
        }
        Ok(())
    }

    fn write(&mut self, command: &str) -> Result<()> {
        let termination = self.options.write_termination.clone();
        let io = self.stream()?.get_mut();
        io.write_all(command.as_bytes()).map_err(io_error)?;
        io.write_all(termination.as_bytes()).map_err(io_error)?;
        io.flush().map_err(io_error)?;
        Ok(())
    }

    fn read(&mut self) -> Result<String> {
        let end = self.options.read_termination;
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        let n = self.stream()?.read_until(end, &mut buf);
        let line = match n {
            Ok(0) => Err(Error::Protocol(ProtocolError::Closed)),
            Ok(_) => Ok(String::from_utf8_lossy(&buf).trim_end_matches(&['\r', '\n'][..]).to_string()),
            Err(e) => Err(io_error(e)),
        };
        self.buf = buf;
        line
    }

    fn discard_input(&mut self) -> Result<()> {
        let stream = self.stream()?;
        let stale = stream.buffer().len();
        if stale > 0 {
            debug!("discarding {} buffered bytes", stale);
        }
        stream.consume(stale);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Canned(Vec<u8>);

    /// Replays a fixed byte buffer and swallows writes.
    struct CannedIo {
        input: Cursor<Vec<u8>>,
    }

    impl Read for CannedIo {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }
    impl Write for CannedIo {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Protocol for Canned {
        type IO = CannedIo;
        fn open(&self, _address: &str, _options: &ConnectOptions) -> std::result::Result<CannedIo, ProtocolError> {
            Ok(CannedIo {
                input: Cursor::new(self.0.clone()),
            })
        }
    }

    #[test]
    fn reads_one_line_per_response() {
        let mut t = StreamTransport::new(Canned(b"KEITHLEY,2450\r\n+1.0E-3\n".to_vec()));
        assert!(t.connect("canned", &ConnectOptions::default()).unwrap());
        assert_eq!(t.query("*IDN?").unwrap(), "KEITHLEY,2450");
        assert_eq!(t.read().unwrap(), "+1.0E-3");
        assert!(matches!(t.read(), Err(Error::Protocol(ProtocolError::Closed))));
    }

    #[test]
    fn discarded_input_is_not_read_again() {
        let mut t = StreamTransport::new(Canned(b"late\nstale\n".to_vec()));
        t.connect("canned", &ConnectOptions::default()).unwrap();
        assert_eq!(t.read().unwrap(), "late");
        t.discard_input().unwrap();
        assert!(matches!(t.read(), Err(Error::Protocol(ProtocolError::Closed))));
    }

    #[test]
    fn io_before_connect_is_refused() {
        let mut t = StreamTransport::new(Canned(Vec::new()));
        assert!(matches!(t.write("*RST"), Err(Error::NotConnected(_))));
        assert!(matches!(t.read(), Err(Error::NotConnected(_))));
        t.disconnect().unwrap();
        t.disconnect().unwrap();
        assert!(!t.is_connected());
    }

    #[test]
    fn serial_addresses_pick_the_serial_protocol() {
        assert!(serial::Serial::accepts("COM5"));
        assert!(serial::Serial::accepts("ASRL3::INSTR"));
        assert!(!serial::Serial::accepts("TCPIP0::192.168.0.95::INSTR"));
    }

    #[test]
    fn hostnames_starting_like_ports_stay_on_tcp() {
        for address in ["compute-01.lab:5025", "comms-smu", "COM", "com5.lab", "asrl-bench"] {
            assert!(!serial::Serial::accepts(address), "{}", address);
        }
        for address in ["com12", "ASRL/dev/ttyUSB0::INSTR", "ASRL5", "/dev/ttyACM1"] {
            assert!(serial::Serial::accepts(address), "{}", address);
        }
    }
}
