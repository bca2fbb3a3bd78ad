use std::sync::LazyLock;

use regex::Regex;

use super::{ConnectOptions, Protocol, ProtocolError};
use ::serial::{SerialPort, SystemPort};

/// `COM5`, `ASRL5[::INSTR]`, `ASRL/dev/ttyUSB0[::INSTR]` or a `/dev/` path.
static SERIAL_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:COM\d+|ASRL(?:\d+|/dev/\S+?)(?:::INSTR)?)$|^/dev/\S+$")
        .expect("serial address pattern")
});

/// RS-232 / USB-serial link, 8N1 without flow control.
#[derive(Clone, Copy)]
pub struct Serial {
    pub data_bits: ::serial::CharSize,
    pub parity: ::serial::Parity,
    pub stop_bits: ::serial::StopBits,
    pub flow_control: ::serial::FlowControl,
}

impl Default for Serial {
    fn default() -> Self {
        Self {
            data_bits: ::serial::Bits8,
            parity: ::serial::ParityNone,
            stop_bits: ::serial::Stop1,
            flow_control: ::serial::FlowNone,
        }
    }
}

impl Serial {
    /// Whether the address names a serial port rather than a network resource.
    pub fn accepts(address: &str) -> bool {
        SERIAL_ADDRESS.is_match(address.trim())
    }

    /// `ASRL5::INSTR` → `COM5`, `ASRL/dev/ttyUSB0::INSTR` → `/dev/ttyUSB0`, anything else as is.
    pub fn port_name(address: &str) -> Result<String, ProtocolError> {
        if !address.to_ascii_uppercase().starts_with("ASRL") {
            return Ok(address.to_string());
        }
        let port = address[4..]
            .split("::")
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ProtocolError::InvalidAddress(address.to_string()))?;
        if port.chars().all(|c| c.is_ascii_digit()) {
            Ok(format!("COM{}", port))
        } else {
            Ok(port.to_string())
        }
    }

    fn configure<T: SerialPort>(&self, port: &mut T, options: &ConnectOptions) -> ::serial::Result<()> {
        let config = *self;
        port.reconfigure(&|settings| {
            settings.set_baud_rate(::serial::BaudRate::from_speed(options.baud_rate))?;
            settings.set_char_size(config.data_bits);
            settings.set_parity(config.parity);
            settings.set_stop_bits(config.stop_bits);
            settings.set_flow_control(config.flow_control);
            Ok(())
        })?;
        port.set_timeout(options.timeout)
    }
}

impl Protocol for Serial {
    type IO = SystemPort;
    fn open(&self, address: &str, options: &ConnectOptions) -> Result<Self::IO, ProtocolError> {
        let mut port = ::serial::open(&Self::port_name(address)?)?;
        self.configure(&mut port, options)?;
        Ok(port)
    }
}
