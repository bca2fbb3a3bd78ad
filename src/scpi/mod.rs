pub mod error;
pub mod proxy;

pub use self::proxy::{no_quote, Arg, CommandProxy, Q};

use self::error::ScpiError;
use crate::error::Result;

/// IEEE 488.2 common queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommonQuery {
    ///Identification query
    Idn,
    ///Operation complete query
    Opc,
    ///Event status enable query
    Ese,
    ///Event status register query
    Esr,
    ///Service request enable query
    Sre,
    ///Read status byte query
    Stb,
}

impl CommonQuery {
    pub fn as_str(self) -> &'static str {
        match self {
            CommonQuery::Idn => "*IDN?",
            CommonQuery::Opc => "*OPC?",
            CommonQuery::Ese => "*ESE?",
            CommonQuery::Esr => "*ESR?",
            CommonQuery::Sre => "*SRE?",
            CommonQuery::Stb => "*STB?",
        }
    }
}

/// IEEE 488.2 common commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommonCommand {
    ///Reset
    Rst,
    ///Wait to complete
    Wai,
    ///Clear status
    Cls,
    ///Event status enable
    Ese,
    ///Service request enable
    Sre,
}

impl CommonCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            CommonCommand::Rst => "*RST",
            CommonCommand::Wai => "*WAI",
            CommonCommand::Cls => "*CLS",
            CommonCommand::Ese => "*ESE",
            CommonCommand::Sre => "*SRE",
        }
    }
}

/// Splits a comma separated response into trimmed fields. This is the only response parsing
/// the crate does.
pub fn split_response(response: &str) -> Vec<String> {
    if response.trim().is_empty() {
        return Vec::new();
    }
    response.split(',').map(|f| f.trim().to_string()).collect()
}

/// Parsed `*IDN?` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Idn {
    pub vendor: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,
}

impl Idn {
    pub fn parse(response: &str) -> std::result::Result<Self, ScpiError> {
        match split_response(response).as_slice() {
            [vendor, model, serial, firmware, ..] => Ok(Idn {
                vendor: vendor.clone(),
                model: model.clone(),
                serial: serial.clone(),
                firmware: firmware.clone(),
            }),
            _ => Err(ScpiError::MalformedResponse {
                command: CommonQuery::Idn.as_str().to_string(),
                response: response.to_string(),
            }),
        }
    }
}

fn parse_register(query: CommonQuery, response: &str) -> std::result::Result<u8, ScpiError> {
    response
        .trim()
        .trim_start_matches('+')
        .parse::<u8>()
        .map_err(|_| ScpiError::MalformedResponse {
            command: query.as_str().to_string(),
            response: response.to_string(),
        })
}

/// Common commands every SCPI instrument understands.
pub trait Scpi {
    fn scpi_write(&self, command: &str) -> Result<()>;
    fn scpi_query(&self, command: &str) -> Result<String>;

    fn idn(&self) -> Result<Idn> {
        let response = self.scpi_query(CommonQuery::Idn.as_str())?;
        Ok(Idn::parse(&response)?)
    }
    fn reset(&self) -> Result<()> {
        self.scpi_write(CommonCommand::Rst.as_str())
    }
    fn clear_status(&self) -> Result<()> {
        self.scpi_write(CommonCommand::Cls.as_str())
    }
    fn wait_for_op_complete(&self) -> Result<()> {
        self.scpi_write(CommonCommand::Wai.as_str())
    }
    fn status_byte(&self) -> Result<StatusByte> {
        let response = self.scpi_query(CommonQuery::Stb.as_str())?;
        Ok(StatusByte::new(parse_register(CommonQuery::Stb, &response)?))
    }
    fn event_status(&self) -> Result<EventStatusByte> {
        let response = self.scpi_query(CommonQuery::Esr.as_str())?;
        Ok(EventStatusByte::new(parse_register(CommonQuery::Esr, &response)?))
    }
    /// Reads (and thereby clears) the event status register and reports the first error bit.
    fn check_event_status(&self) -> Result<()> {
        Ok(self.event_status()?.to_result()?)
    }
    fn set_event_mask(&self, byte: EventStatusByte) -> Result<()> {
        self.scpi_write(&format!("{} {}", CommonCommand::Ese.as_str(), byte.byte()))
    }
    fn set_service_mask(&self, byte: StatusByte) -> Result<()> {
        self.scpi_write(&format!("{} {}", CommonCommand::Sre.as_str(), byte.byte()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusByte(u8);
impl StatusByte {
    pub fn new(b: u8) -> Self {
        Self(b)
    }
    pub fn byte(&self) -> u8 {
        self.0
    }

    pub fn is_error_queued(&self) -> bool {
        self.0 & (1 << 2) != 0
    }
    pub fn is_message_available(&self) -> bool {
        self.0 & (1 << 4) != 0
    }
    pub fn message_available(&mut self) -> &mut Self {
        self.0 |= 1 << 4;
        self
    }
    pub fn is_event_happened(&self) -> bool {
        self.0 & (1 << 5) != 0
    }
    pub fn event_happened(&mut self) -> &mut Self {
        self.0 |= 1 << 5;
        self
    }
    pub fn is_requesting_service(&self) -> bool {
        self.0 & (1 << 6) != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventStatusByte(u8);
impl EventStatusByte {
    pub fn new(b: u8) -> Self {
        Self(b)
    }
    pub fn byte(&self) -> u8 {
        self.0
    }
    pub fn is_command_err(&self) -> bool {
        self.0 & (1 << 5) != 0
    }
    pub fn command_err(&mut self) -> &mut Self {
        self.0 |= 1 << 5;
        self
    }
    pub fn is_execution_err(&self) -> bool {
        self.0 & (1 << 4) != 0
    }
    pub fn execution_err(&mut self) -> &mut Self {
        self.0 |= 1 << 4;
        self
    }
    pub fn is_device_dep_err(&self) -> bool {
        self.0 & (1 << 3) != 0
    }
    pub fn device_dep_err(&mut self) -> &mut Self {
        self.0 |= 1 << 3;
        self
    }
    pub fn is_query_err(&self) -> bool {
        self.0 & (1 << 2) != 0
    }
    pub fn query_err(&mut self) -> &mut Self {
        self.0 |= 1 << 2;
        self
    }
    pub fn is_opera_complete(&self) -> bool {
        self.0 & (1 << 0) != 0
    }
    pub fn opera_complete(&mut self) -> &mut Self {
        self.0 |= 1 << 0;
        self
    }

    pub fn to_result(self) -> std::result::Result<(), ScpiError> {
        if self.is_command_err() {
            Err(ScpiError::CommandError)
        } else if self.is_execution_err() {
            Err(ScpiError::ExecutionError)
        } else if self.is_device_dep_err() {
            Err(ScpiError::DevDependError)
        } else if self.is_query_err() {
            Err(ScpiError::QueryError)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idn_fields() {
        let idn = Idn::parse("KEITHLEY INSTRUMENTS,MODEL 2450,04096331,1.7.12b\n").unwrap();
        assert_eq!(idn.vendor, "KEITHLEY INSTRUMENTS");
        assert_eq!(idn.model, "MODEL 2450");
        assert_eq!(idn.firmware, "1.7.12b");
        assert!(Idn::parse("DUMMY").is_err());
    }

    #[test]
    fn event_status_maps_to_first_error() {
        let mut esr = EventStatusByte::default();
        assert_eq!(esr.opera_complete().to_result(), Ok(()));
        assert_eq!(esr.query_err().to_result(), Err(ScpiError::QueryError));
        assert_eq!(esr.command_err().to_result(), Err(ScpiError::CommandError));
    }

    #[test]
    fn status_bits() {
        let stb = StatusByte::new(0b0101_0000);
        assert!(stb.is_message_available());
        assert!(stb.is_requesting_service());
        assert!(!stb.is_event_happened());
    }

    #[test]
    fn splits_on_commas() {
        assert_eq!(split_response("1.0, 2.0,3"), vec!["1.0", "2.0", "3"]);
        assert!(split_response("  ").is_empty());
    }

    #[test]
    fn registers_accept_a_sign() {
        assert_eq!(parse_register(CommonQuery::Esr, "+32\n").unwrap(), 32);
        assert!(parse_register(CommonQuery::Esr, "abc").is_err());
    }
}
