use super::{ConnectOptions, Protocol, ProtocolError};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

/// Port most instruments expose for raw SCPI over a socket.
pub const SCPI_RAW_PORT: u16 = 5025;

/// Raw socket SCPI.
#[derive(Default, Clone, Copy)]
pub struct Tcp;

impl Tcp {
    /// Turns `host:port`, a bare host, or a VISA `TCPIP[n]::host::port::SOCKET` or
    /// `TCPIP[n]::host[::device]::INSTR` resource into a host and port. INSTR resources, with
    /// any device name (`inst0`, `hislip0`), go to the raw SCPI port.
    pub fn parse_address(address: &str) -> Result<(String, u16), ProtocolError> {
        let invalid = || ProtocolError::InvalidAddress(address.to_string());
        if address.to_ascii_uppercase().starts_with("TCPIP") {
            let parts: Vec<&str> = address.split("::").collect();
            return match parts.as_slice() {
                [_, host, port, kind] if kind.eq_ignore_ascii_case("SOCKET") => {
                    Ok((host.to_string(), port.parse().map_err(|_| invalid())?))
                }
                [_, host, kind] | [_, host, _, kind]
                    if kind.eq_ignore_ascii_case("INSTR") && !host.is_empty() =>
                {
                    Ok((host.to_string(), SCPI_RAW_PORT))
                }
                _ => Err(invalid()),
            };
        }
        match address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => {
                Ok((host.to_string(), port.parse().map_err(|_| invalid())?))
            }
            Some(_) => Err(invalid()),
            None if !address.is_empty() => Ok((address.to_string(), SCPI_RAW_PORT)),
            None => Err(invalid()),
        }
    }

    fn resolve(address: &str) -> Result<SocketAddr, ProtocolError> {
        let (host, port) = Self::parse_address(address)?;
        (host.as_str(), port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ProtocolError::InvalidAddress(address.to_string()))
    }
}

impl Protocol for Tcp {
    type IO = TcpStream;
    fn open(&self, address: &str, options: &ConnectOptions) -> Result<Self::IO, ProtocolError> {
        let socket = Self::resolve(address)?;
        let stream = TcpStream::connect_timeout(&socket, options.timeout)?;
        stream.set_read_timeout(Some(options.timeout))?;
        stream.set_write_timeout(Some(options.timeout))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visa_socket_resource() {
        assert_eq!(
            Tcp::parse_address("TCPIP0::192.168.0.95::5025::SOCKET").unwrap(),
            ("192.168.0.95".to_string(), 5025)
        );
    }

    #[test]
    fn visa_instr_resource_uses_raw_port() {
        assert_eq!(
            Tcp::parse_address("TCPIP0::192.168.0.95::INSTR").unwrap(),
            ("192.168.0.95".to_string(), SCPI_RAW_PORT)
        );
    }

    #[test]
    fn visa_instr_device_names_use_raw_port() {
        for address in [
            "TCPIP0::192.168.0.95::inst0::INSTR",
            "TCPIP0::192.168.0.95::hislip0::INSTR",
            "TCPIP::192.168.0.95::INSTR",
        ] {
            assert_eq!(
                Tcp::parse_address(address).unwrap(),
                ("192.168.0.95".to_string(), SCPI_RAW_PORT),
                "{}",
                address
            );
        }
        assert!(Tcp::parse_address("TCPIP0::::INSTR").is_err());
    }

    #[test]
    fn host_and_port() {
        assert_eq!(
            Tcp::parse_address("169.254.209.174:5025").unwrap(),
            ("169.254.209.174".to_string(), 5025)
        );
        assert_eq!(Tcp::parse_address("scope.lab").unwrap().1, SCPI_RAW_PORT);
    }

    #[test]
    fn rejects_garbage() {
        assert!(Tcp::parse_address("").is_err());
        assert!(Tcp::parse_address("host:notaport").is_err());
        assert!(Tcp::parse_address("TCPIP0::host::GPIB").is_err());
    }
}
