//! Dynamic SCPI command construction and declarative method dispatch.
//!
//! An [`Instrument`] owns a [`protocols::Transport`] and a [`spec::Specification`] loaded
//! from a YAML file. Methods are resolved by name: natively implemented by a driver,
//! declared as a command sequence in the specification, or built on the fly as a command
//! path:
//!
//! ```no_run
//! use dynscpi::{instruments::{keithley_2450::Keithley2450, Driver, smu::Smu}, scpi::no_quote};
//!
//! # fn main() -> dynscpi::Result<()> {
//! let smu = Keithley2450::open("smu", "TCPIP0::192.168.0.95::INSTR")?;
//! smu.source_voltage(1.0, 1e-3)?;
//! smu.scpi().attr("outp").set(no_quote("ON"))?;
//! let current = smu.measure_current()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod instruments;
pub mod protocols;
pub mod scpi;
pub mod spec;
pub mod value;

pub use self::{
    config::Settings,
    error::{Error, Result},
    instruments::{Driver, Instrument, InstrumentBuilder},
    value::{Kwargs, Value},
};
