//! A source-measure unit described entirely by its specification file.
//!
//! Point [`GenericSmu::open_with_spec`] at any file declaring the five [`Smu`] methods to drive
//! an instrument without writing a driver for it.

use std::ops::Deref;

use super::{
    smu::{reading, Smu},
    Driver, Instrument,
};
use crate::{error::Result, value::Kwargs};

pub const DEFAULT_ADDRESS: &str = "TCPIP0::192.168.0.95::INSTR";

pub struct GenericSmu {
    instrument: Instrument,
}

impl Driver for GenericSmu {
    const NAME: &'static str = "generic_smu";
    const SPEC_FILE: Option<&'static str> = Some("generic_smu.yml");
    const SOURCE_DIR: Option<&'static str> =
        Some(concat!(env!("CARGO_MANIFEST_DIR"), "/src/instruments"));
    const SPEC_REQUIRED: &'static [&'static str] = &[
        "source_voltage",
        "source_current",
        "measure_voltage",
        "measure_current",
        "enable_source",
    ];

    fn from_instrument(instrument: Instrument) -> Result<Self> {
        Ok(Self { instrument })
    }
}

impl GenericSmu {
    pub fn open_with_spec(name: &str, address: &str, spec_file: &str) -> Result<Self> {
        Self::from_instrument(Self::builder(name, address).spec_file(spec_file).build()?)
    }

    pub fn into_inner(self) -> Instrument {
        self.instrument
    }
}

impl Deref for GenericSmu {
    type Target = Instrument;
    fn deref(&self) -> &Instrument {
        &self.instrument
    }
}

impl Smu for GenericSmu {
    fn source_voltage(&self, voltage: f64, current_compliance: f64) -> Result<()> {
        self.execute_declared(
            "source_voltage",
            &Kwargs::new()
                .with("voltage", voltage)
                .with("current_compliance", current_compliance),
        )?;
        Ok(())
    }
    fn source_current(&self, current: f64, voltage_compliance: f64) -> Result<()> {
        self.execute_declared(
            "source_current",
            &Kwargs::new()
                .with("current", current)
                .with("voltage_compliance", voltage_compliance),
        )?;
        Ok(())
    }
    fn measure_voltage(&self) -> Result<f64> {
        reading(
            "measure_voltage",
            &self.execute_declared("measure_voltage", &Kwargs::new())?,
        )
    }
    fn measure_current(&self) -> Result<f64> {
        reading(
            "measure_current",
            &self.execute_declared("measure_current", &Kwargs::new())?,
        )
    }
    /// The specification sees `state` as `ON` or `OFF`.
    fn enable_source(&self, enable: bool) -> Result<()> {
        self.execute_declared(
            "enable_source",
            &Kwargs::new().with("state", if enable { "ON" } else { "OFF" }),
        )?;
        Ok(())
    }
}
