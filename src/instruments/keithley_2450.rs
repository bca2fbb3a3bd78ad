//! Keithley 2450 source-measure unit.
//!
//! Sourcing comes from `keithley_2450.yml`; measuring, output control and averaging are
//! native and build their commands through the proxy.

use std::ops::Deref;

use tracing::info;

use super::{
    smu::{reading, Smu},
    Driver, Instrument, NativeMethod,
};
use crate::{
    error::{Error, Result},
    scpi::{no_quote, Scpi},
    value::{Kwargs, Value},
};

pub const DEFAULT_VOLTAGE_COMPLIANCE: f64 = 0.1;
pub const DEFAULT_CURRENT_COMPLIANCE: f64 = 0.1;
pub const DEFAULT_PROBE_CURRENT: f64 = 1e-3;
pub const DEFAULT_PROBE_VOLTAGE: f64 = 1e-3;
pub const AVERAGE_FUNCTIONS: [&str; 3] = ["VOLT", "CURR", "RES"];

pub struct Keithley2450 {
    instrument: Instrument,
}

impl Driver for Keithley2450 {
    const NAME: &'static str = "keithley_2450";
    const SPEC_FILE: Option<&'static str> = Some("keithley_2450.yml");
    const SOURCE_DIR: Option<&'static str> =
        Some(concat!(env!("CARGO_MANIFEST_DIR"), "/src/instruments"));
    const SPEC_REQUIRED: &'static [&'static str] = &["source_voltage", "source_current"];

    fn natives() -> Vec<(&'static str, NativeMethod)> {
        vec![
            ("measure_voltage", native_measure_voltage as NativeMethod),
            ("measure_current", native_measure_current),
            ("enable_source", native_enable_source),
            ("source_resistance", native_source_resistance),
            ("set_average_count", native_set_average_count),
            ("reset", native_reset),
        ]
    }

    /// Runs the declared `initialize` method once connected.
    fn from_instrument(instrument: Instrument) -> Result<Self> {
        if instrument.is_connected() && instrument.specification().contains("initialize") {
            instrument.execute_declared("initialize", &Kwargs::new())?;
        }
        Ok(Self { instrument })
    }
}

impl Deref for Keithley2450 {
    type Target = Instrument;
    fn deref(&self) -> &Instrument {
        &self.instrument
    }
}

impl Keithley2450 {
    pub fn into_inner(self) -> Instrument {
        self.instrument
    }

    pub fn source_resistance(&self, current: f64, voltage_compliance: f64) -> Result<()> {
        source_resistance(self, current, voltage_compliance)
    }

    /// Averages `count` readings of `function` (`VOLT`, `CURR` or `RES`).
    pub fn set_average_count(&self, function: &str, count: i64) -> Result<()> {
        set_average_count(self, function, count)
    }

    pub fn read_measurement(&self) -> Result<f64> {
        read_measurement(self)
    }
}

impl Smu for Keithley2450 {
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
    /// Switches the sense function to voltage and reads at the present source level.
    fn measure_voltage(&self) -> Result<f64> {
        sense(self, "VOLT")?;
        read_measurement(self)
    }
    /// Switches the sense function to current and reads at the present source level.
    fn measure_current(&self) -> Result<f64> {
        sense(self, "CURR")?;
        read_measurement(self)
    }
    fn enable_source(&self, enable: bool) -> Result<()> {
        enable_output(self, enable)
    }
}

fn read_measurement(inst: &Instrument) -> Result<f64> {
    reading(
        "read_measurement",
        &inst.execute_declared("read_measurement", &Kwargs::new())?,
    )
}

fn sense(inst: &Instrument, function: &str) -> Result<()> {
    inst.scpi().attr("sens").attr("func").set(function)
}

fn enable_output(inst: &Instrument, enable: bool) -> Result<()> {
    inst.scpi()
        .attr("output")
        .set(no_quote(if enable { "ON" } else { "OFF" }))
}

fn source_resistance(inst: &Instrument, current: f64, voltage_compliance: f64) -> Result<()> {
    inst.execute_declared(
        "set_resistance",
        &Kwargs::new()
            .with("current", current)
            .with("vlim", voltage_compliance),
    )?;
    Ok(())
}

fn set_average_count(inst: &Instrument, function: &str, count: i64) -> Result<()> {
    let function = function.to_uppercase();
    if !AVERAGE_FUNCTIONS.contains(&function.as_str()) {
        return Err(Error::InvalidState(format!(
            "average function must be one of {:?}, got '{}'",
            AVERAGE_FUNCTIONS, function
        )));
    }
    let average = inst.scpi().attr("sense").attr(&function).attr("average");
    average.attr("count").set(count)?;
    average.attr("state").set(no_quote("ON"))?;
    info!("Set averaging for {} to {} readings.", function, count);
    Ok(())
}

/// Sources `current` (default 1 mA) and reads back the voltage.
fn native_measure_voltage(inst: &Instrument, kwargs: &Kwargs) -> Result<Value> {
    let source = Kwargs::new()
        .with("current", kwargs.f64_or("current", DEFAULT_PROBE_CURRENT))
        .with(
            "voltage_compliance",
            kwargs.f64_or("voltage_compliance", DEFAULT_VOLTAGE_COMPLIANCE),
        );
    inst.execute_declared("source_current", &source)?;
    read_measurement(inst).map(Value::Float)
}

/// Sources `voltage` (default 1 mV) and reads back the current.
fn native_measure_current(inst: &Instrument, kwargs: &Kwargs) -> Result<Value> {
    let source = Kwargs::new()
        .with("voltage", kwargs.f64_or("voltage", DEFAULT_PROBE_VOLTAGE))
        .with(
            "current_compliance",
            kwargs.f64_or("current_compliance", DEFAULT_CURRENT_COMPLIANCE),
        );
    inst.execute_declared("source_voltage", &source)?;
    read_measurement(inst).map(Value::Float)
}

fn native_enable_source(inst: &Instrument, kwargs: &Kwargs) -> Result<Value> {
    let enable = kwargs.bool_or("enable", true);
    enable_output(inst, enable)?;
    Ok(Value::Bool(enable))
}

fn native_source_resistance(inst: &Instrument, kwargs: &Kwargs) -> Result<Value> {
    source_resistance(
        inst,
        kwargs.f64_or("current", 1e-6),
        kwargs.f64_or("voltage_compliance", 1e-3),
    )?;
    Ok(Value::None)
}

fn native_set_average_count(inst: &Instrument, kwargs: &Kwargs) -> Result<Value> {
    set_average_count(
        inst,
        &kwargs.str("set_average_count", "function")?,
        kwargs.i64("set_average_count", "count")?,
    )?;
    Ok(Value::None)
}

fn native_reset(inst: &Instrument, _: &Kwargs) -> Result<Value> {
    inst.reset()?;
    info!("{} reset to default state.", inst.name());
    Ok(Value::None)
}
