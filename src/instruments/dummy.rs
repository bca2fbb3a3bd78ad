//! Stand-ins for hardware, for development without an instrument attached.
//!
//! [`DummySmu`] runs on a [`MockTransport`]: sourcing only logs, measurements are uniform
//! random numbers in `[0, 1)`. [`DummyStage`] keeps its axes in memory.

use std::{cell::RefCell, collections::BTreeMap, ops::Deref};

use rand::Rng;
use tracing::info;

use super::{
    motor_stage::MotorStage,
    smu::{reading, Smu},
    Driver, Instrument, InstrumentBuilder, NativeMethod,
};
use crate::{
    error::{Error, Result},
    protocols::{MockHandle, MockTransport},
    value::{Kwargs, Value},
};

pub const DUMMY_ADDRESS: &str = "DUMMY";

pub struct DummySmu {
    instrument: Instrument,
    handle: Option<MockHandle>,
}

impl Driver for DummySmu {
    const NAME: &'static str = "dummy";

    fn natives() -> Vec<(&'static str, NativeMethod)> {
        vec![
            ("source_voltage", native_source_voltage as NativeMethod),
            ("source_current", native_source_current),
            ("measure_voltage", native_measure),
            ("measure_current", native_measure),
            ("enable_source", native_enable_source),
        ]
    }

    fn from_instrument(instrument: Instrument) -> Result<Self> {
        Ok(Self {
            instrument,
            handle: None,
        })
    }

    /// Always on a fresh [`MockTransport`], whatever the address says.
    fn builder(name: &str, address: &str) -> InstrumentBuilder {
        InstrumentBuilder::new(name, address)
            .driver::<Self>()
            .transport(MockTransport::new())
    }

    fn open(name: &str, address: &str) -> Result<Self> {
        Self::with_address(name, address)
    }
}

impl DummySmu {
    pub fn new(name: &str) -> Result<Self> {
        Self::with_address(name, DUMMY_ADDRESS)
    }

    fn with_address(name: &str, address: &str) -> Result<Self> {
        let transport = MockTransport::new();
        let handle = transport.handle();
        handle.always("*IDN?", "KLAB,DUMMY SMU,0,0.1");
        let instrument = InstrumentBuilder::new(name, address)
            .driver::<Self>()
            .transport(transport)
            .build()?;
        Ok(Self {
            instrument,
            handle: Some(handle),
        })
    }

    /// The mock behind the instrument, for scripting responses of proxied commands. Only
    /// known when the driver opened the instrument itself.
    pub fn mock(&self) -> Option<&MockHandle> {
        self.handle.as_ref()
    }
}

impl Deref for DummySmu {
    type Target = Instrument;
    fn deref(&self) -> &Instrument {
        &self.instrument
    }
}

impl Smu for DummySmu {
    fn source_voltage(&self, voltage: f64, current_compliance: f64) -> Result<()> {
        self.call(
            "source_voltage",
            &Kwargs::new()
                .with("voltage", voltage)
                .with("current_compliance", current_compliance),
        )?;
        Ok(())
    }
    fn source_current(&self, current: f64, voltage_compliance: f64) -> Result<()> {
        self.call(
            "source_current",
            &Kwargs::new()
                .with("current", current)
                .with("voltage_compliance", voltage_compliance),
        )?;
        Ok(())
    }
    fn measure_voltage(&self) -> Result<f64> {
        reading("measure_voltage", &self.call("measure_voltage", &Kwargs::new())?)
    }
    fn measure_current(&self) -> Result<f64> {
        reading("measure_current", &self.call("measure_current", &Kwargs::new())?)
    }
    fn enable_source(&self, enable: bool) -> Result<()> {
        self.call("enable_source", &Kwargs::new().with("enable", enable))?;
        Ok(())
    }
}

fn native_source_voltage(inst: &Instrument, kwargs: &Kwargs) -> Result<Value> {
    let voltage = kwargs.f64("source_voltage", "voltage")?;
    let compliance = kwargs.f64("source_voltage", "current_compliance")?;
    info!("{}: source_voltage {} V, compliance {} A", inst.name(), voltage, compliance);
    Ok(Value::None)
}

fn native_source_current(inst: &Instrument, kwargs: &Kwargs) -> Result<Value> {
    let current = kwargs.f64("source_current", "current")?;
    let compliance = kwargs.f64("source_current", "voltage_compliance")?;
    info!("{}: source_current {} A, compliance {} V", inst.name(), current, compliance);
    Ok(Value::None)
}

fn native_measure(_: &Instrument, _: &Kwargs) -> Result<Value> {
    Ok(Value::Float(rand::thread_rng().gen_range(0.0..1.0)))
}

fn native_enable_source(inst: &Instrument, kwargs: &Kwargs) -> Result<Value> {
    let enable = kwargs.bool_or("enable", true);
    info!("{}: enable_source {}", inst.name(), enable);
    Ok(Value::Bool(enable))
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Axis {
    position: f64,
    speed: f64,
}

/// In-memory stage with a fixed number of axes.
#[derive(Debug)]
pub struct DummyStage {
    name: String,
    axes: RefCell<BTreeMap<usize, Axis>>,
    count: usize,
}

impl DummyStage {
    pub fn new(name: &str, count: usize) -> Self {
        Self {
            name: name.to_string(),
            axes: RefCell::new((0..count).map(|i| (i, Axis::default())).collect()),
            count,
        }
    }

    pub fn speed(&self, axis: usize) -> Result<f64> {
        self.with_axis(axis, |a| a.speed)
    }

    fn with_axis<T>(&self, axis: usize, f: impl FnOnce(&mut Axis) -> T) -> Result<T> {
        let mut axes = self
            .axes
            .try_borrow_mut()
            .map_err(|_| Error::InvalidState(format!("axes of '{}' are in use", self.name)))?;
        match axes.get_mut(&axis) {
            Some(a) => Ok(f(a)),
            None => Err(Error::InvalidState(format!(
                "'{}' has {} axes, no axis {}",
                self.name, self.count, axis
            ))),
        }
    }
}

impl MotorStage for DummyStage {
    fn get_position(&self, axis: usize) -> Result<f64> {
        self.with_axis(axis, |a| a.position)
    }
    fn move_to(&self, position: f64, axis: usize) -> Result<()> {
        info!("{}: axis {} to {}", self.name, axis, position);
        self.with_axis(axis, |a| a.position = position)
    }
    fn set_speed(&self, speed: f64, axis: usize) -> Result<()> {
        self.with_axis(axis, |a| a.speed = speed)
    }
    fn stop(&self, axis: usize) -> Result<()> {
        self.with_axis(axis, |_| ())
    }
    fn home(&self, axis: usize) -> Result<()> {
        self.move_to(0.0, axis)
    }
}
