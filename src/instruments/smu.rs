//! Source-measure units.

use tracing::warn;

use crate::{
    error::{Error, Result},
    scpi::error::ScpiError,
    value::Value,
};

pub trait Smu {
    fn source_voltage(&self, voltage: f64, current_compliance: f64) -> Result<()>;
    fn source_current(&self, current: f64, voltage_compliance: f64) -> Result<()>;
    /// Measures at the present source setting.
    fn measure_voltage(&self) -> Result<f64>;
    /// Measures at the present source setting.
    fn measure_current(&self) -> Result<f64>;
    fn enable_source(&self, enable: bool) -> Result<()>;
}

/// The number a method returned, taken from the last scalar of its result.
pub fn reading(method: &str, value: &Value) -> Result<f64> {
    value
        .last_scalar()
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            Error::Scpi(ScpiError::MalformedResponse {
                command: method.to_string(),
                response: value.to_string(),
            })
        })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IvPoint {
    pub voltage: f64,
    pub current: f64,
}

/// Sources each voltage in turn and measures the current. The output is switched off
/// afterwards, also when a step fails.
pub fn iv_sweep<S: Smu + ?Sized>(
    smu: &S,
    voltages: &[f64],
    current_compliance: f64,
) -> Result<Vec<IvPoint>> {
    smu.enable_source(true)?;
    let sweep = voltages
        .iter()
        .map(|&voltage| {
            smu.source_voltage(voltage, current_compliance)?;
            Ok(IvPoint {
                voltage,
                current: smu.measure_current()?,
            })
        })
        .collect::<Result<Vec<_>>>();
    if let Err(e) = smu.enable_source(false) {
        warn!("failed to switch off the source after a sweep: {}", e);
    }
    sweep
}

/// `count` evenly spaced values from `start` to `stop`, both included.
pub fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (count - 1) as f64;
            (0..count).map(|i| start + step * i as f64).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Resistor {
        log: RefCell<Vec<String>>,
        voltage: RefCell<f64>,
    }

    impl Smu for Resistor {
        fn source_voltage(&self, voltage: f64, _: f64) -> Result<()> {
            if voltage > 2.0 {
                return Err(Error::InvalidState("over range".into()));
            }
            *self.voltage.borrow_mut() = voltage;
            Ok(())
        }
        fn source_current(&self, _: f64, _: f64) -> Result<()> {
            Ok(())
        }
        fn measure_voltage(&self) -> Result<f64> {
            Ok(*self.voltage.borrow())
        }
        fn measure_current(&self) -> Result<f64> {
            Ok(*self.voltage.borrow() / 100.0)
        }
        fn enable_source(&self, enable: bool) -> Result<()> {
            self.log.borrow_mut().push(format!("output {}", enable));
            Ok(())
        }
    }

    #[test]
    fn sweep_measures_each_point() {
        let smu = Resistor::default();
        let points = iv_sweep(&smu, &linspace(0.0, 1.0, 3), 1e-3).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[2], IvPoint { voltage: 1.0, current: 0.01 });
        assert_eq!(*smu.log.borrow(), vec!["output true", "output false"]);
    }

    #[test]
    fn failed_sweep_still_switches_off() {
        let smu = Resistor::default();
        assert!(iv_sweep(&smu, &[1.0, 3.0], 1e-3).is_err());
        assert_eq!(smu.log.borrow().last().unwrap(), "output false");
    }

    #[test]
    fn reading_takes_the_last_number() {
        let value = Value::List(vec![Value::from("1.0"), Value::from("+2.5E-03")]);
        assert_eq!(reading("read", &value).unwrap(), 2.5e-3);
        assert!(reading("read", &Value::List(vec![])).is_err());
    }

    #[test]
    fn linspace_includes_both_ends() {
        assert_eq!(linspace(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }
}
