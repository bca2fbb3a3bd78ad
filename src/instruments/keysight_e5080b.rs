//! Keysight E5080B network analyzer, driven entirely by `keysight_e5080b.yml`.

use std::ops::Deref;

use super::{
    vna::{check_sweep, s_parameter_name, trace_from, SParameterTrace, Vna},
    Driver, Instrument,
};
use crate::{error::Result, value::Kwargs};

pub struct KeysightE5080B {
    instrument: Instrument,
}

impl Driver for KeysightE5080B {
    const NAME: &'static str = "keysight_e5080b";
    const SPEC_FILE: Option<&'static str> = Some("keysight_e5080b.yml");
    const SPEC_REQUIRED: &'static [&'static str] = &["setup_sweep", "measure_s_parameters"];

    /// Runs the declared `initialize` method once connected.
    fn from_instrument(instrument: Instrument) -> Result<Self> {
        if instrument.is_connected() && instrument.specification().contains("initialize") {
            instrument.execute_declared("initialize", &Kwargs::new())?;
        }
        Ok(Self { instrument })
    }
}

impl KeysightE5080B {
    pub fn into_inner(self) -> Instrument {
        self.instrument
    }
}

impl Deref for KeysightE5080B {
    type Target = Instrument;
    fn deref(&self) -> &Instrument {
        &self.instrument
    }
}

impl Vna for KeysightE5080B {
    fn setup_sweep(&self, start_freq: f64, stop_freq: f64, num_points: u32) -> Result<()> {
        check_sweep(start_freq, stop_freq, num_points)?;
        self.execute_declared(
            "setup_sweep",
            &Kwargs::new()
                .with("start_freq", start_freq)
                .with("stop_freq", stop_freq)
                .with("num_points", num_points),
        )?;
        Ok(())
    }

    /// The specification sees the parameter as `parameter`, e.g. `S21`.
    fn measure_s_parameters(&self, ports: (u8, u8)) -> Result<SParameterTrace> {
        let parameter = s_parameter_name(ports);
        let result = self.execute_declared(
            "measure_s_parameters",
            &Kwargs::new().with("parameter", parameter.as_str()),
        )?;
        trace_from(&parameter, &result)
    }
}
