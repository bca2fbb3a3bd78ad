//! Vector network analyzers. Frequencies are in Hz.

use crate::{
    error::{Error, Result},
    scpi::{error::ScpiError, split_response},
    value::Value,
};

/// Ports measured when the caller does not pick any: `S12`.
pub const DEFAULT_PORTS: (u8, u8) = (1, 2);

pub trait Vna {
    /// Configures a linear sweep of `num_points` points from `start_freq` to `stop_freq`.
    fn setup_sweep(&self, start_freq: f64, stop_freq: f64, num_points: u32) -> Result<()>;
    /// Measures `S<ports.0><ports.1>` over the configured sweep, e.g. `(2, 1)` for S21.
    fn measure_s_parameters(&self, ports: (u8, u8)) -> Result<SParameterTrace>;
}

/// Complex S-parameter data, one point per stimulus frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct SParameterTrace {
    pub parameter: String,
    pub frequencies: Vec<f64>,
    /// Real and imaginary part.
    pub data: Vec<(f64, f64)>,
}

impl SParameterTrace {
    /// Pairs a comma-separated stimulus list with interleaved `re,im` data.
    pub fn parse(parameter: &str, frequencies: &str, data: &str) -> Result<Self> {
        let frequencies = numbers(parameter, frequencies)?;
        let values = numbers(parameter, data)?;
        if values.len() != 2 * frequencies.len() {
            return Err(malformed(
                parameter,
                format!(
                    "{} frequencies but {} data values",
                    frequencies.len(),
                    values.len()
                ),
            ));
        }
        Ok(Self {
            parameter: parameter.to_string(),
            frequencies,
            data: values.chunks_exact(2).map(|c| (c[0], c[1])).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    pub fn magnitude_db(&self) -> Vec<f64> {
        self.data
            .iter()
            .map(|(re, im)| 20.0 * re.hypot(*im).log10())
            .collect()
    }
}

/// `S21` for `(2, 1)`.
pub fn s_parameter_name(ports: (u8, u8)) -> String {
    format!("S{}{}", ports.0, ports.1)
}

pub fn check_sweep(start_freq: f64, stop_freq: f64, num_points: u32) -> Result<()> {
    if !(start_freq.is_finite() && stop_freq.is_finite()) || start_freq > stop_freq {
        return Err(Error::InvalidState(format!(
            "invalid sweep from {} Hz to {} Hz",
            start_freq, stop_freq
        )));
    }
    if num_points == 0 {
        return Err(Error::InvalidState("a sweep needs at least one point".to_string()));
    }
    Ok(())
}

/// Trace from the result of a declared measurement whose last two responses are the stimulus
/// and the data.
pub fn trace_from(parameter: &str, result: &Value) -> Result<SParameterTrace> {
    match result {
        Value::List(items) if items.len() >= 2 => {
            let n = items.len();
            SParameterTrace::parse(
                parameter,
                &items[n - 2].to_string(),
                &items[n - 1].to_string(),
            )
        }
        other => Err(malformed(
            parameter,
            format!("expected stimulus and data responses, got {}", other),
        )),
    }
}

fn numbers(parameter: &str, response: &str) -> Result<Vec<f64>> {
    split_response(response)
        .iter()
        .map(|field| {
            field
                .parse::<f64>()
                .map_err(|_| malformed(parameter, response.to_string()))
        })
        .collect()
}

fn malformed(parameter: &str, response: String) -> Error {
    Error::Scpi(ScpiError::MalformedResponse {
        command: parameter.to_string(),
        response,
    })
}
