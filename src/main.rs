//! `dynscpi`: talk to an instrument from the shell.
//!
//! ```bash
//! dynscpi --address 192.168.0.95 idn
//! dynscpi --address 192.168.0.95 query sour:volt
//! dynscpi --address 192.168.0.95 write outp ON
//! dynscpi --driver keithley2450 --address 192.168.0.95 call measure_current voltage=0.5
//! dynscpi --driver dummy methods
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dynscpi::{
    instruments::{
        dummy::{DummySmu, DUMMY_ADDRESS},
        generic_smu::GenericSmu,
        keithley_2450::Keithley2450,
        keysight_e5080b::KeysightE5080B,
        Driver, Instrument, InstrumentBuilder,
    },
    protocols::{default_transport, Serial, StreamTransport, Tcp, Transport},
    scpi::{Arg, CommandProxy, Scpi, Q},
    Kwargs, Value,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dynscpi", version, about = "Send SCPI commands and run declared instrument methods")]
struct Args {
    /// Instrument address, e.g. `192.168.0.95`, `TCPIP0::host::INSTR` or `COM5`
    #[arg(short, long, default_value = DUMMY_ADDRESS)]
    address: String,

    #[arg(short, long, default_value = "instrument")]
    name: String,

    /// Driver to open the instrument with; without one only the specification is used
    #[arg(short, long, value_enum)]
    driver: Option<DriverKind>,

    /// Specification file, overriding the driver's
    #[arg(short, long, value_name = "FILE")]
    spec: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = TransportKind::Auto)]
    transport: TransportKind,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DriverKind {
    Keithley2450,
    GenericSmu,
    KeysightE5080b,
    Dummy,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportKind {
    /// Serial for `COM*`, `ASRL*` and `/dev/*` addresses, TCP otherwise
    Auto,
    Tcp,
    Serial,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query a command path, e.g. `query sour:volt` or `query sens:func 'VOLT'`
    Query { path: String, args: Vec<String> },
    /// Write to a command path, e.g. `write outp ON`
    Write {
        path: String,
        #[arg(required = true)]
        args: Vec<String>,
    },
    /// Call a native or declared method with `key=value` arguments
    Call {
        method: String,
        #[arg(value_name = "KEY=VALUE")]
        params: Vec<String>,
    },
    /// List the methods the instrument answers to
    Methods,
    /// Print the identification string
    Idn,
}

enum Opened {
    Keithley(Keithley2450),
    Generic(GenericSmu),
    Vna(KeysightE5080B),
    Dummy(DummySmu),
    Plain(Instrument),
}

impl Opened {
    fn instrument(&self) -> &Instrument {
        match self {
            Opened::Keithley(d) => &**d,
            Opened::Generic(d) => &**d,
            Opened::Vna(d) => &**d,
            Opened::Dummy(d) => &**d,
            Opened::Plain(i) => i,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let opened = open(&args)?;
    let inst = opened.instrument();
    if !inst.is_connected() {
        bail!("could not connect to '{}' at {}", inst.name(), inst.address());
    }
    run(inst, &args.command)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn transport(kind: TransportKind, address: &str) -> Box<dyn Transport> {
    match kind {
        TransportKind::Auto => default_transport(address),
        TransportKind::Tcp => Box::new(StreamTransport::new(Tcp)),
        TransportKind::Serial => Box::new(StreamTransport::new(Serial::default())),
    }
}

fn configure(builder: InstrumentBuilder, args: &Args) -> Result<InstrumentBuilder> {
    let mut builder = builder.transport(transport(args.transport, &args.address));
    if let Some(spec) = &args.spec {
        let file = spec
            .to_str()
            .with_context(|| format!("specification path {} is not UTF-8", spec.display()))?;
        builder = builder.spec_file(file);
    }
    Ok(builder)
}

fn open_with<D: Driver>(args: &Args) -> Result<D> {
    let builder = configure(D::builder(&args.name, &args.address), args)?;
    Ok(D::from_instrument(builder.build()?)?)
}

fn open(args: &Args) -> Result<Opened> {
    Ok(match args.driver {
        Some(DriverKind::Keithley2450) => Opened::Keithley(open_with(args)?),
        Some(DriverKind::GenericSmu) => Opened::Generic(open_with(args)?),
        Some(DriverKind::KeysightE5080b) => Opened::Vna(open_with(args)?),
        Some(DriverKind::Dummy) => Opened::Dummy(DummySmu::open(&args.name, &args.address)?),
        None if args.address == DUMMY_ADDRESS => {
            Opened::Dummy(DummySmu::open(&args.name, &args.address)?)
        }
        None => Opened::Plain(
            configure(Instrument::builder(&args.name, &args.address), args)?.build()?,
        ),
    })
}

/// Numbers stay numbers, `'text'` is sent quoted, anything else bare.
fn parse_arg(text: &str) -> Arg {
    match Value::parse_literal(text) {
        Value::Int(i) => Arg::Int(i),
        Value::Float(f) => Arg::Float(f),
        _ if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') => {
            Arg::Str(text[1..text.len() - 1].to_string())
        }
        _ => Arg::Unquoted(text.to_string()),
    }
}

fn parse_params(params: &[String]) -> Result<Kwargs> {
    params
        .iter()
        .map(|p| match p.split_once('=') {
            Some((key, value)) => Ok((key.trim().to_string(), Value::parse_literal(value))),
            None => bail!("expected KEY=VALUE, got '{}'", p),
        })
        .collect()
}

/// `sour:volt` and `sour.volt` are both `SOUR:VOLT`.
fn command_path<'a>(inst: &'a Instrument, path: &str) -> CommandProxy<'a> {
    path.split(|c| c == ':' || c == '.')
        .filter(|s| !s.is_empty())
        .fold(inst.scpi(), |proxy, segment| proxy.attr(segment))
}

fn run(inst: &Instrument, command: &Command) -> Result<()> {
    match command {
        Command::Query { path, args } => {
            let proxy = command_path(inst, path);
            let mut call_args = vec![Q];
            call_args.extend(args.iter().map(|a| parse_arg(a)));
            if let Some(response) = proxy.call(&call_args)? {
                println!("{}", response);
            }
        }
        Command::Write { path, args } => {
            let proxy = command_path(inst, path);
            let call_args: Vec<Arg> = args.iter().map(|a| parse_arg(a)).collect();
            proxy.call(&call_args)?;
        }
        Command::Call { method, params } => {
            let value = inst
                .call(method, &parse_params(params)?)
                .with_context(|| format!("calling '{}' on {}", method, inst.name()))?;
            if !value.is_none() {
                println!("{}", value);
            }
        }
        Command::Methods => {
            let methods = inst.available_methods();
            for name in &methods.all {
                let origin = if methods.native.contains(name) {
                    "native"
                } else {
                    "declared"
                };
                println!("{:<24} {}", name, origin);
            }
        }
        Command::Idn => {
            let idn = inst.idn()?;
            println!("{} {} (serial {}, firmware {})", idn.vendor, idn.model, idn.serial, idn.firmware);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_arguments_keep_their_kind() {
        assert_eq!(parse_arg("5"), Arg::Int(5));
        assert_eq!(parse_arg("1e-3"), Arg::Float(1e-3));
        assert_eq!(parse_arg("'VOLT'"), Arg::Str("VOLT".into()));
        assert_eq!(parse_arg("ON"), Arg::Unquoted("ON".into()));
    }

    #[test]
    fn params_need_an_equals_sign() {
        let kwargs = parse_params(&["level=2".to_string()]).unwrap();
        assert_eq!(kwargs.get("level"), Some(&Value::Int(2)));
        assert!(parse_params(&["level".to_string()]).is_err());
    }

    #[test]
    fn cli_parses() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
