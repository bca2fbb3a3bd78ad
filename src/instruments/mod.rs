//! Instruments: a named, addressed [`Transport`] plus the [`Specification`] of its declared
//! methods.
//!
//! An operation on an instrument can be defined three ways:
//!
//! 1. natively, as a Rust function registered by the driver,
//! 2. declaratively, as a command sequence in the driver's specification file,
//! 3. ad hoc, by building a command path through [`Instrument::scpi`].
//!
//! [`Instrument::resolve`] decides between them by name.

use std::{
    cell::{Cell, RefCell, RefMut},
    collections::BTreeMap,
    path::PathBuf,
    thread,
    time::Duration,
};

use tracing::{debug, info, trace, warn};

use crate::{
    config::Settings,
    error::{Error, Result},
    protocols::{default_transport, ConnectOptions, Transport},
    scpi::{CommandProxy, CommonQuery, Scpi},
    spec::{SpecLoader, Specification},
    value::{Kwargs, Value},
};

pub mod dispatch;
pub mod dummy;
pub mod executor;
pub mod generic_smu;
pub mod keithley_2450;
pub mod keysight_e5080b;
pub mod motor_stage;
pub mod smu;
pub mod vna;

pub use self::dispatch::{AvailableMethods, DeclaredCall, NativeCall, Resolved};

/// A natively implemented method reachable by name.
pub type NativeMethod = fn(&Instrument, &Kwargs) -> Result<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Constructed,
    Connecting,
    Connected,
    Failed,
    Disconnected,
}

/// Bounded retry of queries that fail transiently.
///
/// Input already buffered by the transport is dropped before a query is resent. A reply to the
/// failed attempt that arrives after that can still be taken for the answer to the next one,
/// so keep the transport timeout above the slowest expected response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
    /// Poll `*OPC?` before each query; a reply other than `1` uses up an attempt.
    pub opc_gate: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for RetryPolicy {
    fn from(settings: &Settings) -> Self {
        Self {
            attempts: settings.query_retries.max(1),
            delay: settings.retry_delay(),
            opc_gate: settings.opc_gate,
        }
    }
}

/// A driver type: what its instruments load and what they must find in the specification.
pub trait Driver: Sized {
    const NAME: &'static str;
    const SPEC_FILE: Option<&'static str> = None;
    /// Directory of the driver's own files, searched before the shared specification dirs.
    const SOURCE_DIR: Option<&'static str> = None;
    /// Methods that exist only as specification entries; construction fails without them.
    const SPEC_REQUIRED: &'static [&'static str] = &[];

    fn natives() -> Vec<(&'static str, NativeMethod)> {
        Vec::new()
    }

    fn from_instrument(instrument: Instrument) -> Result<Self>;

    fn builder(name: &str, address: &str) -> InstrumentBuilder {
        InstrumentBuilder::new(name, address).driver::<Self>()
    }

    fn open(name: &str, address: &str) -> Result<Self> {
        Self::from_instrument(Self::builder(name, address).build()?)
    }
}

pub struct InstrumentBuilder {
    name: String,
    address: String,
    transport: Option<Box<dyn Transport>>,
    spec_file: Option<String>,
    specification: Option<Specification>,
    driver_dir: Option<PathBuf>,
    required: Vec<String>,
    natives: BTreeMap<String, NativeMethod>,
    connect: bool,
    options: Option<ConnectOptions>,
    settings: Option<Settings>,
}

impl InstrumentBuilder {
    pub fn new(name: &str, address: &str) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            transport: None,
            spec_file: None,
            specification: None,
            driver_dir: None,
            required: Vec::new(),
            natives: BTreeMap::new(),
            connect: true,
            options: None,
            settings: None,
        }
    }

    pub fn driver<D: Driver>(mut self) -> Self {
        if let Some(file) = D::SPEC_FILE {
            self.spec_file = Some(file.to_string());
        }
        if let Some(dir) = D::SOURCE_DIR {
            self.driver_dir = Some(PathBuf::from(dir));
        }
        self.required
            .extend(D::SPEC_REQUIRED.iter().map(|s| s.to_string()));
        for (name, method) in D::natives() {
            self.natives.insert(name.to_string(), method);
        }
        self
    }

    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    pub fn spec_file(mut self, file: &str) -> Self {
        self.spec_file = Some(file.to_string());
        self
    }

    /// Uses an already loaded specification instead of a file.
    pub fn specification(mut self, specification: Specification) -> Self {
        self.specification = Some(specification);
        self
    }

    pub fn driver_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.driver_dir = Some(dir.into());
        self
    }

    pub fn require(mut self, methods: &[&str]) -> Self {
        self.required.extend(methods.iter().map(|s| s.to_string()));
        self
    }

    pub fn native(mut self, name: &str, method: NativeMethod) -> Self {
        self.natives.insert(name.to_string(), method);
        self
    }

    /// Skip connecting during construction.
    pub fn connect(mut self, connect: bool) -> Self {
        self.connect = connect;
        self
    }

    pub fn options(mut self, options: ConnectOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Loads and validates the specification, then connects unless told not to.
    ///
    /// Unparsable settings, a missing specification file or missing specification-required
    /// methods fail the build. A failed connection does not: the instrument is returned in the
    /// [`ConnectionState::Failed`] state and refuses I/O.
    pub fn build(self) -> Result<Instrument> {
        let settings = match self.settings {
            Some(settings) => settings,
            None => Settings::load()?,
        };
        let loader = SpecLoader::new().with_shared_dirs(settings.spec_dirs.clone());
        let spec = match (self.specification, &self.spec_file) {
            (Some(spec), _) => spec,
            (None, Some(file)) => loader.load(file, self.driver_dir.as_deref())?,
            (None, None) => Specification::empty(),
        };
        let required: Vec<&str> = self.required.iter().map(String::as_str).collect();
        validate_required(&spec, self.spec_file.as_deref(), &required)?;

        if !spec.is_empty() {
            info!(
                instrument = %self.name,
                "specification methods: {}",
                spec.names().collect::<Vec<_>>().join(", ")
            );
        }

        let options = self.options.unwrap_or_else(|| ConnectOptions {
            timeout: settings.timeout(),
            ..ConnectOptions::default()
        });
        let transport = self
            .transport
            .unwrap_or_else(|| default_transport(&self.address));
        let instrument = Instrument {
            name: self.name,
            address: self.address,
            transport: RefCell::new(transport),
            spec,
            spec_file: self.spec_file,
            driver_dir: self.driver_dir,
            required: self.required,
            natives: self.natives,
            state: Cell::new(ConnectionState::Constructed),
            retry: RetryPolicy::from(&settings),
            debug_stream: settings.debug_stream,
            options,
            loader,
            depth: Cell::new(0),
        };
        if self.connect {
            if let Err(e) = instrument.connect() {
                warn!(instrument = %instrument.name, "{}", e);
            }
        }
        Ok(instrument)
    }
}

fn validate_required(spec: &Specification, file: Option<&str>, required: &[&str]) -> Result<()> {
    let missing = spec.missing(required);
    if missing.is_empty() {
        return Ok(());
    }
    Err(Error::MissingSpecImplementation {
        file: file.unwrap_or("<none>").to_string(),
        missing: missing.into_iter().map(str::to_string).collect(),
    })
}

/// A connected (or connectable) instrument. Owns its transport and disconnects on drop.
///
/// All I/O takes `&self`; an instrument serves one caller at a time and is meant to live on
/// the thread that uses it.
pub struct Instrument {
    name: String,
    address: String,
    transport: RefCell<Box<dyn Transport>>,
    spec: Specification,
    spec_file: Option<String>,
    driver_dir: Option<PathBuf>,
    required: Vec<String>,
    natives: BTreeMap<String, NativeMethod>,
    state: Cell<ConnectionState>,
    retry: RetryPolicy,
    debug_stream: bool,
    options: ConnectOptions,
    loader: SpecLoader,
    pub(crate) depth: Cell<usize>,
}

impl Instrument {
    pub fn builder(name: &str, address: &str) -> InstrumentBuilder {
        InstrumentBuilder::new(name, address)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn specification(&self) -> &Specification {
        &self.spec
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn set_retry_policy(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    pub(crate) fn native(&self, name: &str) -> Option<NativeMethod> {
        self.natives.get(name).copied()
    }

    pub(crate) fn native_names(&self) -> impl Iterator<Item = &str> {
        self.natives.keys().map(String::as_str)
    }

    fn transport(&self) -> Result<RefMut<'_, Box<dyn Transport>>> {
        self.transport
            .try_borrow_mut()
            .map_err(|_| Error::InvalidState(format!("transport of '{}' is already in use", self.name)))
    }

    fn stream(&self, direction: &str, text: &str) {
        if self.debug_stream {
            info!(target: "dynscpi::stream", "[{}] > {}: {:?}", self.name, direction, text);
        } else {
            trace!(target: "dynscpi::stream", "[{}] > {}: {:?}", self.name, direction, text);
        }
    }

    pub fn connect(&self) -> Result<()> {
        self.state.set(ConnectionState::Connecting);
        let result = self.transport()?.connect(&self.address, &self.options);
        match result {
            Ok(true) => {
                self.state.set(ConnectionState::Connected);
                info!("Connected to {} at {}", self.name, self.address);
                Ok(())
            }
            Ok(false) => {
                self.state.set(ConnectionState::Failed);
                Err(Error::ConnectionFailed {
                    address: self.address.clone(),
                    reason: "transport refused the connection".to_string(),
                })
            }
            Err(e) => {
                self.state.set(ConnectionState::Failed);
                Err(Error::ConnectionFailed {
                    address: self.address.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Safe to call repeatedly and on instruments that never connected.
    pub fn disconnect(&self) -> Result<()> {
        let was_connected = self.state.get() == ConnectionState::Connected;
        self.transport()?.disconnect()?;
        if was_connected {
            self.state.set(ConnectionState::Disconnected);
            info!("Disconnected from {}", self.name);
        }
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        self.disconnect()
    }

    pub fn is_connected(&self) -> bool {
        self.state.get() == ConnectionState::Connected
            && self.transport.try_borrow().map_or(true, |t| t.is_connected())
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected(self.name.clone()))
        }
    }

    /// Best effort: transport failures are logged and dropped, but writing to a disconnected
    /// instrument is an error.
    pub fn write(&self, command: &str) -> Result<()> {
        self.ensure_connected()?;
        self.stream("WRITE", command);
        match self.transport()?.write(command) {
            Err(Error::NotConnected(_)) => Err(Error::NotConnected(self.name.clone())),
            Err(e) => {
                warn!("Failed to write to {}: {}", self.name, e);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    pub fn read(&self) -> Result<String> {
        self.ensure_connected()?;
        self.stream("READ", "");
        let response = self.transport()?.read()?;
        self.stream("RECV", &response);
        Ok(response)
    }

    /// Sends `command` and returns the trimmed response, retrying transient failures per the
    /// [`RetryPolicy`]. Exhausted retries end in [`Error::ConnectionError`].
    pub fn query(&self, command: &str) -> Result<String> {
        self.ensure_connected()?;
        self.stream("QUERY", command);
        let attempts = self.retry.attempts.max(1);
        for attempt in 1..=attempts {
            match self.query_once(command) {
                Ok(Some(response)) => {
                    self.stream("RECV", &response);
                    return Ok(response.trim().to_string());
                }
                Ok(None) => debug!("{} not ready for '{}' ({}/{})", self.name, command, attempt, attempts),
                Err(e) if e.is_transient() => {
                    warn!("I/O error during query of {}: {} (attempt {}/{})", self.name, e, attempt, attempts);
                    if let Err(e) = self.transport().and_then(|mut t| t.discard_input()) {
                        debug!("could not discard stale input of {}: {}", self.name, e);
                    }
                }
                Err(e) => return Err(e),
            }
            if attempt < attempts {
                thread::sleep(self.retry.delay);
            }
        }
        Err(Error::ConnectionError {
            command: command.to_string(),
            attempts,
        })
    }

    fn query_once(&self, command: &str) -> Result<Option<String>> {
        let mut transport = self.transport()?;
        if self.retry.opc_gate {
            let opc = transport.query(CommonQuery::Opc.as_str())?;
            if opc.trim().parse::<i64>().ok() != Some(1) {
                return Ok(None);
            }
        }
        transport.query(command).map(Some)
    }

    pub fn wait(&self, duration: Duration) {
        self.stream("WAIT", &format!("{:?}", duration));
        thread::sleep(duration);
    }

    /// Root of an ad-hoc command path.
    pub fn scpi(&self) -> CommandProxy<'_> {
        CommandProxy::new(self, Vec::new())
    }

    /// Re-reads the specification file and checks the required methods again. Needs exclusive
    /// access, so no resolved method or proxy outlives the old specification.
    pub fn reload_specification(&mut self) -> Result<()> {
        let file = match &self.spec_file {
            Some(file) => file.clone(),
            None => return Ok(()),
        };
        let spec = self.loader.load(&file, self.driver_dir.as_deref())?;
        let required: Vec<&str> = self.required.iter().map(String::as_str).collect();
        validate_required(&spec, Some(&file), &required)?;
        self.spec = spec;
        Ok(())
    }
}

impl Scpi for Instrument {
    fn scpi_write(&self, command: &str) -> Result<()> {
        self.write(command)
    }
    fn scpi_query(&self, command: &str) -> Result<String> {
        self.query(command)
    }
}

impl Drop for Instrument {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!("Error disconnecting from {}: {}", self.name, e);
        }
    }
}

impl std::fmt::Debug for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrument")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("state", &self.state.get())
            .finish()
    }
}
