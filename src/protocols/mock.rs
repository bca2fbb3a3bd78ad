//! In-memory transport with scripted responses.
//!
//! A [`MockTransport`] records every write and query it receives. Its [`MockHandle`] stays with
//! the caller after the transport has been moved into an instrument, so the recorded traffic
//! can be inspected and responses scripted from outside.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use super::{ConnectOptions, Transport};
use crate::error::{Error, Result};

/// One exchange seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Traffic {
    Write(String),
    Query(String),
    Read,
}

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    refuse_connect: bool,
    address: Option<String>,
    traffic: Vec<Traffic>,
    responses: HashMap<String, VecDeque<String>>,
    sticky: HashMap<String, String>,
    pending: VecDeque<String>,
    default_response: Option<String>,
    transient_failures: u32,
    fail_writes: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

/// Caller-side view of a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

fn lock(state: &Arc<Mutex<MockState>>) -> MutexGuard<'_, MockState> {
    // a panicking test thread must not hide the traffic from the others
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: self.state.clone(),
        }
    }
}

impl MockHandle {
    /// Queue a one-shot response for `command`; queued responses are used in order.
    pub fn respond(&self, command: &str, response: &str) -> &Self {
        lock(&self.state)
            .responses
            .entry(command.to_string())
            .or_default()
            .push_back(response.to_string());
        self
    }

    /// Answer `command` with `response` every time once the queue for it is empty.
    pub fn always(&self, command: &str, response: &str) -> &Self {
        lock(&self.state)
            .sticky
            .insert(command.to_string(), response.to_string());
        self
    }

    /// Response for any query without a scripted answer.
    pub fn default_response(&self, response: &str) -> &Self {
        lock(&self.state).default_response = Some(response.to_string());
        self
    }

    /// Text handed out by the next bare `read`.
    pub fn push_read(&self, response: &str) -> &Self {
        lock(&self.state).pending.push_back(response.to_string());
        self
    }

    /// Make the next `count` queries fail with a transient error.
    pub fn fail_transiently(&self, count: u32) -> &Self {
        lock(&self.state).transient_failures = count;
        self
    }

    pub fn fail_writes(&self, fail: bool) -> &Self {
        lock(&self.state).fail_writes = fail;
        self
    }

    pub fn refuse_connect(&self, refuse: bool) -> &Self {
        lock(&self.state).refuse_connect = refuse;
        self
    }

    pub fn traffic(&self) -> Vec<Traffic> {
        lock(&self.state).traffic.clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.traffic()
            .into_iter()
            .filter_map(|t| match t {
                Traffic::Write(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn queries(&self) -> Vec<String> {
        self.traffic()
            .into_iter()
            .filter_map(|t| match t {
                Traffic::Query(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.state).traffic.clear();
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    pub fn address(&self) -> Option<String> {
        lock(&self.state).address.clone()
    }
}

impl MockState {
    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::NotConnected("mock transport".to_string()))
        }
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, address: &str, _options: &ConnectOptions) -> Result<bool> {
        let mut state = lock(&self.state);
        if state.refuse_connect {
            return Ok(false);
        }
        state.connected = true;
        state.address = Some(address.to_string());
        Ok(true)
    }

    fn disconnect(&mut self) -> Result<()> {
        lock(&self.state).connected = false;
        Ok(())
    }

    fn write(&mut self, command: &str) -> Result<()> {
        let mut state = lock(&self.state);
        state.ensure_connected()?;
        state.traffic.push(Traffic::Write(command.to_string()));
        if state.fail_writes {
            return Err(Error::TransientIo(format!("write of '{}' failed", command)));
        }
        Ok(())
    }

    fn read(&mut self) -> Result<String> {
        let mut state = lock(&self.state);
        state.ensure_connected()?;
        state.traffic.push(Traffic::Read);
        state
            .pending
            .pop_front()
            .ok_or_else(|| Error::TransientIo("nothing to read".to_string()))
    }

    fn query(&mut self, command: &str) -> Result<String> {
        let mut state = lock(&self.state);
        state.ensure_connected()?;
        state.traffic.push(Traffic::Query(command.to_string()));
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(Error::TransientIo(format!("device busy on '{}'", command)));
        }
        if let Some(response) = state.responses.get_mut(command).and_then(VecDeque::pop_front) {
            return Ok(response);
        }
        if let Some(response) = state.sticky.get(command) {
            return Ok(response.clone());
        }
        Ok(state.default_response.clone().unwrap_or_default())
    }

    /// Forgets text queued with [`MockHandle::push_read`].
    fn discard_input(&mut self) -> Result<()> {
        lock(&self.state).pending.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
}
