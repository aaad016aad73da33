//! Scripted bus transport
//!
//! Answers transactions from a table of canned replies keyed by target and
//! selector. Used by tests and by fixture-driven runs on machines without
//! a sideband bus.

use super::{cc, BusResult, BusTransport, Completion, Selector, Target};
use crate::error::{BusError, InputError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// One canned answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Complete(Completion),
    Fail { error: BusError },
}

impl Reply {
    fn into_result(self) -> BusResult {
        match self {
            Reply::Complete(c) => Ok(c),
            Reply::Fail { error } => Err(error),
        }
    }
}

/// Replies for one (target, selector) pair, consumed in order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptEntry {
    pub target: Target,
    pub selector: Selector,
    pub replies: Vec<Reply>,
}

/// Serialized form of a scripted bus
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusScript {
    /// Addresses that answer a ping
    #[serde(default)]
    pub cpus: Vec<u8>,
    #[serde(default)]
    pub entries: Vec<ScriptEntry>,
}

type Key = (Target, Selector);

/// Bus transport driven by a script.
///
/// Each key holds a queue of replies. Replies are consumed front to back and
/// the last one keeps answering once the queue is down to a single entry.
/// Unscripted reads on a live address complete with an invalid-request code;
/// any transaction to an address that is not alive fails as not present.
#[derive(Debug, Default)]
pub struct ScriptedBus {
    alive: Mutex<HashSet<u8>>,
    replies: Mutex<HashMap<Key, VecDeque<Reply>>>,
    calls: Mutex<HashMap<Key, usize>>,
    writes: Mutex<Vec<(Target, Selector, Vec<u8>)>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bus from a parsed script
    pub fn from_script(script: BusScript) -> Self {
        let bus = Self::new();
        for addr in script.cpus {
            bus.add_cpu(addr);
        }
        for entry in script.entries {
            for reply in entry.replies {
                bus.push(entry.target, entry.selector, reply);
            }
        }
        bus
    }

    /// Load a script from a JSON fixture file
    pub fn from_fixture(path: impl AsRef<Path>) -> Result<Self, InputError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| InputError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let script: BusScript = serde_json::from_str(&raw).map_err(|source| InputError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_script(script))
    }

    /// Mark an address as answering pings
    pub fn add_cpu(&self, addr: u8) {
        lock(&self.alive).insert(addr);
    }

    pub fn with_cpu(self, addr: u8) -> Self {
        self.add_cpu(addr);
        self
    }

    /// Queue a reply for a key
    pub fn push(&self, target: Target, selector: Selector, reply: Reply) {
        lock(&self.replies)
            .entry((target, selector))
            .or_default()
            .push_back(reply);
    }

    /// Queue a completion for a key
    pub fn respond(&self, target: Target, selector: Selector, code: u8, data: impl Into<Vec<u8>>) {
        self.push(target, selector, Reply::Complete(Completion::new(code, data)));
    }

    /// Queue a successful completion for a key
    pub fn respond_ok(&self, target: Target, selector: Selector, data: impl Into<Vec<u8>>) {
        self.respond(target, selector, cc::SUCCESS, data);
    }

    /// Queue a transport failure for a key
    pub fn fail(&self, target: Target, selector: Selector, error: BusError) {
        self.push(target, selector, Reply::Fail { error });
    }

    /// Number of transactions issued against a key
    pub fn calls(&self, target: Target, selector: Selector) -> usize {
        lock(&self.calls)
            .get(&(target, selector))
            .copied()
            .unwrap_or(0)
    }

    /// Number of transactions whose key satisfies `pred`
    pub fn calls_matching(&self, pred: impl Fn(&Target, &Selector) -> bool) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|((t, s), _)| pred(t, s))
            .map(|(_, n)| *n)
            .sum()
    }

    /// Total number of transactions issued
    pub fn total_calls(&self) -> usize {
        lock(&self.calls).values().sum()
    }

    /// Every write issued, in order
    pub fn writes(&self) -> Vec<(Target, Selector, Vec<u8>)> {
        lock(&self.writes).clone()
    }

    fn answer(&self, target: Target, selector: Selector) -> BusResult {
        *lock(&self.calls).entry((target, selector)).or_insert(0) += 1;

        if !lock(&self.alive).contains(&target.addr) {
            return Err(BusError::CpuNotPresent);
        }

        let mut replies = lock(&self.replies);
        match replies.get_mut(&(target, selector)) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .map(Reply::into_result)
                .unwrap_or(Err(BusError::DriverError)),
            Some(queue) => queue
                .front()
                .cloned()
                .map(Reply::into_result)
                .unwrap_or(Err(BusError::DriverError)),
            None => Ok(Completion::new(cc::INVALID_REQ, Vec::new())),
        }
    }
}

impl BusTransport for ScriptedBus {
    fn ping(&self, addr: u8) -> Result<(), BusError> {
        if lock(&self.alive).contains(&addr) {
            Ok(())
        } else {
            Err(BusError::CpuNotPresent)
        }
    }

    fn read(&self, target: Target, selector: Selector, len: usize) -> BusResult {
        self.answer(target, selector).map(|mut c| {
            if c.data.len() > len {
                c.data.truncate(len);
            }
            c
        })
    }

    fn write(&self, target: Target, selector: Selector, data: &[u8]) -> BusResult {
        lock(&self.writes).push((target, selector, data.to_vec()));
        self.answer(target, selector)
    }
}
