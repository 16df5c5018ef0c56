// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! A fake register bus for unit tests.
//!
//! Records every access in order, serves scripted read sequences for status
//! registers, and models self-clearing request bits.

use super::RegisterBus;
use std::{
    collections::{BTreeMap, VecDeque},
    sync::Mutex,
};

/// A single access observed by the fake bus.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Access {
    /// A read of the register at the given address.
    Read(usize),
    /// A write of the given value to the register at the given address.
    Write(usize, u32),
}

#[derive(Default)]
struct BusState {
    regs: BTreeMap<usize, u32>,
    scripts: BTreeMap<usize, VecDeque<u32>>,
    self_clearing: BTreeMap<usize, u32>,
    log: Vec<Access>,
}

/// A fake [`RegisterBus`] backed by an in-memory register file.
///
/// Unconfigured registers read as zero.
pub struct FakeBus {
    state: Mutex<BusState>,
}

impl FakeBus {
    /// Creates an empty fake bus.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BusState::default()),
        }
    }

    /// Sets the backing value of the register at `addr`.
    pub fn set(&self, addr: usize, value: u32) {
        self.state.lock().unwrap().regs.insert(addr, value);
    }

    /// Returns the backing value of the register at `addr`.
    pub fn get(&self, addr: usize) -> u32 {
        self.state
            .lock()
            .unwrap()
            .regs
            .get(&addr)
            .copied()
            .unwrap_or(0)
    }

    /// Queues `values` to be returned by successive reads of `addr`, before
    /// the backing value is used again. Each served value also becomes the
    /// new backing value, so a script ending in a terminal status leaves the
    /// register in that state.
    pub fn script_reads(&self, addr: usize, values: impl IntoIterator<Item = u32>) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .entry(addr)
            .or_default()
            .extend(values);
    }

    /// Marks the bits of `mask` at `addr` as self-clearing: a write observes
    /// the value but the bits read back clear, like a hardware request bit
    /// that completes immediately.
    pub fn set_self_clearing(&self, addr: usize, mask: u32) {
        *self
            .state
            .lock()
            .unwrap()
            .self_clearing
            .entry(addr)
            .or_default() |= mask;
    }

    /// Returns the full ordered access log.
    pub fn log(&self) -> Vec<Access> {
        self.state.lock().unwrap().log.clone()
    }

    /// Returns the ordered sequence of writes, as `(address, value)` pairs.
    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter_map(|access| match access {
                Access::Write(addr, value) => Some((*addr, *value)),
                Access::Read(_) => None,
            })
            .collect()
    }

    /// Clears the access log, keeping register values and scripts.
    pub fn clear_log(&self) {
        self.state.lock().unwrap().log.clear();
    }

    /// Returns a snapshot of every register with a backing value.
    pub fn snapshot(&self) -> BTreeMap<usize, u32> {
        self.state.lock().unwrap().regs.clone()
    }
}

impl Default for FakeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBus for FakeBus {
    fn read32(&self, addr: usize) -> u32 {
        let mut state = self.state.lock().unwrap();
        state.log.push(Access::Read(addr));
        if let Some(script) = state.scripts.get_mut(&addr)
            && let Some(value) = script.pop_front()
        {
            state.regs.insert(addr, value);
            return value;
        }
        state.regs.get(&addr).copied().unwrap_or(0)
    }

    fn write32(&self, addr: usize, value: u32) {
        let mut state = self.state.lock().unwrap();
        state.log.push(Access::Write(addr, value));
        let stored = match state.self_clearing.get(&addr) {
            Some(mask) => value & !mask,
            None => value,
        };
        state.regs.insert(addr, stored);
    }
}
