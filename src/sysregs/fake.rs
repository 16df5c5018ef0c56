// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Fake implementations of system register getters and setters for unit
//! tests.

use super::SctlrEl3;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Values of fake system registers.
pub static SYSREGS: Mutex<SystemRegisters> = Mutex::new(SystemRegisters::new());

/// Serializes unit tests which depend on the process-wide fake register
/// values or on other process-wide singletons (e.g. the saved timer slot).
///
/// Tolerates poisoning, because some tests intentionally unwind.
static EXCLUSIVE: Mutex<()> = Mutex::new(());

/// Takes the process-wide test serialization lock.
pub fn exclusive() -> MutexGuard<'static, ()> {
    EXCLUSIVE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A set of fake system registers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SystemRegisters {
    /// Fake value for the CNTFRQ_EL0 system register.
    pub cntfrq_el0: u64,
    /// Fake value for the CNTPCT_EL0 system register.
    pub cntpct_el0: u64,
    /// Amount the fake counter advances on every read.
    pub cntpct_step: u64,
    /// Fake value for the MPIDR_EL1 system register.
    pub mpidr_el1: u64,
    /// Fake value for the SCTLR_EL3 system register.
    pub sctlr_el3: SctlrEl3,
    /// Fake value for the core power control register.
    pub cpupwrctlr_el1: u64,
}

impl SystemRegisters {
    const fn new() -> Self {
        Self {
            cntfrq_el0: 0,
            cntpct_el0: 0,
            cntpct_step: 0,
            mpidr_el1: 0,
            sctlr_el3: SctlrEl3::empty(),
            cpupwrctlr_el1: 0,
        }
    }

    /// Resets the fake system registers to their initial state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Generates a public function named `$function_name` to read the fake system
/// register `$sysreg`.
macro_rules! read_sysreg {
    ($sysreg:ident, $function_name:ident) => {
        pub fn $function_name() -> u64 {
            crate::sysregs::fake::SYSREGS.lock().unwrap().$sysreg
        }
    };
}

/// Generates a public function named `$function_name` to write to the fake
/// system register `$sysreg`.
macro_rules! write_sysreg {
    ($sysreg:ident, $function_name:ident) => {
        pub fn $function_name(value: u64) {
            crate::sysregs::fake::SYSREGS.lock().unwrap().$sysreg = value;
        }
    };
}
