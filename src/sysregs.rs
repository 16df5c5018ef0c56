// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! System register access.
//!
//! In unit tests the accessors operate on the fake register file in
//! [`fake::SYSREGS`] instead of issuing `mrs`/`msr` instructions.

#[cfg(test)]
#[macro_use]
pub mod fake;

use bitflags::bitflags;
#[cfg(all(target_arch = "aarch64", not(test)))]
use core::arch::asm;

/// Generates a safe public function named `$function_name` to read the system
/// register `$sysreg`.
///
/// This should only be used for system registers which are indeed safe to
/// read.
#[cfg(not(test))]
macro_rules! read_sysreg {
    ($sysreg:ident, $function_name:ident) => {
        pub fn $function_name() -> u64 {
            #[cfg(target_arch = "aarch64")]
            {
                let value;
                // SAFETY: The macro call site's author (i.e. see below) has
                // determined that it is safe to read the given `$sysreg`.
                unsafe {
                    asm!(
                        concat!("mrs {value}, ", stringify!($sysreg)),
                        options(nomem, nostack),
                        value = out(reg) value,
                    );
                }
                value
            }
            #[cfg(not(target_arch = "aarch64"))]
            unimplemented!("system registers are only accessible on aarch64")
        }
    };
}

/// Generates a safe public function named `$function_name` to write to the
/// system register `$sysreg`.
///
/// This should only be used for system registers which are indeed safe to
/// write.
#[cfg(not(test))]
macro_rules! write_sysreg {
    ($sysreg:ident, $function_name:ident) => {
        #[cfg_attr(not(target_arch = "aarch64"), allow(unused_variables))]
        pub fn $function_name(value: u64) {
            #[cfg(target_arch = "aarch64")]
            // SAFETY: The macro call site's author (i.e. see below) has
            // determined that it is safe to write `value` to the given
            // `$sysreg`.
            unsafe {
                asm!(
                    concat!("msr ", stringify!($sysreg), ", {value}"),
                    options(nomem, nostack),
                    value = in(reg) value,
                );
            }
            #[cfg(not(target_arch = "aarch64"))]
            unimplemented!("system registers are only accessible on aarch64")
        }
    };
}

read_sysreg!(cntfrq_el0, read_cntfrq_el0);
read_sysreg!(mpidr_el1, read_mpidr_el1);

write_sysreg!(cntfrq_el0, write_cntfrq_el0);

bitflags! {
    /// Fields of the `SCTLR_EL3` system control register.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct SctlrEl3: u64 {
        /// MMU enable.
        const M = 1 << 0;
        /// Alignment check enable.
        const A = 1 << 1;
        /// Data cache enable.
        const C = 1 << 2;
        /// Instruction cache enable.
        const I = 1 << 12;
    }
}

/// Returns the current value of the physical counter, `CNTPCT_EL0`.
#[cfg(not(test))]
pub fn read_cntpct_el0() -> u64 {
    #[cfg(target_arch = "aarch64")]
    {
        let value;
        // SAFETY: Reading the physical counter has no side effects. The `isb`
        // prevents the read from being hoisted over earlier instructions.
        unsafe {
            asm!(
                "isb",
                "mrs {value}, cntpct_el0",
                options(nomem, nostack),
                value = out(reg) value,
            );
        }
        value
    }
    #[cfg(not(target_arch = "aarch64"))]
    unimplemented!("system registers are only accessible on aarch64")
}

/// Returns the current value of the fake physical counter and advances it by
/// the configured step, so that elapsed-time loops make progress in tests.
#[cfg(test)]
pub fn read_cntpct_el0() -> u64 {
    let mut regs = fake::SYSREGS.lock().unwrap();
    let value = regs.cntpct_el0;
    regs.cntpct_el0 = value.wrapping_add(regs.cntpct_step);
    value
}

/// Returns the value of the `SCTLR_EL3` system register.
#[cfg(not(test))]
pub fn read_sctlr_el3() -> SctlrEl3 {
    #[cfg(target_arch = "aarch64")]
    {
        let value: u64;
        // SAFETY: Reading `SCTLR_EL3` has no side effects.
        unsafe {
            asm!("mrs {value}, sctlr_el3", options(nomem, nostack), value = out(reg) value);
        }
        SctlrEl3::from_bits_retain(value)
    }
    #[cfg(not(target_arch = "aarch64"))]
    unimplemented!("system registers are only accessible on aarch64")
}

/// Returns the value of the fake `SCTLR_EL3` register.
#[cfg(test)]
pub fn read_sctlr_el3() -> SctlrEl3 {
    fake::SYSREGS.lock().unwrap().sctlr_el3
}

/// Writes `value` to the `SCTLR_EL3` system register.
///
/// # Safety
///
/// The caller must ensure that `value` is a valid and safe configuration for
/// the current execution state, e.g. that disabling the MMU or caches does not
/// break any ongoing memory access.
#[cfg(not(test))]
#[cfg_attr(not(target_arch = "aarch64"), allow(unused_variables))]
pub unsafe fn write_sctlr_el3(value: SctlrEl3) {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: The caller promises that `value` is safe for the current
    // execution state.
    unsafe {
        asm!("msr sctlr_el3, {value}", options(nomem, nostack), value = in(reg) value.bits());
    }
    #[cfg(not(target_arch = "aarch64"))]
    unimplemented!("system registers are only accessible on aarch64")
}

/// Writes `value` to the fake `SCTLR_EL3` register.
///
/// # Safety
///
/// Trivially safe in tests; the signature matches the hardware accessor.
#[cfg(test)]
pub unsafe fn write_sctlr_el3(value: SctlrEl3) {
    fake::SYSREGS.lock().unwrap().sctlr_el3 = value;
}

/// Writes `value` to the core's IMPLEMENTATION DEFINED power control register
/// (`S3_0_C15_C2_7`), which latches a power-down request for the executing
/// core.
///
/// # Safety
///
/// The caller must ensure that it is safe for the executing core to be powered
/// down at its next `wfi`, i.e. that the power controller has been programmed
/// for the requested transition.
#[cfg(not(test))]
#[cfg_attr(not(target_arch = "aarch64"), allow(unused_variables))]
pub unsafe fn write_cpupwrctlr_el1(value: u64) {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: The caller promises that the core may power down.
    unsafe {
        asm!("msr S3_0_C15_C2_7, {value}", options(nomem, nostack), value = in(reg) value);
    }
    #[cfg(not(target_arch = "aarch64"))]
    unimplemented!("system registers are only accessible on aarch64")
}

/// Writes `value` to the fake core power control register.
///
/// # Safety
///
/// Trivially safe in tests; the signature matches the hardware accessor.
#[cfg(test)]
pub unsafe fn write_cpupwrctlr_el1(value: u64) {
    fake::SYSREGS.lock().unwrap().cpupwrctlr_el1 = value;
}
