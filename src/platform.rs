// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! SoC constants and the one-time platform bring-up sequence.

use crate::{logger, mmio::MMIO, pagetable, pwrc, sram, sysregs, timer};
use log::info;
use spin::Once;

/// The number of CPU clusters in the SoC.
pub const CLUSTER_COUNT: usize = 4;

/// The maximum number of cores per cluster.
pub const MAX_CORES_PER_CLUSTER: usize = 2;

/// The number of linear core indices (and per-core register blocks).
pub const CORE_COUNT: usize = CLUSTER_COUNT * MAX_CORES_PER_CLUSTER;

/// The size in bytes of the largest cache line across all the cache levels in
/// the platform.
pub const CACHE_WRITEBACK_GRANULE: usize = 1 << 6;

/// Base address of the power management unit register block.
pub const PMU_BASE: usize = 0xE617_0000;

/// Base address of the boot configuration register block.
pub const BOOTCFG_BASE: usize = 0xE646_0000;

/// Address of the product register holding the core/cluster fuse map.
pub const PRODUCT_REGISTER: usize = 0xFFF0_0044;

/// Base address of the system counter control frame.
pub const CNTC_BASE: usize = 0xE608_0000;

/// Base address of the DRAM controller register block.
pub const DRAMC_BASE: usize = 0xE679_0000;

/// Base address of the mailbox towards the system-control processor.
pub const SCP_MBOX_BASE: usize = 0xE626_0000;

/// The system counter frequency in Hz, derived from the external oscillator.
pub const SYSCNT_FREQ_HZ: u32 = 16_666_600;

/// Base address of the retained on-chip SRAM.
pub const SRAM_BASE: usize = 0xE631_0000;

/// Size of the SRAM range reserved for relocated suspend code.
pub const SRAM_CODE_SIZE: usize = 0x2000;

/// Base address of the SRAM scratch data range.
pub const SRAM_DATA_BASE: usize = SRAM_BASE + SRAM_CODE_SIZE;

/// Size of the SRAM scratch data range.
pub const SRAM_DATA_SIZE: usize = 0x1000;

/// Base address of the private stack used while DRAM is inaccessible.
pub const SRAM_STACK_BASE: usize = SRAM_DATA_BASE + SRAM_DATA_SIZE;

/// Size of the SRAM stack range.
pub const SRAM_STACK_SIZE: usize = 0x1000;

/// Base and size of the identity-mapped device register space.
pub const DEVICE_BASE: usize = 0xE600_0000;
/// Size of the identity-mapped device register space.
pub const DEVICE_SIZE: usize = 0x0100_0000;

/// The affinity fields of an `MPIDR_EL1` value.
pub(crate) const MPIDR_AFFINITY_MASK: u64 = 0xFF_00FF_FFFF;

static BOOT_CORE_MPIDR: Once<u64> = Once::new();

/// Initialises the boot console and the logger.
#[cfg(not(test))]
pub fn init_console() {
    use arm_pl011_uart::{PL011Registers, Uart, UniqueMmioPointer};
    use core::ptr::NonNull;

    // Base address of the boot console UART.
    const UART_BASE: *mut PL011Registers = 0xE6E6_0000 as _;

    // SAFETY: `UART_BASE` is the base address of the console UART, and nothing
    // else accesses that address range.
    let uart_pointer = unsafe { UniqueMmioPointer::new(NonNull::new(UART_BASE).unwrap()) };
    logger::init(logger::LockedWriter::new(Uart::new(uart_pointer)))
        .expect("Failed to initialise logger");
}

/// Initialises the test logger.
#[cfg(test)]
pub fn init_console() {
    // Several tests may race to initialise logging; only the first one wins.
    let _ = logger::init(logger::StdOutSink);
}

/// One-time platform bring-up, run on the boot core before any secondary core
/// is released.
///
/// Sets up the console, the identity mapping, the retained-memory copy of the
/// suspend path, the system counter and the power controller boot vectors,
/// then latches the boot core's identity for [`is_boot_core`].
pub fn bl31_platform_setup() {
    init_console();
    info!("BL31 power controller platform setup");

    pagetable::init_mapping();
    sram::code_copy_to_retained_memory();

    timer::init(&MMIO);
    pwrc::get().setup(secondary_entry_point());

    record_boot_core();
}

/// Latches the calling core's affinity as the boot core identity.
pub fn record_boot_core() {
    BOOT_CORE_MPIDR.call_once(|| sysregs::read_mpidr_el1() & MPIDR_AFFINITY_MASK);
}

/// Returns whether the calling core is the core that performed cold boot.
///
/// Used by the resume path, which re-enters on the boot core only.
pub fn is_boot_core() -> bool {
    let mpidr = sysregs::read_mpidr_el1() & MPIDR_AFFINITY_MASK;
    BOOT_CORE_MPIDR.get() == Some(&mpidr)
}

/// Returns the physical address of the entry point programmed into every
/// core's reset vector, used for both secondary cold boot and wake-up.
pub fn secondary_entry_point() -> usize {
    #[cfg(not(test))]
    {
        unsafe extern "C" {
            // Provided by the boot-stage binary linking this crate.
            fn bl31_warm_entrypoint();
        }
        bl31_warm_entrypoint as usize
    }
    #[cfg(test)]
    0x4602_0000
}
