// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Barriers, wait-for-interrupt and cache maintenance.

#[cfg(all(target_arch = "aarch64", not(test)))]
use core::arch::asm;

/// The panic payload used by the test build of [`wfi`], so that unit tests can
/// unwind out of paths which never return on hardware.
#[cfg(test)]
pub const WFI_MAGIC: &str = "WFI_MAGIC";

/// Issues a data synchronization barrier (`dsb sy`) instruction.
pub fn dsb_sy() {
    // SAFETY: `dsb` does not violate safe Rust guarantees.
    #[cfg(all(target_arch = "aarch64", not(test)))]
    unsafe {
        asm!("dsb sy", options(nostack));
    }
}

/// Issues an instruction synchronization barrier (`isb`) instruction.
pub fn isb() {
    // SAFETY: `isb` does not violate safe Rust guarantees.
    #[cfg(all(target_arch = "aarch64", not(test)))]
    unsafe {
        asm!("isb", options(nostack));
    }
}

/// Waits for an interrupt.
///
/// In unit tests this panics with [`WFI_MAGIC`] instead, because the callers
/// in this crate only reach it on paths which must never return.
pub fn wfi() {
    #[cfg(test)]
    panic!("{}", WFI_MAGIC);

    // SAFETY: `wfi` does not violate safe Rust guarantees.
    #[cfg(all(target_arch = "aarch64", not(test)))]
    unsafe {
        asm!("wfi", options(nostack));
    }
}

/// Cleans and invalidates the data cache for the given virtual address range.
#[cfg_attr(not(all(target_arch = "aarch64", not(test))), allow(unused_variables))]
pub fn flush_dcache_range(base: usize, size: usize) {
    #[cfg(all(target_arch = "aarch64", not(test)))]
    {
        const LINE_SIZE: usize = crate::platform::CACHE_WRITEBACK_GRANULE;

        let end = base + size;
        let mut line = base & !(LINE_SIZE - 1);
        while line < end {
            // SAFETY: `dc civac` performs cache maintenance only; it does not
            // modify the memory contents the address refers to.
            unsafe {
                asm!("dc civac, {addr}", addr = in(reg) line, options(nostack));
            }
            line += LINE_SIZE;
        }
        dsb_sy();
    }
}

/// Cleans and invalidates all data caches to the point of coherency, by
/// set/way, walking every cache level reported by `CLIDR_EL1`.
pub fn flush_dcache_all() {
    #[cfg(all(target_arch = "aarch64", not(test)))]
    {
        let clidr: u64;
        // SAFETY: Reading `CLIDR_EL1` has no side effects.
        unsafe {
            asm!("mrs {value}, clidr_el1", value = out(reg) clidr, options(nomem, nostack));
        }

        for level in 0..7u64 {
            let cache_type = (clidr >> (3 * level)) & 0b111;
            // 0b010 and above means a data or unified cache is present.
            if cache_type < 0b010 {
                continue;
            }

            let csselr = level << 1;
            let ccsidr: u64;
            // SAFETY: Selecting a cache level and reading its size register
            // only affects the subsequent `CCSIDR_EL1` read.
            unsafe {
                asm!(
                    "msr csselr_el1, {csselr}",
                    "isb",
                    "mrs {ccsidr}, ccsidr_el1",
                    csselr = in(reg) csselr,
                    ccsidr = out(reg) ccsidr,
                    options(nomem, nostack),
                );
            }

            let line_shift = (ccsidr & 0x7) + 4;
            let last_way = ((ccsidr >> 3) & 0x3ff) as u32;
            let last_set = ((ccsidr >> 13) & 0x7fff) as u32;
            let way_shift = last_way.leading_zeros();

            for set in 0..=last_set {
                for way in 0..=last_way {
                    let operand = (u64::from(way) << way_shift)
                        | (u64::from(set) << line_shift)
                        | csselr;
                    // SAFETY: `dc cisw` performs cache maintenance only.
                    unsafe {
                        asm!("dc cisw, {operand}", operand = in(reg) operand, options(nostack));
                    }
                }
            }
        }

        dsb_sy();
        isb();
    }
}

/// Invalidates all instruction caches to the point of unification.
pub fn invalidate_icache_all() {
    // SAFETY: `ic iallu` performs cache maintenance only.
    #[cfg(all(target_arch = "aarch64", not(test)))]
    unsafe {
        asm!("ic iallu", options(nostack));
    }
    dsb_sy();
    isb();
}
