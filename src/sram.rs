// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! One-time relocation of the suspend path into retained on-chip SRAM.
//!
//! The suspend sequence cannot fetch from external DRAM once it starts
//! quiescing it, so its text is copied into always-on SRAM at bring-up and
//! executed from there.

use crate::{aarch64, layout, pagetable, platform};
use aarch64_paging::paging::MemoryRegion;
use log::info;

/// Copies the link-time relocatable suspend code into retained SRAM, makes it
/// executable there, and scrubs the SRAM scratch data and private stack.
///
/// Runs once during platform bring-up, before
/// [`suspend_to_ram`](crate::suspend::suspend_to_ram) can ever be called.
pub fn code_copy_to_retained_memory() {
    let code_base = layout::retained_code_base();
    let code_region = MemoryRegion::new(code_base, code_base + platform::SRAM_CODE_SIZE);
    let copy_len = layout::retained_copy_len();
    assert!(copy_len <= platform::SRAM_CODE_SIZE);

    // Writable for the copy; never writable and executable at once.
    pagetable::change_region_attributes(&code_region, pagetable::MT_RW_DATA);

    let source = layout::retained_copy_source();
    // SAFETY: `source..source + copy_len` is the relocatable code the linker
    // placed inside the image, and the destination is the SRAM code range
    // reserved for exactly this copy. The two ranges cannot overlap.
    unsafe {
        core::ptr::copy_nonoverlapping(source as *const u8, code_base as *mut u8, copy_len);
    }
    aarch64::flush_dcache_range(code_base, copy_len);

    aarch64::invalidate_icache_all();
    aarch64::dsb_sy();
    aarch64::isb();

    pagetable::change_region_attributes(&code_region, pagetable::MT_CODE);

    // Scrub the scratch data and private stack left over from any earlier
    // boot.
    let scrub_base = layout::retained_data_base();
    let scrub_len = layout::retained_data_size() + layout::retained_stack_size();
    // SAFETY: The scratch and stack ranges are contiguous, reserved for the
    // suspend path, and not in use until the first suspend.
    unsafe {
        core::ptr::write_bytes(scrub_base as *mut u8, 0, scrub_len);
    }
    aarch64::flush_dcache_range(scrub_base, scrub_len);

    info!("Suspend code relocated to retained memory");
}
