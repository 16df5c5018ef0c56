// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! EL3 identity mapping and memory attribute control.
//!
//! The boot stage installs MAIR/TCR and enables translation; this module owns
//! the runtime identity map, hands out its root address, changes region
//! attributes for the retained-memory relocation, and turns translation off
//! on the way into suspend.

use crate::{
    aarch64::{dsb_sy, isb},
    layout, platform,
    sysregs::{self, SctlrEl3},
};
use aarch64_paging::{
    Mapping,
    descriptor::{Attributes, PhysicalAddress, VirtualAddress},
    paging::{Constraints, MemoryRegion, PageTable, Translation, TranslationRegime, VaRange},
};
use core::{
    fmt::{self, Debug, Formatter},
    ptr::NonNull,
};
use log::{debug, info};
use spin::{
    Once,
    mutex::{SpinMutex, SpinMutexGuard},
};

const ROOT_LEVEL: usize = 1;

/// The number of pages reserved for the page table heap.
const PAGE_HEAP_PAGE_COUNT: usize = 12;

// Attribute values corresponding to the MAIR indices installed by the boot
// stage: index 0 is normal write-through memory, index 1 is device memory.
const NORMAL: Attributes = Attributes::ATTRIBUTE_INDEX_0;
const DEVICE: Attributes = Attributes::ATTRIBUTE_INDEX_1;

/// AP\[1\] is RES1 for a stage 1 translation regime that supports one
/// exception level.
const EL3_RES1: Attributes = Attributes::USER;

/// Attributes used for all mappings.
///
/// The access flag is always set, as access flag faults are not managed.
const BASE: Attributes = EL3_RES1
    .union(Attributes::ACCESSED)
    .union(Attributes::VALID);

/// Attributes used for device mappings.
///
/// Device memory is always mapped as execute-never to avoid the possibility
/// of a speculative instruction fetch from a read-sensitive peripheral.
pub const MT_DEVICE: Attributes = DEVICE.union(BASE).union(Attributes::UXN);

/// Attributes used for regular memory mappings.
pub const MT_MEMORY: Attributes = NORMAL.union(BASE).union(Attributes::INNER_SHAREABLE);

/// Attributes used for code (i.e. text) mappings.
pub const MT_CODE: Attributes = MT_MEMORY.union(Attributes::READ_ONLY);

/// Attributes used for read-write data mappings.
pub const MT_RW_DATA: Attributes = MT_MEMORY.union(Attributes::UXN);

static PAGE_HEAP: SpinMutex<[PageTable; PAGE_HEAP_PAGE_COUNT]> =
    SpinMutex::new([PageTable::EMPTY; PAGE_HEAP_PAGE_COUNT]);
static PAGE_TABLE: Once<SpinMutex<IdMap>> = Once::new();

/// Builds the runtime identity mapping of the image, the device register
/// space and the retained SRAM.
///
/// This should be called once in the startup sequence of the boot core. The
/// boot stage installs the returned root through
/// [`root_address`].
pub fn init_mapping() {
    PAGE_TABLE.call_once(|| {
        let page_heap =
            SpinMutexGuard::leak(PAGE_HEAP.try_lock().expect("Page heap was already taken"));
        let mut idmap = init_page_table(page_heap);

        info!("Marking page table as active");
        idmap.mark_active();

        SpinMutex::new(idmap)
    });
}

/// Returns the physical address of the root translation table.
pub fn root_address() -> usize {
    PAGE_TABLE
        .get()
        .expect("page tables not initialised")
        .lock()
        .root_address()
        .0
}

fn init_page_table(pages: &'static mut [PageTable]) -> IdMap {
    let mut idmap = IdMap::new(pages);

    let product_register_page = platform::PRODUCT_REGISTER & !0xFFF;

    // SAFETY: Nothing is being unmapped, and the regions being mapped have
    // the correct attributes.
    unsafe {
        idmap.map_region(
            &MemoryRegion::new(layout::image_start(), layout::image_end()),
            MT_MEMORY,
        );
        idmap.map_region(
            &MemoryRegion::new(layout::image_code_start(), layout::image_code_end()),
            MT_CODE,
        );
        idmap.map_region(
            &MemoryRegion::new(
                platform::DEVICE_BASE,
                platform::DEVICE_BASE + platform::DEVICE_SIZE,
            ),
            MT_DEVICE,
        );
        idmap.map_region(
            &MemoryRegion::new(product_register_page, product_register_page + 0x1000),
            MT_DEVICE,
        );
        // Retained SRAM. The relocation flips the code range to MT_CODE once
        // it has been populated.
        idmap.map_region(
            &MemoryRegion::new(
                platform::SRAM_BASE,
                platform::SRAM_BASE + platform::SRAM_CODE_SIZE,
            ),
            MT_RW_DATA,
        );
        idmap.map_region(
            &MemoryRegion::new(
                platform::SRAM_DATA_BASE,
                platform::SRAM_STACK_BASE + platform::SRAM_STACK_SIZE,
            ),
            MT_RW_DATA,
        );
    }

    idmap
}

/// Re-maps `region` with the given attributes.
///
/// The region must already be mapped; this is used to toggle permissions,
/// e.g. making the retained code range executable after it has been copied.
/// Failure is a translation-table misconfiguration and halts.
///
/// In unit tests the change is recorded in [`fake::ATTRIBUTE_CHANGES`]
/// instead of being applied.
#[cfg_attr(test, allow(unused_variables))]
pub fn change_region_attributes(region: &MemoryRegion, attributes: Attributes) {
    #[cfg(test)]
    fake::ATTRIBUTE_CHANGES.lock().unwrap().push((
        region.start().0,
        region.end().0,
        attributes,
    ));

    #[cfg(not(test))]
    {
        let mut idmap = PAGE_TABLE
            .get()
            .expect("page tables not initialised")
            .lock();
        // SAFETY: Only permissions change; the region stays mapped to the
        // same output addresses, so no live firmware mapping is lost.
        unsafe {
            idmap.map_region(region, attributes);
        }
    }
}

/// Disables the MMU and data caching at EL3.
///
/// # Safety
///
/// The caller must guarantee that it is safe to disable the MMU at the time
/// of calling this function.
pub unsafe fn disable_mmu_el3() {
    let mut sctlr_el3 = sysregs::read_sctlr_el3();
    sctlr_el3.remove(SctlrEl3::C | SctlrEl3::M);
    // SAFETY: `sctlr_el3` is a valid value for the EL3 system control
    // register. The caller promises that we can safely disable the MMU.
    unsafe {
        sysregs::write_sctlr_el3(sctlr_el3);
    }
    isb();
    dsb_sy();
}

struct IdTranslation {
    /// Pages which can be allocated for page tables.
    pages: &'static mut [PageTable],
    /// Record of which `pages` are currently allocated.
    allocated: [bool; PAGE_HEAP_PAGE_COUNT],
}

impl Debug for IdTranslation {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("IdTranslation")
            .field("pages", &self.pages.len())
            .field("allocated", &self.allocated)
            .finish()
    }
}

impl IdTranslation {
    fn virtual_to_physical(va: VirtualAddress) -> PhysicalAddress {
        // Physical address is the same as the virtual address because we are
        // using identity mapping everywhere.
        PhysicalAddress(va.0)
    }
}

impl Translation for IdTranslation {
    fn allocate_table(&mut self) -> (NonNull<PageTable>, PhysicalAddress) {
        let index = self
            .allocated
            .iter()
            .position(|&allocated| !allocated)
            .expect("Failed to allocate page table");
        self.allocated[index] = true;
        let table = NonNull::from(&mut self.pages[index]);
        (
            table,
            Self::virtual_to_physical(VirtualAddress(table.as_ptr() as usize)),
        )
    }

    unsafe fn deallocate_table(&mut self, page_table: NonNull<PageTable>) {
        let index =
            (page_table.addr().get() - &raw const self.pages[0] as usize) / size_of::<PageTable>();
        self.allocated[index] = false;
    }

    fn physical_to_virtual(&self, page_table_pa: PhysicalAddress) -> NonNull<PageTable> {
        NonNull::new(page_table_pa.0 as *mut PageTable)
            .expect("Got physical address 0 for pagetable")
    }
}

#[derive(Debug)]
struct IdMap {
    mapping: Mapping<IdTranslation>,
}

impl IdMap {
    fn new(pages: &'static mut [PageTable]) -> Self {
        Self {
            mapping: Mapping::new(
                IdTranslation {
                    pages,
                    allocated: [false; PAGE_HEAP_PAGE_COUNT],
                },
                0,
                ROOT_LEVEL,
                TranslationRegime::El3,
                VaRange::Lower,
            ),
        }
    }

    fn mark_active(&mut self) {
        self.mapping.mark_active();
    }

    fn root_address(&self) -> PhysicalAddress {
        self.mapping.root_address()
    }

    /// Adds the given region to the page table with the given attributes,
    /// logging it first.
    ///
    /// # Safety
    ///
    /// Memory which is still used by the firmware must not be unmapped, or
    /// mapped with incorrect attributes.
    unsafe fn map_region(&mut self, region: &MemoryRegion, attributes: Attributes) {
        debug!("Mapping {region} as {attributes:?}.");
        assert!(attributes.contains(Attributes::VALID));
        let pa = IdTranslation::virtual_to_physical(region.start());
        self.mapping
            .map_range(region, pa, attributes, Constraints::empty())
            .expect("Error mapping memory range");
    }
}
