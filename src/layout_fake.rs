// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Fake linker symbols for unit tests.
//!
//! The retained ranges are backed by a leaked heap arena so that the
//! relocation code can really copy and scrub bytes.

use crate::platform;
use std::sync::OnceLock;

const ARENA_SIZE: usize = platform::SRAM_CODE_SIZE
    + platform::SRAM_DATA_SIZE
    + platform::SRAM_STACK_SIZE
    + platform::SRAM_CODE_SIZE;

fn arena_base() -> usize {
    static ARENA: OnceLock<usize> = OnceLock::new();
    *ARENA.get_or_init(|| {
        // Page-aligned so the ranges are valid attribute-change targets.
        let layout = std::alloc::Layout::from_size_align(ARENA_SIZE, 0x1000).unwrap();
        // SAFETY: `layout` has a non-zero size. The arena is intentionally
        // leaked; it backs the fake retained ranges for the process lifetime.
        let arena = unsafe { std::alloc::alloc_zeroed(layout) };
        assert!(!arena.is_null());
        arena as usize
    })
}

pub fn image_start() -> usize {
    0x4600_0000
}

pub fn image_end() -> usize {
    0x4610_0000
}

pub fn image_code_start() -> usize {
    0x4600_0000
}

pub fn image_code_end() -> usize {
    0x4604_0000
}

pub fn retained_code_base() -> usize {
    arena_base()
}

pub fn retained_data_base() -> usize {
    arena_base() + platform::SRAM_CODE_SIZE
}

pub fn retained_data_size() -> usize {
    platform::SRAM_DATA_SIZE
}

pub fn retained_stack_base() -> usize {
    retained_data_base() + platform::SRAM_DATA_SIZE
}

pub fn retained_stack_size() -> usize {
    platform::SRAM_STACK_SIZE
}

pub fn retained_stack_top() -> usize {
    retained_stack_base() + platform::SRAM_STACK_SIZE
}

pub fn retained_copy_source() -> usize {
    retained_stack_top()
}

pub fn retained_copy_len() -> usize {
    platform::SRAM_CODE_SIZE
}
