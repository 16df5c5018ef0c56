// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Helper functions to get addresses defined by the linker script.
//!
//! The boot-stage linker script places the suspend path's text in a
//! `.retained.text` output section whose virtual addresses lie in retained
//! SRAM and whose load address lies inside the image; the relocation in
//! [`sram`](crate::sram) performs the copy at bring-up.

use crate::platform;

unsafe extern "C" {
    // These aren't really variables, just symbols defined by the linker script
    // whose addresses we need to get. They should never be read or written.
    static __IMAGE_START__: u32;
    static __IMAGE_END__: u32;
    static __TEXT_START__: u32;
    static __TEXT_END__: u32;
    static __RETAINED_TEXT_START__: u32;
    static __RETAINED_TEXT_END__: u32;
    static __RETAINED_LOAD_START__: u32;
}

/// Returns the address of the `__IMAGE_START__` symbol defined by the linker
/// script.
pub fn image_start() -> usize {
    (&raw const __IMAGE_START__) as usize
}

/// Returns the address of the `__IMAGE_END__` symbol defined by the linker
/// script.
pub fn image_end() -> usize {
    (&raw const __IMAGE_END__) as usize
}

/// Returns the address of the `__TEXT_START__` symbol defined by the linker
/// script.
pub fn image_code_start() -> usize {
    (&raw const __TEXT_START__) as usize
}

/// Returns the address of the `__TEXT_END__` symbol defined by the linker
/// script.
pub fn image_code_end() -> usize {
    (&raw const __TEXT_END__) as usize
}

/// Base of the retained SRAM code range (the relocation destination).
pub fn retained_code_base() -> usize {
    (&raw const __RETAINED_TEXT_START__) as usize
}

/// Load address of the relocatable code inside the image.
pub fn retained_copy_source() -> usize {
    (&raw const __RETAINED_LOAD_START__) as usize
}

/// Size of the relocatable code.
pub fn retained_copy_len() -> usize {
    (&raw const __RETAINED_TEXT_END__) as usize - retained_code_base()
}

/// Base of the SRAM scratch data range.
pub fn retained_data_base() -> usize {
    platform::SRAM_DATA_BASE
}

/// Size of the SRAM scratch data range.
pub fn retained_data_size() -> usize {
    platform::SRAM_DATA_SIZE
}

/// Base of the private SRAM stack.
pub fn retained_stack_base() -> usize {
    platform::SRAM_STACK_BASE
}

/// Size of the private SRAM stack.
pub fn retained_stack_size() -> usize {
    platform::SRAM_STACK_SIZE
}

/// Top of the private SRAM stack used while DRAM is inaccessible.
#[allow(unused)]
pub fn retained_stack_top() -> usize {
    platform::SRAM_STACK_BASE + platform::SRAM_STACK_SIZE
}
