// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Core/cluster power-state control and suspend-to-RAM sequencing for the
//! BL31 stage of a multi-cluster Armv8-A SoC.
//!
//! The boot-stage driver calls [`platform::bl31_platform_setup`] exactly once
//! on the primary core before releasing any secondary core. At runtime the
//! power controller returned by [`pwrc::get`] performs serialized core and
//! cluster power transitions, and [`suspend::suspend_to_ram`] executes the
//! one-way suspend path from retained on-chip memory. After wake-up, the
//! resume path calls [`timer::restore_state`].

#![cfg_attr(not(test), no_std)]

pub(crate) mod aarch64;
pub mod dram;
#[cfg_attr(test, path = "layout_fake.rs")]
pub(crate) mod layout;
pub mod logger;
pub mod mmio;
pub mod pagetable;
pub mod platform;
pub mod pwrc;
pub(crate) mod scmi;
pub mod sram;
pub mod suspend;
pub(crate) mod sysregs;
pub mod timer;
pub mod topology;
