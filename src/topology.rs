// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Mapping of hardware core identifiers to linear core and cluster indices.
//!
//! Resolution failure is a boot-time contract violation, not a runtime error:
//! every core participating in the system must resolve, so an unresolvable
//! identifier halts the system.

use crate::platform::{CLUSTER_COUNT, MAX_CORES_PER_CLUSTER};
use log::error;

/// An opaque hardware core identifier: the affinity fields of an `MPIDR_EL1`
/// value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Mpidr(u64);

impl Mpidr {
    /// Wraps a raw `MPIDR_EL1` value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Builds the identifier of the given core of the given cluster.
    pub const fn from_indices(cluster: usize, core: usize) -> Self {
        Self(((cluster as u64) << 8) | core as u64)
    }

    /// Affinity level 0: the core within its cluster.
    pub fn aff0(self) -> u8 {
        self.0 as u8
    }

    /// Affinity level 1: the cluster.
    pub fn aff1(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Affinity level 2.
    pub fn aff2(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Affinity level 3.
    pub fn aff3(self) -> u8 {
        (self.0 >> 32) as u8
    }

    /// The raw register value.
    pub fn bits(self) -> u64 {
        self.0
    }
}

fn try_core_index(mpidr: Mpidr) -> Option<usize> {
    let cluster = usize::from(mpidr.aff1());
    let core = usize::from(mpidr.aff0());

    if mpidr.aff3() != 0
        || mpidr.aff2() != 0
        || cluster >= CLUSTER_COUNT
        || core >= MAX_CORES_PER_CLUSTER
    {
        return None;
    }

    Some(cluster * MAX_CORES_PER_CLUSTER + core)
}

/// Returns the linear core index for `mpidr`.
///
/// Never returns the same index for two different valid identifiers, and
/// never returns a value greater than or equal to
/// [`CORE_COUNT`](crate::platform::CORE_COUNT). Halts on an invalid
/// identifier.
pub fn core_index(mpidr: Mpidr) -> usize {
    match try_core_index(mpidr) {
        Some(index) => index,
        None => {
            error!("Invalid hardware core identifier {:#x}", mpidr.bits());
            panic!("unresolvable core identifier");
        }
    }
}

/// Returns the cluster index for `mpidr`. Halts on an invalid identifier.
pub fn cluster_index(mpidr: Mpidr) -> usize {
    let cluster = usize::from(mpidr.aff1());
    if try_core_index(mpidr).is_none() {
        error!("Invalid hardware core identifier {:#x}", mpidr.bits());
        panic!("unresolvable cluster identifier");
    }
    cluster
}
