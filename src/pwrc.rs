// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Core and cluster power-state controller.
//!
//! Power states are tracked by the hardware FSM, not shadowed in software.
//! Every transition sequence spans several registers and is not safely
//! interleavable, so all transitions system-wide are serialized by a single
//! spin lock. The advisory state queries and the interrupt wake-up flag are
//! lock-free.

use crate::{
    mmio::{MMIO, Mmio, RegisterBus},
    platform::{self, CLUSTER_COUNT, MAX_CORES_PER_CLUSTER},
    sysregs,
    topology::{self, Mpidr},
};
use bitflags::bitflags;
use log::info;
use num_enum::TryFromPrimitive;
use spin::mutex::SpinMutex;

const CLUSTER_BLOCK_BASE: usize = platform::PMU_BASE + 0x400;
const CORE_BLOCK_BASE: usize = platform::PMU_BASE + 0x800;

/// Base of a cluster's register block within the power management unit.
fn cluster_block(cluster: usize) -> usize {
    CLUSTER_BLOCK_BASE + (cluster & 0x3) * 0x40
}

/// Base of a core's register block within the power management unit.
fn core_block(core: usize) -> usize {
    CORE_BLOCK_BASE + (core & 0x6) * 0x100 + (core & 0x1) * 0x40
}

fn cluster_pwrctrl(cluster: usize) -> usize {
    cluster_block(cluster)
}

fn core_pwrctrl(core: usize) -> usize {
    core_block(core)
}

fn core_fsm_status(core: usize) -> usize {
    core_block(core) + 0x18
}

fn core_safety_ctrl(core: usize) -> usize {
    core_block(core) + 0x20
}

fn core_reset_vector_low(core: usize) -> usize {
    core_block(core) + 0x38
}

fn core_reset_vector_high(core: usize) -> usize {
    core_block(core) + 0x3C
}

/// Base of a cluster's auxiliary control register in the boot configuration
/// block.
fn cluster_aux(cluster: usize) -> usize {
    platform::BOOTCFG_BASE + 0x10 + (cluster & 0x3) * 0x1000
}

/// Coherent interconnect auxiliary control register.
const INTERCONNECT_AUX: usize = platform::BOOTCFG_BASE + 0x8010;

/// Peripheral-port interconnect auxiliary control register.
const INTERCONNECT_PERIPH_AUX: usize = platform::BOOTCFG_BASE + 0x8090;

/// Auxiliary initialisation bit, common to the cluster and interconnect
/// auxiliary control registers.
const AUX_INIT: u32 = 1 << 0;

bitflags! {
    /// Fields of the per-core power control register.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    struct CorePwrCtrl: u32 {
        /// Wake-up request; self-clears once the wake sequence completes.
        const WUP_REQ = 1 << 0;
        /// Power-down enable for the core.
        const PDN_EN = 1 << 2;
        /// Allows a pending interrupt to wake the core.
        const IWUP_EN = 1 << 3;
    }

    /// Fields of the per-cluster power control register.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    struct ClusterPwrCtrl: u32 {
        /// Power-down enable for the cluster.
        const PDN_EN = 1 << 2;
    }

    /// Fields of the per-core safety/debug control register.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    struct SafetyCtrl: u32 {
        /// Keeps the core's debug logic powered across a power-down.
        const DBG_PWRDN_EN = 1 << 4;
    }
}

/// The FSM state field of the per-core status register.
const FSM_STATE_MASK: u32 = 0xFF;

/// Power FSM states reported by the per-core status register. Values outside
/// this set are transitional and treated as "not off".
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u32)]
enum CoreFsmState {
    Off = 0x00,
    PoweringUp = 0x01,
    On = 0x04,
    PoweringDown = 0x08,
}

/// Valid address bits of the low reset vector register.
const RESET_VECTOR_ADDR_MASK: u32 = 0xFFFF_FFFC;

/// Marks the programmed reset vector as valid.
const RESET_VECTOR_VALID: u32 = 1 << 0;

/// Requests power-down at the lowest retention level through the core's local
/// power control register.
const CPUPWRCTLR_PWDN: u64 = 1 << 0;

/// Bit position of the first fuse group in the product register; each cluster
/// owns one 3-bit group above it.
const FUSE_SHIFT: u32 = 17;
const FUSE_GROUP_BITS: u32 = 3;

/// Cluster-disable fuse within a group. The two low bits of a group disable
/// the cluster's individual cores. A clear fuse means present.
const FUSE_CLUSTER_DISABLE: u32 = 0b100;

/// Serializes all core/cluster power transitions across every calling core.
/// There is no fairness guarantee among waiters; hardware transition latency
/// dominates.
static TRANSITION_LOCK: SpinMutex<()> = SpinMutex::new(());

/// Implemented clusters and cores, decoded from the product register fuses.
struct ImplementedMap {
    clusters: u32,
    cores: u32,
}

fn implemented_map<B: RegisterBus>(bus: &B) -> ImplementedMap {
    let mut fuses = bus.read32(platform::PRODUCT_REGISTER) >> FUSE_SHIFT;
    let mut map = ImplementedMap {
        clusters: 0,
        cores: 0,
    };

    for cluster in 0..CLUSTER_COUNT {
        fuses >>= FUSE_GROUP_BITS;
        if fuses & FUSE_CLUSTER_DISABLE != 0 {
            continue;
        }
        map.clusters |= 1 << cluster;

        for entry in 0..MAX_CORES_PER_CLUSTER {
            if fuses & (1 << entry) != 0 {
                continue;
            }
            map.cores |= 1 << (cluster * MAX_CORES_PER_CLUSTER + entry);
        }
    }

    map
}

/// Driver for the per-core and per-cluster power transition registers.
pub struct PowerController<B> {
    bus: B,
}

static CONTROLLER: PowerController<&Mmio> = PowerController::new(&MMIO);

/// Returns the power controller backed by the SoC's register space.
pub fn get() -> &'static PowerController<&'static Mmio> {
    &CONTROLLER
}

impl<B: RegisterBus> PowerController<B> {
    /// Creates a controller on top of the given register bus.
    pub const fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Powers on the given core.
    ///
    /// Clears the cluster's power-down enable (the cluster must be on before
    /// any of its cores can wake), clears the core's power-down enable, then
    /// raises the wake request and waits for the hardware to complete the
    /// wake sequence. The waits have no timeout: a wake that never completes
    /// is a fatal hardware fault with no recovery authority at this level.
    pub fn cpu_on(&self, mpidr: Mpidr) {
        let _lock = TRANSITION_LOCK.lock();

        let core = topology::core_index(mpidr);
        let cluster = topology::cluster_index(mpidr);

        self.bus
            .clear_bits32(cluster_pwrctrl(cluster), ClusterPwrCtrl::PDN_EN.bits());

        self.bus
            .clear_bits32(core_pwrctrl(core), CorePwrCtrl::PDN_EN.bits());
        self.bus
            .poll_until_clear32(core_pwrctrl(core), CorePwrCtrl::PDN_EN.bits());

        self.bus
            .set_bits32(core_pwrctrl(core), CorePwrCtrl::WUP_REQ.bits());
        // WUP_REQ self-clears once the wake sequence finishes.
        self.bus
            .poll_until_clear32(core_pwrctrl(core), CorePwrCtrl::WUP_REQ.bits());
    }

    /// Requests power-down of the given core.
    ///
    /// Fire-and-forget: power is actually removed only after the core itself
    /// executes `wfi`, outside this sequence.
    pub fn cpu_off(&self, mpidr: Mpidr) {
        let _lock = TRANSITION_LOCK.lock();

        let core = topology::core_index(mpidr);
        self.cpu_off_locked(core);
    }

    /// Requests power-down of the given core and its whole cluster.
    ///
    /// The cluster-level intent is latched before the per-core sequence runs.
    pub fn cluster_off(&self, mpidr: Mpidr) {
        let _lock = TRANSITION_LOCK.lock();

        let core = topology::core_index(mpidr);
        let cluster = topology::cluster_index(mpidr);

        self.bus
            .set_bits32(cluster_pwrctrl(cluster), ClusterPwrCtrl::PDN_EN.bits());

        self.cpu_off_locked(core);
    }

    fn cpu_off_locked(&self, core: usize) {
        // Debug logic must release the core before it can reach OFF.
        self.bus
            .clear_bits32(core_safety_ctrl(core), SafetyCtrl::DBG_PWRDN_EN.bits());
        self.bus
            .set_bits32(core_pwrctrl(core), CorePwrCtrl::PDN_EN.bits());

        // SAFETY: The power controller has been programmed for the power-down
        // just above; the core parks in `wfi` after returning from here.
        unsafe {
            sysregs::write_cpupwrctlr_el1(CPUPWRCTLR_PWDN);
        }
    }

    /// Allows a pending interrupt to wake the given core from a low-power
    /// state.
    ///
    /// Lock-free: the flag is a single independent bit and races on it are
    /// benign per the controller's semantics.
    pub fn enable_interrupt_wakeup(&self, mpidr: Mpidr) {
        let core = topology::core_index(mpidr);
        self.bus
            .set_bits32(core_pwrctrl(core), CorePwrCtrl::IWUP_EN.bits());
    }

    /// Stops pending interrupts from waking the given core.
    pub fn disable_interrupt_wakeup(&self, mpidr: Mpidr) {
        let core = topology::core_index(mpidr);
        self.bus
            .clear_bits32(core_pwrctrl(core), CorePwrCtrl::IWUP_EN.bits());
    }

    /// Returns the number of implemented cores, excluding the caller's, whose
    /// power FSM is not OFF.
    ///
    /// Advisory only: no lock is taken, so the result may be stale by the
    /// time the caller acts on it. Hardware confirms actual transitions
    /// independently.
    pub fn active_core_count(&self, mpidr: Mpidr) -> usize {
        let caller = topology::core_index(mpidr);
        let map = implemented_map(&self.bus);
        let mut count = 0;

        for core in 0..platform::CORE_COUNT {
            if map.cores & (1 << core) == 0 || core == caller {
                continue;
            }
            let state = self.bus.read32(core_fsm_status(core)) & FSM_STATE_MASK;
            if !matches!(CoreFsmState::try_from(state), Ok(CoreFsmState::Off)) {
                count += 1;
            }
        }

        count
    }

    /// Programs every implemented core's reset vector to `entry_point` and
    /// arms the cluster and interconnect auxiliary initialisation bits.
    ///
    /// Must run exactly once on the boot core, before any other core is
    /// released and before the first [`cpu_on`](Self::cpu_on). Re-running it
    /// with the same entry point is harmless: all programmed values are
    /// idempotent.
    pub fn setup(&self, entry_point: usize) {
        let reset = (entry_point as u64 & 0xFFFF_FFFF) as u32;
        let reset = (reset & RESET_VECTOR_ADDR_MASK) | RESET_VECTOR_VALID;

        let map = implemented_map(&self.bus);
        for cluster in 0..CLUSTER_COUNT {
            if map.clusters & (1 << cluster) == 0 {
                continue;
            }
            self.bus.set_bits32(cluster_aux(cluster), AUX_INIT);

            for entry in 0..MAX_CORES_PER_CLUSTER {
                let core = cluster * MAX_CORES_PER_CLUSTER + entry;
                if map.cores & (1 << core) == 0 {
                    continue;
                }
                self.bus.write32(core_reset_vector_high(core), 0);
                self.bus.write32(core_reset_vector_low(core), reset);
            }
        }

        self.bus.set_bits32(INTERCONNECT_AUX, AUX_INIT);
        self.bus.set_bits32(INTERCONNECT_PERIPH_AUX, AUX_INIT);

        info!("Reset vectors programmed for cores {:#04x}", map.cores);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mmio::fake::FakeBus,
        platform::CORE_COUNT,
        sysregs::fake::SYSREGS,
    };

    /// Entry point used by setup tests; low bits exercise the address mask.
    const ENTRY_POINT: usize = 0x4602_0123;

    fn arm_wake_completion(bus: &FakeBus, core: usize) {
        bus.set_self_clearing(core_pwrctrl(core), CorePwrCtrl::WUP_REQ.bits());
    }

    #[test]
    fn register_blocks_are_pairwise_distinct() {
        let mut addresses = Vec::new();
        for core in 0..CORE_COUNT {
            addresses.extend([
                core_pwrctrl(core),
                core_fsm_status(core),
                core_safety_ctrl(core),
                core_reset_vector_low(core),
                core_reset_vector_high(core),
            ]);
        }
        for cluster in 0..CLUSTER_COUNT {
            addresses.push(cluster_pwrctrl(cluster));
            addresses.push(cluster_aux(cluster));
        }

        let count = addresses.len();
        addresses.sort_unstable();
        addresses.dedup();
        assert_eq!(addresses.len(), count);
    }

    #[test]
    fn cpu_on_sequences_cluster_before_core() {
        let bus = FakeBus::new();
        let mpidr = Mpidr::from_indices(1, 1);
        arm_wake_completion(&bus, 3);

        PowerController::new(&bus).cpu_on(mpidr);

        assert_eq!(
            bus.writes(),
            vec![
                (cluster_pwrctrl(1), 0),
                (core_pwrctrl(3), 0),
                (core_pwrctrl(3), CorePwrCtrl::WUP_REQ.bits()),
            ]
        );
        // The wake request has self-cleared.
        assert_eq!(bus.get(core_pwrctrl(3)), 0);
    }

    #[test]
    fn cpu_on_then_cpu_off_latches_power_down() {
        let bus = FakeBus::new();
        let mpidr = Mpidr::from_indices(0, 1);
        let core = 1;
        arm_wake_completion(&bus, core);
        bus.set(core_safety_ctrl(core), SafetyCtrl::DBG_PWRDN_EN.bits());

        let controller = PowerController::new(&bus);
        controller.cpu_on(mpidr);
        controller.cpu_off(mpidr);

        assert_eq!(
            bus.get(core_pwrctrl(core)) & CorePwrCtrl::PDN_EN.bits(),
            CorePwrCtrl::PDN_EN.bits()
        );
        assert_eq!(
            bus.get(core_safety_ctrl(core)) & SafetyCtrl::DBG_PWRDN_EN.bits(),
            0
        );
        assert_eq!(
            SYSREGS.lock().unwrap().cpupwrctlr_el1,
            CPUPWRCTLR_PWDN
        );
    }

    #[test]
    fn cluster_off_latches_cluster_intent_first() {
        let bus = FakeBus::new();
        let mpidr = Mpidr::from_indices(2, 0);

        PowerController::new(&bus).cluster_off(mpidr);

        let writes = bus.writes();
        assert_eq!(
            writes[0],
            (cluster_pwrctrl(2), ClusterPwrCtrl::PDN_EN.bits())
        );
        assert_eq!(writes[1], (core_safety_ctrl(4), 0));
        assert_eq!(writes[2], (core_pwrctrl(4), CorePwrCtrl::PDN_EN.bits()));
    }

    #[test]
    fn transitions_do_not_interleave() {
        let bus = FakeBus::new();
        // Core 0 of cluster 0 and core 0 of cluster 1 touch disjoint blocks.
        arm_wake_completion(&bus, 0);

        std::thread::scope(|scope| {
            scope.spawn(|| PowerController::new(&bus).cpu_on(Mpidr::from_indices(0, 0)));
            scope.spawn(|| PowerController::new(&bus).cpu_off(Mpidr::from_indices(1, 0)));
        });

        let on_targets = [cluster_pwrctrl(0), core_pwrctrl(0)];
        let off_targets = [core_safety_ctrl(2), core_pwrctrl(2)];

        let writes = bus.writes();
        let on_range: Vec<usize> = writes
            .iter()
            .enumerate()
            .filter(|(_, (addr, _))| on_targets.contains(addr))
            .map(|(i, _)| i)
            .collect();
        let off_range: Vec<usize> = writes
            .iter()
            .enumerate()
            .filter(|(_, (addr, _))| off_targets.contains(addr))
            .map(|(i, _)| i)
            .collect();

        assert!(!on_range.is_empty());
        assert!(!off_range.is_empty());
        // One full sequence completes before any write of the other begins.
        assert!(
            on_range.last() < off_range.first() || off_range.last() < on_range.first(),
            "interleaved writes: {writes:?}"
        );
    }

    #[test]
    fn setup_programs_reset_vectors_idempotently() {
        let bus = FakeBus::new();
        let controller = PowerController::new(&bus);

        controller.setup(ENTRY_POINT);

        let expected = (ENTRY_POINT as u32 & RESET_VECTOR_ADDR_MASK) | RESET_VECTOR_VALID;
        for core in 0..CORE_COUNT {
            assert_eq!(bus.get(core_reset_vector_high(core)), 0);
            assert_eq!(bus.get(core_reset_vector_low(core)), expected);
        }
        for cluster in 0..CLUSTER_COUNT {
            assert_eq!(bus.get(cluster_aux(cluster)), AUX_INIT);
        }
        assert_eq!(bus.get(INTERCONNECT_AUX), AUX_INIT);
        assert_eq!(bus.get(INTERCONNECT_PERIPH_AUX), AUX_INIT);

        let first = bus.snapshot();
        controller.setup(ENTRY_POINT);
        assert_eq!(bus.snapshot(), first);
    }

    #[test]
    fn setup_skips_fused_off_cores() {
        let bus = FakeBus::new();
        // Disable cluster 1 entirely and core 0 of cluster 2.
        let fuses = (0b100 << (FUSE_SHIFT + 2 * FUSE_GROUP_BITS))
            | (0b001 << (FUSE_SHIFT + 3 * FUSE_GROUP_BITS));
        bus.set(platform::PRODUCT_REGISTER, fuses);

        PowerController::new(&bus).setup(ENTRY_POINT);

        assert_eq!(bus.get(cluster_aux(1)), 0);
        for core in [2, 3, 4] {
            assert_eq!(bus.get(core_reset_vector_low(core)), 0);
        }
        for core in [0, 1, 5, 6, 7] {
            assert_ne!(bus.get(core_reset_vector_low(core)), 0);
        }
    }

    #[test]
    fn active_core_count_excludes_caller() {
        let bus = FakeBus::new();
        let controller = PowerController::new(&bus);
        let caller = Mpidr::from_indices(0, 0);

        // Everything reports OFF.
        assert_eq!(controller.active_core_count(caller), 0);

        bus.set(core_fsm_status(0), CoreFsmState::On as u32);
        bus.set(core_fsm_status(3), CoreFsmState::On as u32);
        // The caller's own state never counts.
        assert_eq!(controller.active_core_count(caller), 1);

        // An unknown transitional encoding counts as active.
        bus.set(core_fsm_status(5), 0x7F);
        assert_eq!(controller.active_core_count(caller), 2);

        bus.set(core_fsm_status(6), CoreFsmState::PoweringDown as u32);
        assert_eq!(controller.active_core_count(caller), 3);
    }

    #[test]
    fn interrupt_wakeup_flag_is_a_single_bit() {
        let bus = FakeBus::new();
        let mpidr = Mpidr::from_indices(3, 1);
        let controller = PowerController::new(&bus);

        controller.enable_interrupt_wakeup(mpidr);
        assert_eq!(bus.get(core_pwrctrl(7)), CorePwrCtrl::IWUP_EN.bits());

        controller.disable_interrupt_wakeup(mpidr);
        assert_eq!(bus.get(core_pwrctrl(7)), 0);
    }
}
