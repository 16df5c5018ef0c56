// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Suspend-to-RAM orchestration.
//!
//! The suspend path is a one-way transfer: the calling context's stack and
//! translation state are abandoned, execution moves onto a private stack in
//! retained SRAM, and the sequence ends in `wfi` with no resumption path.
//! Wake-up re-enters the firmware at the reset vector programmed by
//! [`pwrc::PowerController::setup`](crate::pwrc::PowerController::setup).

use crate::{
    aarch64,
    dram::{self, SelfRefreshConfig},
    mmio::{MMIO, RegisterBus},
    pagetable, scmi, timer,
};

/// Suspends the system to RAM. Never returns.
///
/// [`sram::code_copy_to_retained_memory`](crate::sram::code_copy_to_retained_memory)
/// must have run before the first call, and no other power transition may be
/// in flight on this core.
pub fn suspend_to_ram() -> ! {
    prepare(&MMIO);

    #[cfg(all(target_arch = "aarch64", not(test)))]
    // SAFETY: The retained stack range was reserved and scrubbed during
    // bring-up and is unused until this point; the current stack and
    // translation state are never revisited because the transfer does not
    // return.
    unsafe {
        switch_stack(final_stage_entry, crate::layout::retained_stack_top())
    }

    #[cfg(not(all(target_arch = "aarch64", not(test))))]
    final_stage(&MMIO, &SelfRefreshConfig::DEFAULT)
}

/// Saves timer state and quiesces this core's address translation and caches,
/// leaving only retained-memory execution behind.
fn prepare<B: RegisterBus>(bus: &B) {
    timer::save_state(bus);

    // SAFETY: The suspend path runs alone on the last active core, with the
    // identity mapping in place; nothing after this point relies on
    // translation or caching.
    unsafe {
        pagetable::disable_mmu_el3();
    }

    aarch64::flush_dcache_all();
}

/// Jumps to `entry` on the given stack. One-way: the previous stack pointer
/// is discarded.
///
/// # Safety
///
/// `stack_top` must be the top of a valid, unused stack range, and `entry`
/// must never return.
#[cfg(all(target_arch = "aarch64", not(test)))]
#[unsafe(naked)]
unsafe extern "C" fn switch_stack(entry: extern "C" fn() -> !, stack_top: usize) -> ! {
    core::arch::naked_asm!("mov sp, x1", "br x0")
}

#[cfg(all(target_arch = "aarch64", not(test)))]
extern "C" fn final_stage_entry() -> ! {
    final_stage(&MMIO, &SelfRefreshConfig::DEFAULT)
}

/// The retained-memory half of the suspend sequence: quiesce DRAM, hand off
/// to the system-control processor, and park. Resumption re-enters at the
/// reset vector, never at the instruction after `wfi`.
#[cfg_attr(not(test), unsafe(link_section = ".retained.text"))]
#[inline(never)]
fn final_stage<B: RegisterBus>(bus: &B, config: &SelfRefreshConfig) -> ! {
    dram::enter_self_refresh(bus, config);
    scmi::system_suspend(bus);

    aarch64::wfi();

    // Do not return.
    loop {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aarch64::WFI_MAGIC,
        mmio::fake::FakeBus,
        sysregs::{
            SctlrEl3,
            fake::{SYSREGS, exclusive},
        },
        timer,
    };
    use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};

    #[test]
    fn suspend_saves_timer_quiesces_and_parks() {
        let _exclusive = exclusive();
        timer::reset_saved_state();
        {
            let mut regs = SYSREGS.lock().unwrap();
            regs.reset();
            regs.cntfrq_el0 = 1_000_000;
            regs.cntpct_step = 1;
            regs.sctlr_el3 = SctlrEl3::M | SctlrEl3::C | SctlrEl3::I;
        }

        let bus = FakeBus::new();
        bus.set(dram::REG_FLUSH_STATUS, dram::FLUSH_COMPLETE);

        prepare(&bus);

        // Translation and data caching are off; the instruction cache bit is
        // untouched.
        let sctlr = SYSREGS.lock().unwrap().sctlr_el3;
        assert!(!sctlr.contains(SctlrEl3::M));
        assert!(!sctlr.contains(SctlrEl3::C));
        assert!(sctlr.contains(SctlrEl3::I));

        bus.clear_log();
        let result = catch_unwind(AssertUnwindSafe(|| {
            final_stage(&bus, &SelfRefreshConfig::DEFAULT);
        }));

        // The path must end in the (test) wfi, not return or fail elsewhere.
        match result {
            Err(payload) => {
                if let Some(message) = payload.downcast_ref::<String>()
                    && *message == WFI_MAGIC
                {
                    // Parked as expected.
                } else {
                    resume_unwind(payload);
                }
            }
            Ok(()) => panic!("suspend path returned"),
        }

        // DRAM was quiesced before the handoff doorbell rang.
        let writes = bus.writes();
        let refresh_off = writes
            .iter()
            .position(|&(addr, _)| addr == dram::REG_AUTO_REFRESH)
            .expect("auto-refresh was never disabled");
        let doorbell = writes
            .iter()
            .position(|&(addr, _)| addr == scmi::MBOX_DOORBELL)
            .expect("handoff doorbell never rang");
        assert!(refresh_off < doorbell);

        timer::reset_saved_state();
        SYSREGS.lock().unwrap().reset();
    }
}
