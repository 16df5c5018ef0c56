// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! System counter bring-up, and the save/restore pair used around suspend.
//!
//! The saved state is a single process-wide slot: suspend cycles never nest,
//! so a second save before a restore is a contract violation rather than
//! something to generalize into a stack.

use crate::{mmio::RegisterBus, platform, sysregs};
use spin::mutex::SpinMutex;

// Counter control frame registers.
const CNTCR: usize = platform::CNTC_BASE;
const CNTCVL: usize = platform::CNTC_BASE + 0x08;
const CNTCVU: usize = platform::CNTC_BASE + 0x0C;
const CNTFID0: usize = platform::CNTC_BASE + 0x20;

/// Counter enable bit of the counter control register.
const CNTCR_EN: u32 = 1 << 0;

/// Frequency change request for the given frequency table entry.
const fn cntcr_fcreq(entry: u32) -> u32 {
    1 << (8 + entry)
}

/// Snapshot of the system counter taken before suspend.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct SavedTimerState {
    count: u64,
    freq_id: u32,
}

static SAVED_TIMER_STATE: SpinMutex<Option<SavedTimerState>> = SpinMutex::new(None);

/// Programs the canonical counter frequency into both the register-based and
/// memory-mapped views, then enables the system counter.
///
/// Runs once during platform bring-up.
pub fn init<B: RegisterBus>(bus: &B) {
    sysregs::write_cntfrq_el0(u64::from(platform::SYSCNT_FREQ_HZ));
    bus.write32(CNTFID0, platform::SYSCNT_FREQ_HZ);
    bus.write32(CNTCR, cntcr_fcreq(0) | CNTCR_EN);
}

/// Captures the physical counter and the frequency-id register into the
/// saved-state slot.
///
/// Panics if a previous save has not been restored.
pub fn save_state<B: RegisterBus>(bus: &B) {
    let state = SavedTimerState {
        count: sysregs::read_cntpct_el0(),
        freq_id: bus.read32(CNTFID0),
    };

    let mut slot = SAVED_TIMER_STATE.lock();
    assert!(slot.is_none(), "timer state already saved");
    *slot = Some(state);
}

/// Restores the system counter from the saved-state slot and re-enables it.
///
/// Called on the resume path after wake-up. Panics if nothing was saved.
pub fn restore_state<B: RegisterBus>(bus: &B) {
    let state = SAVED_TIMER_STATE
        .lock()
        .take()
        .expect("no saved timer state to restore");

    // Stop the counter before rewriting its value.
    bus.write32(CNTCR, 0);

    bus.write32(CNTCVL, state.count as u32);
    bus.write32(CNTCVU, (state.count >> 32) as u32);
    bus.write32(CNTFID0, state.freq_id);

    sysregs::write_cntfrq_el0(u64::from(platform::SYSCNT_FREQ_HZ));
    bus.write32(CNTCR, cntcr_fcreq(0) | CNTCR_EN);
}

/// Empties the saved-state slot, for tests which abandon a suspend mid-way.
#[cfg(test)]
pub(crate) fn reset_saved_state() {
    *SAVED_TIMER_STATE.lock() = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mmio::fake::FakeBus,
        sysregs::fake::{SYSREGS, exclusive},
    };
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[test]
    fn counter_init_programs_frequency() {
        let _exclusive = exclusive();
        SYSREGS.lock().unwrap().reset();

        let bus = FakeBus::new();
        init(&bus);

        assert_eq!(
            SYSREGS.lock().unwrap().cntfrq_el0,
            u64::from(platform::SYSCNT_FREQ_HZ)
        );
        assert_eq!(bus.get(CNTFID0), platform::SYSCNT_FREQ_HZ);
        assert_eq!(bus.get(CNTCR), cntcr_fcreq(0) | CNTCR_EN);

        SYSREGS.lock().unwrap().reset();
    }

    #[test]
    fn saved_state_lifecycle() {
        let _exclusive = exclusive();
        SYSREGS.lock().unwrap().reset();
        reset_saved_state();

        let count = 0x1_2345_6789_ABCD;
        {
            let mut regs = SYSREGS.lock().unwrap();
            regs.cntpct_el0 = count;
            regs.cntpct_step = 0;
        }
        let bus = FakeBus::new();
        bus.set(CNTFID0, 0x00FE_502A);

        save_state(&bus);

        // Nesting is a contract violation.
        let nested = catch_unwind(AssertUnwindSafe(|| save_state(&bus)));
        assert!(nested.is_err());

        bus.clear_log();
        restore_state(&bus);

        assert_eq!(
            bus.writes(),
            vec![
                (CNTCR, 0),
                (CNTCVL, 0x6789_ABCD),
                (CNTCVU, 0x0001_2345),
                (CNTFID0, 0x00FE_502A),
                (CNTCR, cntcr_fcreq(0) | CNTCR_EN),
            ]
        );
        assert_eq!(
            SYSREGS.lock().unwrap().cntfrq_el0,
            u64::from(platform::SYSCNT_FREQ_HZ)
        );

        // Restoring again without a save is a contract violation.
        let unsaved = catch_unwind(AssertUnwindSafe(|| restore_state(&bus)));
        assert!(unsaved.is_err());

        SYSREGS.lock().unwrap().reset();
    }
}
