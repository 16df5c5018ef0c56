// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Suspend handoff to the system-control processor.
//!
//! Only the posting interface lives here; protocol handling is the
//! system-control processor firmware's concern.

use crate::{mmio::RegisterBus, platform};

const MBOX_MESSAGE: usize = platform::SCP_MBOX_BASE;
pub(crate) const MBOX_DOORBELL: usize = platform::SCP_MBOX_BASE + 0x08;

const DOORBELL_RING: u32 = 1 << 0;

/// Message code requesting system suspend.
const MSG_SYSTEM_SUSPEND: u32 = 0x0000_0004;

/// Posts the system-suspend request to the system-control processor.
///
/// Does not wait for a reply: the system-control processor completes the
/// suspend only after the calling core has parked in `wfi`. Runs from
/// retained memory, after DRAM has been quiesced.
#[cfg_attr(not(test), unsafe(link_section = ".retained.text"))]
pub fn system_suspend<B: RegisterBus>(bus: &B) {
    bus.write32(MBOX_MESSAGE, MSG_SYSTEM_SUSPEND);
    bus.write32(MBOX_DOORBELL, DOORBELL_RING);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmio::fake::FakeBus;

    #[test]
    fn suspend_request_rings_the_doorbell_last() {
        let bus = FakeBus::new();
        system_suspend(&bus);
        assert_eq!(
            bus.writes(),
            vec![
                (MBOX_MESSAGE, MSG_SYSTEM_SUSPEND),
                (MBOX_DOORBELL, DOORBELL_RING),
            ]
        );
    }
}
