// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! DRAM controller self-refresh entry, executed on the way into
//! suspend-to-RAM.
//!
//! The whole sequence runs from retained memory: it revokes SDRAM access
//! mid-way, so no code fetch or data access may touch external DRAM until the
//! system-control processor later powers it back up. Steps are strictly
//! ordered and the controller serializes one in-flight command at a time.

use crate::{mmio::RegisterBus, platform, sysregs};
use core::sync::atomic::{AtomicU32, Ordering};

// DRAM controller registers.
const REG_CONFIG_ACCESS: usize = platform::DRAMC_BASE + 0x100;
const REG_SDRAM_ACCESS: usize = platform::DRAMC_BASE + 0x200;
pub(crate) const REG_AUTO_REFRESH: usize = platform::DRAMC_BASE + 0x204;
const REG_COMMAND: usize = platform::DRAMC_BASE + 0x208;
const REG_COMMAND_BUSY: usize = platform::DRAMC_BASE + 0x210;
const REG_CALIBRATION: usize = platform::DRAMC_BASE + 0x424;
const REG_DFI_MASTERSHIP: usize = platform::DRAMC_BASE + 0x520;
const REG_FLUSH_REQUEST: usize = platform::DRAMC_BASE + 0x940;
pub(crate) const REG_FLUSH_STATUS: usize = platform::DRAMC_BASE + 0x980;

/// Command queue flush completed.
pub(crate) const FLUSH_COMPLETE: u32 = 1 << 0;

/// Unlock key for configuration register writes.
const CONFIG_WRITE_ENABLE: u32 = 0x0000_1234;
const CONFIG_WRITE_DISABLE: u32 = 0x0000_0000;

/// PHY-mastership acknowledge enable; cleared to hand control to software.
const DFI_MASTERSHIP_ACK_EN: u32 = 1 << 0;

// Manual command encoding: opcode, channel/rank selection and argument.
const CMD_OPCODE_PRECHARGE_ALL: u32 = 0x04 << 24;
const CMD_OPCODE_POWER_DOWN: u32 = 0x08 << 24;
const CMD_OPCODE_SELF_REFRESH: u32 = 0x0A << 24;
const CMD_OPCODE_MODE_REGISTER_WRITE: u32 = 0x0E << 24;
const CMD_CHANNEL_ALL: u32 = 0x0080_0000;
const CMD_RANK_ALL: u32 = 0x0004_0000;
const CMD_ARG_ALL_BANKS: u32 = 0x0000_0010;
const CMD_ARG_ENTER: u32 = 0x0000_0000;
/// Mode register 11 written with zero, disabling on-die termination.
const CMD_ARG_MRW_ODT_DISABLE: u32 = 0x0000_0B00;

/// Default bound on a single command-queue flush wait before the stall
/// workaround runs, in microseconds.
///
/// Hardware-revision specific; override through [`SelfRefreshConfig`].
pub const DEFAULT_FLUSH_TIMEOUT_US: u64 = 1_000;

const MICROSECONDS_PER_SECOND: u64 = 1_000_000;

/// Tuning parameters for the self-refresh entry sequence.
pub struct SelfRefreshConfig {
    /// Elapsed time after which a pending flush is considered stalled and the
    /// dummy-write workaround is applied.
    pub flush_timeout_us: u64,
}

impl SelfRefreshConfig {
    /// The production configuration.
    pub const DEFAULT: Self = Self {
        flush_timeout_us: DEFAULT_FLUSH_TIMEOUT_US,
    };
}

impl Default for SelfRefreshConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Scratch word backed by SDRAM. Only ever toggled: a write through to the
/// SDRAM unsticks a stalled controller flush. The value itself is never read
/// for meaning.
static DUMMY_SDRAM: AtomicU32 = AtomicU32::new(0xAAAA_AAAA);

/// Puts the SDRAM into self-refresh and powers the interface down.
///
/// On hardware this must execute from retained memory (see
/// [`sram`](crate::sram)); after step three no access to external DRAM may
/// occur until resume.
#[cfg_attr(not(test), unsafe(link_section = ".retained.text"))]
#[inline(never)]
pub fn enter_self_refresh<B: RegisterBus>(bus: &B, config: &SelfRefreshConfig) {
    bus.write32(REG_CONFIG_ACCESS, CONFIG_WRITE_ENABLE);

    // Hand PHY mastership fully to software.
    bus.clear_bits32(REG_DFI_MASTERSHIP, DFI_MASTERSHIP_ACK_EN);

    // Disable SDRAM access and flush the controller's outstanding commands.
    bus.write32(REG_SDRAM_ACCESS, 0);
    bus.write32(REG_FLUSH_REQUEST, 1);
    wait_for_flush(bus, config);

    bus.write32(REG_CALIBRATION, 0);

    issue_command(
        bus,
        CMD_OPCODE_PRECHARGE_ALL | CMD_CHANNEL_ALL | CMD_RANK_ALL | CMD_ARG_ALL_BANKS,
    );
    issue_command(
        bus,
        CMD_OPCODE_SELF_REFRESH | CMD_CHANNEL_ALL | CMD_RANK_ALL | CMD_ARG_ENTER,
    );
    issue_command(
        bus,
        CMD_OPCODE_MODE_REGISTER_WRITE | CMD_CHANNEL_ALL | CMD_RANK_ALL | CMD_ARG_MRW_ODT_DISABLE,
    );
    issue_command(
        bus,
        CMD_OPCODE_POWER_DOWN | CMD_CHANNEL_ALL | CMD_RANK_ALL | CMD_ARG_ENTER,
    );

    bus.write32(REG_AUTO_REFRESH, 0);

    // One status read satisfies the controller's power-down settle time.
    let _ = bus.read32(REG_COMMAND_BUSY);

    bus.write32(REG_CONFIG_ACCESS, CONFIG_WRITE_DISABLE);
}

/// Waits for the command-queue flush to complete, measuring elapsed time with
/// the generic timer.
///
/// A flush exceeding the configured bound is assumed stalled (a documented,
/// rare controller erratum): access is briefly re-enabled, the SDRAM-backed
/// scratch word is toggled to unstick the queue, and the flush is requested
/// again with a fresh time base. Retries are unbounded; each one is itself
/// time-bounded and measured.
#[cfg_attr(not(test), unsafe(link_section = ".retained.text"))]
fn wait_for_flush<B: RegisterBus>(bus: &B, config: &SelfRefreshConfig) {
    let freq = sysregs::read_cntfrq_el0();
    let mut base_count = sysregs::read_cntpct_el0();

    while bus.read32(REG_FLUSH_STATUS) & FLUSH_COMPLETE != FLUSH_COMPLETE {
        let elapsed_ticks = sysregs::read_cntpct_el0().wrapping_sub(base_count);
        let elapsed_us = elapsed_ticks * MICROSECONDS_PER_SECOND / freq;

        if elapsed_us > config.flush_timeout_us {
            // Stop flushing and let one dummy access drain through.
            bus.write32(REG_FLUSH_REQUEST, 0);
            bus.write32(REG_SDRAM_ACCESS, 1);

            DUMMY_SDRAM.fetch_xor(u32::MAX, Ordering::SeqCst);

            bus.write32(REG_SDRAM_ACCESS, 0);
            bus.write32(REG_FLUSH_REQUEST, 1);

            base_count = sysregs::read_cntpct_el0();
        }
    }
}

/// Issues one manual command and waits for it to complete. The controller
/// accepts a single in-flight command.
#[cfg_attr(not(test), unsafe(link_section = ".retained.text"))]
fn issue_command<B: RegisterBus>(bus: &B, command: u32) {
    bus.write32(REG_COMMAND, command);
    bus.poll_until_clear32(REG_COMMAND_BUSY, u32::MAX);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mmio::fake::FakeBus,
        sysregs::fake::{SYSREGS, exclusive},
    };

    /// One fake counter tick per microsecond keeps the arithmetic readable.
    fn one_tick_per_microsecond(step: u64) {
        let mut regs = SYSREGS.lock().unwrap();
        regs.reset();
        regs.cntfrq_el0 = MICROSECONDS_PER_SECOND;
        regs.cntpct_step = step;
    }

    fn expected_tail() -> Vec<(usize, u32)> {
        vec![
            (REG_CALIBRATION, 0),
            (
                REG_COMMAND,
                CMD_OPCODE_PRECHARGE_ALL | CMD_CHANNEL_ALL | CMD_RANK_ALL | CMD_ARG_ALL_BANKS,
            ),
            (
                REG_COMMAND,
                CMD_OPCODE_SELF_REFRESH | CMD_CHANNEL_ALL | CMD_RANK_ALL | CMD_ARG_ENTER,
            ),
            (
                REG_COMMAND,
                CMD_OPCODE_MODE_REGISTER_WRITE
                    | CMD_CHANNEL_ALL
                    | CMD_RANK_ALL
                    | CMD_ARG_MRW_ODT_DISABLE,
            ),
            (
                REG_COMMAND,
                CMD_OPCODE_POWER_DOWN | CMD_CHANNEL_ALL | CMD_RANK_ALL | CMD_ARG_ENTER,
            ),
            (REG_AUTO_REFRESH, 0),
            (REG_CONFIG_ACCESS, CONFIG_WRITE_DISABLE),
        ]
    }

    #[test]
    fn sequence_is_exact_when_flush_completes_in_time() {
        let _exclusive = exclusive();
        one_tick_per_microsecond(1);

        let bus = FakeBus::new();
        bus.set(REG_FLUSH_STATUS, FLUSH_COMPLETE);

        enter_self_refresh(&bus, &SelfRefreshConfig::DEFAULT);

        let mut expected = vec![
            (REG_CONFIG_ACCESS, CONFIG_WRITE_ENABLE),
            (REG_DFI_MASTERSHIP, 0),
            (REG_SDRAM_ACCESS, 0),
            (REG_FLUSH_REQUEST, 1),
        ];
        expected.extend(expected_tail());
        assert_eq!(bus.writes(), expected);

        SYSREGS.lock().unwrap().reset();
    }

    #[test]
    fn stalled_flush_triggers_dummy_write_workaround() {
        let _exclusive = exclusive();
        // Each counter read advances well past the threshold.
        one_tick_per_microsecond(DEFAULT_FLUSH_TIMEOUT_US + 1);

        let bus = FakeBus::new();
        // Stalled once, complete after the workaround.
        bus.script_reads(REG_FLUSH_STATUS, [0, FLUSH_COMPLETE]);

        let before = DUMMY_SDRAM.load(Ordering::SeqCst);
        enter_self_refresh(&bus, &SelfRefreshConfig::DEFAULT);
        assert_eq!(DUMMY_SDRAM.load(Ordering::SeqCst), !before);

        let mut expected = vec![
            (REG_CONFIG_ACCESS, CONFIG_WRITE_ENABLE),
            (REG_DFI_MASTERSHIP, 0),
            (REG_SDRAM_ACCESS, 0),
            (REG_FLUSH_REQUEST, 1),
            // The stall workaround cycle.
            (REG_FLUSH_REQUEST, 0),
            (REG_SDRAM_ACCESS, 1),
            (REG_SDRAM_ACCESS, 0),
            (REG_FLUSH_REQUEST, 1),
        ];
        expected.extend(expected_tail());
        assert_eq!(bus.writes(), expected);

        SYSREGS.lock().unwrap().reset();
    }

    #[test]
    fn fast_flush_never_runs_the_workaround() {
        let _exclusive = exclusive();
        one_tick_per_microsecond(1);

        let bus = FakeBus::new();
        bus.script_reads(REG_FLUSH_STATUS, [0, 0, 0, FLUSH_COMPLETE]);

        let before = DUMMY_SDRAM.load(Ordering::SeqCst);
        enter_self_refresh(&bus, &SelfRefreshConfig::DEFAULT);
        assert_eq!(DUMMY_SDRAM.load(Ordering::SeqCst), before);

        let writes = bus.writes();
        assert!(!writes.contains(&(REG_SDRAM_ACCESS, 1)));

        SYSREGS.lock().unwrap().reset();
    }
}
