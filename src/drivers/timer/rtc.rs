/*
 * Real-Time Clock (RTC) Driver (spec §4.4, §6 "CMOS")
 *
 * The *RTC* role (spec §4.4): wall-clock updater. On each tick, decodes
 * CMOS BCD-or-binary date registers, converts to 24-hour time, and
 * caches the resulting date/time for `time::TimeManager` to serve
 * without re-touching the hardware on every query.
 *
 * Enables IRQ8 by setting bit 6 of CMOS status register B and selects a
 * tick rate in register A's low nibble; frequency = 32768 Hz >> (rate -
 * 1), per spec §6.
 */

use spin::Mutex;

use crate::drivers::cmos;
use crate::error::{KernelError, KernelResult};

use super::{dummy_handler, TickHandler, TimerDriver};

pub const IRQ: u8 = 8;

const BASE_FREQ: u32 = 32768;
/// Status register B bit 6: periodic-interrupt-enable.
const STATUS_B_PIE: u8 = 1 << 6;

#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub day: u8,
    pub month: u8,
    pub year: u8,
}

static CACHED: Mutex<WallClock> = Mutex::new(WallClock {
    seconds: 0,
    minutes: 0,
    hours: 0,
    day: 0,
    month: 0,
    year: 0,
});

pub fn cached() -> WallClock {
    *CACHED.lock()
}

fn rate_to_freq(rate: u8) -> u32 {
    if rate < 3 || rate > 15 {
        return 0;
    }
    BASE_FREQ >> (rate - 1)
}

fn freq_to_rate(hz: u32) -> Option<u8> {
    (3u8..=15).find(|&rate| rate_to_freq(rate) == hz)
}

pub struct Rtc {
    rate: u8,
    enabled: bool,
    handler: TickHandler,
}

impl Rtc {
    pub const fn new() -> Self {
        Self {
            rate: 6, // 1024 Hz default, matches typical BIOS defaults
            enabled: false,
            handler: dummy_handler,
        }
    }

    fn apply_rate(&self) {
        let prev = cmos::read_register(cmos::REG_STATUS_A);
        cmos::write_register(cmos::REG_STATUS_A, (prev & 0xF0) | self.rate);
    }

    /// Interrupt entry point for IRQ8. Refreshes the cached wall clock and
    /// invokes the installed handler; reading status register C is
    /// mandatory on real hardware to re-arm the next interrupt.
    pub fn on_tick(&self) {
        let _ = cmos::read_register(cmos::REG_STATUS_C);
        let raw = cmos::read_date_time_raw();
        let status_b = cmos::read_register(cmos::REG_STATUS_B);
        let (seconds, minutes, hours, day, month, year) = cmos::decode(raw, status_b);
        *CACHED.lock() = WallClock {
            seconds,
            minutes,
            hours,
            day,
            month,
            year,
        };
        (self.handler)();
    }
}

impl TimerDriver for Rtc {
    fn get_freq(&self) -> u32 {
        rate_to_freq(self.rate)
    }

    fn set_freq(&mut self, hz: u32) -> KernelResult<()> {
        let rate = freq_to_rate(hz).ok_or(KernelError::NotSupported)?;
        self.rate = rate;
        if self.enabled {
            self.apply_rate();
        }
        Ok(())
    }

    fn enable(&mut self) -> KernelResult<()> {
        self.apply_rate();
        let prev = cmos::read_register(cmos::REG_STATUS_B);
        cmos::write_register(cmos::REG_STATUS_B, prev | STATUS_B_PIE);
        crate::drivers::intctl::set_mask(IRQ, true)?;
        self.enabled = true;
        Ok(())
    }

    fn disable(&mut self) -> KernelResult<()> {
        let prev = cmos::read_register(cmos::REG_STATUS_B);
        cmos::write_register(cmos::REG_STATUS_B, prev & !STATUS_B_PIE);
        crate::drivers::intctl::set_mask(IRQ, false)?;
        self.enabled = false;
        Ok(())
    }

    fn set_handler(&mut self, handler: TickHandler) {
        self.handler = handler;
    }

    fn remove_handler(&mut self) {
        self.handler = dummy_handler;
    }

    fn get_irq(&self) -> Option<u8> {
        Some(IRQ)
    }

    fn name(&self) -> &'static str {
        "CMOS RTC"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_freq_roundtrip() {
        for rate in 3u8..=15 {
            let hz = rate_to_freq(rate);
            assert_eq!(freq_to_rate(hz), Some(rate));
        }
    }
}
