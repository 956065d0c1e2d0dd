/*
 * Local-APIC Timer Driver (spec §4.4, §6 "Local APIC")
 *
 * Per-CPU one-shot/periodic timer built into each core's Local APIC.
 * Calibrated against the PIT at init (spec §6 "Timer calibrated against
 * PIT at init"): program the PIT for a known short interval, let the
 * LAPIC timer free-run over that interval, and derive ticks-per-ms from
 * however far its count register moved.
 *
 * Register access delegated to `drivers::intctl::apic` (already owns the
 * Local APIC's MMIO mapping); this module only adds the timer-specific
 * LVT/TICR/TDCR programming sequence and calibration.
 */

use crate::drivers::intctl::apic;
use crate::error::{KernelError, KernelResult};

use super::{dummy_handler, pit::Pit, TickHandler, TimerDriver};

/// Divide-by-16, a reasonable default giving a wide usable frequency
/// range without the TCCR running to zero too quickly at low rates.
const DIVIDE_BY_16: u32 = 0b0011;
const CALIBRATION_HZ: u32 = 100; // PIT one-shot duration used to calibrate

pub struct LapicTimer {
    vector: u8,
    ticks_per_ms: u32,
    freq_hz: u32,
    enabled: bool,
    handler: TickHandler,
}

impl LapicTimer {
    pub const fn new(vector: u8) -> Self {
        Self {
            vector,
            ticks_per_ms: 0,
            freq_hz: 0,
            enabled: false,
            handler: dummy_handler,
        }
    }

    /// Runs once per boot, after `apic::map_local_apic` and after the PIT
    /// has been brought up as a reference clock (spec §6 "Timer
    /// calibrated against PIT at init").
    pub fn calibrate(&mut self, pit: &Pit) {
        apic::configure_timer(DIVIDE_BY_16, u32::MAX, self.vector, false);
        pit.program_oneshot(CALIBRATION_HZ);
        let start = apic::timer_current_count();
        // Busy-wait one PIT period (~10 ms at 100 Hz); the PIT's own
        // interrupt is masked during calibration so this is a pure
        // count-register poll, not an IRQ-driven wait.
        let target_pit_ticks = 1_193_182 / CALIBRATION_HZ;
        let mut elapsed = 0u32;
        let mut last = read_pit_count();
        while elapsed < target_pit_ticks {
            let now = read_pit_count();
            elapsed = elapsed.wrapping_add(last.wrapping_sub(now) as u32);
            last = now;
        }
        let end = apic::timer_current_count();
        let lapic_ticks_elapsed = start.saturating_sub(end);
        self.ticks_per_ms = (lapic_ticks_elapsed / (1000 / CALIBRATION_HZ)).max(1);
    }
}

fn read_pit_count() -> u16 {
    use crate::io::pio::{Io, Pio};
    let mut cmd = Pio::<u8>::new(0x43);
    let mut channel0 = Pio::<u8>::new(0x40);
    unsafe { cmd.write(0x00) }; // latch channel 0
    let lo = channel0.read() as u16;
    let hi = channel0.read() as u16;
    (hi << 8) | lo
}

impl TimerDriver for LapicTimer {
    fn get_freq(&self) -> u32 {
        self.freq_hz
    }

    fn set_freq(&mut self, hz: u32) -> KernelResult<()> {
        if hz == 0 || self.ticks_per_ms == 0 {
            return Err(KernelError::NotSupported);
        }
        let period_ms = 1000 / hz;
        let initial_count = self.ticks_per_ms.saturating_mul(period_ms.max(1));
        apic::configure_timer(DIVIDE_BY_16, initial_count, self.vector, true);
        self.freq_hz = hz;
        Ok(())
    }

    fn enable(&mut self) -> KernelResult<()> {
        self.enabled = true;
        Ok(())
    }

    fn disable(&mut self) -> KernelResult<()> {
        apic::configure_timer(DIVIDE_BY_16, 0, self.vector, false);
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
        None // delivered via its own LVT vector, not the IRQ controller
    }

    fn name(&self) -> &'static str {
        "Local APIC timer"
    }
}

impl LapicTimer {
    pub fn on_tick(&self) {
        (self.handler)();
        apic::eoi();
    }
}
