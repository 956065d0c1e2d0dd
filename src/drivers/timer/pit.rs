/*
 * Programmable Interval Timer (PIT) Driver (spec §4.4, §6 "PIT")
 *
 * Command port 0x43 (mode 2 or 3), data port 0x40; quartz 1193182 Hz;
 * 16-bit frequency divisor. This is the usual *main* timer role (spec
 * §4.4) — it drives the scheduler tick.
 *
 * Grounded in the teacher's `drivers::system::pic::init_pit`, generalized
 * from a bare free function into a `TimerDriver` impl with a real
 * handler slot instead of a hard-coded IRQ0 vector in the IDT.
 */

use crate::error::{KernelError, KernelResult};
use crate::io::pio::{Io, Pio};

use super::{dummy_handler, TickHandler, TimerDriver};

const PIT_BASE_FREQ: u32 = 1_193_182;
const CMD_PORT: u16 = 0x43;
const CHANNEL0_PORT: u16 = 0x40;

/// Channel 0, access mode lo/hi, mode 3 (square wave), binary.
const MODE_SQUARE_WAVE: u8 = 0x36;
/// Channel 0, access mode lo/hi, mode 2 (rate generator), binary — used
/// for precise one-shot calibration against the Local-APIC timer.
const MODE_RATE_GENERATOR: u8 = 0x34;

pub const IRQ: u8 = 0;

pub struct Pit {
    freq_hz: u32,
    enabled: bool,
    handler: TickHandler,
}

impl Pit {
    pub const fn new() -> Self {
        Self {
            freq_hz: 0,
            enabled: false,
            handler: dummy_handler,
        }
    }

    fn program(&self, hz: u32, mode: u8) {
        let divisor: u16 = (PIT_BASE_FREQ / hz) as u16;
        let mut cmd = Pio::<u8>::new(CMD_PORT);
        let mut channel0 = Pio::<u8>::new(CHANNEL0_PORT);
        unsafe {
            cmd.write(mode);
            channel0.write((divisor & 0xFF) as u8);
            channel0.write((divisor >> 8) as u8);
        }
    }

    /// Used by `drivers::timer::lapic` to calibrate the Local-APIC timer
    /// against this known-good source.
    pub fn program_oneshot(&self, hz: u32) {
        self.program(hz, MODE_RATE_GENERATOR);
    }

    /// Interrupt entry point, called from `arch::x86::idt`'s IRQ0 stub.
    pub fn on_tick(&self) {
        (self.handler)();
    }
}

impl TimerDriver for Pit {
    fn get_freq(&self) -> u32 {
        self.freq_hz
    }

    fn set_freq(&mut self, hz: u32) -> KernelResult<()> {
        if hz == 0 || hz > PIT_BASE_FREQ {
            return Err(KernelError::OutOfBound);
        }
        self.program(hz, MODE_SQUARE_WAVE);
        self.freq_hz = hz;
        Ok(())
    }

    fn enable(&mut self) -> KernelResult<()> {
        crate::drivers::intctl::set_mask(IRQ, true)?;
        self.enabled = true;
        Ok(())
    }

    fn disable(&mut self) -> KernelResult<()> {
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
        "PIT"
    }
}
