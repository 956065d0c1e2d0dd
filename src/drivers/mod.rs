/*
 * Hardware Drivers
 *
 * Driver categories this core actually uses (spec §6):
 * - serial: COM2 UART, the logger's sink
 * - intctl: PIC8259/IO-APIC abstraction behind `IntCtlDriver`
 * - timer: PIT, RTC, Local APIC timer, behind `TimerDriver`
 * - cmos: CMOS/RTC register access backing `timer::rtc`
 *
 * `display`/`input`/`system` are the teacher's framebuffer, keyboard and
 * legacy PIC/PIT modules; kept on disk pending the final trim (see
 * `DESIGN.md`) but not part of this tree — this core has no console or
 * keyboard surface in scope.
 */

pub mod cmos;
pub mod intctl;
pub mod serial;
pub mod timer;
