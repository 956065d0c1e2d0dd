/*
 * Timer-Source Driver Interface (spec §4.4, §2 "Timer-Source Driver
 * Interface")
 *
 * A polymorphic handle exposing `get_freq`/`set_freq`/`enable`/`disable`/
 * `set_handler`/`remove_handler`/`get_irq`. Implementations: PIT, RTC,
 * LAPIC-timer. Mirrors the shape of `drivers::intctl::IntCtlDriver`
 * (trait object, one explicitly-constructed singleton per active role),
 * generalized for the three driver roles `time::TimeManager` assigns
 * (main/RTC/auxiliary, spec §4.4).
 *
 * The teacher's closest analogue is `drivers::system::pic::init_pit`, a
 * free function hard-coding a single PIT instance; this trait lets
 * `time::TimeManager` treat PIT, RTC and the Local-APIC timer uniformly.
 */

pub mod lapic;
pub mod pit;
pub mod rtc;

use crate::error::KernelResult;

/// The function the timer calls on every tick once a handler has been
/// installed. Takes no arguments; the handler reads whatever driver
/// state it needs (the "dummy" handler installed before `time::init` just
/// EOIs and does nothing else, spec Design Notes).
pub type TickHandler = fn();

/// Capability set every timer-source driver implementation exposes.
pub trait TimerDriver: Send {
    /// Current tick frequency in Hz.
    fn get_freq(&self) -> u32;

    /// Reprograms the tick frequency. Returns `not-supported` if the
    /// hardware cannot hit `hz` exactly (callers should pick a divisor
    /// the driver can satisfy).
    fn set_freq(&mut self, hz: u32) -> KernelResult<()>;

    fn enable(&mut self) -> KernelResult<()>;

    fn disable(&mut self) -> KernelResult<()>;

    /// Installs the function called on every tick. Replaces the
    /// driver's "dummy" EOI-only handler.
    fn set_handler(&mut self, handler: TickHandler);

    /// Reverts to the dummy handler (still EOIs, does nothing else) —
    /// load-bearing so a tick that fires between `remove_handler` and
    /// the next `set_handler` still acknowledges the interrupt.
    fn remove_handler(&mut self);

    /// The IRQ line this driver delivers on, if any (the Local-APIC
    /// timer has none in the `drivers::intctl` sense — it delivers
    /// straight to its own LVT vector).
    fn get_irq(&self) -> Option<u8>;

    fn name(&self) -> &'static str;
}

/// The no-op handler every driver installs at construction time (spec
/// Design Notes, "Dummy/initial handlers"): if a tick fires before
/// `time::init` installs the real scheduler-tick callback, the EOI still
/// has to happen. Each driver's interrupt entry point calls
/// `set_irq_eoi`/`apic::eoi` itself regardless of which handler is
/// installed; this function is the installed handler's body, which does
/// nothing beyond that.
pub fn dummy_handler() {}
