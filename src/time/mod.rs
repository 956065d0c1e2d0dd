/*
 * Time Manager (spec §2 "Time Manager", §4.4)
 *
 * Owns a *main* timer (tick-driver), an optional *RTC* (wall-clock) and
 * an optional *auxiliary* timer; accumulates monotonic uptime; drives the
 * scheduler tick; implements the pre-scheduler busy-wait.
 *
 * Grounded in `utils/timer.rs` (`UPTIME_MS`/`SCHEDULER_TICKS` globals,
 * `on_timer_interrupt`, `sleep_ms`'s busy-wait shape) and
 * `utils/system/timer.rs`, generalized from "there is exactly one PIT"
 * to the three-role model spec §4.4 describes, each a
 * `drivers::timer::TimerDriver` trait object.
 *
 * Ordering guarantee (spec §4.4): `uptime` is monotonic non-decreasing as
 * observed by any single CPU; a single global `AtomicU64` gives that for
 * free, and every reader uses `Ordering::Acquire`/writer `Release` so a
 * tick increment is visible no later than the next `eoi` barrier.
 */

use alloc::boxed::Box;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use crate::drivers::timer::rtc::{Rtc, WallClock};
use crate::drivers::timer::TimerDriver;
use crate::error::{KernelError, KernelResult};

static UPTIME_MS: AtomicU64 = AtomicU64::new(0);
static TICK_COUNT: AtomicU64 = AtomicU64::new(0);

static MAIN_DRIVER: Mutex<Option<Box<dyn TimerDriver>>> = Mutex::new(None);
static RTC_DRIVER: Mutex<Option<Rtc>> = Mutex::new(None);
static AUX_DRIVER: Mutex<Option<Box<dyn TimerDriver>>> = Mutex::new(None);

/// Milliseconds added to `uptime` per main-timer tick; derived from
/// `config::TIMER_HZ`, the frequency `init` programs the main driver to.
const MS_PER_TICK: u64 = 1000 / crate::config::TIMER_HZ as u64;

/// Rejects a NULL main driver (spec §4.4 "init rejects a NULL main
/// driver"); RTC and aux are optional. Installs each driver's own
/// tick-processing callback and enables it.
pub fn init(
    main: Option<Box<dyn TimerDriver>>,
    rtc: Option<Rtc>,
    aux: Option<Box<dyn TimerDriver>>,
) -> KernelResult<()> {
    let mut main = main.ok_or(KernelError::NullPointer)?;
    main.set_freq(crate::config::TIMER_HZ)?;
    main.set_handler(on_main_tick);
    main.enable()?;
    *MAIN_DRIVER.lock() = Some(main);

    if let Some(mut rtc) = rtc {
        rtc.enable()?;
        *RTC_DRIVER.lock() = Some(rtc);
    }

    if let Some(mut aux) = aux {
        aux.set_handler(super::drivers::timer::dummy_handler);
        *AUX_DRIVER.lock() = Some(aux);
    }

    log::info!("time manager initialized: main @ {} Hz", crate::config::TIMER_HZ);
    Ok(())
}

/// Installs/replaces the auxiliary timer's user handler (spec §4.4
/// "Auxiliary: user-attached handler, no scheduler interaction").
pub fn set_aux_handler(handler: crate::drivers::timer::TickHandler) -> KernelResult<()> {
    let mut aux = AUX_DRIVER.lock();
    let driver = aux.as_mut().ok_or(KernelError::NoSuchId)?;
    driver.set_handler(handler);
    Ok(())
}

/// The main timer's tick-processing callback (spec §4.4 "Main" role).
/// Installed via `TimerDriver::set_handler`; invoked by the driver's own
/// interrupt entry point (e.g. `Pit::on_tick`) on every tick.
fn on_main_tick() {
    UPTIME_MS.fetch_add(MS_PER_TICK, Ordering::Release);
    TICK_COUNT.fetch_add(1, Ordering::Release);

    let now = uptime_ms();
    let mut expired = alloc::vec::Vec::new();
    crate::scheduler::sched_core::SLEEP_QUEUE.drain_expired(now, &mut expired);
    for tid in expired {
        crate::scheduler::wake_one(tid);
    }

    if let Some(irq) = MAIN_DRIVER.lock().as_ref().and_then(|d| d.get_irq()) {
        let _ = crate::interrupts::set_irq_eoi(irq);
    }

    if crate::scheduler::scheduler_enabled() {
        crate::scheduler::schedule();
    }
}

/// Monotonic uptime in milliseconds since boot.
pub fn uptime_ms() -> u64 {
    UPTIME_MS.load(Ordering::Acquire)
}

pub fn tick_count() -> u64 {
    TICK_COUNT.load(Ordering::Acquire)
}

/// Pre-scheduler busy-wait (spec §4.4 "the pre-scheduler `wait_no_sched`
/// busy-polls `uptime`; once the scheduler runs, it must not be used").
pub fn wait_no_sched(ms: u64) {
    debug_assert!(
        !crate::scheduler::scheduler_enabled(),
        "wait_no_sched must not be used once the scheduler is running"
    );
    let start = uptime_ms();
    while uptime_ms() - start < ms {
        unsafe { core::arch::asm!("hlt", options(nomem, nostack)) };
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WallTime {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

/// Snapshot of the cached wall clock, refreshed on every RTC tick. Used
/// by the panic path (spec §4.7 "the wall time of panic").
pub fn wall_clock_now() -> WallTime {
    let WallClock { hours, minutes, seconds, .. } = RTC_DRIVER
        .lock()
        .as_ref()
        .map(|_| crate::drivers::timer::rtc::cached())
        .unwrap_or_default();
    WallTime { hours, minutes, seconds }
}

/// Serializes every unit test that drives a tick through [`test_tick`] or
/// drains `sched_core::SLEEP_QUEUE` directly: both touch the single global
/// `UPTIME_MS`/sleep queue shared by every test in the binary.
#[cfg(test)]
pub(crate) static TEST_TIME_LOCK: spin::Mutex<()> = spin::Mutex::new(());

/// Exercises `on_main_tick`'s non-driver-owned half (uptime/tick-count
/// advance, sleep-queue drain, conditional reschedule) from a unit test,
/// without a real timer driver installed. `MAIN_DRIVER` is `None` in test
/// builds, so the EOI step is skipped, and `scheduler::scheduler_enabled()`
/// is never set by `kernel_kickstart` in a unit test, so the final
/// `schedule()` call never happens either.
#[cfg(test)]
pub(crate) fn test_tick() {
    on_main_tick();
}
