/*
 * CPU-local State (spec §2 "CPU-local state", §4.1 interrupt-disable depth)
 *
 * Per-core identity, the current interrupt-nesting count, and a pointer to
 * the thread currently running on this core. Grounded in the teacher's
 * `scheduler::types::CpuId` and `scheduler::sched_core::PerCpuSchedState`,
 * which already modeled "one state block per CPU" for the dispatch layer;
 * this module provides the lower-level slot those structures sit on top
 * of, indexed by the CPU identity function the Design Notes call for.
 *
 * This kernel targets i386 (no `GS`-relative thread-local storage of the
 * kind the long-mode teacher used); CPU-local slots are instead a fixed
 * array indexed by APIC ID, looked up through the Local APIC ID register
 * at the few call sites that need "who am I" before the scheduler itself
 * is running.
 */

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::config::MAX_CPUS;
use crate::scheduler::thread::ThreadId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CpuId(pub u32);

impl CpuId {
    pub const BSP: CpuId = CpuId(0);

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// One slot per possible CPU. `running_thread` is `None` before the
/// scheduler has elected anything for that core (e.g. during early boot).
struct CpuLocal {
    present: AtomicU32,
    int_disable_depth: AtomicUsize,
    running_thread: AtomicUsize, // encodes Option<ThreadId> as 0 = none, id+1 otherwise
}

const INIT_SLOT: CpuLocal = CpuLocal {
    present: AtomicU32::new(0),
    int_disable_depth: AtomicUsize::new(0),
    running_thread: AtomicUsize::new(0),
};

static CPUS: [CpuLocal; MAX_CPUS] = [INIT_SLOT; MAX_CPUS];

/// Mark a CPU as present in the table. Called once per core during SMP
/// bring-up.
pub fn register_cpu(id: CpuId) {
    CPUS[id.as_usize()].present.store(1, Ordering::Release);
}

pub fn is_registered(id: CpuId) -> bool {
    CPUS[id.as_usize()].present.load(Ordering::Acquire) != 0
}

/// Identify the current core via the Local APIC ID register (falls back to
/// the BSP if the APIC hasn't been brought up yet, e.g. during very early
/// boot before `drivers::intctl` has chosen a controller).
pub fn current_id() -> CpuId {
    match crate::drivers::intctl::apic::current_lapic_id() {
        Some(id) => CpuId(id as u32),
        None => CpuId::BSP,
    }
}

/// Disables interrupts on this CPU, incrementing the nesting depth, and
/// returns the *previous* hardware interrupt-enable flag so the caller can
/// hand it to [`restore_interrupts`]. Only the outermost `restore` (depth
/// reaching zero) actually re-enables interrupts in hardware.
pub fn disable_interrupts() -> bool {
    let was_enabled = interrupts_enabled_hw();
    // `cli` is a privileged instruction (GPF outside ring 0); under
    // `cargo test` this code runs as an ordinary ring-3 host process, so
    // only the depth bookkeeping happens there, not the real instruction.
    #[cfg(not(test))]
    unsafe {
        core::arch::asm!("cli", options(nomem, nostack, preserves_flags));
    }
    let cpu = &CPUS[current_id().as_usize()];
    cpu.int_disable_depth.fetch_add(1, Ordering::AcqRel);
    was_enabled
}

/// Restores interrupts given the `prev_int_state` returned by the disable
/// that opened this nesting level.
pub fn restore_interrupts(prev_int_state: bool) {
    let cpu = &CPUS[current_id().as_usize()];
    let depth = cpu.int_disable_depth.fetch_sub(1, Ordering::AcqRel);
    debug_assert!(depth > 0, "interrupt-disable depth underflow");
    if depth == 1 && prev_int_state {
        #[cfg(not(test))]
        unsafe {
            core::arch::asm!("sti", options(nomem, nostack, preserves_flags));
        }
    }
}

pub fn interrupt_disable_depth() -> usize {
    CPUS[current_id().as_usize()]
        .int_disable_depth
        .load(Ordering::Acquire)
}

#[cfg(not(test))]
fn interrupts_enabled_hw() -> bool {
    let flags: u32;
    unsafe {
        core::arch::asm!(
            "pushfd",
            "pop {0:e}",
            out(reg) flags,
            options(nomem, preserves_flags)
        );
    }
    (flags & (1 << 9)) != 0 // EFLAGS.IF
}

/// Host test builds have no EFLAGS.IF of their own to read; every
/// `disable_interrupts` under test is treated as toggling a software-only
/// flag starting from "enabled", which is enough for the depth-counter and
/// `CriticalSection` nesting invariants the tests exercise.
#[cfg(test)]
fn interrupts_enabled_hw() -> bool {
    interrupt_disable_depth() == 0
}

/// Encodes the currently-running thread on this CPU. `None` before the
/// scheduler has elected anyone (idle-less boot window).
pub fn running_thread() -> Option<ThreadId> {
    let raw = CPUS[current_id().as_usize()]
        .running_thread
        .load(Ordering::Acquire);
    if raw == 0 {
        None
    } else {
        Some(ThreadId((raw - 1) as u32))
    }
}

pub fn set_running_thread(id: Option<ThreadId>) {
    let raw = match id {
        None => 0,
        Some(tid) => tid.0 as usize + 1,
    };
    CPUS[current_id().as_usize()]
        .running_thread
        .store(raw, Ordering::Release);
}

/// Serializes every unit test that reads or writes `running_thread` (a
/// single slot per CPU, shared by every test in the binary since
/// `current_id()` always resolves to `CpuId::BSP` without real hardware).
/// Without this, two tests setting the "current" thread concurrently would
/// stomp on each other's view of who is running.
#[cfg(test)]
pub(crate) static TEST_CPU_LOCK: spin::Mutex<()> = spin::Mutex::new(());

/// Number of CPUs that have called [`register_cpu`] so far.
pub fn cpu_count() -> usize {
    CPUS.iter()
        .filter(|c| c.present.load(Ordering::Acquire) != 0)
        .count()
}
