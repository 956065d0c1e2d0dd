/*
 * Kernel-wide Compile-time Configuration
 *
 * Centralizes the constants that used to be scattered across individual
 * modules (e.g. `THREAD_STACK_SIZE` and `MAX_THREADS` previously lived at
 * the top of `scheduler/mod.rs`). Keeping them here lets the scheduler,
 * interrupt dispatcher and timer pipeline agree on the same numbers
 * without importing each other.
 */

/// Number of scheduler priority levels, 0 (highest) ..= 63 (lowest).
pub const NUM_PRIORITIES: usize = 64;

/// Lowest possible priority value, reserved for each CPU's idle thread.
pub const IDLE_PRIORITY: u8 = (NUM_PRIORITIES - 1) as u8;

/// Upper bound on the number of CPU cores this build supports.
pub const MAX_CPUS: usize = 32;

/// Upper bound on live threads. The teacher used a flat `Vec`; we size the
/// TCB arena up front so handle allocation can stay O(1) amortized.
pub const MAX_THREADS: usize = 4096;

/// Default kernel-thread stack size in bytes.
pub const KERNEL_STACK_SIZE: usize = 64 * 1024;

/// Default user-thread stack size in bytes.
pub const USER_STACK_SIZE: usize = 256 * 1024;

/// IRQ base vector for the legacy PIC remap (spec §6 default).
pub const PIC_IRQ_BASE: u8 = 0x30;

/// Scheduler software interrupt vector (spec §6).
pub const SCHED_SOFTIRQ_VECTOR: u8 = 0x40;

/// Panic vector, distinct from every IRQ and the scheduler softirq.
pub const PANIC_VECTOR: u8 = 0x41;

/// LAPIC spurious-interrupt vector (configurable per spec §6; this is the
/// default used when nothing else claims it).
pub const LAPIC_SPURIOUS_VECTOR: u8 = 0xFF;

/// Main timer tick rate in Hz. 100 Hz gives a 10 ms scheduler quantum,
/// matching the teacher's existing PIT/timer assumptions.
pub const TIMER_HZ: u32 = 100;

/// isa-debug-exit style port used to signal hypervisor shutdown from test
/// builds (spec §6).
pub const HYPERVISOR_EXIT_PORT: u16 = 0x604;

/// Word written to [`HYPERVISOR_EXIT_PORT`] to request shutdown.
pub const HYPERVISOR_EXIT_CODE: u16 = 0x2000;
