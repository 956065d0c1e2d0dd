/*
 * Per-CPU Scheduler Core (spec §4.5 "Scheduler", §4.5 "SMP")
 *
 * One [`PerCpuSchedState`] per core: its ready set (spec's data model
 * allows either 64 buckets or one priority-ordered queue per CPU; per
 * `DESIGN.md`'s Open Question resolution this uses a single
 * `queue::HandleQueue` per CPU ordered by priority, degenerating to FIFO
 * within a priority — `HandleQueue::push_ordered` already gives exactly
 * that). The global sleep queue (one instance, not per-CPU, ordered by
 * `wakeup_time`) lives here too since every CPU's tick handler scans it.
 *
 * Lock order (spec §5): primitive-lock → target-CPU-ready-lock →
 * sleep-queue-lock. Nothing in this file ever takes the sleep-queue lock
 * before a ready-queue lock.
 */

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use alloc::vec::Vec;

use crate::atomics::Spinlock;
use crate::config::MAX_CPUS;
use crate::cpu::CpuId;
use crate::queue::HandleQueue;
use crate::scheduler::thread::ThreadId;

pub struct PerCpuSchedState {
    ready_lock: Spinlock,
    ready_queue: core::cell::UnsafeCell<HandleQueue>,
    idle_thread: AtomicUsize, // ThreadId + 1, 0 = none yet
    schedule_count: AtomicU64,
    idle_schedule_count: AtomicU64,
}

// SAFETY: `ready_queue` is only ever touched while `ready_lock` is held.
unsafe impl Sync for PerCpuSchedState {}

impl PerCpuSchedState {
    const fn new() -> Self {
        Self {
            ready_lock: Spinlock::new(),
            ready_queue: core::cell::UnsafeCell::new(HandleQueue::new()),
            idle_thread: AtomicUsize::new(0),
            schedule_count: AtomicU64::new(0),
            idle_schedule_count: AtomicU64::new(0),
        }
    }

    /// Push a now-ready thread onto this CPU's ready set, ordered by
    /// priority (lower numeric value = higher priority = popped first).
    pub fn push_ready(&self, tid: ThreadId, priority: u8) {
        self.ready_lock.spin_acquire();
        unsafe { (*self.ready_queue.get()).push_ordered(tid, priority as u64) };
        self.ready_lock.spin_release();
    }

    pub fn pop_ready(&self) -> Option<ThreadId> {
        self.ready_lock.spin_acquire();
        let next = unsafe { (*self.ready_queue.get()).pop_front() };
        self.ready_lock.spin_release();
        next
    }

    pub fn remove_ready(&self, tid: ThreadId) {
        self.ready_lock.spin_acquire();
        unsafe { (*self.ready_queue.get()).remove(tid) };
        self.ready_lock.spin_release();
    }

    pub fn ready_len(&self) -> usize {
        self.ready_lock.spin_acquire();
        let len = unsafe { (*self.ready_queue.get()).len() };
        self.ready_lock.spin_release();
        len
    }

    pub fn set_idle_thread(&self, tid: ThreadId) {
        self.idle_thread.store(tid.0 as usize + 1, Ordering::Release);
    }

    pub fn idle_thread(&self) -> Option<ThreadId> {
        let raw = self.idle_thread.load(Ordering::Acquire);
        if raw == 0 {
            None
        } else {
            Some(ThreadId((raw - 1) as u32))
        }
    }

    pub fn record_schedule(&self, elected_idle: bool) {
        self.schedule_count.fetch_add(1, Ordering::Relaxed);
        if elected_idle {
            self.idle_schedule_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn schedule_count(&self) -> u64 {
        self.schedule_count.load(Ordering::Relaxed)
    }

    pub fn idle_schedule_count(&self) -> u64 {
        self.idle_schedule_count.load(Ordering::Relaxed)
    }
}

const INIT: PerCpuSchedState = PerCpuSchedState::new();
static PER_CPU: [PerCpuSchedState; MAX_CPUS] = [INIT; MAX_CPUS];

pub fn per_cpu(cpu: CpuId) -> &'static PerCpuSchedState {
    &PER_CPU[cpu.as_usize()]
}

pub fn current() -> &'static PerCpuSchedState {
    per_cpu(crate::cpu::current_id())
}

/// Global sleep queue, ordered ascending by `wakeup_time`. One instance,
/// not per-CPU: any CPU's timer tick may wake a sleeper regardless of
/// which CPU put it to sleep.
pub struct SleepQueue {
    lock: Spinlock,
    queue: core::cell::UnsafeCell<HandleQueue>,
}

unsafe impl Sync for SleepQueue {}

impl SleepQueue {
    const fn new() -> Self {
        Self {
            lock: Spinlock::new(),
            queue: core::cell::UnsafeCell::new(HandleQueue::new()),
        }
    }

    pub fn insert(&self, tid: ThreadId, wakeup_time: u64) {
        self.lock.spin_acquire();
        unsafe { (*self.queue.get()).push_ordered(tid, wakeup_time) };
        self.lock.spin_release();
    }

    pub fn remove(&self, tid: ThreadId) {
        self.lock.spin_acquire();
        unsafe { (*self.queue.get()).remove(tid) };
        self.lock.spin_release();
    }

    /// Pop every sleeper whose deadline has elapsed (`wakeup_time <=
    /// now`), in ascending-deadline order, appending them to `out`.
    pub fn drain_expired(&self, now: u64, out: &mut Vec<ThreadId>) {
        self.lock.spin_acquire();
        let q = unsafe { &mut *self.queue.get() };
        while let Some(deadline) = q.front_key() {
            if deadline > now {
                break;
            }
            if let Some(tid) = q.pop_front() {
                out.push(tid);
            } else {
                break;
            }
        }
        self.lock.spin_release();
    }
}

pub static SLEEP_QUEUE: SleepQueue = SleepQueue::new();
