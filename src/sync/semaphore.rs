/*
 * Counting Semaphore (spec §4.6 "Semaphore", §3 "Sync objects")
 *
 * `{initialized, signed level, waiter queue, spinlock}`. A negative level
 * counts blocked waiters (standard "signed semaphore" shape): `pend`
 * decrements unconditionally and blocks only if the result went
 * negative; `post` increments and wakes a waiter only if the level was
 * at or below zero *before* the increment.
 */

use core::cell::UnsafeCell;

use crate::atomics::Spinlock;
use crate::error::{KernelError, KernelResult};
use crate::scheduler::{self, WaitType};

use super::WaitQueue;

pub struct Semaphore {
    lock: Spinlock,
    level: UnsafeCell<i32>,
    destroyed: UnsafeCell<bool>,
    waiters: WaitQueue,
}

// SAFETY: `level`/`destroyed` are only touched while `lock` is held.
unsafe impl Sync for Semaphore {}

impl Semaphore {
    pub const fn new(initial: i32) -> Self {
        Self {
            lock: Spinlock::new(),
            level: UnsafeCell::new(initial),
            destroyed: UnsafeCell::new(false),
            waiters: WaitQueue::new(),
        }
    }

    pub fn level(&self) -> i32 {
        self.lock.spin_acquire();
        let v = unsafe { *self.level.get() };
        self.lock.spin_release();
        v
    }

    /// Decrements `level`; if the result is negative, blocks.
    pub fn pend(&self) -> KernelResult<()> {
        let current = scheduler::current_thread_id().ok_or(KernelError::Unauthorized)?;
        self.lock.spin_acquire();
        if unsafe { *self.destroyed.get() } {
            self.lock.spin_release();
            return Err(KernelError::Uninitialized);
        }
        let level = unsafe { &mut *self.level.get() };
        *level -= 1;
        let must_block = *level < 0;
        self.lock.spin_release();

        if must_block {
            self.waiters.push_back(current);
            scheduler::block_current(WaitType::Resource);
            if unsafe {
                self.lock.spin_acquire();
                let d = *self.destroyed.get();
                self.lock.spin_release();
                d
            } {
                return Err(KernelError::Uninitialized);
            }
        }
        Ok(())
    }

    /// Never blocks. On success the level was `> 0` and is decremented. On
    /// failure returns `locked` and stores the level observed in
    /// `level_out` (spec §4.6 "`try_pend` peeks: if level > 0, decrement
    /// and return 0; else return `locked` and store current level").
    pub fn try_pend(&self, level_out: &mut i32) -> KernelResult<()> {
        self.lock.spin_acquire();
        if unsafe { *self.destroyed.get() } {
            self.lock.spin_release();
            return Err(KernelError::Uninitialized);
        }
        let level = unsafe { &mut *self.level.get() };
        if *level > 0 {
            *level -= 1;
            self.lock.spin_release();
            Ok(())
        } else {
            *level_out = *level;
            self.lock.spin_release();
            Err(KernelError::Locked)
        }
    }

    /// Increments `level`; if the level was `<= 0` before the increment,
    /// wakes the head waiter.
    pub fn post(&self) -> KernelResult<()> {
        self.lock.spin_acquire();
        if unsafe { *self.destroyed.get() } {
            self.lock.spin_release();
            return Err(KernelError::Uninitialized);
        }
        let level = unsafe { &mut *self.level.get() };
        let pre = *level;
        *level += 1;
        self.lock.spin_release();

        if pre <= 0 {
            if let Some(tid) = self.waiters.pop_front() {
                scheduler::wake_one(tid);
            }
        }
        Ok(())
    }

    /// Wakes every waiter with `uninitialized`.
    pub fn destroy(&self) {
        self.lock.spin_acquire();
        unsafe { *self.destroyed.get() = true };
        self.lock.spin_release();
        for tid in self.waiters.drain_all() {
            scheduler::wake_one(tid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_pend_reports_current_level() {
        let sem = Semaphore::new(0);
        let mut observed = 99;
        assert!(sem.try_pend(&mut observed).is_err());
        assert_eq!(observed, 0);
    }

    #[test]
    fn post_increments_level() {
        let sem = Semaphore::new(0);
        sem.post().unwrap();
        assert_eq!(sem.level(), 1);
        let mut observed = 0;
        assert!(sem.try_pend(&mut observed).is_ok());
        assert_eq!(sem.level(), 0);
    }

    extern "C" fn chain_entry(_arg: usize) -> usize {
        0
    }

    /// Spec §8 seed scenario 3: a chain of nine posts followed by nine
    /// pends hands the counter nine signals. Every `pend` here is preceded
    /// by a matching `post`, so `level` never goes negative and `pend`
    /// never reaches its blocking path.
    #[test]
    fn semaphore_chain_accumulates_to_nine() {
        let _cpu_guard = crate::cpu::TEST_CPU_LOCK.lock();
        let tid = scheduler::create_kernel_thread(12, "sem-chain", scheduler::ThreadKind::Kernel, 4096, chain_entry, 0)
            .unwrap();
        crate::cpu::set_running_thread(Some(tid));

        let sem = Semaphore::new(0);
        for _ in 0..9 {
            sem.post().unwrap();
        }

        let mut counter = 0;
        for _ in 0..9 {
            sem.pend().unwrap();
            counter += 1;
        }

        assert_eq!(counter, 9);
        assert_eq!(sem.level(), 0);
    }
}
