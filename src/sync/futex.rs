/*
 * Futex (spec §4.6 "Futex", §3 "Sync objects")
 *
 * "waiting entries indexed by user-space word address, each entry
 * carries the TCB and the expected value." Per `DESIGN.md`'s Open
 * Question resolution the table is global, keyed by the word's physical
 * address (stable across `fork`'s copy-on-write remap, unlike a virtual
 * address which would alias between parent and child).
 *
 * Grounded in `scheduler::io_wait`'s block/wake shape; the hash table
 * itself has no teacher analogue (the teacher has no futex) and is built
 * directly from `alloc::collections::BTreeMap` plus `queue::HandleQueue`
 * per bucket, consistent with every other waiter list in this crate.
 */

use alloc::collections::BTreeMap;
use core::sync::atomic::{AtomicU32, Ordering};

use spin::Mutex;

use crate::error::{KernelError, KernelResult};
use crate::queue::HandleQueue;
use crate::scheduler::{self, WaitType};

static TABLE: Mutex<BTreeMap<u32, HandleQueue>> = Mutex::new(BTreeMap::new());

/// Atomically verifies `*addr == expected` and, if so, blocks the caller
/// on the internal hash keyed by `addr`. On mismatch returns immediately
/// without blocking. `addr` must be the word's physical address (spec
/// §4.6 Design Notes), stable across `fork`.
///
/// # Safety
/// `addr` must point to a valid, live `u32` for the duration of the read.
pub unsafe fn wait(addr: *const AtomicU32, expected: u32) -> KernelResult<()> {
    let current = scheduler::current_thread_id().ok_or(KernelError::Unauthorized)?;
    let key = addr as u32;

    let mut table = TABLE.lock();
    let observed = unsafe { (*addr).load(Ordering::SeqCst) };
    if observed != expected {
        return Ok(());
    }
    table.entry(key).or_insert_with(HandleQueue::new).push_back(current);
    drop(table);

    scheduler::block_current(WaitType::Resource);
    Ok(())
}

/// Moves up to `n` waiters blocked on `addr` back to ready; returns the
/// number actually woken.
pub fn wake(addr: *const AtomicU32, n: usize) -> usize {
    let key = addr as u32;
    let mut table = TABLE.lock();
    let Some(entry) = table.get_mut(&key) else {
        return 0;
    };

    let mut woken = 0;
    while woken < n {
        let Some(tid) = entry.pop_front() else { break };
        scheduler::wake_one(tid);
        woken += 1;
    }
    if entry.is_empty() {
        table.remove(&key);
    }
    woken
}

/// Count of threads currently parked on `addr`; used by tests and by
/// `destroy`-style cleanup paths that need to know before tearing down a
/// region backing futex words.
pub fn waiter_count(addr: *const AtomicU32) -> usize {
    let key = addr as u32;
    TABLE.lock().get(&key).map(|q| q.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_on_empty_key_is_noop() {
        let word = AtomicU32::new(0);
        assert_eq!(wake(&word as *const AtomicU32, 1), 0);
        assert_eq!(waiter_count(&word as *const AtomicU32), 0);
    }
}
