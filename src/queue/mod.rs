/*
 * Kernel Queue Primitive (spec §2 "Kernel queue primitive", §4.8, Design
 * Notes "Linked-intrusive queues")
 *
 * An ordered, optionally priority-ordered doubly-linked queue of handles,
 * used by every blocked/ready list in the kernel: per-CPU ready buckets,
 * the sleep queue, and every sync primitive's waiter queue.
 *
 * The teacher's closest analogue is `scheduler::io_wait::WaitQueue`, a
 * flat `Vec<ThreadId>` with linear `remove_waiter`. The spec's Design
 * Notes call out that this must cost O(1) to dequeue a specific thread by
 * handle when it's killed while blocked — a `Vec` can't do that without a
 * linear scan. Thread storage itself is an arena (`BTreeMap<ThreadId,
 * Thread>`, see `scheduler::thread`) rather than individually boxed nodes,
 * so "intrusive" here means the queue stores prev/next *links* in a side
 * table keyed by handle, not that the payload struct embeds pointers.
 */

use core::cmp::Ordering as CmpOrdering;

use heapless::FnvIndexMap;

use crate::config::MAX_THREADS;
use crate::scheduler::thread::ThreadId;

const NONE: u32 = u32::MAX;

#[derive(Clone, Copy)]
struct Link {
    prev: u32,
    next: u32,
    key: u64,
    in_queue: bool,
}

const EMPTY_LINK: Link = Link {
    prev: NONE,
    next: NONE,
    key: 0,
    in_queue: false,
};

/// Intrusive doubly-linked queue of [`ThreadId`] handles.
///
/// When `ordered` is true, `push_ordered` keeps the list sorted ascending
/// by key (used for the sleep queue, ordered by `wakeup_time`, and for
/// priority buckets where all members share one priority so ordering
/// degenerates to FIFO -- `push_back` is used there instead). When false,
/// only `push_back`/`pop_front` are meaningful (plain FIFO).
pub struct HandleQueue {
    links: FnvIndexMap<u32, Link, MAX_THREADS>,
    head: u32,
    tail: u32,
    len: usize,
}

impl HandleQueue {
    pub const fn new() -> Self {
        Self {
            links: FnvIndexMap::new(),
            head: NONE,
            tail: NONE,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn insert_link(&mut self, id: u32, link: Link) {
        // heapless maps have no fallible-overwrite-in-place API that keeps
        // our invariants simpler than remove+insert.
        let _ = self.links.remove(&id);
        let _ = self.links.insert(id, link);
    }

    /// Append at the tail (FIFO order), regardless of key.
    pub fn push_back(&mut self, id: ThreadId) {
        let id = id.0;
        if self.contains(id) {
            return;
        }
        let mut link = EMPTY_LINK;
        link.in_queue = true;
        link.prev = self.tail;
        if self.tail != NONE {
            if let Some(t) = self.links.get_mut(&self.tail) {
                t.next = id;
            }
        } else {
            self.head = id;
        }
        self.tail = id;
        self.insert_link(id, link);
        self.len += 1;
    }

    /// Insert keeping ascending key order (stable: new entries with an
    /// equal key go after existing ones, preserving FIFO within a key).
    pub fn push_ordered(&mut self, id: ThreadId, key: u64) {
        let id = id.0;
        if self.contains(id) {
            return;
        }
        // Find the first node whose key is > `key`; insert before it.
        let mut cursor = self.head;
        let mut insert_before = NONE;
        while cursor != NONE {
            let cur_key = self.links.get(&cursor).map(|l| l.key).unwrap_or(0);
            if cmp_key(cur_key, key) == CmpOrdering::Greater {
                insert_before = cursor;
                break;
            }
            cursor = self.links.get(&cursor).map(|l| l.next).unwrap_or(NONE);
        }

        let mut link = EMPTY_LINK;
        link.key = key;
        link.in_queue = true;

        if insert_before == NONE {
            // append at tail
            link.prev = self.tail;
            if self.tail != NONE {
                if let Some(t) = self.links.get_mut(&self.tail) {
                    t.next = id;
                }
            } else {
                self.head = id;
            }
            self.tail = id;
        } else {
            let before_prev = self.links.get(&insert_before).map(|l| l.prev).unwrap_or(NONE);
            link.prev = before_prev;
            link.next = insert_before;
            if before_prev != NONE {
                if let Some(p) = self.links.get_mut(&before_prev) {
                    p.next = id;
                }
            } else {
                self.head = id;
            }
            if let Some(b) = self.links.get_mut(&insert_before) {
                b.prev = id;
            }
        }

        self.insert_link(id, link);
        self.len += 1;
    }

    pub fn pop_front(&mut self) -> Option<ThreadId> {
        if self.head == NONE {
            return None;
        }
        let id = self.head;
        self.remove(ThreadId(id));
        Some(ThreadId(id))
    }

    pub fn peek_front(&self) -> Option<ThreadId> {
        if self.head == NONE {
            None
        } else {
            Some(ThreadId(self.head))
        }
    }

    /// The ordering key of the head node (the smallest key in the queue,
    /// since `push_ordered` keeps ascending order). Used by callers that
    /// need to test the head's key against a threshold without popping
    /// (e.g. the sleep queue checking `wakeup_time <= now`).
    pub fn front_key(&self) -> Option<u64> {
        if self.head == NONE {
            None
        } else {
            self.links.get(&self.head).map(|l| l.key)
        }
    }

    pub fn contains(&self, raw_id: u32) -> bool {
        self.links.get(&raw_id).map(|l| l.in_queue).unwrap_or(false)
    }

    /// Remove a specific handle from the queue in O(1) (amortized — the
    /// underlying map lookup is hashed, not scanned). A no-op if the
    /// handle isn't currently enqueued.
    pub fn remove(&mut self, id: ThreadId) {
        let id = id.0;
        let Some(link) = self.links.get(&id).copied() else {
            return;
        };
        if !link.in_queue {
            return;
        }

        if link.prev != NONE {
            if let Some(p) = self.links.get_mut(&link.prev) {
                p.next = link.next;
            }
        } else {
            self.head = link.next;
        }

        if link.next != NONE {
            if let Some(n) = self.links.get_mut(&link.next) {
                n.prev = link.prev;
            }
        } else {
            self.tail = link.prev;
        }

        let _ = self.links.remove(&id);
        self.len -= 1;
    }

    pub fn iter(&self) -> HandleQueueIter<'_> {
        HandleQueueIter {
            queue: self,
            cursor: self.head,
        }
    }
}

impl Default for HandleQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn cmp_key(a: u64, b: u64) -> CmpOrdering {
    a.cmp(&b)
}

pub struct HandleQueueIter<'a> {
    queue: &'a HandleQueue,
    cursor: u32,
}

impl<'a> Iterator for HandleQueueIter<'a> {
    type Item = ThreadId;

    fn next(&mut self) -> Option<ThreadId> {
        if self.cursor == NONE {
            return None;
        }
        let id = self.cursor;
        self.cursor = self.queue.links.get(&id).map(|l| l.next).unwrap_or(NONE);
        Some(ThreadId(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_push_pop() {
        let mut q = HandleQueue::new();
        q.push_back(ThreadId(1));
        q.push_back(ThreadId(2));
        q.push_back(ThreadId(3));
        assert_eq!(q.pop_front(), Some(ThreadId(1)));
        assert_eq!(q.pop_front(), Some(ThreadId(2)));
        assert_eq!(q.pop_front(), Some(ThreadId(3)));
        assert_eq!(q.pop_front(), None);
    }

    #[test]
    fn remove_specific_handle() {
        let mut q = HandleQueue::new();
        q.push_back(ThreadId(1));
        q.push_back(ThreadId(2));
        q.push_back(ThreadId(3));
        q.remove(ThreadId(2));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop_front(), Some(ThreadId(1)));
        assert_eq!(q.pop_front(), Some(ThreadId(3)));
    }

    /// Seed scenario 6: priority-queue push of {0,3,5,7,4,1,8,9,6,2} four
    /// times must pop back 0,0,0,0,1,1,1,1,...,9,9,9,9.
    #[test]
    fn priority_push_pop_seed_scenario() {
        let mut q = HandleQueue::new();
        let payloads = [0u64, 3, 5, 7, 4, 1, 8, 9, 6, 2];
        let mut next_id = 0u32;
        for _ in 0..4 {
            for &p in payloads.iter() {
                q.push_ordered(ThreadId(next_id), p);
                next_id += 1;
            }
        }
        let mut popped = alloc::vec::Vec::new();
        // drain to a list of keys by re-resolving from a side table
        let mut ids = alloc::vec::Vec::new();
        while let Some(id) = q.pop_front() {
            ids.push(id);
        }
        // Reconstruct keys from the original push order for comparison.
        let mut key_of = alloc::collections::BTreeMap::new();
        let mut id = 0u32;
        for _ in 0..4 {
            for &p in payloads.iter() {
                key_of.insert(id, p);
                id += 1;
            }
        }
        for tid in ids {
            popped.push(key_of[&tid.0]);
        }
        let expected: alloc::vec::Vec<u64> = (0..10).flat_map(|v| core::iter::repeat(v).take(4)).collect();
        assert_eq!(popped, expected);
    }
}
