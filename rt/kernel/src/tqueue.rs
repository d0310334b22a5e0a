//! Intrusive thread queues
//!
//! A [`ThreadQueue`] is a head/tail pair; the links live in the thread
//! records of the arena, so link and unlink are O(1) and a thread can be
//! in at most one queue at a time. Queues come in two flavors used by
//! the primitives: FIFO insertion and priority-ordered insertion (FIFO
//! among equal priorities).

use crate::thread::{ThreadId, Threads};
use crate::{halt, kernel_assert};

/// Queue of threads, linked through the records of a thread arena.
#[derive(Clone, Copy, Default)]
pub struct ThreadQueue {
    head: Option<ThreadId>,
    tail: Option<ThreadId>,
}

impl ThreadQueue {
    pub const fn new() -> Self {
        ThreadQueue {
            head: None,
            tail: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// First thread in the queue without removing it.
    pub fn front(&self) -> Option<ThreadId> {
        self.head
    }

    /// Appends `t` at the tail (FIFO order).
    pub fn insert_back(&mut self, threads: &mut Threads, t: ThreadId) {
        Self::assert_unlinked(threads, t);
        let old_tail = self.tail;
        link_mut(threads, t).prev = old_tail;
        match old_tail {
            Some(tail) => link_mut(threads, tail).next = Some(t),
            None => self.head = Some(t),
        }
        self.tail = Some(t);
    }

    /// Inserts `t` by descending effective priority, after all threads
    /// of equal or higher priority (FIFO among equals).
    pub fn insert_priority(&mut self, threads: &mut Threads, t: ThreadId) {
        self.insert_ordered(threads, t, false);
    }

    /// Inserts `t` by descending effective priority, before threads of
    /// equal priority. Used when requeueing a preempted thread that did
    /// not finish its turn.
    pub fn insert_priority_ahead(&mut self, threads: &mut Threads, t: ThreadId) {
        self.insert_ordered(threads, t, true);
    }

    fn insert_ordered(&mut self, threads: &mut Threads, t: ThreadId, ahead: bool) {
        Self::assert_unlinked(threads, t);
        let prio = node(threads, t).prio;

        let mut after = None;
        let mut cursor = self.head;
        while let Some(c) = cursor {
            let c_prio = node(threads, c).prio;
            if c_prio < prio || (ahead && c_prio == prio) {
                break;
            }
            after = Some(c);
            cursor = node(threads, c).next;
        }

        match after {
            None => {
                let old_head = self.head;
                link_mut(threads, t).next = old_head;
                match old_head {
                    Some(head) => link_mut(threads, head).prev = Some(t),
                    None => self.tail = Some(t),
                }
                self.head = Some(t);
            }
            Some(a) => {
                let next = node(threads, a).next;
                link_mut(threads, t).prev = Some(a);
                link_mut(threads, t).next = next;
                link_mut(threads, a).next = Some(t);
                match next {
                    Some(n) => link_mut(threads, n).prev = Some(t),
                    None => self.tail = Some(t),
                }
            }
        }
    }

    /// Removes and returns the head of the queue.
    pub fn pop_front(&mut self, threads: &mut Threads) -> Option<ThreadId> {
        let t = self.head?;
        self.unlink(threads, t);
        Some(t)
    }

    /// Unlinks `t` from anywhere in the queue.
    pub fn unlink(&mut self, threads: &mut Threads, t: ThreadId) {
        let (prev, next) = {
            let record = node(threads, t);
            (record.prev, record.next)
        };
        match prev {
            Some(p) => link_mut(threads, p).next = next,
            None => {
                kernel_assert!(self.head == Some(t), "thread not in this queue");
                self.head = next;
            }
        }
        match next {
            Some(n) => link_mut(threads, n).prev = prev,
            None => {
                kernel_assert!(self.tail == Some(t), "thread not in this queue");
                self.tail = prev;
            }
        }
        let record = link_mut(threads, t);
        record.prev = None;
        record.next = None;
    }

    /// Collects the queue contents in order. Test and inspection helper.
    pub fn collect<const N: usize>(&self, threads: &Threads) -> heapless::Vec<ThreadId, N> {
        let mut out = heapless::Vec::new();
        let mut cursor = self.head;
        while let Some(t) = cursor {
            let _ = out.push(t);
            cursor = node(threads, t).next;
        }
        out
    }

    fn assert_unlinked(threads: &Threads, t: ThreadId) {
        let record = node(threads, t);
        kernel_assert!(
            record.next.is_none() && record.prev.is_none(),
            "thread already linked in a queue"
        );
    }
}

fn node(threads: &Threads, t: ThreadId) -> &crate::thread::Thread {
    match threads.get(t) {
        Some(record) => record,
        None => halt("stale thread handle in queue"),
    }
}

fn link_mut(threads: &mut Threads, t: ThreadId) -> &mut crate::thread::Thread {
    match threads.get_mut(t) {
        Some(record) => record,
        None => halt("stale thread handle in queue"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::Thread;
    use rtk_core::Priority;

    fn spawn(threads: &mut Threads, prio: u8) -> ThreadId {
        threads
            .alloc(Thread::new("t", Priority::new_unchecked(prio)))
            .unwrap()
    }

    #[test]
    fn fifo_order() {
        let mut threads = Threads::new();
        let mut q = ThreadQueue::new();
        let a = spawn(&mut threads, 10);
        let b = spawn(&mut threads, 20);
        let c = spawn(&mut threads, 5);

        q.insert_back(&mut threads, a);
        q.insert_back(&mut threads, b);
        q.insert_back(&mut threads, c);

        assert_eq!(q.pop_front(&mut threads), Some(a));
        assert_eq!(q.pop_front(&mut threads), Some(b));
        assert_eq!(q.pop_front(&mut threads), Some(c));
        assert_eq!(q.pop_front(&mut threads), None);
    }

    #[test]
    fn priority_order_fifo_among_equals() {
        let mut threads = Threads::new();
        let mut q = ThreadQueue::new();
        let low = spawn(&mut threads, 10);
        let high = spawn(&mut threads, 90);
        let mid_first = spawn(&mut threads, 50);
        let mid_second = spawn(&mut threads, 50);

        q.insert_priority(&mut threads, low);
        q.insert_priority(&mut threads, mid_first);
        q.insert_priority(&mut threads, high);
        q.insert_priority(&mut threads, mid_second);

        let order: heapless::Vec<ThreadId, 8> = q.collect(&threads);
        assert_eq!(order.as_slice(), &[high, mid_first, mid_second, low]);
    }

    #[test]
    fn unlink_from_middle() {
        let mut threads = Threads::new();
        let mut q = ThreadQueue::new();
        let a = spawn(&mut threads, 1);
        let b = spawn(&mut threads, 1);
        let c = spawn(&mut threads, 1);
        q.insert_back(&mut threads, a);
        q.insert_back(&mut threads, b);
        q.insert_back(&mut threads, c);

        q.unlink(&mut threads, b);
        let order: heapless::Vec<ThreadId, 8> = q.collect(&threads);
        assert_eq!(order.as_slice(), &[a, c]);

        q.unlink(&mut threads, a);
        q.unlink(&mut threads, c);
        assert!(q.is_empty());
    }
}
