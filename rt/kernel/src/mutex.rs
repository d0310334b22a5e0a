//! Mutexes with priority inheritance
//!
//! A mutex has at most one owner; waiters queue in priority order and a
//! blocked lock boosts the owner's effective priority to the waiter's,
//! following the ownership chain when the owner is itself blocked on
//! another mutex. Each thread keeps a LIFO list of the mutexes it owns,
//! linked through the mutex records, and must unlock in reverse lock
//! order.
//!
//! Locks take no timeout: bounded mutex waits would let the inherited
//! priority decay in ways the unlock path cannot untangle, so a lock
//! either succeeds or the caller uses [`Kernel::mtx_trylock_s`].

use rtk_core::{KernelResult, Message, Priority, WaitResult, MSG_OK};

use crate::arena::Arena;
use crate::kernel::{Kernel, Outcome};
use crate::thread::{MutexId, ThreadId, ThreadState};
use crate::tqueue::ThreadQueue;
use crate::{halt, kernel_assert, MAX_MUTEXES};

/// A mutex record: owner, priority-ordered wait queue and the link in
/// the owner's owned-mutex list.
pub struct Mutex {
    pub(crate) owner: Option<ThreadId>,
    pub(crate) queue: ThreadQueue,
    pub(crate) next_owned: Option<MutexId>,
}

impl Mutex {
    pub(crate) fn new() -> Self {
        Mutex {
            owner: None,
            queue: ThreadQueue::new(),
            next_owned: None,
        }
    }
}

fn mtx_ref(mutexes: &Arena<Mutex, MAX_MUTEXES>, mutex: MutexId) -> &Mutex {
    match mutexes.get(mutex) {
        Some(record) => record,
        None => halt("stale mutex handle"),
    }
}

fn mtx_mut(mutexes: &mut Arena<Mutex, MAX_MUTEXES>, mutex: MutexId) -> &mut Mutex {
    match mutexes.get_mut(mutex) {
        Some(record) => record,
        None => halt("stale mutex handle"),
    }
}

impl Kernel {
    /// Creates an unowned mutex.
    pub fn mtx_create(&mut self) -> KernelResult<MutexId> {
        self.mutexes.alloc(Mutex::new())
    }

    /// Frees a mutex, which must be unowned with no waiters.
    pub fn mtx_free(&mut self, mutex: MutexId) {
        let record = mtx_ref(&self.mutexes, mutex);
        kernel_assert!(record.owner.is_none(), "freeing an owned mutex");
        kernel_assert!(record.queue.is_empty(), "freeing a mutex with waiters");
        self.mutexes.free(mutex);
    }

    /// Current owner, if any.
    pub fn mtx_owner(&self, mutex: MutexId) -> Option<ThreadId> {
        mtx_ref(&self.mutexes, mutex).owner
    }

    /// Locks the mutex, blocking until it is free. Not recursive: a
    /// second lock by the owner halts. S-class.
    pub fn mtx_lock_s(&mut self, mutex: MutexId) -> Outcome {
        let locker = self.current();
        match mtx_ref(&self.mutexes, mutex).owner {
            None => {
                self.mtx_take(mutex, locker);
                Outcome::Ready(WaitResult::Completed(MSG_OK))
            }
            Some(owner) => {
                kernel_assert!(owner != locker, "recursive mutex lock");
                let prio = self.thread(locker).prio;
                self.mtx_boost_chain(mutex, prio);
                self.thread_mut(locker).msg = MSG_OK;
                let mut queue = mtx_ref(&self.mutexes, mutex).queue;
                queue.insert_priority(&mut self.threads, locker);
                mtx_mut(&mut self.mutexes, mutex).queue = queue;
                self.go_to_sleep_s(ThreadState::WtMtx(mutex));
                Outcome::Suspended
            }
        }
    }

    /// Takes the mutex only if it is free; never blocks. S-class.
    pub fn mtx_trylock_s(&mut self, mutex: MutexId) -> bool {
        if mtx_ref(&self.mutexes, mutex).owner.is_some() {
            return false;
        }
        let locker = self.current();
        self.mtx_take(mutex, locker);
        true
    }

    /// Unlocks the most recently locked mutex, hands ownership to the
    /// highest-priority waiter and sheds any inherited priority no
    /// longer justified by the remaining owned mutexes. S-class.
    pub fn mtx_unlock_s(&mut self, mutex: MutexId) {
        self.mtx_unlock_inner(mutex);
        self.reschedule_s();
    }

    /// Unlocks every mutex the current thread owns, in reverse lock
    /// order. Meant for cleanup paths. S-class.
    pub fn mtx_unlock_all_s(&mut self) {
        while let Some(mutex) = self.thread(self.current()).owned {
            self.mtx_unlock_inner(mutex);
        }
        self.reschedule_s();
    }

    pub(crate) fn mtx_unlock_inner(&mut self, mutex: MutexId) {
        let owner = self.current();
        kernel_assert!(
            mtx_ref(&self.mutexes, mutex).owner == Some(owner),
            "unlocking a mutex owned by another thread"
        );
        kernel_assert!(
            self.thread(owner).owned == Some(mutex),
            "mutexes unlocked out of lock order"
        );

        self.thread_mut(owner).owned = mtx_ref(&self.mutexes, mutex).next_owned;
        mtx_mut(&mut self.mutexes, mutex).next_owned = None;

        let restored = self.inherited_priority(owner);
        self.thread_mut(owner).prio = restored;

        let mut queue = mtx_ref(&self.mutexes, mutex).queue;
        let next_owner = queue.pop_front(&mut self.threads);
        mtx_mut(&mut self.mutexes, mutex).queue = queue;
        mtx_mut(&mut self.mutexes, mutex).owner = None;
        if let Some(t) = next_owner {
            self.mtx_take(mutex, t);
            // Deliver the message stowed when the waiter parked; a plain
            // lock stores MSG_OK, a condvar handover its verdict.
            let msg = self.thread(t).msg;
            self.make_ready(t, msg);
        }
    }

    /// Assigns a free mutex to `t` and pushes it onto `t`'s owned list.
    fn mtx_take(&mut self, mutex: MutexId, t: ThreadId) {
        let head = self.thread(t).owned;
        let record = mtx_mut(&mut self.mutexes, mutex);
        kernel_assert!(record.owner.is_none(), "taking an owned mutex");
        record.owner = Some(t);
        record.next_owned = head;
        self.thread_mut(t).owned = Some(mutex);
    }

    /// Grants the mutex to `t` if free, otherwise parks `t` (which is
    /// not the current thread) on its wait queue with `msg` stowed for
    /// delivery once ownership arrives. Used when a condition variable
    /// hands a woken waiter back to its mutex. Returns whether the
    /// grant succeeded.
    pub(crate) fn mtx_grant_or_enqueue(&mut self, mutex: MutexId, t: ThreadId, msg: Message) -> bool {
        if mtx_ref(&self.mutexes, mutex).owner.is_none() {
            self.mtx_take(mutex, t);
            return true;
        }
        let prio = self.thread(t).prio;
        self.mtx_boost_chain(mutex, prio);
        let record = self.thread_mut(t);
        record.state = ThreadState::WtMtx(mutex);
        record.msg = msg;
        let mut queue = mtx_ref(&self.mutexes, mutex).queue;
        queue.insert_priority(&mut self.threads, t);
        mtx_mut(&mut self.mutexes, mutex).queue = queue;
        false
    }

    /// Propagates a waiter's priority along the ownership chain: each
    /// owner below `prio` is boosted, and when that owner is itself
    /// blocked on a mutex the walk continues with that mutex's owner.
    /// Termination is guaranteed because each step strictly raises a
    /// distinct thread's priority.
    fn mtx_boost_chain(&mut self, mutex: MutexId, prio: Priority) {
        let mut mutex = mutex;
        loop {
            let owner = match mtx_ref(&self.mutexes, mutex).owner {
                Some(owner) => owner,
                None => halt("boost chain reached an unowned mutex"),
            };
            if self.thread(owner).prio >= prio {
                return;
            }
            self.thread_mut(owner).prio = prio;

            match self.thread(owner).state {
                ThreadState::Ready => {
                    // Re-sort the boosted thread within the ready list.
                    let mut ready = self.ready;
                    ready.unlink(&mut self.threads, owner);
                    ready.insert_priority(&mut self.threads, owner);
                    self.ready = ready;
                    return;
                }
                ThreadState::WtMtx(next) => {
                    let mut queue = mtx_ref(&self.mutexes, next).queue;
                    queue.unlink(&mut self.threads, owner);
                    queue.insert_priority(&mut self.threads, owner);
                    mtx_mut(&mut self.mutexes, next).queue = queue;
                    mutex = next;
                }
                // Current, or parked on something without priority
                // ordering; the raised priority takes effect when the
                // thread is next queued.
                _ => return,
            }
        }
    }

    /// Effective priority justified by `t`'s own priority and the
    /// front waiters of the mutexes it still owns.
    fn inherited_priority(&self, t: ThreadId) -> Priority {
        let mut prio = self.thread(t).base_prio;
        let mut cursor = self.thread(t).owned;
        while let Some(mutex) = cursor {
            let record = mtx_ref(&self.mutexes, mutex);
            if let Some(waiter) = record.queue.front() {
                let wp = self.thread(waiter).prio;
                if wp > prio {
                    prio = wp;
                }
            }
            cursor = record.next_owned;
        }
        prio
    }
}
