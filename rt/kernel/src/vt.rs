//! Virtual timers
//!
//! Armed timers live in a singly linked delta list ordered by
//! ticks-until-fire: each entry stores only the increment relative to
//! its predecessor, so advancing the list touches the head only and
//! disarming is cheap. The tick source (periodic interrupt, or a
//! one-shot deadline programmed from
//! [`time_until_next_i`](Kernel::time_until_next_i) in tickless setups)
//! drives [`tick_i`](Kernel::tick_i); the list algorithm is the same
//! either way.

use rtk_core::{KernelResult, Ticks};

use crate::arena::Handle;
use crate::kernel::{with_kernel, Kernel};
use crate::thread::ThreadId;
use crate::{halt, kernel_assert};

/// Handle to a virtual timer.
pub type VtId = Handle<VTimer>;

/// Callback of a user timer. Runs with the kernel lock held and must
/// not block; I-class operations are allowed.
pub type VtCallback = fn(&mut Kernel, usize);

/// What a timer does when it fires.
#[derive(Clone, Copy)]
pub enum VtAction {
    /// Disarmed timer; never fires.
    None,
    /// End a bounded wait with a timeout wakeup. Internal.
    TimeoutWake(ThreadId),
    /// Invoke a user callback with an opaque parameter.
    Callback(VtCallback, usize),
}

/// A virtual timer record.
pub struct VTimer {
    /// Ticks relative to the predecessor in the delta list.
    pub(crate) delta: Ticks,
    /// Re-arm interval of a continuous timer; `0` means one-shot.
    pub(crate) reload: Ticks,
    pub(crate) action: VtAction,
    pub(crate) next: Option<VtId>,
    pub(crate) armed: bool,
}

impl VTimer {
    pub(crate) fn new() -> Self {
        VTimer {
            delta: 0,
            reload: 0,
            action: VtAction::None,
            next: None,
            armed: false,
        }
    }
}

impl Kernel {
    /// Allocates a disarmed timer.
    pub fn vt_create(&mut self) -> KernelResult<VtId> {
        self.vtimers.alloc(VTimer::new())
    }

    /// Frees a timer, disarming it first.
    pub fn vt_free(&mut self, vt: VtId) {
        self.vt_reset_i(vt);
        self.vtimers.free(vt);
    }

    /// Arms a one-shot timer: after `delay` ticks, `callback` runs with
    /// the kernel lock held. Re-arms if already armed. I-class.
    pub fn vt_set_i(&mut self, vt: VtId, delay: Ticks, callback: VtCallback, param: usize) {
        self.vt_arm_i(vt, delay, VtAction::Callback(callback, param), 0);
    }

    /// Arms a continuous timer firing every `interval` ticks until
    /// reset. I-class.
    pub fn vt_set_continuous_i(
        &mut self,
        vt: VtId,
        interval: Ticks,
        callback: VtCallback,
        param: usize,
    ) {
        self.vt_arm_i(vt, interval, VtAction::Callback(callback, param), interval);
    }

    /// Disarms a timer; no-op when not armed. I-class.
    pub fn vt_reset_i(&mut self, vt: VtId) {
        if !self.timer(vt).armed {
            return;
        }
        self.unlink_timer(vt);
        let record = self.timer_mut(vt);
        record.armed = false;
        record.action = VtAction::None;
        record.reload = 0;
    }

    /// Whether the timer is counting down.
    pub fn vt_is_armed(&self, vt: VtId) -> bool {
        self.timer(vt).armed
    }

    /// Ticks until the earliest armed timer fires; the deadline a
    /// tickless port programs its one-shot hardware timer to. I-class.
    pub fn time_until_next_i(&self) -> Option<Ticks> {
        self.vt_head.map(|head| self.timer(head).delta)
    }

    /// Advances the timer subsystem by one tick and charges the
    /// round-robin quantum. Called by the tick source; the ISR epilogue
    /// (or X-class wrapper) follows up with
    /// [`reschedule_s`](Kernel::reschedule_s). I-class.
    pub fn tick_i(&mut self) {
        self.ticks += 1;
        self.charge_quantum();

        let head = match self.vt_head {
            Some(head) => head,
            None => return,
        };
        {
            let record = self.timer_mut(head);
            kernel_assert!(record.delta > 0, "armed timer with zero delta");
            record.delta -= 1;
        }

        while let Some(head) = self.vt_head {
            if self.timer(head).delta != 0 {
                break;
            }
            // Unlink before firing: the action may rearm this timer.
            self.vt_head = self.timer(head).next;
            let (action, reload) = {
                let record = self.timer_mut(head);
                record.next = None;
                record.armed = false;
                (record.action, record.reload)
            };
            if reload > 0 {
                self.vt_arm_i(head, reload, action, reload);
            }
            match action {
                VtAction::None => {}
                VtAction::TimeoutWake(t) => self.timeout_wakeup(t),
                VtAction::Callback(callback, param) => callback(self, param),
            }
        }
    }

    /// Links a timer into the delta list. `reload` of zero makes it
    /// one-shot.
    pub(crate) fn vt_arm_i(&mut self, vt: VtId, delay: Ticks, action: VtAction, reload: Ticks) {
        kernel_assert!(delay > 0, "timer armed with zero delay");
        if self.timer(vt).armed {
            self.unlink_timer(vt);
        }
        {
            let record = self.timer_mut(vt);
            record.action = action;
            record.reload = reload;
            record.armed = true;
        }

        // Walk the list accumulating deltas to find the insertion point.
        let mut remaining = delay;
        let mut prev: Option<VtId> = None;
        let mut cursor = self.vt_head;
        while let Some(c) = cursor {
            let c_delta = self.timer(c).delta;
            if c_delta > remaining {
                break;
            }
            remaining -= c_delta;
            prev = Some(c);
            cursor = self.timer(c).next;
        }

        self.timer_mut(vt).delta = remaining;
        self.timer_mut(vt).next = cursor;
        if let Some(c) = cursor {
            let record = self.timer_mut(c);
            record.delta -= remaining;
        }
        match prev {
            Some(p) => self.timer_mut(p).next = Some(vt),
            None => self.vt_head = Some(vt),
        }
    }

    fn unlink_timer(&mut self, vt: VtId) {
        let (delta, next) = {
            let record = self.timer(vt);
            (record.delta, record.next)
        };
        // Give the removed delta back to the successor.
        if let Some(n) = next {
            self.timer_mut(n).delta += delta;
        }

        let mut prev: Option<VtId> = None;
        let mut cursor = self.vt_head;
        while let Some(c) = cursor {
            if c == vt {
                match prev {
                    Some(p) => self.timer_mut(p).next = next,
                    None => self.vt_head = next,
                }
                self.timer_mut(vt).next = None;
                return;
            }
            prev = Some(c);
            cursor = self.timer(c).next;
        }
        halt("armed timer missing from delta list");
    }

    fn charge_quantum(&mut self) {
        if self.config.quantum == 0 || self.current == self.idle {
            return;
        }
        let current = self.current;
        let record = self.thread_mut(current);
        if record.quantum > 0 {
            record.quantum -= 1;
        }
        if record.quantum == 0 {
            self.quantum_expired = true;
        }
    }

    fn timer(&self, vt: VtId) -> &VTimer {
        match self.vtimers.get(vt) {
            Some(record) => record,
            None => halt("stale timer handle"),
        }
    }

    fn timer_mut(&mut self, vt: VtId) -> &mut VTimer {
        match self.vtimers.get_mut(vt) {
            Some(record) => record,
            None => halt("stale timer handle"),
        }
    }
}

/// X-class wrapper: one tick plus the preemption check a tick ISR
/// epilogue performs.
pub fn tick() {
    with_kernel(|k| {
        k.tick_i();
        k.reschedule_s();
    });
}
