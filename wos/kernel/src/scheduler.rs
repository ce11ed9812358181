//! Scheduler core: the thread table, the ready heap and `schedule_next`.
//!
//! Every method here runs with the kernel's critical section held; the
//! caller owns the `CriticalSection` token and the port switch happens only
//! after it is released. Trace records and overflow reports are queued here
//! and handed to their hooks by the kernel once the section is closed, so a
//! hook is free to query the kernel.

use alloc::vec::Vec;
use core::mem;
use critical_section::CriticalSection;
use log::{debug, trace, warn};
use wos_core::{Instant, OsError, OsResult, Priority, PriorityQueue, ThreadId, ThreadState};

use crate::stack::Stack;
use crate::thread::Descriptor;
use crate::trace::{TraceHook, TraceRecord};
use crate::wait::{WaitCell, WaitCondition, WaitOutcome};

pub(crate) struct Scheduler<C, const N: usize> {
    threads: [Descriptor<C>; N],
    ready: PriorityQueue<ThreadId, N>,
    current: ThreadId,
    live: usize,
    stack_guard: usize,
    overflow_hook: Option<fn(ThreadId)>,
    trace: Option<TraceHook>,
    pending: Vec<TraceRecord>,
    overflowed: Option<ThreadId>,
}

/// Hook calls collected inside the critical section.
pub(crate) struct Deferred {
    trace: Option<TraceHook>,
    records: Vec<TraceRecord>,
    overflow: Option<(fn(ThreadId), ThreadId)>,
}

impl Deferred {
    /// Call the hooks. Must run outside the critical section.
    pub fn run(self) {
        if let Some(hook) = self.trace {
            for record in &self.records {
                hook(record);
            }
        }
        if let Some((hook, id)) = self.overflow {
            hook(id);
        }
    }
}

impl<C: Clone + Default, const N: usize> Scheduler<C, N> {
    const TABLE_SIZE_OK: () = assert!(N >= 1 && N <= 256, "thread table holds 1..=256 slots");

    pub fn new(stack_guard: usize, overflow_hook: Option<fn(ThreadId)>) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::TABLE_SIZE_OK;
        Self {
            threads: core::array::from_fn(|_| Descriptor::empty()),
            ready: PriorityQueue::new(),
            current: ThreadId::IDLE,
            live: 0,
            stack_guard,
            overflow_hook,
            trace: None,
            pending: Vec::new(),
            overflowed: None,
        }
    }

    pub fn set_trace_hook(&mut self, hook: Option<TraceHook>) {
        self.trace = hook;
    }

    fn emit(&mut self, record: TraceRecord) {
        if self.trace.is_some() {
            self.pending.push(record);
        }
    }

    /// Take the hook calls queued since the last call.
    pub fn take_deferred(&mut self) -> Deferred {
        let records = mem::take(&mut self.pending);
        let overflow = self
            .overflowed
            .take()
            .and_then(|id| self.overflow_hook.map(|hook| (hook, id)));
        Deferred {
            trace: if records.is_empty() { None } else { self.trace.clone() },
            records,
            overflow,
        }
    }

    pub fn current(&self) -> ThreadId {
        self.current
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn context(&self, id: ThreadId) -> &C {
        &self.threads[id.index()].context
    }

    /// Kernel-allocated stack bytes still held by the table.
    pub fn owned_stack_bytes(&self) -> usize {
        self.threads.iter().map(Descriptor::owned_stack_bytes).sum()
    }

    /// Reset the table and make the calling context thread 0.
    pub fn adopt_idle(&mut self, context: C) {
        for slot in self.threads.iter_mut() {
            *slot = Descriptor::empty();
        }
        self.ready.clear();
        let idle = &mut self.threads[0];
        idle.state = ThreadState::Running;
        idle.priority = Priority::IDLE;
        idle.name = "idle";
        idle.context = context;
        self.current = ThreadId::IDLE;
        self.live = 1;
    }

    /// First empty or ended slot, never the idle slot.
    pub fn free_slot(&self) -> Option<ThreadId> {
        (1..N)
            .find(|&i| self.threads[i].state.is_allocatable())
            .map(|i| ThreadId(i as u8))
    }

    /// Put a freshly built thread into `id`, releasing whatever the slot
    /// held before.
    pub fn install(
        &mut self,
        id: ThreadId,
        priority: Priority,
        name: &'static str,
        context: C,
        stack: Stack,
        sp: usize,
    ) {
        // A previous occupant may have left a stale entry behind.
        self.ready.retain(|&queued| queued != id);
        self.threads[id.index()] = Descriptor {
            state: ThreadState::Running,
            priority,
            name,
            context,
            stack: Some(stack),
            sp,
            ..Descriptor::empty()
        };
        self.live += 1;
        self.enqueue(id);
        self.emit(TraceRecord::ThreadAdded { id, priority });
    }

    fn enqueue(&mut self, id: ThreadId) {
        if id.is_idle() {
            return;
        }
        let slot = &mut self.threads[id.index()];
        if slot.queued {
            return;
        }
        if self.ready.push(slot.priority, id).is_err() {
            warn!("ready queue full, {} not queued", id);
            return;
        }
        slot.queued = true;
    }

    /// Steps 1–4 of a reschedule; returns the thread to switch to.
    pub fn schedule_next(&mut self, cs: CriticalSection<'_>, now: Instant, sp: usize) -> ThreadId {
        let outgoing = self.current;
        self.threads[outgoing.index()].sp = sp;

        if !outgoing.is_idle() && self.threads[outgoing.index()].state.is_live() {
            self.check_stack(outgoing, sp);
        }

        self.resolve(cs, now);

        if !outgoing.is_idle() && self.threads[outgoing.index()].state == ThreadState::Running {
            self.enqueue(outgoing);
        }
        let next = self.select();

        if next != outgoing {
            trace!("switch {} -> {} at {}", outgoing, next, now);
            self.emit(TraceRecord::Switch {
                from: outgoing,
                to: next,
                at: now,
            });
        }
        self.current = next;
        next
    }

    fn check_stack(&mut self, id: ThreadId, sp: usize) {
        let overflowed = match &self.threads[id.index()].stack {
            Some(stack) => sp.saturating_sub(stack.base()) <= self.stack_guard,
            None => false,
        };
        if !overflowed {
            return;
        }
        warn!(
            "stack overflow in {} ({}), thread ended",
            id,
            self.threads[id.index()].name
        );
        self.end(id);
        self.emit(TraceRecord::StackOverflow { id });
        self.overflowed = Some(id);
    }

    /// Wake every parked thread whose deadline passed or whose condition now
    /// holds.
    fn resolve(&mut self, cs: CriticalSection<'_>, now: Instant) {
        for i in 0..N {
            let slot = &self.threads[i];
            if !slot.state.is_waiting() {
                continue;
            }
            let due = slot.deadline.map_or(false, |d| d.has_passed(now));
            let satisfied = slot.wait.as_ref().map_or(false, |w| w.holds(cs));
            if due || satisfied {
                self.wake(ThreadId(i as u8), now);
            }
        }
    }

    fn select(&mut self) -> ThreadId {
        while let Some((_, id)) = self.ready.pop() {
            let slot = &mut self.threads[id.index()];
            slot.queued = false;
            if slot.state == ThreadState::Running {
                return id;
            }
        }
        ThreadId::IDLE
    }

    /// Make `id` eligible again. Returns whether it outranks the current
    /// thread.
    fn wake(&mut self, id: ThreadId, now: Instant) -> bool {
        let slot = &mut self.threads[id.index()];
        if slot.state == ThreadState::Running || !slot.state.is_live() {
            return false;
        }
        slot.state = ThreadState::Running;
        self.enqueue(id);
        self.emit(TraceRecord::Woken { id, at: now });
        self.threads[id.index()].priority > self.threads[self.current.index()].priority
    }

    /// Wake threads parked on `cell` whose predicate now holds.
    pub fn notify(&mut self, cs: CriticalSection<'_>, cell: &WaitCell, now: Instant) -> bool {
        let mut preempt = false;
        for i in 0..N {
            let slot = &self.threads[i];
            let matches = slot.state.is_blocked()
                && slot
                    .wait
                    .as_ref()
                    .map_or(false, |w| w.targets(cell) && w.holds(cs));
            if matches {
                preempt |= self.wake(ThreadId(i as u8), now);
            }
        }
        preempt
    }

    /// One pass of a blocking call for the current thread: finish the wait
    /// if it is over, otherwise (re)park the thread in `parked`.
    pub fn poll_wait(
        &mut self,
        cs: CriticalSection<'_>,
        now: Instant,
        parked: ThreadState,
        wait: Option<&WaitCondition>,
        deadline: Option<Instant>,
    ) -> Option<WaitOutcome> {
        let id = self.current;
        let slot = &mut self.threads[id.index()];
        let outcome = if wait.map_or(false, |w| w.holds(cs)) {
            Some(WaitOutcome::Ready)
        } else if deadline.map_or(false, |d| d.has_passed(now)) {
            Some(WaitOutcome::TimedOut)
        } else if slot.resumed {
            Some(WaitOutcome::Resumed)
        } else {
            None
        };

        if outcome.is_some() {
            slot.state = ThreadState::Running;
            slot.clear_wait();
            if outcome == Some(WaitOutcome::TimedOut) && wait.is_some() {
                self.emit(TraceRecord::TimedOut { id, at: now });
            }
            return outcome;
        }

        let newly_parked = slot.state != parked;
        slot.state = parked;
        slot.wait = wait.cloned();
        slot.deadline = deadline;
        if newly_parked {
            self.emit(TraceRecord::Blocked { id, state: parked });
        }
        None
    }

    /// Mark `id` ended; its stack stays until the slot is reused.
    pub fn end(&mut self, id: ThreadId) {
        let slot = &mut self.threads[id.index()];
        if !slot.state.is_live() {
            return;
        }
        slot.state = ThreadState::Ended;
        slot.clear_wait();
        self.live -= 1;
        debug!("{} ({}) ended", id, slot.name);
        self.emit(TraceRecord::ThreadEnded { id });
    }

    /// Any in-range slot, including empty and ended ones.
    pub fn slot(&self, id: ThreadId) -> OsResult<&Descriptor<C>> {
        self.threads.get(id.index()).ok_or(OsError::DoesNotExist)
    }

    /// A slot holding a thread that has not ended.
    fn live_slot_mut(&mut self, id: ThreadId) -> OsResult<&mut Descriptor<C>> {
        match self.threads.get_mut(id.index()) {
            Some(slot) if slot.state.is_live() => Ok(slot),
            _ => Err(OsError::DoesNotExist),
        }
    }

    pub fn suspend(&mut self, id: ThreadId) -> OsResult<()> {
        if id.is_idle() {
            return Err(OsError::InvalidParam);
        }
        self.live_slot_mut(id)?.state = ThreadState::Suspended;
        Ok(())
    }

    /// Force `id` back to running, abandoning any wait. Returns whether it
    /// outranks the current thread.
    pub fn resume(&mut self, id: ThreadId, now: Instant) -> OsResult<bool> {
        if id.is_idle() {
            return Err(OsError::InvalidParam);
        }
        let slot = self.live_slot_mut(id)?;
        if slot.state == ThreadState::Running {
            return Ok(false);
        }
        if slot.in_wait() {
            slot.resumed = true;
        }
        Ok(self.wake(id, now))
    }

    pub fn kill(&mut self, id: ThreadId) -> OsResult<()> {
        if id.is_idle() {
            return Err(OsError::InvalidParam);
        }
        self.live_slot_mut(id)?;
        self.end(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait::Predicate;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

    type Sched = Scheduler<(), 8>;

    fn prio(p: u8) -> Priority {
        Priority::new(p).unwrap()
    }

    fn spawn(s: &mut Sched, p: u8) -> (ThreadId, usize) {
        let id = s.free_slot().unwrap();
        let stack = Stack::allocate(256).unwrap();
        let top = stack.top();
        s.install(id, prio(p), "t", (), stack, top);
        (id, top)
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    fn reschedule(s: &mut Sched, now: u64) -> ThreadId {
        let current = s.current();
        let sp = s.threads[current.index()].sp;
        critical_section::with(|cs| s.schedule_next(cs, at(now), sp))
    }

    #[test]
    fn test_selects_highest_priority() {
        let mut s = Sched::new(8, None);
        s.adopt_idle(());
        spawn(&mut s, 3);
        let (high, _) = spawn(&mut s, 9);
        spawn(&mut s, 5);
        assert_eq!(reschedule(&mut s, 0), high);
        assert_eq!(reschedule(&mut s, 1), high);
    }

    #[test]
    fn test_equal_priorities_rotate() {
        let mut s = Sched::new(8, None);
        s.adopt_idle(());
        let (a, _) = spawn(&mut s, 4);
        let (b, _) = spawn(&mut s, 4);
        let (c, _) = spawn(&mut s, 4);
        let order: Vec<ThreadId> = (0..6).map(|t| reschedule(&mut s, t)).collect();
        assert_eq!(order, vec![a, b, c, a, b, c]);
    }

    #[test]
    fn test_falls_back_to_idle() {
        let mut s = Sched::new(8, None);
        s.adopt_idle(());
        let (a, _) = spawn(&mut s, 2);
        assert_eq!(reschedule(&mut s, 0), a);
        s.suspend(a).unwrap();
        assert_eq!(reschedule(&mut s, 0), ThreadId::IDLE);
    }

    #[test]
    fn test_sleep_deadline_resolves() {
        let mut s = Sched::new(8, None);
        s.adopt_idle(());
        let (a, _) = spawn(&mut s, 2);
        assert_eq!(reschedule(&mut s, 0), a);
        let parked = critical_section::with(|cs| {
            s.poll_wait(cs, at(0), ThreadState::Sleeping, None, Some(at(10)))
        });
        assert_eq!(parked, None);
        assert_eq!(reschedule(&mut s, 0), ThreadId::IDLE);
        assert_eq!(reschedule(&mut s, 9), ThreadId::IDLE);
        assert_eq!(reschedule(&mut s, 10), a);
    }

    #[test]
    fn test_notify_wakes_matching_waiter() {
        let mut s = Sched::new(8, None);
        s.adopt_idle(());
        let (a, _) = spawn(&mut s, 2);
        let cell = WaitCell::shared(1);
        let other = WaitCell::shared(0);
        let cond = WaitCondition::new(cell.clone(), Predicate::Below(1));
        assert_eq!(reschedule(&mut s, 0), a);
        critical_section::with(|cs| {
            s.poll_wait(cs, at(0), ThreadState::BlockedOnMutex, Some(&cond), None)
        });
        assert_eq!(reschedule(&mut s, 0), ThreadId::IDLE);

        critical_section::with(|cs| {
            assert!(!s.notify(cs, &other, at(1)));
            assert!(!s.notify(cs, &cell, at(1)));
            cell.set_in(cs, 0);
            assert!(s.notify(cs, &cell, at(1)));
        });
        assert_eq!(s.slot(a).unwrap().state, ThreadState::Running);
        assert_eq!(reschedule(&mut s, 1), a);
    }

    #[test]
    fn test_overflow_ends_thread() {
        let mut s = Sched::new(8, None);
        s.adopt_idle(());
        let (a, _) = spawn(&mut s, 2);
        assert_eq!(reschedule(&mut s, 0), a);
        let base = s.threads[a.index()].stack.as_ref().unwrap().base();
        let next = critical_section::with(|cs| s.schedule_next(cs, at(0), base + 4));
        assert_eq!(next, ThreadId::IDLE);
        assert_eq!(s.slot(a).unwrap().state, ThreadState::Ended);
        assert_eq!(s.live_count(), 1);
    }

    static REPORTED: AtomicU8 = AtomicU8::new(0);

    fn report(id: ThreadId) {
        REPORTED.store(id.0, Ordering::SeqCst);
    }

    #[test]
    fn test_overflow_reported_after_switch_decision() {
        let mut s = Sched::new(8, Some(report));
        s.adopt_idle(());
        let (a, _) = spawn(&mut s, 2);
        assert_eq!(reschedule(&mut s, 0), a);
        let base = s.threads[a.index()].stack.as_ref().unwrap().base();
        critical_section::with(|cs| s.schedule_next(cs, at(0), base + 4));
        assert_eq!(REPORTED.load(Ordering::SeqCst), 0);

        s.take_deferred().run();
        assert_eq!(REPORTED.load(Ordering::SeqCst), a.0);
        assert!(s.take_deferred().overflow.is_none());
    }

    #[test]
    fn test_trace_records_queue_until_taken() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut s = Sched::new(8, None);
        s.adopt_idle(());
        let counter = seen.clone();
        s.set_trace_hook(Some(Arc::new(move |_: &TraceRecord| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        let (a, _) = spawn(&mut s, 2);
        assert_eq!(reschedule(&mut s, 0), a);
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        let deferred = s.take_deferred();
        assert_eq!(
            deferred.records,
            vec![
                TraceRecord::ThreadAdded { id: a, priority: prio(2) },
                TraceRecord::Switch { from: ThreadId::IDLE, to: a, at: at(0) },
            ]
        );
        deferred.run();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(s.take_deferred().records.is_empty());
    }

    #[test]
    fn test_slot_reuse_releases_stack() {
        let mut s = Sched::new(8, None);
        s.adopt_idle(());
        let (a, _) = spawn(&mut s, 2);
        s.kill(a).unwrap();
        assert_eq!(s.owned_stack_bytes(), 256);
        let (b, _) = spawn(&mut s, 3);
        assert_eq!(a, b);
        assert_eq!(s.owned_stack_bytes(), 256);
        assert_eq!(reschedule(&mut s, 0), b);
        assert!(s.ready.is_empty());
    }

    #[test]
    fn test_control_validates_ids() {
        let mut s = Sched::new(8, None);
        s.adopt_idle(());
        assert_eq!(s.suspend(ThreadId(3)), Err(OsError::DoesNotExist));
        assert_eq!(s.kill(ThreadId(200)), Err(OsError::DoesNotExist));
        assert_eq!(s.resume(ThreadId(0), at(0)), Err(OsError::InvalidParam));
        assert!(s.slot(ThreadId(200)).is_err());
        assert_eq!(s.slot(ThreadId(3)).unwrap().state, ThreadState::Empty);
    }
}
