//! The kernel object

use alloc::boxed::Box;
use core::cell::{Cell, RefCell};
use critical_section::{CriticalSection, Mutex};
use log::{debug, info, warn};
use wos_core::{
    BlockReason, Instant, OsError, OsResult, Priority, RunState, ThreadId, ThreadState,
    MAX_THREADS,
};

use crate::config::KernelConfig;
use crate::port::{Port, ThreadEntry};
use crate::preempt::PreemptionGuard;
use crate::scheduler::Scheduler;
use crate::stack::Stack;
use crate::thread::ThreadConfig;
use crate::trace::TraceHook;
use crate::wait::{signal_mask, wait_timeout, Predicate, WaitCell, WaitCondition, WaitOutcome};

/// Kernel surface used by the blocking primitives.
///
/// Object safe, so a primitive holds a `&dyn KernelServices` and does not
/// carry the port and table size in its type.
pub trait KernelServices: Sync {
    fn now(&self) -> Instant;

    fn current_id(&self) -> ThreadId;

    fn config(&self) -> &KernelConfig;

    fn yield_now(&self);

    fn sleep_ms(&self, ms: u32);

    /// Park the calling thread until `wait` holds, `deadline` passes or the
    /// thread is resumed.
    fn block_on(
        &self,
        reason: BlockReason,
        wait: &WaitCondition,
        deadline: Option<Instant>,
    ) -> WaitOutcome;

    /// Wake threads parked on `cell` whose predicate now holds.
    fn notify(&self, cell: &WaitCell);

    fn os_stop(&self) -> RunState;

    fn os_start(&self) -> RunState;

    fn restore_run_state(&self, previous: RunState);

    fn signal_thread(&self, id: ThreadId, bit: u8) -> OsResult<()>;

    fn clear_thread_signal(&self, id: ThreadId, bit: u8) -> OsResult<()>;

    fn wait_thread_signal(&self, bit: u8, timeout_ms: u32) -> OsResult<()>;
}

/// Preemptive priority kernel over port `P` with `N` thread slots.
///
/// Blocking operations must be called from a kernel thread or from the
/// context that ran [`init`](Kernel::init).
pub struct Kernel<P: Port, const N: usize = MAX_THREADS> {
    port: P,
    config: KernelConfig,
    sched: Mutex<RefCell<Scheduler<P::Context, N>>>,
    run_state: Mutex<Cell<RunState>>,
    ticks: Mutex<Cell<u64>>,
}

impl<P: Port, const N: usize> Kernel<P, N> {
    pub fn new(port: P, config: KernelConfig) -> Self {
        let sched = Scheduler::new(config.stack_guard_bytes, config.stack_overflow_hook);
        Self {
            port,
            config,
            sched: Mutex::new(RefCell::new(sched)),
            run_state: Mutex::new(Cell::new(RunState::Uninitialized)),
            ticks: Mutex::new(Cell::new(0)),
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Install or remove the trace hook. Hooks run after the kernel's
    /// critical section is released.
    pub fn set_trace_hook(&self, hook: Option<TraceHook>) {
        critical_section::with(|cs| self.sched.borrow_ref_mut(cs).set_trace_hook(hook));
    }

    /// Run `f` on the thread table, then hand queued trace records and
    /// overflow reports to their hooks outside the critical section.
    fn with_sched<R>(
        &self,
        f: impl FnOnce(CriticalSection<'_>, &mut Scheduler<P::Context, N>) -> R,
    ) -> R {
        let (result, deferred) = critical_section::with(|cs| {
            let mut sched = self.sched.borrow_ref_mut(cs);
            let result = f(cs, &mut *sched);
            (result, sched.take_deferred())
        });
        deferred.run();
        result
    }

    /// Adopt the calling context as the idle thread and start the tick.
    pub fn init(&self) -> OsResult<()> {
        let first = critical_section::with(|cs| {
            let state = self.run_state.borrow(cs);
            if state.get() != RunState::Uninitialized {
                return false;
            }
            self.sched.borrow_ref_mut(cs).adopt_idle(P::Context::default());
            state.set(RunState::FirstRun);
            true
        });
        if !first {
            debug!("{} already initialized", self.config.name);
            return Ok(());
        }

        if let Err(err) = self.port.start_tick(self.config.tick_period_us) {
            critical_section::with(|cs| self.run_state.borrow(cs).set(RunState::Uninitialized));
            return Err(err);
        }
        info!(
            "{} started: {} slots, {}us tick",
            self.config.name, N, self.config.tick_period_us
        );
        Ok(())
    }

    /// Create a thread running `entry`. Returning from `entry` ends it.
    pub fn add_thread<F>(&'static self, config: ThreadConfig, entry: F) -> OsResult<ThreadId>
    where
        F: FnOnce() + Send + 'static,
    {
        let ThreadConfig {
            priority,
            stack_size,
            stack,
            name,
        } = config;
        if priority.is_idle() {
            return Err(OsError::InvalidParam);
        }
        let mut stack = match stack {
            Some(stack) => stack,
            None => Stack::allocate(stack_size.unwrap_or(self.config.default_stack_size))?,
        };
        if stack.len() <= self.config.stack_guard_bytes {
            return Err(OsError::InvalidParam);
        }

        self.with_sched(|cs, sched| {
            if self.run_state.borrow(cs).get() == RunState::Uninitialized {
                return Err(OsError::NotInitialized);
            }
            let Some(id) = sched.free_slot() else {
                warn!("no free thread slot for {}", name);
                return Err(OsError::NoMoreResources);
            };
            let start: ThreadEntry = Box::new(move || self.run_thread(entry));
            let (context, sp) = self.port.init_context(&mut stack, start)?;
            debug!("{} ({}) added at {}, {} byte stack", id, name, priority, stack.len());
            sched.install(id, priority, name, context, stack, sp);
            Ok(id)
        })
    }

    fn run_thread<F: FnOnce()>(&self, entry: F) -> ! {
        entry();
        self.exit_current()
    }

    fn exit_current(&self) -> ! {
        self.with_sched(|_, sched| {
            let id = sched.current();
            sched.end(id);
        });
        loop {
            if !self.reschedule() {
                self.idle_once();
            }
        }
    }

    /// Save, pick the next thread and switch to it. Returns whether a switch
    /// happened; when it did, the caller has since been switched back in.
    fn reschedule(&self) -> bool {
        let now = self.now();
        let handoff = self.with_sched(|cs, sched| {
            if self.run_state.borrow(cs).get() == RunState::Uninitialized {
                return None;
            }
            let from = sched.current();
            let sp = self.port.save_context(sched.context(from));
            let to = sched.schedule_next(cs, now, sp);
            if to == from {
                None
            } else {
                Some((sched.context(from).clone(), sched.context(to).clone()))
            }
        });
        match handoff {
            Some((from, to)) => {
                self.port.restore_context(&from, &to);
                true
            }
            None => false,
        }
    }

    fn idle_once(&self) {
        if let Some(callback) = self.config.idle_callback {
            callback();
        }
        if self.port.idle() {
            self.tick();
        }
    }

    /// Park the current thread; see [`KernelServices::block_on`].
    fn block(
        &self,
        reason: Option<BlockReason>,
        wait: Option<&WaitCondition>,
        deadline: Option<Instant>,
    ) -> WaitOutcome {
        let parked = match reason {
            Some(reason) => reason.state(deadline.is_some()),
            None => ThreadState::Sleeping,
        };
        loop {
            let now = self.now();
            let outcome =
                self.with_sched(|cs, sched| sched.poll_wait(cs, now, parked, wait, deadline));
            if let Some(outcome) = outcome {
                return outcome;
            }
            if !self.reschedule() {
                self.idle_once();
            }
        }
    }

    /// Timer interrupt entry.
    pub fn tick(&self) {
        let preempt = critical_section::with(|cs| {
            let ticks = self.ticks.borrow(cs);
            ticks.set(ticks.get() + 1);
            let state = self.run_state.borrow(cs);
            match state.get() {
                RunState::FirstRun => {
                    state.set(RunState::Started);
                    true
                }
                RunState::Started => true,
                _ => false,
            }
        });
        if preempt {
            self.reschedule();
        }
    }

    pub fn ticks(&self) -> u64 {
        critical_section::with(|cs| self.ticks.borrow(cs).get())
    }

    pub fn now(&self) -> Instant {
        Instant::from_millis(self.port.now_ms())
    }

    pub fn now_ms(&self) -> u64 {
        self.port.now_ms()
    }

    pub fn current_id(&self) -> ThreadId {
        critical_section::with(|cs| self.sched.borrow_ref(cs).current())
    }

    /// Threads that have not ended, the idle thread included.
    pub fn thread_count(&self) -> usize {
        critical_section::with(|cs| self.sched.borrow_ref(cs).live_count())
    }

    pub fn thread_state(&self, id: ThreadId) -> OsResult<ThreadState> {
        critical_section::with(|cs| self.sched.borrow_ref(cs).slot(id).map(|t| t.state))
    }

    pub fn thread_name(&self, id: ThreadId) -> OsResult<&'static str> {
        critical_section::with(|cs| self.sched.borrow_ref(cs).slot(id).map(|t| t.name))
    }

    pub fn thread_priority(&self, id: ThreadId) -> OsResult<Priority> {
        critical_section::with(|cs| self.sched.borrow_ref(cs).slot(id).map(|t| t.priority))
    }

    /// Stack bytes in use by `id` as of its last switch.
    pub fn stack_used(&self, id: ThreadId) -> OsResult<usize> {
        critical_section::with(|cs| {
            let sched = self.sched.borrow_ref(cs);
            let slot = sched.slot(id)?;
            if slot.state == ThreadState::Empty {
                return Err(OsError::DoesNotExist);
            }
            slot.stack_used().ok_or(OsError::InvalidParam)
        })
    }

    /// Kernel-allocated stack memory currently held by the thread table.
    pub fn stack_bytes_reserved(&self) -> usize {
        critical_section::with(|cs| self.sched.borrow_ref(cs).owned_stack_bytes())
    }

    pub fn suspend_thread(&self, id: ThreadId) -> OsResult<ThreadId> {
        let is_current = self.with_sched(|_, sched| {
            sched.suspend(id)?;
            Ok::<_, OsError>(sched.current() == id)
        })?;
        if is_current {
            self.reschedule();
        }
        Ok(id)
    }

    /// Make `id` runnable again. A thread parked in a blocking call returns
    /// from it: timed waits report `Timeout`, sleeps end early.
    pub fn resume_thread(&self, id: ThreadId) -> OsResult<ThreadId> {
        let now = self.now();
        let preempt = self.with_sched(|cs, sched| {
            let outranks = sched.resume(id, now)?;
            Ok::<_, OsError>(outranks && self.run_state.borrow(cs).get().is_preemptible())
        })?;
        if preempt {
            self.reschedule();
        }
        Ok(id)
    }

    pub fn kill_thread(&self, id: ThreadId) -> OsResult<ThreadId> {
        // Selection relies on the idle thread always being there.
        if id.is_idle() {
            return Err(OsError::InvalidParam);
        }
        if id == self.current_id() {
            self.exit_current();
        }
        self.with_sched(|_, sched| sched.kill(id))?;
        Ok(id)
    }

    pub fn yield_now(&self) {
        self.reschedule();
    }

    pub fn sleep_ms(&self, ms: u32) {
        if ms == 0 {
            self.yield_now();
            return;
        }
        let deadline = self.now().after(ms);
        self.block(None, None, Some(deadline));
    }

    pub fn run_state(&self) -> RunState {
        critical_section::with(|cs| self.run_state.borrow(cs).get())
    }

    /// Mask tick-driven preemption. Returns the previous state.
    pub fn os_stop(&self) -> RunState {
        self.swap_run_state(RunState::Stopped)
    }

    /// Unmask tick-driven preemption. Returns the previous state.
    pub fn os_start(&self) -> RunState {
        self.swap_run_state(RunState::Started)
    }

    fn swap_run_state(&self, next: RunState) -> RunState {
        critical_section::with(|cs| {
            let state = self.run_state.borrow(cs);
            let previous = state.get();
            if previous != RunState::Uninitialized {
                state.set(next);
            }
            previous
        })
    }

    pub fn restore_run_state(&self, previous: RunState) {
        critical_section::with(|cs| {
            let state = self.run_state.borrow(cs);
            if state.get() != RunState::Uninitialized {
                state.set(previous);
            }
        });
    }

    /// Mask preemption until the guard drops.
    pub fn preemption_guard(&self) -> PreemptionGuard<'_> {
        PreemptionGuard::new(self)
    }

    fn notify_cell(&self, cell: &WaitCell) {
        let now = self.now();
        let preempt = self.with_sched(|cs, sched| {
            let woke = sched.notify(cs, cell, now);
            woke && self.run_state.borrow(cs).get().is_preemptible()
        });
        if preempt {
            self.reschedule();
        }
    }

    fn thread_signals(&self, id: ThreadId) -> OsResult<alloc::sync::Arc<WaitCell>> {
        critical_section::with(|cs| {
            let sched = self.sched.borrow_ref(cs);
            let slot = sched.slot(id)?;
            if !slot.state.is_live() {
                return Err(OsError::DoesNotExist);
            }
            Ok(slot.signals.clone())
        })
    }

    /// Set bit `bit` of thread `id`'s own signal word.
    pub fn signal_thread(&self, id: ThreadId, bit: u8) -> OsResult<()> {
        let mask = signal_mask(bit)?;
        let signals = self.thread_signals(id)?;
        signals.update(|bits| *bits |= mask);
        self.notify_cell(&signals);
        Ok(())
    }

    pub fn clear_thread_signal(&self, id: ThreadId, bit: u8) -> OsResult<()> {
        let mask = signal_mask(bit)?;
        self.thread_signals(id)?.update(|bits| *bits &= !mask);
        Ok(())
    }

    pub fn check_thread_signal(&self, id: ThreadId, bit: u8) -> OsResult<bool> {
        let mask = signal_mask(bit)?;
        Ok(self.thread_signals(id)?.get() & mask != 0)
    }

    /// Wait for bit `bit` of the caller's own signal word. The bit is left set.
    pub fn wait_thread_signal(&self, bit: u8, timeout_ms: u32) -> OsResult<()> {
        let mask = signal_mask(bit)?;
        let signals = self.thread_signals(self.current_id())?;
        let wait = WaitCondition::new(signals.clone(), Predicate::AnyBits(mask));
        wait_timeout(self, BlockReason::Signal, &wait, timeout_ms, || {
            (signals.get() & mask != 0).then_some(())
        })
    }

    pub fn wait_thread_signal_indefinite(&self, bit: u8) -> OsResult<()> {
        let mask = signal_mask(bit)?;
        let signals = self.thread_signals(self.current_id())?;
        let wait = WaitCondition::new(signals.clone(), Predicate::AnyBits(mask));
        crate::wait::wait_indefinite(self, BlockReason::Signal, &wait, || {
            (signals.get() & mask != 0).then_some(())
        });
        Ok(())
    }
}

impl<P: Port, const N: usize> KernelServices for Kernel<P, N> {
    fn now(&self) -> Instant {
        Kernel::now(self)
    }

    fn current_id(&self) -> ThreadId {
        Kernel::current_id(self)
    }

    fn config(&self) -> &KernelConfig {
        &self.config
    }

    fn yield_now(&self) {
        Kernel::yield_now(self)
    }

    fn sleep_ms(&self, ms: u32) {
        Kernel::sleep_ms(self, ms)
    }

    fn block_on(
        &self,
        reason: BlockReason,
        wait: &WaitCondition,
        deadline: Option<Instant>,
    ) -> WaitOutcome {
        self.block(Some(reason), Some(wait), deadline)
    }

    fn notify(&self, cell: &WaitCell) {
        self.notify_cell(cell)
    }

    fn os_stop(&self) -> RunState {
        Kernel::os_stop(self)
    }

    fn os_start(&self) -> RunState {
        Kernel::os_start(self)
    }

    fn restore_run_state(&self, previous: RunState) {
        Kernel::restore_run_state(self, previous)
    }

    fn signal_thread(&self, id: ThreadId, bit: u8) -> OsResult<()> {
        Kernel::signal_thread(self, id, bit)
    }

    fn clear_thread_signal(&self, id: ThreadId, bit: u8) -> OsResult<()> {
        Kernel::clear_thread_signal(self, id, bit)
    }

    fn wait_thread_signal(&self, bit: u8, timeout_ms: u32) -> OsResult<()> {
        Kernel::wait_thread_signal(self, bit, timeout_ms)
    }
}
