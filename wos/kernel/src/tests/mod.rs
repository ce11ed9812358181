//! Kernel tests that do not need a real context switch.
//!
//! `StubPort` never switches: `restore_context` returns immediately. Tests
//! here stay on the idle thread and only drive operations that do not
//! block it.

use std::boxed::Box;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::vec::Vec;

use crate::port::{ContextSwitch, ThreadEntry, TickSource};
use crate::{Kernel, KernelConfig, OsError, OsResult, Stack, ThreadConfig, TraceRecord};


#[derive(Default)]
pub(crate) struct StubPort {
    now: AtomicU64,
    tick_period: AtomicU32,
}

impl ContextSwitch for StubPort {
    type Context = ();

    fn init_context(&self, stack: &mut Stack, _entry: ThreadEntry) -> OsResult<((), usize)> {
        Ok(((), stack.top()))
    }

    fn save_context(&self, _context: &()) -> usize {
        usize::MAX
    }

    fn restore_context(&self, _from: &(), _to: &()) {}
}

impl TickSource for StubPort {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn start_tick(&self, period_us: u32) -> OsResult<()> {
        if period_us == 0 {
            return Err(OsError::InvalidParam);
        }
        self.tick_period.store(period_us, Ordering::SeqCst);
        Ok(())
    }

    fn idle(&self) -> bool {
        self.now.fetch_add(1, Ordering::SeqCst);
        true
    }
}

pub(crate) fn kernel_with(config: KernelConfig) -> &'static Kernel<StubPort, 4> {
    Box::leak(Box::new(Kernel::new(StubPort::default(), config)))
}

pub(crate) fn kernel() -> &'static Kernel<StubPort, 4> {
    let kernel = kernel_with(KernelConfig::default());
    kernel.init().unwrap();
    kernel
}

fn cfg(priority: u8) -> ThreadConfig {
    ThreadConfig::new(crate::Priority::new(priority).unwrap()).with_stack_size(256)
}

#[test]
fn test_add_thread_before_init() {
    let kernel = kernel_with(KernelConfig::default());
    assert_eq!(kernel.add_thread(cfg(1), || {}), Err(OsError::NotInitialized));
}

#[test]
fn test_init_starts_tick_with_configured_period() {
    let kernel = kernel_with(KernelConfig::builder().tick_period_us(500).build());
    kernel.init().unwrap();
    assert_eq!(kernel.port().tick_period.load(Ordering::SeqCst), 500);
    assert_eq!(kernel.current_id(), crate::ThreadId::IDLE);
    assert_eq!(kernel.thread_count(), 1);
    // A second init is harmless.
    kernel.init().unwrap();
    assert_eq!(kernel.thread_count(), 1);
}

#[test]
fn test_init_reports_tick_failure() {
    let kernel = kernel_with(KernelConfig::builder().tick_period_us(0).build());
    assert_eq!(kernel.init(), Err(OsError::InvalidParam));
    assert_eq!(kernel.run_state(), crate::RunState::Uninitialized);
}

#[test]
fn test_table_exhaustion() {
    let kernel = kernel();
    // Slot 0 is the idle thread, leaving three.
    for _ in 0..3 {
        kernel.add_thread(cfg(1), || {}).unwrap();
    }
    assert_eq!(kernel.add_thread(cfg(1), || {}), Err(OsError::NoMoreResources));
    assert_eq!(kernel.thread_count(), 4);
}

#[test]
fn test_add_thread_rejects_bad_config() {
    let kernel = kernel();
    let idle_prio = ThreadConfig::new(crate::Priority::IDLE);
    assert_eq!(kernel.add_thread(idle_prio, || {}), Err(OsError::InvalidParam));
    assert_eq!(
        kernel.add_thread(cfg(1).with_stack_size(0), || {}),
        Err(OsError::InvalidParam)
    );
    assert_eq!(
        kernel.add_thread(cfg(1).with_stack_size(8), || {}),
        Err(OsError::InvalidParam)
    );
}

#[test]
fn test_thread_control_on_missing_ids() {
    let kernel = kernel();
    let missing = crate::ThreadId(2);
    assert_eq!(kernel.suspend_thread(missing), Err(OsError::DoesNotExist));
    assert_eq!(kernel.resume_thread(missing), Err(OsError::DoesNotExist));
    assert_eq!(kernel.kill_thread(missing), Err(OsError::DoesNotExist));
    assert_eq!(kernel.thread_state(missing), Ok(crate::ThreadState::Empty));
    assert_eq!(kernel.thread_state(crate::ThreadId(9)), Err(OsError::DoesNotExist));
    assert_eq!(kernel.stack_used(missing), Err(OsError::DoesNotExist));
}

#[test]
fn test_suspend_resume_kill_other_thread() {
    let kernel = kernel();
    let id = kernel.add_thread(cfg(3).with_name("worker"), || {}).unwrap();
    assert_eq!(kernel.thread_name(id), Ok("worker"));
    assert_eq!(kernel.thread_state(id), Ok(crate::ThreadState::Running));

    assert_eq!(kernel.suspend_thread(id), Ok(id));
    assert_eq!(kernel.thread_state(id), Ok(crate::ThreadState::Suspended));
    assert_eq!(kernel.os_stop(), crate::RunState::FirstRun);
    assert_eq!(kernel.resume_thread(id), Ok(id));
    assert_eq!(kernel.thread_state(id), Ok(crate::ThreadState::Running));

    assert_eq!(kernel.kill_thread(id), Ok(id));
    assert_eq!(kernel.thread_state(id), Ok(crate::ThreadState::Ended));
    assert_eq!(kernel.kill_thread(id), Err(OsError::DoesNotExist));
    assert_eq!(kernel.thread_count(), 1);
}

#[test]
fn test_idle_thread_is_protected() {
    let kernel = kernel();
    let idle = crate::ThreadId::IDLE;
    assert_eq!(kernel.suspend_thread(idle), Err(OsError::InvalidParam));
    assert_eq!(kernel.resume_thread(idle), Err(OsError::InvalidParam));
    assert_eq!(kernel.stack_used(idle), Err(OsError::InvalidParam));
}

#[test]
fn test_idle_thread_cannot_kill_itself() {
    let kernel = kernel();
    let idle = crate::ThreadId::IDLE;
    assert_eq!(kernel.current_id(), idle);
    assert_eq!(kernel.kill_thread(idle), Err(OsError::InvalidParam));
    assert_eq!(kernel.thread_state(idle), Ok(crate::ThreadState::Running));
    assert_eq!(kernel.thread_count(), 1);
}

#[test]
fn test_new_thread_uses_no_stack() {
    let kernel = kernel();
    let id = kernel.add_thread(cfg(2), || {}).unwrap();
    assert_eq!(kernel.stack_used(id), Ok(0));
    assert_eq!(kernel.stack_bytes_reserved(), 256);
}

#[test]
fn test_ended_slot_is_reused_without_leak() {
    let kernel = kernel();
    let first = kernel.add_thread(cfg(2), || {}).unwrap();
    kernel.kill_thread(first).unwrap();
    let second = kernel.add_thread(cfg(5), || {}).unwrap();
    assert_eq!(first, second);
    assert_eq!(kernel.stack_bytes_reserved(), 256);
    assert_eq!(kernel.thread_priority(second).unwrap().raw(), 5);
}

#[test]
fn test_borrowed_stack_is_not_counted() {
    let kernel = kernel();
    let buf: &'static mut [u8] = Box::leak(std::vec![0u8; 512].into_boxed_slice());
    let id = kernel
        .add_thread(cfg(2).with_stack(Stack::borrowed(buf).unwrap()), || {})
        .unwrap();
    assert_eq!(kernel.stack_bytes_reserved(), 0);
    kernel.kill_thread(id).unwrap();
    kernel.add_thread(cfg(2), || {}).unwrap();
    assert_eq!(kernel.stack_bytes_reserved(), 256);
}

#[test]
fn test_preemption_guard_restores_state() {
    let kernel = kernel();
    kernel.os_start();
    {
        let guard = kernel.preemption_guard();
        assert_eq!(guard.previous(), crate::RunState::Started);
        assert_eq!(kernel.run_state(), crate::RunState::Stopped);
        {
            let _inner = kernel.preemption_guard();
            assert_eq!(kernel.run_state(), crate::RunState::Stopped);
        }
        assert_eq!(kernel.run_state(), crate::RunState::Stopped);
    }
    assert_eq!(kernel.run_state(), crate::RunState::Started);
}

#[test]
fn test_guard_restores_on_early_return() {
    fn fallible(kernel: &Kernel<StubPort, 4>, fail: bool) -> OsResult<()> {
        let _guard = kernel.preemption_guard();
        if fail {
            return Err(OsError::Timeout);
        }
        Ok(())
    }

    let kernel = kernel();
    kernel.os_start();
    assert!(fallible(kernel, true).is_err());
    assert_eq!(kernel.run_state(), crate::RunState::Started);
}

#[test]
fn test_tick_counts_while_stopped() {
    let kernel = kernel();
    kernel.os_stop();
    kernel.tick();
    kernel.tick();
    assert_eq!(kernel.ticks(), 2);
    assert_eq!(kernel.run_state(), crate::RunState::Stopped);
}

#[test]
fn test_thread_signals() {
    let kernel = kernel();
    let id = kernel.add_thread(cfg(2), || {}).unwrap();
    assert_eq!(kernel.check_thread_signal(id, 4), Ok(false));
    kernel.os_stop();
    kernel.signal_thread(id, 4).unwrap();
    assert_eq!(kernel.check_thread_signal(id, 4), Ok(true));
    kernel.clear_thread_signal(id, 4).unwrap();
    assert_eq!(kernel.check_thread_signal(id, 4), Ok(false));
    assert_eq!(kernel.signal_thread(id, 32), Err(OsError::InvalidParam));
    assert_eq!(
        kernel.signal_thread(crate::ThreadId(3), 1),
        Err(OsError::DoesNotExist)
    );
}

#[test]
fn test_own_signal_already_set() {
    let kernel = kernel();
    let me = kernel.current_id();
    kernel.signal_thread(me, 0).unwrap();
    assert_eq!(kernel.wait_thread_signal(0, 0), Ok(()));
    assert_eq!(kernel.wait_thread_signal(1, 0), Err(OsError::Timeout));
    assert_eq!(kernel.wait_thread_signal_indefinite(0), Ok(()));
}

#[test]
fn test_trace_hook_sees_lifecycle() {
    let kernel = kernel();
    let records: Arc<StdMutex<Vec<TraceRecord>>> = Arc::default();
    let sink = records.clone();
    kernel.set_trace_hook(Some(Arc::new(move |r: &TraceRecord| {
        sink.lock().unwrap().push(*r);
    })));
    let id = kernel.add_thread(cfg(2), || {}).unwrap();
    kernel.kill_thread(id).unwrap();

    let records = records.lock().unwrap();
    assert!(matches!(records[0], TraceRecord::ThreadAdded { id: t, .. } if t == id));
    assert!(matches!(records[1], TraceRecord::ThreadEnded { id: t } if t == id));
}

#[test]
fn test_idle_thread_times_out() {
    let kernel = kernel();
    let records: Arc<StdMutex<Vec<TraceRecord>>> = Arc::default();
    let sink = records.clone();
    kernel.set_trace_hook(Some(Arc::new(move |r: &TraceRecord| {
        sink.lock().unwrap().push(*r);
    })));

    let mutex = crate::Mutex::new(kernel);
    mutex.lock_indefinite();
    assert_eq!(mutex.lock(5), Err(OsError::Timeout));
    assert_eq!(kernel.now_ms(), 5);
    assert_eq!(kernel.ticks(), 5);

    let records = records.lock().unwrap();
    assert!(records.contains(&TraceRecord::TimedOut {
        id: crate::ThreadId::IDLE,
        at: crate::Instant::from_millis(5),
    }));
}
