//! Task list shared by the runner thread and its handle

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use wos_kernel::{Instant, OsError, OsResult};

pub(crate) type Callback = Box<dyn FnMut() + Send>;

/// Identifies a registered task. Handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u32);

impl TaskHandle {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

struct Task {
    handle: TaskHandle,
    // Taken out while the runner is calling it.
    callback: Option<Callback>,
    interval_ms: u32,
    next_exec: Instant,
    enabled: bool,
}

pub(crate) struct Registry {
    tasks: Vec<Task>,
    next_handle: u32,
    capacity: usize,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            tasks: Vec::new(),
            next_handle: 0,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn register(
        &mut self,
        callback: Callback,
        interval_ms: u32,
        now: Instant,
    ) -> OsResult<TaskHandle> {
        if interval_ms == 0 {
            return Err(OsError::InvalidParam);
        }
        if self.tasks.len() >= self.capacity {
            return Err(OsError::Full);
        }
        let handle = TaskHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        self.tasks.push(Task {
            handle,
            callback: Some(callback),
            interval_ms,
            next_exec: now.after(interval_ms),
            enabled: true,
        });
        Ok(handle)
    }

    fn find(&mut self, handle: TaskHandle) -> OsResult<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|task| task.handle == handle)
            .ok_or(OsError::DoesNotExist)
    }

    pub fn enable(&mut self, handle: TaskHandle, now: Instant) -> OsResult<()> {
        let task = self.find(handle)?;
        task.enabled = true;
        task.next_exec = now.after(task.interval_ms);
        Ok(())
    }

    pub fn disable(&mut self, handle: TaskHandle) -> OsResult<()> {
        self.find(handle)?.enabled = false;
        Ok(())
    }

    pub fn remove(&mut self, handle: TaskHandle) -> OsResult<()> {
        let index = self
            .tasks
            .iter()
            .position(|task| task.handle == handle)
            .ok_or(OsError::DoesNotExist)?;
        self.tasks.remove(index);
        Ok(())
    }

    pub fn is_enabled(&mut self, handle: TaskHandle) -> OsResult<bool> {
        Ok(self.find(handle)?.enabled)
    }

    /// Take the callbacks of every enabled task due at `now` and schedule
    /// their next run.
    pub fn take_due(&mut self, now: Instant) -> Vec<(TaskHandle, Callback)> {
        let mut due = Vec::new();
        for task in self.tasks.iter_mut() {
            if !task.enabled || !task.next_exec.has_passed(now) {
                continue;
            }
            if let Some(callback) = task.callback.take() {
                task.next_exec = now.after(task.interval_ms);
                due.push((task.handle, callback));
            }
        }
        due
    }

    /// Give a callback back after it ran. Dropped if the task was removed
    /// meanwhile.
    pub fn restore(&mut self, handle: TaskHandle, callback: Callback) {
        if let Ok(task) = self.find(handle) {
            task.callback = Some(callback);
        }
    }

    /// Milliseconds until the next enabled task is due.
    pub fn next_wait(&self, now: Instant) -> Option<u32> {
        self.tasks
            .iter()
            .filter(|task| task.enabled)
            .map(|task| task.next_exec.since(now))
            .min()
            .map(|ms| ms.min(u32::MAX as u64) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Callback {
        Box::new(|| {})
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn test_register_validates() {
        let mut registry = Registry::new(2);
        assert_eq!(registry.register(noop(), 0, at(0)), Err(OsError::InvalidParam));
        let a = registry.register(noop(), 5, at(0)).unwrap();
        let b = registry.register(noop(), 5, at(0)).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.register(noop(), 5, at(0)), Err(OsError::Full));
        registry.remove(a).unwrap();
        assert!(registry.register(noop(), 5, at(0)).is_ok());
    }

    #[test]
    fn test_due_tasks_taken_once() {
        let mut registry = Registry::new(4);
        let fast = registry.register(noop(), 10, at(0)).unwrap();
        let slow = registry.register(noop(), 25, at(0)).unwrap();

        assert!(registry.take_due(at(9)).is_empty());
        assert_eq!(registry.next_wait(at(9)), Some(1));

        let due = registry.take_due(at(10));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0, fast);
        // Still out with the runner.
        assert!(registry.take_due(at(20)).is_empty());
        for (handle, callback) in due {
            registry.restore(handle, callback);
        }
        assert_eq!(registry.next_wait(at(10)), Some(10));

        let handles: Vec<_> = registry
            .take_due(at(25))
            .into_iter()
            .map(|(handle, _)| handle)
            .collect();
        assert_eq!(handles, vec![fast, slow]);
    }

    #[test]
    fn test_disable_and_enable() {
        let mut registry = Registry::new(4);
        let task = registry.register(noop(), 10, at(0)).unwrap();
        registry.disable(task).unwrap();
        assert_eq!(registry.is_enabled(task), Ok(false));
        assert!(registry.take_due(at(50)).is_empty());
        assert_eq!(registry.next_wait(at(50)), None);

        registry.enable(task, at(50)).unwrap();
        assert!(registry.take_due(at(59)).is_empty());
        assert_eq!(registry.take_due(at(60)).len(), 1);
    }

    #[test]
    fn test_unknown_handle() {
        let mut registry = Registry::new(4);
        let task = registry.register(noop(), 10, at(0)).unwrap();
        registry.remove(task).unwrap();
        assert_eq!(registry.remove(task), Err(OsError::DoesNotExist));
        assert_eq!(registry.enable(task, at(0)), Err(OsError::DoesNotExist));
        assert_eq!(registry.disable(task), Err(OsError::DoesNotExist));
    }

    #[test]
    fn test_removed_while_running_is_dropped() {
        let mut registry = Registry::new(4);
        let task = registry.register(noop(), 1, at(0)).unwrap();
        let mut due = registry.take_due(at(1));
        registry.remove(task).unwrap();
        let (handle, callback) = due.remove(0);
        registry.restore(handle, callback);
        assert_eq!(registry.len(), 0);
    }
}
