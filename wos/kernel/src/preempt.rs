use wos_core::RunState;

use crate::kernel::KernelServices;

/// Masks tick-driven preemption for its lifetime.
///
/// Dropping the guard restores whatever run state was in force when it was
/// taken, so nested guards and early returns unwind correctly. Explicit
/// yields and blocking calls still switch threads while it is held.
#[must_use = "preemption is restored as soon as the guard is dropped"]
pub struct PreemptionGuard<'k> {
    kernel: &'k dyn KernelServices,
    previous: RunState,
}

impl<'k> PreemptionGuard<'k> {
    pub fn new(kernel: &'k dyn KernelServices) -> Self {
        let previous = kernel.os_stop();
        Self { kernel, previous }
    }

    /// Run state that will be restored on drop.
    pub fn previous(&self) -> RunState {
        self.previous
    }
}

impl Drop for PreemptionGuard<'_> {
    fn drop(&mut self) {
        self.kernel.restore_run_state(self.previous);
    }
}
