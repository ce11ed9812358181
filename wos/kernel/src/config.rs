//! Kernel configuration

use wos_core::{ThreadId, DEFAULT_STACK_SIZE};

/// Configuration for the WOS kernel.
///
/// Sizes the runtime knobs that are not part of the type: the thread table
/// capacity is the `N` parameter of [`Kernel`](crate::Kernel).
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub name: &'static str,
    /// Period handed to the port's tick source, in microseconds.
    pub tick_period_us: u32,
    /// Stack allocated for threads whose config names no size.
    pub default_stack_size: usize,
    /// A saved stack pointer this close to the stack base counts as overflow.
    pub stack_guard_bytes: usize,
    /// Reject `unlock` from a thread other than the one holding the mutex.
    pub strict_mutex_ownership: bool,
    /// Called every time the kernel idles, before the port sleeps.
    pub idle_callback: Option<fn()>,
    /// Called when a thread is ended for overflowing, after the scheduler's
    /// critical section is released and before the switch away from it. It
    /// may query the kernel but must not block.
    pub stack_overflow_hook: Option<fn(ThreadId)>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            name: "WOS",
            tick_period_us: 1_000,
            default_stack_size: DEFAULT_STACK_SIZE,
            stack_guard_bytes: 8,
            strict_mutex_ownership: false,
            idle_callback: None,
            stack_overflow_hook: None,
        }
    }
}

impl KernelConfig {
    /// Creates a new kernel configuration builder.
    pub fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder::default()
    }
}

/// Builder for ergonomic kernel configuration construction.
#[derive(Debug, Clone, Default)]
pub struct KernelConfigBuilder {
    config: KernelConfig,
}

impl KernelConfigBuilder {
    /// Sets the kernel name.
    pub fn name(mut self, name: &'static str) -> Self {
        self.config.name = name;
        self
    }

    /// Sets the tick period in microseconds.
    pub fn tick_period_us(mut self, period: u32) -> Self {
        self.config.tick_period_us = period;
        self
    }

    pub fn default_stack_size(mut self, bytes: usize) -> Self {
        self.config.default_stack_size = bytes;
        self
    }

    pub fn stack_guard_bytes(mut self, bytes: usize) -> Self {
        self.config.stack_guard_bytes = bytes;
        self
    }

    /// Makes foreign unlocks fail with `NotOwned` instead of succeeding.
    pub fn strict_mutex_ownership(mut self, strict: bool) -> Self {
        self.config.strict_mutex_ownership = strict;
        self
    }

    /// Sets the idle callback function.
    pub fn idle_callback(mut self, callback: fn()) -> Self {
        self.config.idle_callback = Some(callback);
        self
    }

    pub fn stack_overflow_hook(mut self, hook: fn(ThreadId)) -> Self {
        self.config.stack_overflow_hook = Some(hook);
        self
    }

    /// Builds the kernel configuration.
    pub fn build(self) -> KernelConfig {
        self.config
    }
}
