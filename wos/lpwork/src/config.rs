use wos_kernel::{priority, Priority};

/// Runner thread settings.
#[derive(Debug, Clone)]
pub struct LpWorkConfig {
    pub priority: Priority,
    pub stack_size: usize,
    /// Most tasks the registry holds at once.
    pub capacity: usize,
    /// Sleep between passes while no task is enabled.
    pub idle_interval_ms: u32,
}

impl Default for LpWorkConfig {
    fn default() -> Self {
        Self {
            priority: priority!(1),
            stack_size: 2048,
            capacity: 256,
            idle_interval_ms: 10,
        }
    }
}

impl LpWorkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn with_capacity(mut self, tasks: usize) -> Self {
        self.capacity = tasks;
        self
    }

    pub fn with_idle_interval(mut self, ms: u32) -> Self {
        self.idle_interval_ms = ms;
        self
    }
}
