#![no_std]
#![forbid(unsafe_code)]

//! # WOS Core
//!
//! Vocabulary shared by every WOS crate: thread ids and priorities, the
//! thread state machine, the error taxonomy and the max-heap the scheduler
//! uses as its ready queue. Nothing here touches hardware or allocates.

pub mod error;
pub mod priority;
pub mod queue;
pub mod state;
pub mod time;

pub use error::*;
pub use priority::*;
pub use queue::*;
pub use state::*;
pub use time::*;

/// WOS version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default thread table capacity.
pub const MAX_THREADS: usize = 128;

/// Stack size used when a thread config does not name one, in bytes.
pub const DEFAULT_STACK_SIZE: usize = 4092;

/// Number of addressable bits in a signal word.
pub const SIGNAL_BITS: u8 = 32;
