//! Hook vectors for the execution core.
//!
//! Each hook kind is a `Vec` of boxed callables, guarded by the core's
//! reentrant lock. Per the design notes in spec.md §9, the list is copied
//! out from under the lock before invoking so a callback may register a new
//! hook of its own without deadlocking.

use std::sync::Arc;

use mbios_registers::RegisterFile;

use crate::execution_core::ExecutionCore;
use crate::error::CoreError;

/// Invoked just before the emulation thread begins stepping.
pub type OnStart = Arc<dyn Fn(&ExecutionCore) + Send + Sync>;

/// Invoked just after the emulation thread stops.
pub type OnStop = Arc<dyn Fn(&ExecutionCore) + Send + Sync>;

/// Invoked on a software interrupt; returns whether it was handled.
pub type OnInterrupt = Arc<dyn Fn(u32, &ExecutionCore) -> bool + Send + Sync>;

/// Invoked on a fatal condition; returns whether it was handled.
pub type OnException = Arc<dyn Fn(&CoreError, &ExecutionCore) -> bool + Send + Sync>;

/// Invoked on an access to an unmapped or disallowed address.
pub type OnInvalidMemoryAccess = Arc<dyn Fn(u64, usize, &ExecutionCore) + Send + Sync>;

/// Invoked on a valid guest write or fetch.
pub type OnValidMemoryAccess = Arc<dyn Fn(u64, usize, &ExecutionCore) + Send + Sync>;

/// Invoked at each instruction fetch with its raw encoding.
pub type BeforeInstruction = Arc<dyn Fn(u64, &[u8], &ExecutionCore) + Send + Sync>;

/// Invoked at the *next* fetch with the captured state of the previous one.
pub type AfterInstruction = Arc<dyn Fn(u64, &RegisterFile, &[u8], &ExecutionCore) + Send + Sync>;

/// The snapshot captured at one `before_instruction` call, replayed to the
/// matching `after_instruction` call at the next fetch.
#[derive(Clone)]
pub(crate) struct PendingInstruction {
    pub address: u64,
    pub registers: RegisterFile,
    pub bytes: Vec<u8>,
}

/// All hook vectors owned by one [`ExecutionCore`].
#[derive(Default)]
pub(crate) struct Hooks {
    pub on_start: Vec<OnStart>,
    pub on_stop: Vec<OnStop>,
    pub on_interrupt: Vec<OnInterrupt>,
    pub on_exception: Vec<OnException>,
    pub on_invalid_memory_access: Vec<OnInvalidMemoryAccess>,
    pub on_valid_memory_access: Vec<OnValidMemoryAccess>,
    pub before_instruction: Vec<BeforeInstruction>,
    pub after_instruction: Vec<AfterInstruction>,
    pub pending_instruction: Option<PendingInstruction>,
}
