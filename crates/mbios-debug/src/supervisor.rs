//! Breakpoint and single-step state machine.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mbios_engine::ExecutionCore;

use crate::frontend::{DebugFrontend, ResumeKey};

/// Pauses emulation on breakpoints, single steps, and interrupt boundaries,
/// handing control to a [`DebugFrontend`] each time.
pub struct DebugSupervisor {
    break_on_interrupt: AtomicBool,
    break_on_interrupt_return: AtomicBool,
    trap: AtomicBool,
    single_step: AtomicBool,
    single_step_once: AtomicBool,
    breakpoints: Mutex<HashSet<u64>>,
    frontend: Arc<dyn DebugFrontend>,
}

impl DebugSupervisor {
    /// Builds a supervisor with every break condition disabled.
    #[must_use]
    pub fn new(frontend: Arc<dyn DebugFrontend>) -> Arc<Self> {
        Arc::new(Self {
            break_on_interrupt: AtomicBool::new(false),
            break_on_interrupt_return: AtomicBool::new(false),
            trap: AtomicBool::new(false),
            single_step: AtomicBool::new(false),
            single_step_once: AtomicBool::new(false),
            breakpoints: Mutex::new(HashSet::new()),
            frontend,
        })
    }

    pub fn set_break_on_interrupt(&self, enabled: bool) {
        self.break_on_interrupt.store(enabled, Ordering::Relaxed);
    }

    pub fn set_break_on_interrupt_return(&self, enabled: bool) {
        self.break_on_interrupt_return.store(enabled, Ordering::Relaxed);
    }

    pub fn set_trap(&self, enabled: bool) {
        self.trap.store(enabled, Ordering::Relaxed);
    }

    pub fn set_single_step(&self, enabled: bool) {
        self.single_step.store(enabled, Ordering::Relaxed);
    }

    pub fn add_breakpoint(&self, address: u64) {
        self.breakpoints.lock().unwrap().insert(address);
    }

    pub fn remove_breakpoint(&self, address: u64) {
        self.breakpoints.lock().unwrap().remove(&address);
    }

    #[must_use]
    pub fn has_breakpoint(&self, address: u64) -> bool {
        self.breakpoints.lock().unwrap().contains(&address)
    }

    /// Registers the `before_instruction` half of the state machine onto
    /// `core`. The `on_interrupt` half is composed separately with
    /// [`Self::wrap_interrupt_handler`], since `ExecutionCore` treats the
    /// first `on_interrupt` callback that claims a vector as authoritative
    /// and a bare second subscriber would never run.
    pub fn install(self: &Arc<Self>, core: &ExecutionCore) {
        let supervisor = Arc::clone(self);
        core.before_instruction(move |addr, _bytes, _core| {
            supervisor.on_before_instruction(addr);
        });
    }

    fn on_before_instruction(&self, addr: u64) {
        if self.single_step.load(Ordering::Relaxed) || self.single_step_once.swap(false, Ordering::Relaxed) {
            self.pause("");
        } else if self.has_breakpoint(addr) {
            self.pause(&format!("{addr:#018X}"));
        }
    }

    /// Wraps an interrupt handler so it pauses around the dispatch per
    /// `break_on_interrupt`/`break_on_interrupt_return`. The returned
    /// closure is what callers register with `ExecutionCore::on_interrupt`.
    pub fn wrap_interrupt_handler<F>(
        self: &Arc<Self>,
        inner: F,
    ) -> impl Fn(u32, &ExecutionCore) -> bool + Send + Sync + 'static
    where
        F: Fn(u32, &ExecutionCore) -> bool + Send + Sync + 'static,
    {
        let supervisor = Arc::clone(self);
        move |vector, core| {
            if supervisor.break_on_interrupt.load(Ordering::Relaxed) {
                supervisor.pause(&format!("Interrupt {vector:#x}"));
            }
            let handled = inner(vector, core);
            if supervisor.break_on_interrupt_return.load(Ordering::Relaxed) {
                supervisor.pause("Return from interrupt");
            }
            handled
        }
    }

    fn pause(&self, msg: &str) {
        if !msg.is_empty() {
            self.frontend.write_debug_line(&format!("[ BREAK ]>{msg}"));
        }

        if self.trap.load(Ordering::Relaxed) {
            raise_trap();
            return;
        }

        match self.frontend.wait_for_user_resume() {
            ResumeKey::Space => self.single_step_once.store(true, Ordering::Relaxed),
            ResumeKey::Other | ResumeKey::Stop => {
                self.single_step.store(false, Ordering::Relaxed);
                self.single_step_once.store(false, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(target_arch = "x86_64")]
fn raise_trap() {
    // SAFETY: `int3` takes no operands and always traps; under a debugger
    // this stops here, otherwise the OS delivers SIGTRAP and terminates us.
    unsafe {
        std::arch::asm!("int3");
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn raise_trap() {
    panic!("trap requested but the host architecture has no int3 equivalent");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct ScriptedFrontend {
        lines: StdMutex<Vec<String>>,
        keys: StdMutex<Vec<ResumeKey>>,
    }

    impl ScriptedFrontend {
        fn new(keys: Vec<ResumeKey>) -> Arc<Self> {
            Arc::new(Self {
                lines: StdMutex::new(Vec::new()),
                keys: StdMutex::new(keys),
            })
        }
    }

    impl DebugFrontend for ScriptedFrontend {
        fn write_debug_line(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }

        fn wait_for_user_resume(&self) -> ResumeKey {
            self.keys.lock().unwrap().remove(0)
        }
    }

    #[test]
    fn breakpoint_hit_pauses_with_hex_address() {
        let frontend = ScriptedFrontend::new(vec![ResumeKey::Other]);
        let supervisor = DebugSupervisor::new(frontend.clone());
        supervisor.add_breakpoint(0x7C00);

        supervisor.on_before_instruction(0x7C00);

        assert_eq!(
            frontend.lines.lock().unwrap().as_slice(),
            ["[ BREAK ]>0x0000000000007C00"]
        );
    }

    #[test]
    fn non_breakpoint_address_does_not_pause() {
        let frontend = ScriptedFrontend::new(vec![]);
        let supervisor = DebugSupervisor::new(frontend.clone());
        supervisor.add_breakpoint(0x7C00);

        supervisor.on_before_instruction(0x1234);

        assert!(frontend.lines.lock().unwrap().is_empty());
    }

    #[test]
    fn single_step_pauses_on_every_instruction() {
        let frontend = ScriptedFrontend::new(vec![ResumeKey::Other, ResumeKey::Other]);
        let supervisor = DebugSupervisor::new(frontend.clone());
        supervisor.set_single_step(true);

        supervisor.on_before_instruction(0x0000);
        supervisor.on_before_instruction(0x0001);

        assert_eq!(frontend.lines.lock().unwrap().len(), 2);
    }

    #[test]
    fn space_at_a_breakpoint_arms_one_more_step() {
        let frontend = ScriptedFrontend::new(vec![ResumeKey::Space, ResumeKey::Other]);
        let supervisor = DebugSupervisor::new(frontend.clone());
        supervisor.add_breakpoint(0x7C00);

        supervisor.on_before_instruction(0x7C00); // breakpoint hit, user presses space
        supervisor.on_before_instruction(0x7C03); // not a breakpoint, but single_step_once fires

        assert_eq!(frontend.lines.lock().unwrap().len(), 2);
    }

    #[test]
    fn other_key_clears_single_step_flags() {
        let frontend = ScriptedFrontend::new(vec![ResumeKey::Other]);
        let supervisor = DebugSupervisor::new(frontend.clone());
        supervisor.set_single_step(true);

        supervisor.on_before_instruction(0x0000);

        assert!(!supervisor.single_step.load(Ordering::Relaxed));
        assert!(!supervisor.single_step_once.load(Ordering::Relaxed));
    }

    #[test]
    fn wrap_interrupt_handler_pauses_before_and_after_when_enabled() {
        let frontend = ScriptedFrontend::new(vec![ResumeKey::Other, ResumeKey::Other]);
        let supervisor = DebugSupervisor::new(frontend.clone());
        supervisor.set_break_on_interrupt(true);
        supervisor.set_break_on_interrupt_return(true);

        let core = ExecutionCore::new(2 * 1024 * 1024).unwrap();
        let wrapped = supervisor.wrap_interrupt_handler(|_vector, _core| true);
        let handled = wrapped(0x10, &core);

        assert!(handled);
        assert_eq!(
            frontend.lines.lock().unwrap().as_slice(),
            ["[ BREAK ]>Interrupt 0x10", "[ BREAK ]>Return from interrupt"]
        );
    }
}
