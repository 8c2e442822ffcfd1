//! The execution core: owns the emulator handle, flat memory, hook
//! dispatch, and the concurrency contract between the emulation thread and
//! its supervisor.

use std::cell::{Cell, RefCell};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use parking_lot::ReentrantMutex;
use unicorn_engine::unicorn_const::{Arch, HookType, Permission};
use unicorn_engine::{RegisterX86, Unicorn};

use mbios_registers::RegisterFile;

use crate::error::{CoreError, EngineError, EngineErrorKind, InvalidMemoryAccess, UnhandledInterrupt};
use crate::hooks::{
    AfterInstruction, BeforeInstruction, Hooks, OnException, OnInterrupt, OnInvalidMemoryAccess,
    OnStart, OnStop, OnValidMemoryAccess, PendingInstruction,
};
use crate::mode::CpuMode;

/// Maximum step count passed to `emu_start`: unbounded, matching spec.md
/// §4.1's `MAX_U64` run-until-stopped convention.
const RUN_UNBOUNDED: u64 = u64::MAX;

thread_local! {
    /// Non-null while this thread is synchronously inside a unicorn hook
    /// callback fired by this thread's own `emu_start` call, pointing at
    /// the `Unicorn` handle that callback was given. Lets [`ExecutionCore`]
    /// accessor methods called back into from a hook reuse that live
    /// handle instead of re-locking `Shared::uc`, which `start()` holds
    /// borrowed for the whole `emu_start` call.
    static ACTIVE_UC: Cell<*mut Unicorn<'static, ()>> = Cell::new(std::ptr::null_mut());
}

/// RAII scope that publishes `uc` to [`ExecutionCore::with_uc`] for the
/// duration of one hook invocation, clearing it again on drop (including on
/// unwind, so a panicking hook doesn't leave a dangling pointer behind).
struct ActiveUc;

impl ActiveUc {
    fn enter(uc: &mut Unicorn<'static, ()>) -> Self {
        ACTIVE_UC.with(|cell| cell.set(uc as *mut _));
        Self
    }
}

impl Drop for ActiveUc {
    fn drop(&mut self) {
        ACTIVE_UC.with(|cell| cell.set(std::ptr::null_mut()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    Stopping,
}

/// Hook bookkeeping and mode/guard flags. Deliberately holds no reference to
/// the engine handle itself — see [`Shared::uc`] — so dispatch can always
/// freely borrow this cell, even while `emu_start` has the handle borrowed
/// for the whole run.
struct EngineState {
    mode: CpuMode,
    hooks: Hooks,
    guard_reserved_writes: bool,
}

struct Shared {
    /// The emulator handle, locked and borrowed for the entire duration of
    /// `emu_start`. Hooks firing synchronously on that same thread during
    /// the call must not borrow this a second time (it would panic); they
    /// reach the engine through [`ExecutionCore::with_uc`] instead, which
    /// detects that reentry and reuses the hook's own handle.
    uc: ReentrantMutex<RefCell<Unicorn<'static, ()>>>,
    memory_size: u64,
    state: ReentrantMutex<RefCell<EngineState>>,
    run: Mutex<RunState>,
    run_cv: Condvar,
}

fn uc_err(kind: EngineErrorKind, e: impl std::fmt::Debug) -> EngineError {
    EngineError::new(kind, format!("{e:?}"))
}

fn read_registers(uc: &mut Unicorn<'static, ()>) -> Result<RegisterFile, EngineError> {
    let mut regs = RegisterFile::new();
    let reg = |r| uc.reg_read(r).map_err(|e| uc_err(EngineErrorKind::RegAccess, e));

    regs.set_rax(reg(RegisterX86::RAX)?);
    regs.set_rbx(reg(RegisterX86::RBX)?);
    regs.set_rcx(reg(RegisterX86::RCX)?);
    regs.set_rdx(reg(RegisterX86::RDX)?);
    regs.set_rsi(reg(RegisterX86::RSI)?);
    regs.set_rdi(reg(RegisterX86::RDI)?);
    regs.set_rsp(reg(RegisterX86::RSP)?);
    regs.set_rbp(reg(RegisterX86::RBP)?);
    regs.set_rip(reg(RegisterX86::RIP)?);
    regs.set_r8(reg(RegisterX86::R8)?);
    regs.set_r9(reg(RegisterX86::R9)?);
    regs.set_r10(reg(RegisterX86::R10)?);
    regs.set_r11(reg(RegisterX86::R11)?);
    regs.set_r12(reg(RegisterX86::R12)?);
    regs.set_r13(reg(RegisterX86::R13)?);
    regs.set_r14(reg(RegisterX86::R14)?);
    regs.set_r15(reg(RegisterX86::R15)?);
    regs.cs = reg(RegisterX86::CS)? as u16;
    regs.ds = reg(RegisterX86::DS)? as u16;
    regs.es = reg(RegisterX86::ES)? as u16;
    regs.fs = reg(RegisterX86::FS)? as u16;
    regs.gs = reg(RegisterX86::GS)? as u16;
    regs.ss = reg(RegisterX86::SS)? as u16;
    regs.set_eflags(reg(RegisterX86::EFLAGS)?);

    Ok(regs)
}

fn write_registers(uc: &mut Unicorn<'static, ()>, regs: &RegisterFile) -> Result<(), EngineError> {
    let mut set = |r, v: u64| -> Result<(), EngineError> {
        uc.reg_write(r, v)
            .map_err(|e| uc_err(EngineErrorKind::RegAccess, e))
    };

    set(RegisterX86::RAX, regs.rax())?;
    set(RegisterX86::RBX, regs.rbx())?;
    set(RegisterX86::RCX, regs.rcx())?;
    set(RegisterX86::RDX, regs.rdx())?;
    set(RegisterX86::RSI, regs.rsi())?;
    set(RegisterX86::RDI, regs.rdi())?;
    set(RegisterX86::RSP, regs.rsp())?;
    set(RegisterX86::RBP, regs.rbp())?;
    set(RegisterX86::RIP, regs.rip())?;
    set(RegisterX86::R8, regs.r8())?;
    set(RegisterX86::R9, regs.r9())?;
    set(RegisterX86::R10, regs.r10())?;
    set(RegisterX86::R11, regs.r11())?;
    set(RegisterX86::R12, regs.r12())?;
    set(RegisterX86::R13, regs.r13())?;
    set(RegisterX86::R14, regs.r14())?;
    set(RegisterX86::R15, regs.r15())?;
    set(RegisterX86::CS, u64::from(regs.cs))?;
    set(RegisterX86::DS, u64::from(regs.ds))?;
    set(RegisterX86::ES, u64::from(regs.es))?;
    set(RegisterX86::FS, u64::from(regs.fs))?;
    set(RegisterX86::GS, u64::from(regs.gs))?;
    set(RegisterX86::SS, u64::from(regs.ss))?;
    set(RegisterX86::EFLAGS, regs.eflags())?;

    Ok(())
}

/// The execution core. Cheaply cloneable — every clone shares the same
/// underlying engine handle and hook vectors.
#[derive(Clone)]
pub struct ExecutionCore {
    shared: Arc<Shared>,
}

impl ExecutionCore {
    /// Opens a fresh 16-bit real-mode engine handle and maps `memory_size`
    /// bytes of read/write/execute guest memory starting at address 0.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the engine handle cannot be opened, guest
    /// memory cannot be mapped, or a hook cannot be registered.
    pub fn new(memory_size: u64) -> Result<Self, EngineError> {
        let mut uc = Unicorn::new(Arch::X86, CpuMode::Real.unicorn_mode())
            .map_err(|e| uc_err(EngineErrorKind::Open, e))?;
        uc.mem_map(0, memory_size as usize, Permission::ALL)
            .map_err(|e| uc_err(EngineErrorKind::MemMap, e))?;

        let state = EngineState {
            mode: CpuMode::Real,
            hooks: Hooks::default(),
            guard_reserved_writes: true,
        };
        let shared = Arc::new(Shared {
            uc: ReentrantMutex::new(RefCell::new(uc)),
            memory_size,
            state: ReentrantMutex::new(RefCell::new(state)),
            run: Mutex::new(RunState::Idle),
            run_cv: Condvar::new(),
        });

        let core = Self { shared };
        core.install_dispatch_hooks()?;
        Ok(core)
    }

    fn install_dispatch_hooks(&self) -> Result<(), EngineError> {
        let memory_size = self.shared.memory_size;
        let guard = self.shared.uc.lock();
        let mut uc = guard.borrow_mut();

        let intr_core = self.clone();
        uc.add_intr_hook(move |uc, vector| {
            let _active = ActiveUc::enter(uc);
            intr_core.dispatch_interrupt(vector);
        })
        .map_err(|e| uc_err(EngineErrorKind::HookAdd, e))?;

        let code_core = self.clone();
        uc.add_code_hook(0, memory_size, move |uc, addr, size| {
            let _active = ActiveUc::enter(uc);
            let mut bytes = vec![0u8; size as usize];
            if uc.mem_read(addr, &mut bytes).is_ok() {
                code_core.dispatch_instruction(addr, &bytes);
            }
        })
        .map_err(|e| uc_err(EngineErrorKind::HookAdd, e))?;

        let invalid_core = self.clone();
        uc.add_mem_hook(
            HookType::MEM_INVALID,
            0,
            u64::MAX,
            move |uc, _kind, addr, size, _value| {
                let _active = ActiveUc::enter(uc);
                invalid_core.dispatch_invalid_access(addr, size as usize);
                false
            },
        )
        .map_err(|e| uc_err(EngineErrorKind::HookAdd, e))?;

        let valid_core = self.clone();
        uc.add_mem_hook(
            HookType::MEM_WRITE | HookType::MEM_FETCH,
            0,
            u64::MAX,
            move |uc, _kind, addr, size, _value| {
                let _active = ActiveUc::enter(uc);
                valid_core.dispatch_valid_access(addr, size as usize);
                true
            },
        )
        .map_err(|e| uc_err(EngineErrorKind::HookAdd, e))?;

        Ok(())
    }

    /// Runs `f` against the live engine handle. If this thread is already
    /// inside a unicorn hook (reentering via a BIOS handler called from
    /// `on_interrupt`, `before_instruction`, etc.), reuses that hook's own
    /// handle; `Shared::uc`'s cell is already borrowed for the whole
    /// `emu_start` call on this same thread and a second borrow would
    /// panic. Otherwise locks and borrows `Shared::uc` normally.
    fn with_uc<R>(&self, f: impl FnOnce(&mut Unicorn<'static, ()>) -> R) -> R {
        let active = ACTIVE_UC.with(Cell::get);
        if active.is_null() {
            let guard = self.shared.uc.lock();
            let mut uc = guard.borrow_mut();
            f(&mut uc)
        } else {
            // SAFETY: `active` is non-null only while the `ActiveUc` guard
            // set up by the enclosing hook invocation is still alive on
            // this same thread (cleared on that scope's exit, including on
            // unwind), so the pointer stays valid for this call.
            f(unsafe { &mut *active })
        }
    }

    // -- hook registration -------------------------------------------------

    /// Registers a callback invoked just before the emulation thread begins
    /// stepping.
    pub fn on_start(&self, f: impl Fn(&ExecutionCore) + Send + Sync + 'static) {
        self.with_hooks(|h| h.on_start.push(Arc::new(f) as OnStart));
    }

    /// Registers a callback invoked just after the emulation thread stops.
    pub fn on_stop(&self, f: impl Fn(&ExecutionCore) + Send + Sync + 'static) {
        self.with_hooks(|h| h.on_stop.push(Arc::new(f) as OnStop));
    }

    /// Registers a callback invoked on a software interrupt. Returning
    /// `true` claims the interrupt.
    pub fn on_interrupt(&self, f: impl Fn(u32, &ExecutionCore) -> bool + Send + Sync + 'static) {
        self.with_hooks(|h| h.on_interrupt.push(Arc::new(f) as OnInterrupt));
    }

    /// Registers a callback invoked on a fatal condition. Returning `true`
    /// claims the exception.
    pub fn on_exception(&self, f: impl Fn(&CoreError, &ExecutionCore) -> bool + Send + Sync + 'static) {
        self.with_hooks(|h| h.on_exception.push(Arc::new(f) as OnException));
    }

    /// Registers a callback invoked on an invalid fetch/read/write.
    pub fn on_invalid_memory_access(&self, f: impl Fn(u64, usize, &ExecutionCore) + Send + Sync + 'static) {
        self.with_hooks(|h| h.on_invalid_memory_access.push(Arc::new(f) as OnInvalidMemoryAccess));
    }

    /// Registers a callback invoked on a valid guest write or fetch.
    pub fn on_valid_memory_access(&self, f: impl Fn(u64, usize, &ExecutionCore) + Send + Sync + 'static) {
        self.with_hooks(|h| h.on_valid_memory_access.push(Arc::new(f) as OnValidMemoryAccess));
    }

    /// Registers a callback invoked at each instruction fetch.
    pub fn before_instruction(&self, f: impl Fn(u64, &[u8], &ExecutionCore) + Send + Sync + 'static) {
        self.with_hooks(|h| h.before_instruction.push(Arc::new(f) as BeforeInstruction));
    }

    /// Registers a callback invoked with the previous instruction's captured
    /// state at the next fetch.
    pub fn after_instruction(
        &self,
        f: impl Fn(u64, &RegisterFile, &[u8], &ExecutionCore) + Send + Sync + 'static,
    ) {
        self.with_hooks(|h| h.after_instruction.push(Arc::new(f) as AfterInstruction));
    }

    fn with_hooks<R>(&self, f: impl FnOnce(&mut Hooks) -> R) -> R {
        let guard = self.shared.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state.hooks)
    }

    /// Whether reserved/ACPI memory regions are protected from guest writes
    /// while running. Defaults to enabled; see spec.md §9's open question.
    pub fn set_guard_reserved_writes(&self, enabled: bool) {
        let guard = self.shared.state.lock();
        guard.borrow_mut().guard_reserved_writes = enabled;
    }

    // -- dispatch (invoked on the emulation thread) ------------------------

    fn dispatch_interrupt(&self, vector: u32) {
        let guard = self.shared.state.lock();
        let handled = {
            let state = guard.borrow();
            let callbacks = state.hooks.on_interrupt.clone();
            drop(state);
            callbacks.iter().any(|cb| cb(vector, self))
        };
        drop(guard);

        if !handled {
            self.raise(CoreError::UnhandledInterrupt(UnhandledInterrupt(vector)));
        }
    }

    fn dispatch_instruction(&self, addr: u64, bytes: &[u8]) {
        let guard = self.shared.state.lock();
        let pending = {
            let mut state = guard.borrow_mut();
            state.hooks.pending_instruction.take()
        };

        if let Some(prev) = pending {
            let callbacks = guard.borrow().hooks.after_instruction.clone();
            for cb in &callbacks {
                cb(prev.address, &prev.registers, &prev.bytes, self);
            }
        }

        let registers = self.with_uc(|uc| read_registers(uc).unwrap_or_default());

        let before_callbacks = guard.borrow().hooks.before_instruction.clone();
        for cb in &before_callbacks {
            cb(addr, bytes, self);
        }

        guard.borrow_mut().hooks.pending_instruction = Some(PendingInstruction {
            address: addr,
            registers,
            bytes: bytes.to_vec(),
        });
    }

    fn dispatch_invalid_access(&self, addr: u64, size: usize) {
        let guard = self.shared.state.lock();
        let callbacks = guard.borrow().hooks.on_invalid_memory_access.clone();
        drop(guard);
        for cb in &callbacks {
            cb(addr, size, self);
        }
        self.raise(CoreError::InvalidMemoryAccess(InvalidMemoryAccess {
            address: addr,
            size: size as u64,
        }));
    }

    fn dispatch_valid_access(&self, addr: u64, size: usize) {
        let guarded = {
            let guard = self.shared.state.lock();
            guard.borrow().guard_reserved_writes
        };
        if guarded && self.intersects_reserved(addr, size) {
            self.raise(CoreError::InvalidMemoryAccess(InvalidMemoryAccess {
                address: addr,
                size: size as u64,
            }));
            return;
        }

        let guard = self.shared.state.lock();
        let callbacks = guard.borrow().hooks.on_valid_memory_access.clone();
        drop(guard);
        for cb in &callbacks {
            cb(addr, size, self);
        }
    }

    /// Whether `[addr, addr+size)` intersects a BIOS-reserved region.
    ///
    /// A pure address-range check against the fixed layout from spec.md §3;
    /// kept here (rather than depending on `mbios-memory`) since the engine
    /// only needs the Reserved/ACPI envelope, not the full memory-map API.
    fn intersects_reserved(&self, addr: u64, size: usize) -> bool {
        if size == 0 {
            return false;
        }
        let end = addr.saturating_add(size as u64 - 1);
        let ranges = [(0x0009_FC00u64, 0x0009_FFFFu64), (0x000F_0000, 0x000F_FFFF)];
        ranges.iter().any(|&(lo, hi)| addr <= hi && end >= lo)
    }

    fn raise(&self, err: CoreError) {
        let guard = self.shared.state.lock();
        let callbacks = guard.borrow().hooks.on_exception.clone();
        drop(guard);
        let handled = callbacks.iter().any(|cb| cb(&err, self));
        if !handled {
            self.stop();
        }
    }

    // -- lifecycle ----------------------------------------------------------

    /// Starts emulation at `address` on a dedicated emulation thread.
    ///
    /// Returns `false` without side effects if the core is not `Idle`.
    pub fn start(&self, address: u64) -> bool {
        {
            let mut run = self.shared.run.lock().unwrap();
            if *run != RunState::Idle {
                return false;
            }
            *run = RunState::Running;
            self.shared.run_cv.notify_all();
        }

        let callbacks = self.with_hooks(|h| h.on_start.clone());
        for cb in &callbacks {
            cb(self);
        }

        let core = self.clone();
        thread::spawn(move || {
            let result = {
                let guard = core.shared.uc.lock();
                let mut uc = guard.borrow_mut();
                uc.emu_start(address, RUN_UNBOUNDED, 0, 0)
            };

            if let Err(e) = result {
                core.raise(CoreError::Engine(uc_err(EngineErrorKind::EmuStart, e)));
            }

            {
                let mut run = core.shared.run.lock().unwrap();
                *run = RunState::Idle;
                core.shared.run_cv.notify_all();
            }

            let stop_callbacks = core.with_hooks(|h| h.on_stop.clone());
            for cb in &stop_callbacks {
                cb(&core);
            }
        });

        true
    }

    /// Asks the emulation loop to exit. A no-op if not `Running`.
    pub fn stop(&self) {
        let mut run = self.shared.run.lock().unwrap();
        if *run != RunState::Running {
            return;
        }
        *run = RunState::Stopping;
        drop(run);

        // May be called reentrantly (e.g. a halt handler calling this from
        // inside an interrupt hook on the emulation thread), so this goes
        // through `with_uc` rather than locking `Shared::uc` directly.
        let _ = self.with_uc(|uc| uc.emu_stop());
    }

    /// Blocks until the core returns to `Idle`.
    pub fn wait_until_finished(&self) {
        let run = self.shared.run.lock().unwrap();
        let _guard = self
            .shared
            .run_cv
            .wait_while(run, |s| *s != RunState::Idle)
            .unwrap();
    }

    /// Whether the emulation thread is currently stepping.
    #[must_use]
    pub fn running(&self) -> bool {
        *self.shared.run.lock().unwrap() == RunState::Running
    }

    /// A one-shot snapshot of every exposed register.
    ///
    /// # Panics
    ///
    /// Panics if the underlying register read fails, which should only
    /// happen if the engine handle itself is corrupt.
    #[must_use]
    pub fn registers(&self) -> RegisterFile {
        self.with_uc(|uc| read_registers(uc).expect("register snapshot"))
    }

    /// Overwrites the full register set from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the underlying engine rejects a register
    /// write.
    pub fn set_registers(&self, regs: &RegisterFile) -> Result<(), EngineError> {
        self.with_uc(|uc| write_registers(uc, regs))
    }

    /// Reads `len` bytes of guest memory starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if `address + len` exceeds the mapped size or
    /// the underlying read fails.
    pub fn read(&self, address: u64, len: usize) -> Result<Vec<u8>, EngineError> {
        if address.saturating_add(len as u64) > self.shared.memory_size {
            return Err(EngineError::new(
                EngineErrorKind::MemAccess,
                format!("address {address:#010x} exceeds mapped memory"),
            ));
        }
        self.with_uc(|uc| {
            let mut buf = vec![0u8; len];
            uc.mem_read(address, &mut buf)
                .map_err(|e| uc_err(EngineErrorKind::MemAccess, e))?;
            Ok(buf)
        })
    }

    /// Writes `bytes` to guest memory starting at `address`. A zero-length
    /// write always succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if `address + bytes.len()` exceeds the mapped
    /// size or the underlying write fails.
    pub fn write(&self, address: u64, bytes: &[u8]) -> Result<(), EngineError> {
        if bytes.is_empty() {
            return Ok(());
        }
        if address.saturating_add(bytes.len() as u64) > self.shared.memory_size {
            return Err(EngineError::new(
                EngineErrorKind::MemAccess,
                format!("address {address:#010x} exceeds mapped memory"),
            ));
        }
        self.with_uc(|uc| {
            uc.mem_write(address, bytes)
                .map_err(|e| uc_err(EngineErrorKind::MemAccess, e))
        })
    }

    /// Switches the CPU to `new_mode`, carrying memory contents and CPU
    /// context across a fresh engine handle. Must not be called while
    /// `Running`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the new handle cannot be opened, memory
    /// cannot be re-mapped, or the context cannot be transferred.
    ///
    /// # Panics
    ///
    /// Panics (via `debug_assert`) if called while the core is `Running`.
    pub fn switch_mode(&self, new_mode: CpuMode) -> Result<(), EngineError> {
        debug_assert!(!self.running(), "switch_mode called while running");

        let memory_size = self.shared.memory_size;
        let guard = self.shared.uc.lock();
        let mut uc = guard.borrow_mut();

        let mut new_uc = Unicorn::new(Arch::X86, new_mode.unicorn_mode())
            .map_err(|e| uc_err(EngineErrorKind::Open, e))?;
        new_uc
            .mem_map(0, memory_size as usize, Permission::ALL)
            .map_err(|e| uc_err(EngineErrorKind::MemMap, e))?;

        let mut buf = vec![0u8; memory_size as usize];
        uc.mem_read(0, &mut buf)
            .map_err(|e| uc_err(EngineErrorKind::MemAccess, e))?;
        new_uc
            .mem_write(0, &buf)
            .map_err(|e| uc_err(EngineErrorKind::MemAccess, e))?;

        let regs = read_registers(&mut uc)?;
        write_registers(&mut new_uc, &regs).map_err(|e| {
            EngineError::new(EngineErrorKind::Context, e.diagnostic().to_string())
        })?;

        *uc = new_uc;
        drop(uc);
        drop(guard);

        let state_guard = self.shared.state.lock();
        state_guard.borrow_mut().mode = new_mode;

        Ok(())
    }

    /// The CPU's current operating mode.
    #[must_use]
    pub fn mode(&self) -> CpuMode {
        let guard = self.shared.state.lock();
        guard.borrow().mode
    }
}

impl Drop for ExecutionCore {
    fn drop(&mut self) {
        if Arc::strong_count(&self.shared) == 1 && self.running() {
            self.stop();
            self.wait_until_finished();
        }
    }
}
