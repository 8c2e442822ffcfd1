//! int 15h system services (currently just the E820 memory map query).

use mbios_engine::ExecutionCore;
use mbios_memory::MemoryMap;
use mbios_registers::RegisterFile;

use crate::sinks::DebugSink;

/// The `'SMAP'` signature exchanged in both directions of an E820 call.
const SMAP_SIGNATURE: u32 = 0x534D_4150;
/// Size of one packed E820 entry on the wire.
const ENTRY_SIZE: u32 = 0x14;

fn fail(regs: &mut RegisterFile) {
    regs.set_cf(true);
    regs.set_eax(SMAP_SIGNATURE);
    regs.set_ebx(0);
    regs.set_ecx(ENTRY_SIZE);
}

/// Dispatches one int 15h call by `AX`. Only `AX=0xE820` is implemented;
/// anything else is logged and left unhandled by the caller's convention.
pub fn handle(regs: &mut RegisterFile, core: &ExecutionCore, map: &MemoryMap, debug: &dyn DebugSink) {
    if (regs.ah(), regs.al()) != (0xE8, 0x20) {
        debug.write_line(&format!(
            "int 15h AX={:#06x} unimplemented (log only)",
            regs.ax()
        ));
        return;
    }

    let destination = (u64::from(regs.es) << 4) + u64::from(regs.di());
    let continuation = regs.ebx();
    let buffer_size = regs.ecx();
    let signature = regs.edx();

    let entries = map.entries();
    if buffer_size < ENTRY_SIZE || signature != SMAP_SIGNATURE || continuation as usize >= entries.len() {
        fail(regs);
        return;
    }

    let index = continuation as usize;
    let entry = entries[index];
    if core.write(destination, &entry.to_e820_bytes()).is_err() {
        fail(regs);
        return;
    }

    regs.set_cf(false);
    regs.set_eax(SMAP_SIGNATURE);
    regs.set_ecx(ENTRY_SIZE);
    regs.set_ebx(if index + 1 == entries.len() {
        0
    } else {
        (index + 1) as u32
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CapturingDebug(Mutex<Vec<String>>);
    impl DebugSink for CapturingDebug {
        fn write_line(&self, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
    }

    fn regs_for_e820(continuation: u32, buffer_size: u32, signature: u32) -> RegisterFile {
        let mut regs = RegisterFile::new();
        regs.set_ah(0xE8);
        regs.set_al(0x20);
        regs.set_ebx(continuation);
        regs.set_ecx(buffer_size);
        regs.set_edx(signature);
        regs.es = 0x2000;
        regs.set_di(0);
        regs
    }

    #[test]
    fn first_call_returns_first_entry_and_nonzero_continuation() {
        let core = ExecutionCore::new(64 * 1024 * 1024).unwrap();
        let map = MemoryMap::new(64 * 1024 * 1024).unwrap();
        let debug = CapturingDebug(Mutex::new(Vec::new()));
        let mut regs = regs_for_e820(0, 0x14, SMAP_SIGNATURE);
        handle(&mut regs, &core, &map, &debug);
        assert!(!regs.cf());
        assert_eq!(regs.eax(), SMAP_SIGNATURE);
        assert_eq!(regs.ecx(), 0x14);
        assert_eq!(regs.ebx(), 1);
    }

    #[test]
    fn last_entry_signals_completion_with_zero_continuation() {
        let core = ExecutionCore::new(64 * 1024 * 1024).unwrap();
        let map = MemoryMap::new(64 * 1024 * 1024).unwrap();
        let debug = CapturingDebug(Mutex::new(Vec::new()));
        let last = (map.entries().len() - 1) as u32;
        let mut regs = regs_for_e820(last, 0x14, SMAP_SIGNATURE);
        handle(&mut regs, &core, &map, &debug);
        assert!(!regs.cf());
        assert_eq!(regs.ebx(), 0);
    }

    #[test]
    fn rejects_undersized_buffer() {
        let core = ExecutionCore::new(64 * 1024 * 1024).unwrap();
        let map = MemoryMap::new(64 * 1024 * 1024).unwrap();
        let debug = CapturingDebug(Mutex::new(Vec::new()));
        let mut regs = regs_for_e820(0, 0x10, SMAP_SIGNATURE);
        handle(&mut regs, &core, &map, &debug);
        assert!(regs.cf());
        assert_eq!(regs.ebx(), 0);
        assert_eq!(regs.ecx(), 0x14);
    }

    #[test]
    fn rejects_bad_signature() {
        let core = ExecutionCore::new(64 * 1024 * 1024).unwrap();
        let map = MemoryMap::new(64 * 1024 * 1024).unwrap();
        let debug = CapturingDebug(Mutex::new(Vec::new()));
        let mut regs = regs_for_e820(0, 0x14, 0);
        handle(&mut regs, &core, &map, &debug);
        assert!(regs.cf());
    }
}
