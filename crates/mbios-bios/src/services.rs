//! Bundles the disk image, memory map, and host sinks that the per-vector
//! handlers need, and routes a dispatched interrupt to the right one.

use std::sync::Arc;

use mbios_disk::DiskImage;
use mbios_engine::ExecutionCore;
use mbios_memory::MemoryMap;

use crate::sinks::{DebugSink, KeyboardSource, OutputSink};
use crate::{disk, keyboard, system, video};

/// Owns everything a BIOS service handler needs beyond the vector number
/// and current registers.
pub struct BiosServices {
    disk: Arc<DiskImage>,
    memory_map: MemoryMap,
    output: Arc<dyn OutputSink>,
    debug: Arc<dyn DebugSink>,
    keyboard: Arc<dyn KeyboardSource>,
    debug_video: bool,
}

impl BiosServices {
    /// Builds a service bundle from a loaded disk image, the configured
    /// memory map, and the three host sinks. `debug_video` mirrors
    /// `--debug-video`: it gates int 10h's log-only branches.
    #[must_use]
    pub fn new(
        disk: Arc<DiskImage>,
        memory_map: MemoryMap,
        output: Arc<dyn OutputSink>,
        debug: Arc<dyn DebugSink>,
        keyboard: Arc<dyn KeyboardSource>,
        debug_video: bool,
    ) -> Self {
        Self {
            disk,
            memory_map,
            output,
            debug,
            keyboard,
            debug_video,
        }
    }

    /// Services one software interrupt, per the vector table in spec.md
    /// §4.2. Returns whether the vector is one this BIOS accepts at all;
    /// vectors outside the accepted set (e.g. DOS's 0x21) return `false`,
    /// which causes the core to raise "unhandled interrupt".
    pub fn handle(&self, vector: u32, core: &ExecutionCore) -> bool {
        let accepted = matches!(
            vector,
            0x05 | 0x10 | 0x11 | 0x12 | 0x13 | 0x14 | 0x15 | 0x16 | 0x17 | 0x18 | 0x19 | 0x1A
        );
        if !accepted {
            return false;
        }

        match vector {
            0x10 => {
                let mut regs = core.registers();
                video::handle(&mut regs, core, self.output.as_ref(), self.debug.as_ref(), self.debug_video);
                let _ = core.set_registers(&regs);
            }
            0x13 => {
                let mut regs = core.registers();
                disk::handle(&mut regs, core, &self.disk, self.debug.as_ref());
                let _ = core.set_registers(&regs);
            }
            0x15 => {
                let mut regs = core.registers();
                system::handle(&mut regs, core, &self.memory_map, self.debug.as_ref());
                let _ = core.set_registers(&regs);
            }
            0x16 => {
                let mut regs = core.registers();
                keyboard::handle(&mut regs, self.keyboard.as_ref());
                let _ = core.set_registers(&regs);
            }
            0x18 | 0x19 => crate::halt::handle(core),
            // 0x05, 0x11, 0x12, 0x14, 0x17, 0x1A: accepted, deliberate no-ops.
            _ => {}
        }

        true
    }
}
