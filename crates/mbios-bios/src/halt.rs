//! int 18h/19h halt vectors. Both stop emulation outright; a real BIOS would
//! jump to ROM BASIC or re-run the bootstrap, neither of which this shim
//! hosts.

use mbios_engine::ExecutionCore;

pub fn handle(core: &ExecutionCore) {
    core.stop();
}
