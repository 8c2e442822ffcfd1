//! Entry point: parses arguments, wires the BIOS services and debug
//! supervisor onto an execution core, and runs the boot image to
//! completion.

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use mbios_bios::{BiosServices, DebugSink, KeyboardSource, OutputSink};
use mbios_debug::{DebugFrontend, DebugSupervisor};
use mbios_disk::DiskImage;
use mbios_engine::ExecutionCore;
use mbios_memory::MemoryMap;
use mbios_ui::{InteractiveUi, NonInteractiveUi};

use cli::Arguments;

fn main() -> Result<()> {
    let args = Arguments::parse();

    let disk = Arc::new(
        DiskImage::open(&args.boot_image)
            .with_context(|| format!("failed to open boot image {}", args.boot_image.display()))?,
    );
    let memory_map = MemoryMap::new(args.memory_bytes()).context("failed to build memory map")?;
    let core = ExecutionCore::new(args.memory_bytes()).context("failed to initialize execution core")?;

    core.write(mbios_mbr::BOOT_ADDRESS, disk.mbr().raw())
        .context("failed to load boot sector into guest memory")?;

    if args.no_ui {
        let ui = Arc::new(NonInteractiveUi::new());
        run(
            &args,
            &core,
            disk,
            memory_map,
            ui.clone() as Arc<dyn OutputSink>,
            ui.clone() as Arc<dyn DebugSink>,
            ui.clone() as Arc<dyn KeyboardSource>,
            ui as Arc<dyn DebugFrontend>,
        )
    } else {
        let ui = InteractiveUi::new(core.clone());
        let ui_thread = {
            let ui = ui.clone();
            std::thread::spawn(move || ui.run())
        };

        let result = run(
            &args,
            &core,
            disk,
            memory_map,
            Arc::new(ui.clone()) as Arc<dyn OutputSink>,
            Arc::new(ui.clone()) as Arc<dyn DebugSink>,
            Arc::new(ui.clone()) as Arc<dyn KeyboardSource>,
            Arc::new(ui.clone()) as Arc<dyn DebugFrontend>,
        );

        ui.stop();
        let ui_result = ui_thread.join().expect("ui thread panicked");
        result.and(ui_result.context("interactive UI failed"))
    }
}

/// Builds the BIOS service bundle and debug supervisor from the parsed
/// arguments, registers them on `core`, and runs the boot image to
/// completion.
#[allow(clippy::too_many_arguments)]
fn run(
    args: &Arguments,
    core: &ExecutionCore,
    disk: Arc<DiskImage>,
    memory_map: MemoryMap,
    output: Arc<dyn OutputSink>,
    debug: Arc<dyn DebugSink>,
    keyboard: Arc<dyn KeyboardSource>,
    frontend: Arc<dyn DebugFrontend>,
) -> Result<()> {
    let supervisor = DebugSupervisor::new(frontend);
    supervisor.set_break_on_interrupt(args.break_on_interrupt);
    supervisor.set_break_on_interrupt_return(args.break_on_interrupt_return);
    supervisor.set_trap(args.trap);
    supervisor.set_single_step(args.single_step);
    for address in &args.breakpoints {
        supervisor.add_breakpoint(*address);
    }
    supervisor.install(core);

    mbios_bios::cpuid::install(core);

    let services = Arc::new(BiosServices::new(disk, memory_map, output, debug, keyboard, args.debug_video));
    let wrapped = supervisor.wrap_interrupt_handler(move |vector, core| services.handle(vector, core));
    core.on_interrupt(wrapped);

    core.start(mbios_mbr::BOOT_ADDRESS);
    core.wait_until_finished();
    Ok(())
}
