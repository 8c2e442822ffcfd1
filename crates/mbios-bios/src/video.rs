//! int 10h video services.

use mbios_engine::ExecutionCore;
use mbios_registers::RegisterFile;

use crate::sinks::{DebugSink, OutputSink};

/// Size of the placeholder VBE controller info block written for `AH=0x4F`
/// `AL=0x01`. The real block is 512 bytes; we write it zeroed since no VBE
/// mode data is modeled.
const VBE_INFO_BLOCK_SIZE: usize = 512;

/// Describes the video mode set by `AH=0x00`, matching the standard VGA BIOS
/// mode table.
fn mode_name(mode: u8) -> &'static str {
    match mode {
        0x00 => "40x25 16-color text",
        0x01 => "40x25 16-color text",
        0x02 => "80x25 16-color text",
        0x03 => "80x25 16-color text",
        0x04 => "320x200 4-color graphics",
        0x05 => "320x200 4-color graphics (B/W)",
        0x06 => "640x200 monochrome graphics",
        0x07 => "80x25 monochrome text",
        0x08 => "160x200 16-color graphics (PCjr)",
        0x09 => "320x200 16-color graphics (PCjr)",
        0x0A => "640x200 16-color graphics (PCjr)",
        0x0D => "320x200 16-color graphics",
        0x0E => "640x200 16-color graphics",
        0x0F => "640x350 monochrome graphics",
        0x10 => "640x350 16-color graphics",
        0x11 => "640x480 monochrome graphics",
        0x12 => "640x480 16-color graphics",
        0x13 => "320x200 256-color graphics",
        _ => "Unknown",
    }
}

/// Dispatches one int 10h call by `AH` (and, for `0x10`/`0x4F`, `AL`).
///
/// `verbose` gates the log-only branches (set mode, cursor, write-char, DAC
/// palette, VBE, unimplemented) behind `--debug-video`; teletype output is
/// never a log message and always goes to `output` regardless of the flag.
pub fn handle(
    regs: &mut RegisterFile,
    core: &ExecutionCore,
    output: &dyn OutputSink,
    debug: &dyn DebugSink,
    verbose: bool,
) {
    match (regs.ah(), regs.al()) {
        (0x0E, al) => {
            let byte = if al.is_ascii_graphic() || al.is_ascii_whitespace() {
                al
            } else {
                b'.'
            };
            output.write_byte(byte);
        }
        (0x00, al) => {
            let masked = al & 0x7F;
            if verbose {
                debug.write_line(&format!("int 10h AH=00 set mode {masked:#04x}: {}", mode_name(masked)));
            }
            let result = if masked > 0x07 {
                0x20
            } else if masked == 0x06 {
                0x3F
            } else {
                0x30
            };
            regs.set_al(result);
        }
        (0x02, _) => {
            if verbose {
                debug.write_line(&format!(
                    "int 10h AH=02 set cursor: page={:#04x} row={} col={}",
                    regs.bh(),
                    regs.dh(),
                    regs.dl()
                ));
            }
        }
        (0x09, _) | (0x0A, _) => {
            if verbose {
                debug.write_line(&format!(
                    "int 10h AH={:02x} write char: page={:#04x} color={:#04x} char={:#04x} count={}",
                    regs.ah(),
                    regs.bh(),
                    regs.bl(),
                    regs.al(),
                    regs.cx()
                ));
            }
        }
        (0x10, 0x10) => {
            if verbose {
                debug.write_line("int 10h AH=10 AL=10 set DAC palette register (log only)");
            }
        }
        (0x4F, 0x01) => {
            let dest = (u64::from(regs.es) << 4) + u64::from(regs.di());
            let _ = core.write(dest, &[0u8; VBE_INFO_BLOCK_SIZE]);
            if verbose {
                debug.write_line("int 10h AH=4F AL=01 VBE controller info (placeholder block)");
            }
        }
        (ah, al) => {
            if verbose {
                debug.write_line(&format!("int 10h AH={ah:#04x} AL={al:#04x} unimplemented (log only)"));
            }
        }
    }
}
