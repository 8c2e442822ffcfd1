//! Command-line interface definition.

use std::path::PathBuf;

use clap::Parser;

/// Hosts a 16-bit real-mode BIOS image under `unicorn-engine`.
#[derive(Parser)]
#[command(name = "mbios", version, about)]
pub struct Arguments {
    /// Disk image to boot.
    pub boot_image: PathBuf,

    /// Memory in MiB (N=1 is treated as 2; minimum 2).
    #[arg(long = "memory", short = 'm', default_value_t = 64)]
    pub memory_mib: u64,

    /// Enable pause on every interrupt.
    #[arg(long = "break-int")]
    pub break_on_interrupt: bool,

    /// Enable pause on interrupt return.
    #[arg(long = "break-iret")]
    pub break_on_interrupt_return: bool,

    /// Raise a trap signal at pause instead of prompting.
    #[arg(long)]
    pub trap: bool,

    /// Enable verbose logging for int 10h.
    #[arg(long = "debug-video")]
    pub debug_video: bool,

    /// Enable pause on every instruction.
    #[arg(long = "single-step")]
    pub single_step: bool,

    /// Run without the interactive pane UI; mirror output/debug to stdout/stderr.
    #[arg(long = "no-ui")]
    pub no_ui: bool,

    /// Add a breakpoint at the given hexadecimal linear address. Repeatable.
    #[arg(short = 'b', value_parser = parse_hex_address)]
    pub breakpoints: Vec<u64>,
}

impl Arguments {
    /// The configured memory size in bytes, after the `N=1 → 2` and
    /// minimum-2 adjustments from spec.md §6.
    #[must_use]
    pub fn memory_bytes(&self) -> u64 {
        let mib = if self.memory_mib == 1 { 2 } else { self.memory_mib.max(2) };
        mib * 1024 * 1024
    }
}

fn parse_hex_address(s: &str) -> Result<u64, String> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid hex address {s:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_of_one_mib_is_treated_as_two() {
        let args = Arguments::try_parse_from(["mbios", "boot.img", "-m", "1"]).unwrap();
        assert_eq!(args.memory_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    fn memory_below_minimum_is_clamped_to_two() {
        let args = Arguments::try_parse_from(["mbios", "boot.img", "-m", "0"]).unwrap();
        assert_eq!(args.memory_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    fn default_memory_is_64_mib() {
        let args = Arguments::try_parse_from(["mbios", "boot.img"]).unwrap();
        assert_eq!(args.memory_bytes(), 64 * 1024 * 1024);
    }

    #[test]
    fn repeated_breakpoint_flags_accumulate() {
        let args = Arguments::try_parse_from(["mbios", "boot.img", "-b", "7c00", "-b", "0x7c10"]).unwrap();
        assert_eq!(args.breakpoints, vec![0x7C00, 0x7C10]);
    }

    #[test]
    fn rejects_non_hex_breakpoint() {
        assert!(Arguments::try_parse_from(["mbios", "boot.img", "-b", "not-hex"]).is_err());
    }
}
