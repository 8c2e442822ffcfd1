//! Pure formatting helpers for the interactive debug UI's register and
//! disassembly panes. Not part of the pause/resume state machine.

use mbios_registers::RegisterFile;

/// Renders a register/flags/stack snapshot as display-ready lines.
#[must_use]
pub fn register_pane(regs: &RegisterFile) -> String {
    format!(
        "AX={:04x} BX={:04x} CX={:04x} DX={:04x}\n\
         SI={:04x} DI={:04x} SP={:04x} BP={:04x}\n\
         CS={:04x} DS={:04x} ES={:04x} SS={:04x}\n\
         IP={:04x} FLAGS={:04x} CF={}",
        regs.ax(),
        regs.bx(),
        regs.cx(),
        regs.dx(),
        regs.si(),
        regs.di(),
        regs.sp(),
        regs.bp(),
        regs.cs,
        regs.ds,
        regs.es,
        regs.ss,
        regs.ip(),
        regs.eflags() & 0xFFFF,
        u8::from(regs.cf()),
    )
}

/// Renders the instructions decoded from `code` (starting at linear address
/// `ip`) as display-ready lines, one per instruction.
#[must_use]
pub fn disassembly_pane(code: &[u8], ip: u64) -> Vec<String> {
    mbios_disasm::disassemble(code, ip, 16)
        .into_iter()
        .map(|line| {
            let bytes = line
                .bytes
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ");
            format!("{:08x}  {:<24} {}", line.address, bytes, line.text)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_pane_includes_all_rows() {
        let mut regs = RegisterFile::new();
        regs.set_ax(0x1234);
        regs.cs = 0x0000;
        regs.set_ip(0x7C00);
        let text = register_pane(&regs);
        assert!(text.contains("AX=1234"));
        assert!(text.contains("IP=7c00"));
    }

    #[test]
    fn disassembly_pane_renders_address_bytes_and_text() {
        let code = [0xFA, 0xF4]; // cli ; hlt
        let lines = disassembly_pane(&code, 0x7C00);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00007c00"));
        assert!(lines[0].contains("fa"));
    }
}
