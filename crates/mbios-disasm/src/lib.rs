//! Disassembly for the debug supervisor's disassembly pane.
//!
//! A thin adapter over `iced-x86`: decode a window of guest bytes starting
//! at a linear address and render each instruction as a display-ready line.
//! `mbios-debug` owns the decision of *which* bytes and *how many* lines;
//! this crate only turns bytes into text.

use iced_x86::{Decoder, DecoderOptions, Formatter, Instruction, NasmFormatter};

/// One decoded instruction, ready to render in a disassembly pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassembledLine {
    /// Linear address of the instruction's first byte.
    pub address: u64,
    /// Raw encoding, as consumed from the input buffer.
    pub bytes: Vec<u8>,
    /// Disassembled text, e.g. `"mov ax, 0x7c00"`.
    pub text: String,
}

/// Decodes as many instructions as fit in `code`, starting at linear address
/// `ip`, for a CPU running in `bitness`-bit mode (16, 32, or 64).
///
/// Truncated trailing bytes (not enough left for a complete instruction) are
/// silently dropped; `iced-x86` reports them as invalid encodings, which
/// would otherwise show up as a misleading final line.
#[must_use]
pub fn disassemble(code: &[u8], ip: u64, bitness: u32) -> Vec<DisassembledLine> {
    let mut decoder = Decoder::with_ip(bitness, code, ip, DecoderOptions::NONE);
    let mut formatter = NasmFormatter::new();
    let mut instruction = Instruction::default();
    let mut lines = Vec::new();

    while decoder.can_decode() {
        let start = decoder.position();
        let addr = decoder.ip();
        decoder.decode_out(&mut instruction);
        if instruction.is_invalid() {
            break;
        }
        let end = decoder.position();

        let mut text = String::new();
        formatter.format(&instruction, &mut text);

        lines.push(DisassembledLine {
            address: addr,
            bytes: code[start..end].to_vec(),
            text,
        });
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_single_real_mode_mov() {
        // mov ax, 0x7c00
        let code = [0xB8, 0x00, 0x7C];
        let lines = disassemble(&code, 0x7C00, 16);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].address, 0x7C00);
        assert_eq!(lines[0].bytes, vec![0xB8, 0x00, 0x7C]);
        assert!(lines[0].text.contains("mov"));
    }

    #[test]
    fn decodes_multiple_instructions_in_sequence() {
        // mov ax, 0x1234 ; cli ; hlt
        let code = [0xB8, 0x34, 0x12, 0xFA, 0xF4];
        let lines = disassemble(&code, 0x0000, 16);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].address, 0x0003);
        assert_eq!(lines[2].address, 0x0004);
    }

    #[test]
    fn empty_input_yields_no_lines() {
        assert!(disassemble(&[], 0, 16).is_empty());
    }

    #[test]
    fn truncated_trailing_instruction_is_dropped() {
        // A complete `mov ax, imm16` needs 3 bytes; give it only the opcode.
        let code = [0xB8];
        let lines = disassemble(&code, 0, 16);
        assert!(lines.is_empty());
    }
}
