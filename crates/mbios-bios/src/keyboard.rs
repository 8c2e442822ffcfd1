//! int 16h keyboard services.

use mbios_registers::RegisterFile;

use crate::sinks::KeyboardSource;

/// Dispatches one int 16h call by `AH`.
pub fn handle(regs: &mut RegisterFile, keyboard: &dyn KeyboardSource) {
    match regs.ah() {
        0x00 => {
            let (scancode, ascii) = keyboard.read_key();
            regs.set_ah(scancode);
            regs.set_al(ascii);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedKey(u8, u8);
    impl KeyboardSource for FixedKey {
        fn read_key(&self) -> (u8, u8) {
            (self.0, self.1)
        }
    }

    #[test]
    fn read_key_fills_ah_and_al() {
        let mut regs = RegisterFile::new();
        regs.set_ah(0x00);
        handle(&mut regs, &FixedKey(0x1E, b'a'));
        assert_eq!(regs.ah(), 0x1E);
        assert_eq!(regs.al(), b'a');
    }
}
