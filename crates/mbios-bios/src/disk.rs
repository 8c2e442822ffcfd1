//! int 13h disk services.

use mbios_disk::{DiskImage, SUPPORTED_DRIVE};
use mbios_engine::ExecutionCore;
use mbios_registers::RegisterFile;

use crate::sinks::DebugSink;

fn fail(regs: &mut RegisterFile) {
    regs.set_cf(true);
    regs.set_ah(1);
    regs.set_al(0);
}

/// Dispatches one int 13h call by `AH`.
pub fn handle(
    regs: &mut RegisterFile,
    core: &ExecutionCore,
    disk: &DiskImage,
    debug: &dyn DebugSink,
) {
    match regs.ah() {
        0x00 => {
            regs.set_cf(false);
            regs.set_ah(0);
        }
        0x02 => {
            let drive = regs.dl();
            if drive != SUPPORTED_DRIVE {
                fail(regs);
                return;
            }
            let count = regs.al();
            let cylinder = regs.ch();
            let sector = regs.cl();
            let head = regs.dh();

            match disk.read_sectors(drive, cylinder, head, sector, count) {
                Ok(data) => {
                    let dest = (u64::from(regs.es) << 4) + u64::from(regs.bx());
                    if core.write(dest, &data).is_ok() {
                        regs.set_cf(false);
                        regs.set_ah(0);
                        regs.set_al(count);
                    } else {
                        fail(regs);
                    }
                }
                Err(_) => fail(regs),
            }
        }
        ah => {
            debug.write_line(&format!("int 13h AH={ah:#04x} unimplemented (log only)"));
        }
    }
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

    fn sample_image() -> DiskImage {
        let mut b = vec![0u8; 512 * 40];
        b[11..13].copy_from_slice(&512u16.to_le_bytes());
        b[13] = 4;
        b[24..26].copy_from_slice(&18u16.to_le_bytes());
        b[26..28].copy_from_slice(&2u16.to_le_bytes());
        b[510..512].copy_from_slice(&0xAA55u16.to_le_bytes());
        for (i, byte) in b[512..1024].iter_mut().enumerate() {
            *byte = (i % 256) as u8;
        }
        DiskImage::from_bytes(b).unwrap()
    }

    #[test]
    fn reset_clears_carry_and_ah() {
        let mut regs = RegisterFile::new();
        regs.set_ah(0x00);
        regs.set_cf(true);
        let core = ExecutionCore::new(2 * 1024 * 1024).unwrap();
        let debug = CapturingDebug(Mutex::new(Vec::new()));
        handle(&mut regs, &core, &sample_image(), &debug);
        assert!(!regs.cf());
        assert_eq!(regs.ah(), 0);
    }

    #[test]
    fn read_sectors_rejects_unsupported_drive_with_failure_contract() {
        let mut regs = RegisterFile::new();
        regs.set_ah(0x02);
        regs.set_dl(1);
        let core = ExecutionCore::new(2 * 1024 * 1024).unwrap();
        let debug = CapturingDebug(Mutex::new(Vec::new()));
        handle(&mut regs, &core, &sample_image(), &debug);
        assert!(regs.cf());
        assert_eq!(regs.ah(), 1);
        assert_eq!(regs.al(), 0);
    }

    #[test]
    fn read_sectors_succeeds_and_writes_destination() {
        let mut regs = RegisterFile::new();
        regs.set_ah(0x02);
        regs.set_al(1);
        regs.set_ch(0);
        regs.set_cl(2);
        regs.set_dh(0);
        regs.set_dl(0);
        regs.es = 0x1000;
        regs.set_bx(0x0000);
        let core = ExecutionCore::new(2 * 1024 * 1024).unwrap();
        let debug = CapturingDebug(Mutex::new(Vec::new()));
        handle(&mut regs, &core, &sample_image(), &debug);
        assert!(!regs.cf());
        assert_eq!(regs.ah(), 0);
        assert_eq!(regs.al(), 1);
        let dest = (u64::from(regs.es) << 4) + u64::from(regs.bx());
        let written = core.read(dest, 2).unwrap();
        assert_eq!(written, vec![0, 1]);
    }
}
