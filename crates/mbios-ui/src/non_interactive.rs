//! Plain stdio front end: output mirrors to stdout, debug mirrors to
//! stderr, resume/keyboard input comes from one byte of stdin.

use std::io::{self, Read, Write};

use mbios_bios::{DebugSink as BiosDebugSink, KeyboardSource, OutputSink};
use mbios_debug::{DebugFrontend, ResumeKey};

/// Mirrors output/debug to the process's standard streams and reads
/// keyboard/resume input from stdin.
pub struct NonInteractiveUi;

impl NonInteractiveUi {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn read_stdin_byte(&self) -> Option<u8> {
        let mut buf = [0u8; 1];
        match io::stdin().read_exact(&mut buf) {
            Ok(()) => Some(buf[0]),
            Err(_) => None,
        }
    }
}

impl Default for NonInteractiveUi {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for NonInteractiveUi {
    fn write_byte(&self, byte: u8) {
        let mut stdout = io::stdout();
        let _ = stdout.write_all(&[byte]);
        let _ = stdout.flush();
    }
}

impl BiosDebugSink for NonInteractiveUi {
    fn write_line(&self, line: &str) {
        eprintln!("{line}");
    }
}

impl KeyboardSource for NonInteractiveUi {
    fn read_key(&self) -> (u8, u8) {
        match self.read_stdin_byte() {
            Some(b) => (0, b),
            // Stdin closed: there is no more input to offer the guest.
            None => (0, 0),
        }
    }
}

impl DebugFrontend for NonInteractiveUi {
    fn write_debug_line(&self, line: &str) {
        eprintln!("{line}");
    }

    fn wait_for_user_resume(&self) -> ResumeKey {
        match self.read_stdin_byte() {
            Some(b' ') => ResumeKey::Space,
            Some(_) => ResumeKey::Other,
            // Stdin closed: behave as `stop()` would have unblocked us.
            None => ResumeKey::Stop,
        }
    }
}
