//! Four-pane `ratatui` front end: output scrollback, debug/log scrollback,
//! a live register view, and a disassembly view centered on the current
//! instruction pointer.

use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;

use mbios_bios::{DebugSink as BiosDebugSink, KeyboardSource, OutputSink};
use mbios_debug::{disassembly_pane, register_pane, DebugFrontend, ResumeKey};
use mbios_engine::ExecutionCore;

/// Number of instruction bytes fetched for the disassembly pane's window.
const DISASM_WINDOW: usize = 32;

struct Inner {
    output: String,
    debug: Vec<String>,
    awaiting_resume: bool,
    awaiting_key: bool,
    resume_result: Option<ResumeKey>,
    key_result: Option<(u8, u8)>,
    stopped: bool,
}

/// The shared TUI state plus the emulation core it renders registers and
/// disassembly from. Implements every sink trait the BIOS services and
/// debug supervisor need; cloning is cheap (it's an `Arc` underneath).
#[derive(Clone)]
pub struct InteractiveUi {
    inner: Arc<(Mutex<Inner>, Condvar)>,
    core: ExecutionCore,
}

impl InteractiveUi {
    #[must_use]
    pub fn new(core: ExecutionCore) -> Self {
        let inner = Inner {
            output: String::new(),
            debug: Vec::new(),
            awaiting_resume: false,
            awaiting_key: false,
            resume_result: None,
            key_result: None,
            stopped: false,
        };
        Self {
            inner: Arc::new((Mutex::new(inner), Condvar::new())),
            core,
        }
    }

    /// Unblocks any pending `wait_for_user_resume`/`read_key` call with the
    /// `Stop` sentinel, and tells the draw loop to exit on its next tick.
    pub fn stop(&self) {
        let (lock, cv) = &*self.inner;
        let mut state = lock.lock().unwrap();
        state.stopped = true;
        cv.notify_all();
    }

    /// Runs the screen-update/key-poll loop until `stop()` is called or the
    /// user presses `q`. Enters raw mode and the alternate screen for the
    /// duration of the call, restoring the terminal on the way out.
    pub fn run(&self) -> Result<()> {
        enable_raw_mode()?;
        io::stdout().execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(io::stdout());
        let mut terminal = Terminal::new(backend)?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        io::stdout().execute(LeaveAlternateScreen)?;
        result
    }

    fn event_loop(&self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
        loop {
            terminal.draw(|f| self.draw(f))?;

            if { self.inner.0.lock().unwrap().stopped } {
                return Ok(());
            }

            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    let (lock, cv) = &*self.inner;
                    let mut state = lock.lock().unwrap();
                    match key.code {
                        KeyCode::Char('q') => {
                            state.stopped = true;
                            cv.notify_all();
                        }
                        KeyCode::Enter => {
                            if state.awaiting_resume {
                                state.resume_result = Some(ResumeKey::Other);
                                state.awaiting_resume = false;
                                cv.notify_all();
                            } else if state.awaiting_key {
                                state.key_result = Some((0x1C, b'\r'));
                                state.awaiting_key = false;
                                cv.notify_all();
                            }
                        }
                        KeyCode::Char(' ') => {
                            if state.awaiting_resume {
                                state.resume_result = Some(ResumeKey::Space);
                                state.awaiting_resume = false;
                                cv.notify_all();
                            } else if state.awaiting_key {
                                state.key_result = Some((0x39, b' '));
                                state.awaiting_key = false;
                                cv.notify_all();
                            }
                        }
                        KeyCode::Char(c) if state.awaiting_key => {
                            state.key_result = Some((0, c as u8));
                            state.awaiting_key = false;
                            cv.notify_all();
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn draw(&self, f: &mut ratatui::Frame) {
        let state = self.inner.0.lock().unwrap();
        let regs = self.core.registers();
        let code = self.core.read(regs.linear_ip(), DISASM_WINDOW).unwrap_or_default();

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(f.area());

        let left = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(columns[0]);

        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(columns[1]);

        f.render_widget(
            Paragraph::new(state.output.as_str())
                .block(Block::default().title("output").borders(Borders::ALL))
                .wrap(Wrap { trim: false }),
            left[0],
        );
        f.render_widget(
            Paragraph::new(state.debug.join("\n"))
                .block(Block::default().title("debug").borders(Borders::ALL))
                .wrap(Wrap { trim: false }),
            left[1],
        );
        f.render_widget(
            Paragraph::new(register_pane(&regs))
                .block(Block::default().title("registers").borders(Borders::ALL)),
            right[0],
        );
        f.render_widget(
            Paragraph::new(disassembly_pane(&code, regs.linear_ip()).join("\n"))
                .block(Block::default().title("disassembly").borders(Borders::ALL)),
            right[1],
        );
    }
}

impl OutputSink for InteractiveUi {
    fn write_byte(&self, byte: u8) {
        let printable = if byte.is_ascii_graphic() || byte.is_ascii_whitespace() {
            byte
        } else {
            b'.'
        };
        self.inner.0.lock().unwrap().output.push(printable as char);
    }
}

impl BiosDebugSink for InteractiveUi {
    fn write_line(&self, line: &str) {
        self.inner.0.lock().unwrap().debug.push(line.to_string());
    }
}

impl DebugFrontend for InteractiveUi {
    fn write_debug_line(&self, line: &str) {
        BiosDebugSink::write_line(self, line);
    }

    fn wait_for_user_resume(&self) -> ResumeKey {
        let (lock, cv) = &*self.inner;
        let mut state = lock.lock().unwrap();
        state.awaiting_resume = true;
        state.resume_result = None;
        let mut state = cv
            .wait_while(state, |s| !s.stopped && s.resume_result.is_none())
            .unwrap();
        state.awaiting_resume = false;
        if state.stopped {
            return ResumeKey::Stop;
        }
        state.resume_result.take().unwrap_or(ResumeKey::Stop)
    }
}

impl KeyboardSource for InteractiveUi {
    fn read_key(&self) -> (u8, u8) {
        let (lock, cv) = &*self.inner;
        let mut state = lock.lock().unwrap();
        state.awaiting_key = true;
        state.key_result = None;
        let mut state = cv
            .wait_while(state, |s| !s.stopped && s.key_result.is_none())
            .unwrap();
        state.awaiting_key = false;
        if state.stopped {
            return (0, 0);
        }
        state.key_result.take().unwrap_or((0, 0))
    }
}
