//! Key loop shown after the report
//!
//! Q or Esc exits; W writes the dump file and keeps waiting.

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, Write};

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    WriteDump,
    Ignore,
}

pub fn action_for(key: &KeyEvent) -> KeyAction {
    if key.kind != KeyEventKind::Press {
        return KeyAction::Ignore;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => KeyAction::Quit,
        KeyCode::Char('w') | KeyCode::Char('W') => KeyAction::WriteDump,
        _ => KeyAction::Ignore,
    }
}

/// Wait for keys until the user quits
///
/// `write_dump` runs on every W and returns the line to show.
pub fn run(mut write_dump: impl FnMut() -> Result<String>) -> Result<()> {
    println!();
    println!("Press 'Q' to exit, 'W' to write dump to file...");

    enable_raw_mode().context("Failed to enable raw mode")?;
    let result = key_loop(&mut write_dump);
    disable_raw_mode().context("Failed to disable raw mode")?;
    result
}

fn key_loop(write_dump: &mut impl FnMut() -> Result<String>) -> Result<()> {
    let mut stdout = io::stdout();
    loop {
        let Event::Key(key) = event::read().context("Failed to read event")? else {
            continue;
        };

        match action_for(&key) {
            KeyAction::Quit => return Ok(()),
            KeyAction::WriteDump => {
                // Raw mode needs explicit carriage returns
                let line = match write_dump() {
                    Ok(line) => line,
                    Err(e) => format!("error: {:#}", e),
                };
                write!(stdout, "{}\r\n", line)?;
                stdout.flush()?;
            }
            KeyAction::Ignore => {}
        }
    }
}
