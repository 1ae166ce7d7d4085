//! Terminal device output.
//!
//! The display is an exclusively-owned, append-only byte sink (usually a
//! tty device opened for writing). Only three kinds of writes happen:
//! a one-time clear at startup, full frames on bulk refreshes, and
//! header-only in-place repaints in between. The cursor is hidden while
//! the dashboard runs and restored on shutdown.

use std::io::{self, Write};

use crossterm::cursor::{Hide, MoveTo, RestorePosition, SavePosition, Show};
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use crossterm::{execute, queue};

/// Writer for dashboard frames.
pub struct Screen<W: Write> {
    out: W,
}

impl<W: Write> Screen<W> {
    pub fn new(out: W) -> Self {
        Screen { out }
    }

    /// Clears the device and hides the cursor. Called once at startup.
    pub fn init(&mut self) -> io::Result<()> {
        execute!(self.out, Clear(ClearType::All), MoveTo(0, 0), Hide)
    }

    /// Writes a full frame: header, body, and clear everything below.
    pub fn draw_full(&mut self, header: &str, body: &str) -> io::Result<()> {
        queue!(
            self.out,
            MoveTo(0, 0),
            Print(header),
            Print("\n"),
            Print(body),
            Print("\n"),
            Clear(ClearType::FromCursorDown)
        )?;
        self.out.flush()
    }

    /// Overwrites only the header line, leaving the body undisturbed:
    /// save cursor, home, write, clear to end of line, restore cursor.
    pub fn draw_header(&mut self, header: &str) -> io::Result<()> {
        queue!(
            self.out,
            SavePosition,
            MoveTo(0, 0),
            Print(header),
            Clear(ClearType::UntilNewLine),
            RestorePosition
        )?;
        self.out.flush()
    }

    /// Makes the cursor visible again. Called on shutdown.
    pub fn restore(&mut self) -> io::Result<()> {
        execute!(self.out, Show)
    }
}
