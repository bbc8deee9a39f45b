//! Terminal rendering for chat entries and in-progress reveals.

use std::io::{self, Write};

use chrono::{DateTime, Local, Utc};
use colored::*;

use crate::conversation::{ChatEntry, Speaker, SUGGESTIONS};

pub struct Renderer<W: Write> {
    out: W,
    /// Bytes of the current reveal already written.
    printed: usize,
    in_reveal: bool,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            printed: 0,
            in_reveal: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn entry(&mut self, entry: &ChatEntry) -> io::Result<()> {
        match entry.sender {
            Speaker::User => writeln!(self.out, "{} {}", "You:".bright_white().bold(), entry.message)?,
            Speaker::Bot => writeln!(self.out, "{} {}", "Bot:".bright_cyan().bold(), entry.message)?,
        }
        writeln!(self.out, "{}", format_timestamp(&entry.timestamp).dimmed())?;
        self.out.flush()
    }

    pub fn history(&mut self, entries: &[ChatEntry]) -> io::Result<()> {
        for e in entries {
            self.entry(e)?;
        }
        Ok(())
    }

    pub fn suggestions(&mut self) -> io::Result<()> {
        writeln!(self.out, "{}", "Start Asking Questions!".bright_cyan())?;
        for (i, s) in SUGGESTIONS.iter().enumerate() {
            writeln!(self.out, "  {} {}", format!("/{}", i + 1).cyan(), s)?;
        }
        self.out.flush()
    }

    /// Write the part of `revealed` not yet on screen.
    ///
    /// `revealed` must extend whatever was passed before within the same
    /// reveal; the first call prints the `Bot:` label.
    pub fn reveal_progress(&mut self, revealed: &str) -> io::Result<()> {
        if !self.in_reveal {
            write!(self.out, "{} ", "Bot:".bright_cyan().bold())?;
            self.in_reveal = true;
            self.printed = 0;
        }
        let fresh = revealed.get(self.printed..).unwrap_or_default();
        if !fresh.is_empty() {
            write!(self.out, "{fresh}")?;
            self.printed = revealed.len();
            self.out.flush()?;
        }
        Ok(())
    }

    /// Close the current reveal line and print the entry's timestamp.
    pub fn reveal_done(&mut self, entry: &ChatEntry) -> io::Result<()> {
        if self.in_reveal {
            self.reveal_progress(&entry.message)?;
            writeln!(self.out)?;
        } else {
            writeln!(self.out, "{} {}", "Bot:".bright_cyan().bold(), entry.message)?;
        }
        self.in_reveal = false;
        self.printed = 0;
        writeln!(self.out, "{}", format_timestamp(&entry.timestamp).dimmed())?;
        self.out.flush()
    }

    pub fn skip_hint(&mut self) -> io::Result<()> {
        writeln!(self.out, "{}", "(press Enter to skip)".dimmed())?;
        self.out.flush()
    }

    pub fn info(&mut self, msg: &str) -> io::Result<()> {
        writeln!(self.out, "{msg}")?;
        self.out.flush()
    }

    pub fn error(&mut self, msg: &str) -> io::Result<()> {
        if self.in_reveal {
            writeln!(self.out)?;
            self.in_reveal = false;
        }
        writeln!(self.out, "{} {}", "error:".bright_red().bold(), msg.red())?;
        self.out.flush()
    }

    pub fn prompt(&mut self) -> io::Result<()> {
        write!(self.out, "{} ", ">".bright_green())?;
        self.out.flush()
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}
