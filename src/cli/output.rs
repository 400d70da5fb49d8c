//! Colored terminal output.

use crate::bundler::utils::OutputObserver;
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Writes progress, warnings and tool output to stderr.
#[derive(Debug, Clone)]
pub struct OutputManager {
    verbose: bool,
    quiet: bool,
    color: ColorChoice,
}

impl OutputManager {
    /// Create a new output manager
    pub fn new(verbose: bool, quiet: bool) -> Self {
        let color = if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        };
        Self {
            verbose,
            quiet,
            color,
        }
    }

    /// Whether tool output is shown
    pub fn is_verbose(&self) -> bool {
        self.verbose && !self.quiet
    }

    fn print(&self, color: Option<Color>, bold: bool, prefix: &str, message: &str) -> io::Result<()> {
        let mut stream = StandardStream::stderr(self.color);
        stream.set_color(ColorSpec::new().set_fg(color).set_bold(bold))?;
        write!(stream, "{prefix}")?;
        stream.reset()?;
        writeln!(stream, "{message}")
    }

    /// Print a message only in verbose mode
    pub fn verbose(&self, message: &str) -> io::Result<()> {
        if !self.is_verbose() {
            return Ok(());
        }
        self.print(Some(Color::Cyan), false, "  ", message)
    }

    /// Print a progress message
    pub fn progress(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.print(Some(Color::Blue), true, "→ ", message)
    }

    /// Print a success message
    pub fn success(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.print(Some(Color::Green), true, "✓ ", message)
    }

    /// Print a warning; shown even in quiet mode
    pub fn warn(&self, message: &str) -> io::Result<()> {
        self.print(Some(Color::Yellow), true, "⚠ ", message)
    }

    /// Print an error; shown even in quiet mode
    pub fn error(&self, message: &str) -> io::Result<()> {
        self.print(Some(Color::Red), true, "✗ ", message)
    }

    /// Print a section header
    pub fn section(&self, title: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.print(Some(Color::White), true, "", &format!("\n{title}"))
    }

    /// Print indented text
    pub fn indent(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.print(None, false, "    ", message)
    }
}

impl OutputObserver for OutputManager {
    fn on_line(&self, label: &str, line: &str) {
        log::debug!("[{label}] {line}");
        if self.is_verbose() {
            let _ = self.print(Some(Color::Ansi256(244)), false, &format!("[{label}] "), line);
        }
    }
}
