//! Terminal output with verbosity control.

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use std::io::{self, Write};

/// Colored, verbosity-aware terminal printer.
///
/// Quiet mode suppresses everything but errors; verbose mode adds detail lines.
#[derive(Debug, Clone, Copy)]
pub struct OutputManager {
    verbose: bool,
    quiet: bool,
}

impl OutputManager {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    fn write(&self, stderr: bool, color: Option<Color>, bold: bool, prefix: &str, message: &str) -> io::Result<()> {
        let mut stream = if stderr {
            StandardStream::stderr(ColorChoice::Auto)
        } else {
            StandardStream::stdout(ColorChoice::Auto)
        };
        if !prefix.is_empty() {
            stream.set_color(ColorSpec::new().set_fg(color).set_bold(bold))?;
            write!(stream, "{prefix} ")?;
            stream.reset()?;
        }
        writeln!(stream, "{message}")
    }

    pub fn info(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.write(false, None, false, "", message)
    }

    pub fn verbose(&self, message: &str) -> io::Result<()> {
        if !self.verbose || self.quiet {
            return Ok(());
        }
        self.write(false, Some(Color::Cyan), false, "·", message)
    }

    pub fn progress(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.write(false, Some(Color::Blue), true, "→", message)
    }

    pub fn success(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.write(false, Some(Color::Green), true, "✓", message)
    }

    pub fn warn(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.write(true, Some(Color::Yellow), true, "⚠", message)
    }

    pub fn error(&self, message: &str) -> io::Result<()> {
        self.write(true, Some(Color::Red), true, "✗", message)
    }

    pub fn section(&self, title: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut stream = StandardStream::stdout(ColorChoice::Auto);
        stream.set_color(ColorSpec::new().set_bold(true))?;
        writeln!(stream, "\n{title}")?;
        stream.reset()
    }

    pub fn indent(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.write(false, None, false, "", &format!("  {message}"))
    }
}
