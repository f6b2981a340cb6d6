//! Output for dump mode and run progress.

use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::error::{MigrateError, Result};

/// Receives rendered SQL, comments and progress marks.
pub trait StatementSink: Send {
    /// Write one complete line.
    fn write_line(&mut self, line: &str) -> Result<()>;

    /// Write a statement, terminated for replay through a SQL client.
    fn statement(&mut self, sql: &str) -> Result<()> {
        self.write_line(&format!("{};", sql))
    }

    /// Write a SQL comment line.
    fn comment(&mut self, text: &str) -> Result<()> {
        self.write_line(&format!("-- {}", text))
    }

    /// Write a single progress character. Ignored by default.
    fn progress(&mut self, _mark: char) -> Result<()> {
        Ok(())
    }
}

/// Collects lines in memory.
impl StatementSink for Vec<String> {
    fn write_line(&mut self, line: &str) -> Result<()> {
        self.push(line.to_string());
        Ok(())
    }
}

/// Shared in-memory sink; clones append to the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl StatementSink for MemorySink {
    fn write_line(&mut self, line: &str) -> Result<()> {
        self.lines
            .lock()
            .map_err(|e| MigrateError::store(e, "writing to memory sink"))?
            .push(line.to_string());
        Ok(())
    }
}

/// Writes lines (and progress marks) to any [`Write`] implementation.
pub struct WriterSink<W: Write + Send> {
    writer: W,
    mid_line: bool,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            mid_line: false,
        }
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl WriterSink<std::io::Stdout> {
    /// Sink writing to standard output.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl WriterSink<std::io::Stderr> {
    /// Sink writing to standard error.
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write + Send> StatementSink for WriterSink<W> {
    fn write_line(&mut self, line: &str) -> Result<()> {
        if self.mid_line {
            writeln!(self.writer)?;
            self.mid_line = false;
        }
        writeln!(self.writer, "{}", line)?;
        Ok(())
    }

    fn progress(&mut self, mark: char) -> Result<()> {
        write!(self.writer, "{}", mark)?;
        self.writer.flush()?;
        self.mid_line = true;
        Ok(())
    }
}
