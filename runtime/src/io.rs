//! Text I/O collaborators for the `WRITE`/`READ` opcodes.
//!
//! The virtual machine core never touches `std::io` directly so that it can
//! be driven headlessly in tests against in-memory buffers; a CLI binary
//! supplies the real stdout/stdin-backed implementations.

use std::io::{self, BufRead, Write as _};

/// Sink for `WRITE`. Ivy's `print` never appends a trailing newline; callers
/// that want one must embed `\n` in the written text.
pub trait Output {
    fn write(&mut self, text: &str);
}

/// Source for `READ`. Returns one line with the trailing newline stripped,
/// matching the teaching interpreter's use of Python's `input()`.
pub trait Input {
    fn read_line(&mut self) -> io::Result<String>;
}

/// Writes to the process's real stdout.
pub struct StdoutSink;

impl Output for StdoutSink {
    fn write(&mut self, text: &str) {
        print!("{text}");
        let _ = io::stdout().flush();
    }
}

/// Reads lines from the process's real stdin.
pub struct StdinSource;

impl Input for StdinSource {
    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(line)
    }
}

/// In-memory sink, used by tests and the integration scenarios.
#[derive(Default)]
pub struct BufferOutput {
    pub buffer: String,
}

impl Output for BufferOutput {
    fn write(&mut self, text: &str) {
        self.buffer.push_str(text);
    }
}

/// In-memory line source, used by tests.
pub struct BufferInput {
    lines: std::collections::VecDeque<String>,
}

impl BufferInput {
    pub fn new(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        BufferInput {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl Input for BufferInput {
    fn read_line(&mut self) -> io::Result<String> {
        self.lines
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no more input"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_output_accumulates_writes() {
        let mut out = BufferOutput::default();
        out.write("hello");
        out.write(", world");
        assert_eq!(out.buffer, "hello, world");
    }

    #[test]
    fn buffer_input_yields_lines_in_order() {
        let mut input = BufferInput::new(["first", "second"]);
        assert_eq!(input.read_line().unwrap(), "first");
        assert_eq!(input.read_line().unwrap(), "second");
        assert!(input.read_line().is_err());
    }
}
