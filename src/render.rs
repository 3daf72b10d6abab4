//! Output sinks for relayed completions.
//!
//! The relay core never draws anything.  It talks to an [`OutputSink`], which a UI collaborator
//! implements; [`PlainTextSink`] is the terminal implementation used by the `chatterbox` binary.

use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

/// ANSI escape code for dim text (used for informational messages).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Where the relay delivers assistant output.
///
/// For a streamed response the relay calls [`open_message`](OutputSink::open_message) once,
/// [`append_token`](OutputSink::append_token) once per non-empty fragment in arrival order, then
/// [`finalize`](OutputSink::finalize) exactly once.  A non-streamed response is a single
/// [`send_message`](OutputSink::send_message) followed by one `finalize`.  An `Err` from any of
/// these means the sink is gone and aborts the relay.
pub trait OutputSink: Send {
    /// Start a new, empty assistant message.
    fn open_message(&mut self) -> Result<()>;

    /// Append one fragment to the open message.
    fn append_token(&mut self, token: &str) -> Result<()>;

    /// Close the current message; `content` is its full text.
    fn finalize(&mut self, content: &str) -> Result<()>;

    /// Deliver a complete assistant message in one call.
    fn send_message(&mut self, content: &str) -> Result<()>;

    /// Show a failure to the user.
    fn print_error(&mut self, error: &str);

    /// Show an informational line to the user.
    fn print_info(&mut self, info: &str);

    /// Called when the user interrupts a stream.
    fn print_interrupted(&mut self) {}

    /// Returns true if the stream in progress should be abandoned.
    fn should_interrupt(&self) -> bool {
        false
    }
}

/// Plain text sink with optional ANSI styling.
///
/// Assistant text goes to the wrapped writer (stdout by default); errors go to stderr.
pub struct PlainTextSink<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    interrupted: Option<Arc<AtomicBool>>,
    streaming: bool,
}

impl PlainTextSink<Stdout> {
    /// Creates a new PlainTextSink on stdout with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextSink on stdout with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl<W: Write + Send> PlainTextSink<W> {
    /// Creates a sink that writes assistant output to `out`.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            interrupted: None,
            streaming: false,
        }
    }

    /// Attaches an interrupt flag to the sink.
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(interrupted);
        self
    }

    /// Consumes the sink and returns its writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) -> Result<()> {
        self.out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|e| Error::io("output closed", e))
    }
}

impl Default for PlainTextSink<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> OutputSink for PlainTextSink<W> {
    fn open_message(&mut self) -> Result<()> {
        self.streaming = true;
        Ok(())
    }

    fn append_token(&mut self, token: &str) -> Result<()> {
        self.write(token)
    }

    fn finalize(&mut self, _: &str) -> Result<()> {
        // A sent message already ended its line.
        if !std::mem::take(&mut self.streaming) {
            return Ok(());
        }
        self.write("\n")
    }

    fn send_message(&mut self, content: &str) -> Result<()> {
        self.write(content)?;
        self.write("\n")
    }

    fn print_error(&mut self, error: &str) {
        self.streaming = false;
        let _ = self.out.flush();
        if self.use_color {
            eprintln!("\n{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("\nError: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        let line = if self.use_color {
            format!("{ANSI_DIM}{info}{ANSI_RESET}\n")
        } else {
            format!("{info}\n")
        };
        let _ = self.write(&line);
    }

    fn print_interrupted(&mut self) {
        self.streaming = false;
        let _ = self.write("\n[interrupted]\n");
    }

    fn should_interrupt(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}
