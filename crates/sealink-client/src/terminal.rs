//! Line-oriented terminal surface.

use std::collections::VecDeque;
use std::io::{BufRead, Write};

use sealink_core::{ErrorKind, UiSurface};

/// Reads outbound messages line by line and prints what it is shown.
///
/// Queued messages are used first. After that, lines come from `input`
/// unless reading is disabled.
pub struct TerminalUi<R, W> {
    input: R,
    output: W,
    queued: VecDeque<String>,
    read_input: bool,
    prompt: bool,
}

impl<R: BufRead, W: Write> TerminalUi<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            queued: VecDeque::new(),
            read_input: true,
            prompt: false,
        }
    }

    /// Send `message` and never read from `input`.
    pub fn with_message(input: R, output: W, message: impl Into<String>) -> Self {
        let mut ui = Self::new(input, output);
        ui.queued.push_back(message.into());
        ui.read_input = false;
        ui
    }

    /// Print `> ` before each read.
    pub fn prompting(mut self) -> Self {
        self.prompt = true;
        self
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn line(&mut self, label: &str, text: &str) {
        // write errors are ignored
        let _ = writeln!(self.output, "{label}: {text}");
        let _ = self.output.flush();
    }
}

impl<R: BufRead, W: Write> UiSurface for TerminalUi<R, W> {
    fn read_outbound_plaintext(&mut self) -> Option<String> {
        if let Some(message) = self.queued.pop_front() {
            return Some(message);
        }
        if !self.read_input {
            return None;
        }
        if self.prompt {
            let _ = write!(self.output, "> ");
            let _ = self.output.flush();
        }

        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }

    fn display_ciphertext(&mut self, ciphertext: &str) {
        self.line("ciphertext", ciphertext);
    }

    fn display_plaintext(&mut self, plaintext: &str) {
        self.line("plaintext", plaintext);
    }

    fn display_failure(&mut self, kind: ErrorKind, message: &str) {
        self.line(&format!("error[{}]", kind.code()), message);
    }
}
