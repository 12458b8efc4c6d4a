//! Operator confirmation.

use std::io::{BufRead, Write};

use parking_lot::Mutex;
use tracing::warn;

use crate::backend::OperatorPrompt;

/// Confirms everything (`--force`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

impl OperatorPrompt for AlwaysConfirm {
    fn confirm(&self, _text: &str) -> bool {
        true
    }
}

/// Declines everything; useful for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverConfirm;

impl OperatorPrompt for NeverConfirm {
    fn confirm(&self, _text: &str) -> bool {
        false
    }
}

/// Writes the question to `output` and blocks on one line of `input`.
///
/// `y` and `yes` (any case) confirm. Anything else, end of input, or an I/O
/// error declines.
pub struct LinePrompt<R, W> {
    io: Mutex<(R, W)>,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            io: Mutex::new((input, output)),
        }
    }

    pub fn into_inner(self) -> (R, W) {
        self.io.into_inner()
    }
}

impl<R: BufRead, W: Write> OperatorPrompt for LinePrompt<R, W> {
    fn confirm(&self, text: &str) -> bool {
        let mut io = self.io.lock();
        let (input, output) = &mut *io;
        let asked = write!(output, "{text} [y/N]: ").and_then(|()| output.flush());
        if let Err(err) = asked {
            warn!(target: "seglog.inspect", error = %err, "failed to write confirmation prompt");
            return false;
        }
        let mut answer = String::new();
        match input.read_line(&mut answer) {
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(err) => {
                warn!(target: "seglog.inspect", error = %err, "failed to read confirmation");
                false
            }
        }
    }
}
