use std::fmt::Display;
use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::provider::ProgressSink;
use crate::types::{LifecycleOutcome, StackIdentity};

/// Printed once after every runner has finished.
pub const COMPLETION_MARKER: &str = "--- LOAD TEST COMPLETE! ---";

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Shared, line-atomic text sink for every runner in a fleet.
///
/// Each line is fully formatted before the lock is taken and written with a
/// single `write_all`, so lines from concurrent runners never interleave.
/// Write errors are dropped: losing report output must not fail a stack.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Reporter {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Reporter {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// Write one unprefixed line.
    pub fn line(&self, text: impl Display) {
        let mut buf = text.to_string();
        buf.push('\n');
        if let Ok(mut w) = self.sink.lock() {
            let _ = w.write_all(buf.as_bytes());
            let _ = w.flush();
        }
    }

    /// A reporter bound to one stack; every line it writes is prefixed with
    /// `[<stack>] `.
    pub fn for_stack(&self, stack: &StackIdentity) -> StackReporter {
        StackReporter {
            reporter: self.clone(),
            prefix: format!("[{stack}] "),
        }
    }

    pub fn completion(&self) {
        self.line(COMPLETION_MARKER);
    }
}

// ---------------------------------------------------------------------------
// StackReporter
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StackReporter {
    reporter: Reporter,
    prefix: String,
}

impl StackReporter {
    pub fn line(&self, text: impl Display) {
        self.reporter.line(format_args!("{}{}", self.prefix, text));
    }

    pub fn stack_ready(&self, stack: &StackIdentity) {
        self.line(format_args!("Created/Selected stack \"{stack}\""));
    }

    /// Final status line for the stack.
    pub fn outcome(&self, outcome: &LifecycleOutcome) {
        match outcome {
            LifecycleOutcome::Succeeded { outputs } => match outputs.get("url") {
                Some(serde_json::Value::String(url)) => self.line(format_args!("URL: {url}")),
                _ => self.line("Stack lifecycle succeeded"),
            },
            LifecycleOutcome::Failed { stage, cause } => {
                self.line(format_args!("Failed to {}: {cause}", stage.action()))
            }
        }
    }
}

impl ProgressSink for StackReporter {
    fn line(&self, line: &str) {
        StackReporter::line(self, line);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
