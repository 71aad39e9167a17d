//! Output sinks for the `PRINT` opcode (spec.md §4.5, §5).
//!
//! `PrintWriter` is invoked through a shared reference because a frame
//! never needs exclusive access to its sink -- concurrent handlers on
//! different threads may print through the same sink simultaneously, and
//! it is the sink's job to keep each line whole (spec.md §5: "Stdout:
//! serialized via an I/O mutex inside host print functions so concurrent
//! prints produce whole lines").

use std::io::{self, Write as _};

use parking_lot::Mutex;

/// Receives one formatted line per `PRINT` instruction.
///
/// Implementations must treat `line` as a complete, newline-free line and
/// append exactly one line terminator; this is what keeps concurrent
/// prints from different threads from interleaving mid-line.
pub trait PrintWriter: Send + Sync {
    fn print(&self, line: &str);
}

/// Serializes access to the process's real stdout so concurrent `PRINT`s
/// from different threads each land as a whole line (spec.md §5).
static STDOUT_LOCK: Mutex<()> = Mutex::new(());

/// The default `PrintWriter`: writes to the process's stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn print(&self, line: &str) {
        let _guard = STDOUT_LOCK.lock();
        let mut stdout = io::stdout();
        let _ = writeln!(stdout, "{line}");
        let _ = stdout.flush();
    }
}

/// A `PrintWriter` that collects each line into an in-memory `Vec`, useful
/// for tests and for embedders capturing output programmatically.
#[derive(Debug, Default)]
pub struct CollectStringPrint(Mutex<Vec<String>>);

impl CollectStringPrint {
    /// An empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self(Mutex::new(Vec::new()))
    }

    /// Drains and returns every line printed so far.
    #[must_use]
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut self.0.lock())
    }
}

impl PrintWriter for CollectStringPrint {
    fn print(&self, line: &str) {
        self.0.lock().push(line.to_owned());
    }
}

/// A `PrintWriter` that discards all output, for benchmarking or tests that
/// don't care about `PRINT`'s side effect.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn print(&self, _line: &str) {}
}
