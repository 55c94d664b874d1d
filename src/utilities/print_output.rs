use std::sync::Mutex;

/// Sink for human-readable build output.
pub trait IPrintOutput: Send + Sync {
    fn print(&self, s: &str);
}

/// Forwards every line to `log::info!`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogPrintOutput;

impl IPrintOutput for LogPrintOutput {
    fn print(&self, s: &str) {
        log::info!("{s}");
    }
}

/// Keeps every printed line in memory.
#[derive(Debug, Default)]
pub struct CollectingPrintOutput {
    lines: Mutex<Vec<String>>,
}

impl CollectingPrintOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the lines printed so far.
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl IPrintOutput for CollectingPrintOutput {
    fn print(&self, s: &str) {
        let mut lines = self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        lines.push(s.to_owned());
    }
}
