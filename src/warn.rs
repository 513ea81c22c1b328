//! Deduplicating warning sink (§7).
//!
//! Each distinct message is printed at most once per log file, and the
//! progress bar's current line is cleared first so a warning never lands
//! mid-line.

use std::collections::HashSet;

use crate::progress::ProgressBar;

pub struct WarnSink {
    seen: HashSet<String>,
}

impl WarnSink {
    pub fn new() -> Self {
        WarnSink { seen: HashSet::new() }
    }

    /// Reset the dedup set; called when moving on to the next log file.
    pub fn reset(&mut self) {
        self.seen.clear();
    }

    pub fn warn(&mut self, progress: &mut ProgressBar, message: &str) {
        if !self.seen.insert(message.to_string()) {
            return;
        }
        progress.clear_line();
        eprintln!("warning: {message}");
    }
}

impl Default for WarnSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_message_is_suppressed() {
        let mut sink = WarnSink::new();
        assert!(sink.seen.insert("a".to_string()));
        assert!(!sink.seen.insert("a".to_string()));
    }

    #[test]
    fn reset_allows_message_again() {
        let mut sink = WarnSink::new();
        sink.seen.insert("a".to_string());
        sink.reset();
        assert!(sink.seen.is_empty());
    }
}
