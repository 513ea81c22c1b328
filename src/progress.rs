//! Terminal progress bar (§1: out of scope as a subsystem, invoked only
//! through this narrow interface; §5: advisory, must not block).

use std::io::Write;

pub struct ProgressBar {
    enabled: bool,
    last_len: usize,
}

impl ProgressBar {
    pub fn new(enabled: bool) -> Self {
        ProgressBar { enabled, last_len: 0 }
    }

    /// Overwrite the current line with `done/total` progress. A no-op when
    /// disabled (`-p` not passed).
    pub fn update(&mut self, done: u32, total: u32) {
        if !self.enabled {
            return;
        }
        let pct = if total == 0 { 100 } else { (done * 100 / total).min(100) };
        let line = format!("\r{done}/{total} ({pct}%)");
        self.last_len = line.len();
        print!("{line}");
        let _ = std::io::stdout().flush();
    }

    /// Blank the current line, leaving the cursor at column 0. Called before
    /// a warning is printed, so it doesn't land in the middle of a progress
    /// line, and once more when the bar is done.
    pub fn clear_line(&mut self) {
        if !self.enabled || self.last_len == 0 {
            return;
        }
        print!("\r{}\r", " ".repeat(self.last_len));
        let _ = std::io::stdout().flush();
        self.last_len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_bar_tracks_no_line_length() {
        let mut bar = ProgressBar::new(false);
        bar.update(5, 10);
        assert_eq!(bar.last_len, 0);
    }
}
