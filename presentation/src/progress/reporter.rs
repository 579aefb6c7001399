//! Progress reporting for selective-mode runs

use colored::Colorize;
use conclave_application::ProgressSink;
use conclave_domain::TaskStatus;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;

/// One indicatif bar per task, labelled and updated as the engine reports.
pub struct ConsoleProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn task_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:.bold.cyan} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }

    fn status_message(status: TaskStatus) -> String {
        match status {
            TaskStatus::Pending => "pending".dimmed().to_string(),
            TaskStatus::Running => "running".yellow().to_string(),
            TaskStatus::Completed => "done".green().to_string(),
            TaskStatus::Failed => "failed".red().to_string(),
            TaskStatus::Aborted => "aborted".magenta().to_string(),
            TaskStatus::Skipped => "skipped".dimmed().to_string(),
        }
    }

    /// Clear every bar, e.g. before printing the final output.
    pub fn clear(&self) {
        let Ok(mut bars) = self.bars.lock() else {
            return;
        };
        for (_, bar) in bars.drain() {
            bar.finish_and_clear();
        }
        let _ = self.multi.clear();
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleProgress {
    fn add_task(&self, id: &str, label: &str, status: TaskStatus) {
        let Ok(mut bars) = self.bars.lock() else {
            return;
        };
        let bar = self.multi.add(ProgressBar::new(100));
        bar.set_style(Self::task_style());
        bar.set_prefix(label.to_string());
        bar.set_message(Self::status_message(status));
        if let Some(old) = bars.insert(id.to_string(), bar) {
            old.finish_and_clear();
        }
    }

    fn update_task(&self, id: &str, status: TaskStatus, percent: u8) {
        let Ok(bars) = self.bars.lock() else {
            return;
        };
        let Some(bar) = bars.get(id) else {
            return;
        };
        bar.set_position(u64::from(percent.min(100)));
        bar.set_message(Self::status_message(status));
        if status.is_terminal() {
            bar.finish();
        } else {
            bar.tick();
        }
    }
}

/// Simple text-based progress (no fancy UI), one line per finished task.
pub struct SimpleProgress {
    labels: Mutex<HashMap<String, String>>,
}

impl SimpleProgress {
    pub fn new() -> Self {
        Self {
            labels: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for SimpleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for SimpleProgress {
    fn add_task(&self, id: &str, label: &str, _status: TaskStatus) {
        if let Ok(mut labels) = self.labels.lock() {
            labels.insert(id.to_string(), label.to_string());
        }
    }

    fn update_task(&self, id: &str, status: TaskStatus, _percent: u8) {
        if !status.is_terminal() {
            return;
        }
        let label = self
            .labels
            .lock()
            .ok()
            .and_then(|labels| labels.get(id).cloned())
            .unwrap_or_else(|| id.to_string());
        let mark = match status {
            TaskStatus::Completed => "v".green(),
            TaskStatus::Failed => "x".red(),
            _ => "-".dimmed(),
        };
        eprintln!("  {} {} ({})", mark, label, status.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_progress_tracks_bars() {
        let progress = ConsoleProgress::new();
        progress.add_task("a::scene", "Alpha / scene", TaskStatus::Pending);
        progress.update_task("a::scene", TaskStatus::Running, 50);
        progress.update_task("missing", TaskStatus::Completed, 100);

        let bars = progress.bars.lock().unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars["a::scene"].position(), 50);
    }

    #[test]
    fn test_console_progress_clear() {
        let progress = ConsoleProgress::new();
        progress.add_task("x", "X", TaskStatus::Pending);
        progress.update_task("x", TaskStatus::Completed, 100);
        progress.clear();
        assert!(progress.bars.lock().unwrap().is_empty());
    }

    #[test]
    fn test_simple_progress_remembers_labels() {
        let progress = SimpleProgress::new();
        progress.add_task("a::scene", "Alpha / scene", TaskStatus::Pending);
        assert_eq!(
            progress.labels.lock().unwrap().get("a::scene").map(String::as_str),
            Some("Alpha / scene")
        );
    }
}
