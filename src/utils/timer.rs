//! Timer utilities
//!
//! Phase timing for station runs.

use std::time::{Duration, Instant};

/// Labelled timer for a single step
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    label: String,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    /// Stop and log the elapsed time at debug level
    pub fn stop(self) -> Duration {
        let elapsed = self.elapsed();
        tracing::debug!("{} took {}ms", self.label, elapsed.as_millis());
        elapsed
    }
}

/// Splits a run into named phases
#[derive(Debug)]
pub struct Stopwatch {
    start: Instant,
    marks: Vec<(String, Duration)>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            marks: Vec::new(),
        }
    }

    /// Close the current phase under `label`
    pub fn lap(&mut self, label: impl Into<String>) {
        self.marks.push((label.into(), self.start.elapsed()));
    }

    pub fn total(&self) -> Duration {
        self.start.elapsed()
    }

    /// Duration of each phase, in the order they were closed
    pub fn lap_times(&self) -> Vec<(String, Duration)> {
        let mut previous = Duration::ZERO;
        self.marks
            .iter()
            .map(|(label, mark)| {
                let phase = mark.saturating_sub(previous);
                previous = *mark;
                (label.clone(), phase)
            })
            .collect()
    }

    /// One `phase: Nms` line per phase plus the total
    pub fn format(&self) -> String {
        let mut lines: Vec<String> = self
            .lap_times()
            .into_iter()
            .map(|(label, d)| format!("{label}: {}ms", d.as_millis()))
            .collect();
        lines.push(format!("Total: {}ms", self.total().as_millis()));
        lines.join("\n")
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}
