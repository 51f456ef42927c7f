//! Iteration timing.
//!
//! Blocks mark intermediate points of an iteration with `time_flag`; the
//! worker folds each iteration's marks into running per-flag averages so a
//! profiler view can show where a block spends its time.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Time elapsed between consecutive flags of one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagTiming {
    pub name: String,
    /// Mean duration of the section ending at this flag, in ms
    pub mean_ms: f64,
    pub samples: u64,
}

/// Aggregated timing of a block's iterations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationStats {
    pub iterations: u64,
    /// Duration of the last iteration, in ms
    pub last_ms: f64,
    pub mean_ms: f64,
    pub max_ms: f64,
    /// Per-flag sections, in first-seen order
    pub flags: Vec<FlagTiming>,
}

impl IterationStats {
    pub(crate) fn record(&mut self, total: Duration, marks: &[(String, Duration)]) {
        let ms = total.as_secs_f64() * 1000.0;
        self.iterations += 1;
        self.last_ms = ms;
        self.max_ms = self.max_ms.max(ms);
        self.mean_ms += (ms - self.mean_ms) / self.iterations as f64;

        let mut previous = Duration::ZERO;
        for (name, at) in marks {
            let section = at.saturating_sub(previous).as_secs_f64() * 1000.0;
            previous = *at;
            let slot = match self.flags.iter().position(|f| &f.name == name) {
                Some(i) => &mut self.flags[i],
                None => {
                    self.flags.push(FlagTiming {
                        name: name.clone(),
                        mean_ms: 0.0,
                        samples: 0,
                    });
                    let last = self.flags.len() - 1;
                    &mut self.flags[last]
                }
            };
            slot.samples += 1;
            slot.mean_ms += (section - slot.mean_ms) / slot.samples as f64;
        }
    }
}

crate::custom_property_type!(IterationStats);

/// Marks collected during one iteration
#[derive(Debug)]
pub(crate) struct FlagRecorder {
    started: Instant,
    marks: Vec<(String, Duration)>,
}

impl FlagRecorder {
    pub(crate) fn start() -> Self {
        Self {
            started: Instant::now(),
            marks: Vec::new(),
        }
    }

    pub(crate) fn mark(&mut self, name: &str) {
        self.marks.push((name.to_string(), self.started.elapsed()));
    }

    pub(crate) fn finish(self) -> (Duration, Vec<(String, Duration)>) {
        (self.started.elapsed(), self.marks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_mean() {
        let mut stats = IterationStats::default();
        stats.record(Duration::from_millis(10), &[]);
        stats.record(Duration::from_millis(30), &[]);
        assert_eq!(stats.iterations, 2);
        assert!((stats.mean_ms - 20.0).abs() < 1e-9);
        assert!((stats.max_ms - 30.0).abs() < 1e-9);
        assert!((stats.last_ms - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_flag_sections() {
        let mut stats = IterationStats::default();
        let marks = vec![
            ("load".to_string(), Duration::from_millis(4)),
            ("filter".to_string(), Duration::from_millis(10)),
        ];
        stats.record(Duration::from_millis(12), &marks);
        assert_eq!(stats.flags.len(), 2);
        assert_eq!(stats.flags[0].name, "load");
        assert!((stats.flags[0].mean_ms - 4.0).abs() < 1e-9);
        assert!((stats.flags[1].mean_ms - 6.0).abs() < 1e-9);
    }
}
