//! DataState - Current Value, Sample History and the Ingestion Pipeline

use crate::constants::CHART_WINDOW;
use crate::domain::sample::Sample;

/// Destination for the best-effort cloud copy of each sample.
///
/// Implementations must not block and must swallow their own failures; the
/// acquisition path never sees an error from the mirror.
pub trait SampleMirror {
    fn upload_sample(&self, sample: &Sample);
}

/// Summary figures over the whole history
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleStats {
    pub total: usize,
    pub true_count: usize,
    /// Share of `true` samples in percent (0.0 when empty)
    pub true_percentage: f64,
}

/// Acquisition state. Only `ingest` writes to it.
///
/// The history is unbounded and trusts arrival order; there is no eviction
/// or timestamp reordering.
#[derive(Debug, Clone, Default)]
pub struct DataState {
    current: Option<Sample>,
    history: Vec<Sample>,
}

impl DataState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one inbound sample: current value, history, then cloud mirror
    pub fn ingest(&mut self, sample: Sample, mirror: &dyn SampleMirror) {
        tracing::debug!("sample {}", sample);
        self.current = Some(sample.clone());
        self.history.push(sample);

        if let Some(latest) = self.history.last() {
            mirror.upload_sample(latest);
        }
    }

    /// Most recent sample, if any arrived this session
    pub fn current(&self) -> Option<&Sample> {
        self.current.as_ref()
    }

    /// All samples in arrival order
    pub fn history(&self) -> &[Sample] {
        &self.history
    }

    /// The last `CHART_WINDOW` samples, oldest first
    pub fn chart_window(&self) -> &[Sample] {
        self.recent(CHART_WINDOW)
    }

    /// The last `n` samples, oldest first
    pub fn recent(&self, n: usize) -> &[Sample] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    pub fn stats(&self) -> SampleStats {
        let total = self.history.len();
        let true_count = self.history.iter().filter(|s| s.value).count();
        let true_percentage = if total > 0 {
            true_count as f64 * 100.0 / total as f64
        } else {
            0.0
        };
        SampleStats {
            total,
            true_count,
            true_percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingMirror {
        uploads: RefCell<Vec<Sample>>,
    }

    impl SampleMirror for RecordingMirror {
        fn upload_sample(&self, sample: &Sample) {
            self.uploads.borrow_mut().push(sample.clone());
        }
    }

    /// Simulates a mirror whose writes are always rejected
    struct RejectingMirror;

    impl SampleMirror for RejectingMirror {
        fn upload_sample(&self, _sample: &Sample) {
            tracing::error!("simulated rejected write");
        }
    }

    fn samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample::new(format!("2024-01-01T00:00:{:02}", i), i % 3 == 0))
            .collect()
    }

    #[test]
    fn test_history_keeps_delivery_order() {
        let mirror = RecordingMirror::default();
        let mut state = DataState::new();
        let delivered = samples(45);

        for sample in delivered.clone() {
            state.ingest(sample, &mirror);
        }

        assert_eq!(state.history().len(), 45);
        assert_eq!(state.history(), delivered.as_slice());
        assert_eq!(state.current(), delivered.last());
        assert_eq!(*mirror.uploads.borrow(), delivered);
    }

    #[test]
    fn test_rejected_mirror_leaves_acquisition_intact() {
        let mut state = DataState::new();
        let sample = Sample::new("T1", true);
        state.ingest(sample.clone(), &RejectingMirror);

        assert_eq!(state.current(), Some(&sample));
        assert_eq!(state.history(), &[sample]);
    }

    #[test]
    fn test_chart_window_and_stats() {
        let mirror = RecordingMirror::default();
        let mut state = DataState::new();
        assert_eq!(state.stats().true_percentage, 0.0);

        for sample in samples(30) {
            state.ingest(sample, &mirror);
        }

        let window = state.chart_window();
        assert_eq!(window.len(), CHART_WINDOW);
        assert_eq!(window[0].timestamp, "2024-01-01T00:00:10");
        assert_eq!(window[CHART_WINDOW - 1].timestamp, "2024-01-01T00:00:29");

        let stats = state.stats();
        assert_eq!(stats.total, 30);
        assert_eq!(stats.true_count, 10);
        assert!((stats.true_percentage - 33.333).abs() < 0.01);
    }
}
