//! Bounded in-memory ring of recent temperature readings with running statistics.

use std::collections::VecDeque;

/// An immutable view of the window's contents and derived statistics, taken atomically
/// with respect to the sequence it describes (there is no way to observe a sequence from
/// one moment and statistics from another, because both are read under one borrow).
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSnapshot {
    pub readings: Vec<f64>,
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Fixed-capacity ring of the last `capacity` temperature readings, in insertion order.
///
/// Cardinality never exceeds `capacity` (invariant 7 of the data model). The running sum
/// makes the mean O(1) per insertion; min/max are cached and only rescanned when the
/// evicted reading was itself the cached min or max, which is O(1) amortised for readings
/// that don't sit at the extremes and O(n) only on the rare eviction of an extremum.
pub struct TelemetryWindow {
    capacity: usize,
    readings: VecDeque<f64>,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl TelemetryWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            readings: VecDeque::with_capacity(capacity.max(1)),
            sum: 0.0,
            min: None,
            max: None,
        }
    }

    /// Append a finite reading, evicting the oldest if the window is at capacity.
    pub fn record(&mut self, value: f64) {
        debug_assert!(value.is_finite());

        if self.readings.len() == self.capacity {
            if let Some(evicted) = self.readings.pop_front() {
                self.sum -= evicted;
                if self.min == Some(evicted) || self.max == Some(evicted) {
                    self.rescan_extrema();
                }
            }
        }

        self.readings.push_back(value);
        self.sum += value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    fn rescan_extrema(&mut self) {
        self.min = self.readings.iter().copied().fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))));
        self.max = self.readings.iter().copied().fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))));
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn average(&self) -> Option<f64> {
        if self.readings.is_empty() { None } else { Some(self.sum / self.readings.len() as f64) }
    }

    /// Take a consistent view of the readings plus their mean/min/max.
    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            readings: self.readings.iter().copied().collect(),
            average: self.average(),
            min: self.min,
            max: self.max,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn empty_window_has_null_stats() {
        let window = TelemetryWindow::new(3);
        let snap = window.snapshot();
        assert!(snap.readings.is_empty());
        assert_eq!(snap.average, None);
        assert_eq!(snap.min, None);
        assert_eq!(snap.max, None);
    }

    #[test]
    fn cardinality_never_exceeds_capacity() {
        let mut window = TelemetryWindow::new(3);
        for t in [1.0, 2.0, 3.0, 4.0, 5.0] {
            window.record(t);
            assert!(window.len() <= 3);
        }
        assert_eq!(window.snapshot().readings, vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn burst_of_n_plus_k_leaves_exactly_last_n() {
        let mut window = TelemetryWindow::new(10);
        for i in 0..15 {
            window.record(i as f64);
        }
        let snap = window.snapshot();
        assert_eq!(snap.readings.len(), 10);
        assert_eq!(snap.readings, (5..15).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[rstest]
    #[case(vec![10.0, 20.0, 30.0], 20.0, 10.0, 30.0)]
    #[case(vec![5.0], 5.0, 5.0, 5.0)]
    #[case(vec![-1.0, -2.0, -3.0], -2.0, -3.0, -1.0)]
    fn mean_min_max_match_contents(
        #[case] values: Vec<f64>,
        #[case] expected_mean: f64,
        #[case] expected_min: f64,
        #[case] expected_max: f64,
    ) {
        let mut window = TelemetryWindow::new(values.len());
        for v in &values {
            window.record(*v);
        }
        let snap = window.snapshot();
        assert!((snap.average.unwrap() - expected_mean).abs() < 1e-9);
        assert_eq!(snap.min, Some(expected_min));
        assert_eq!(snap.max, Some(expected_max));
    }

    #[test]
    fn extrema_rescan_on_eviction_of_minimum() {
        let mut window = TelemetryWindow::new(2);
        window.record(1.0);
        window.record(5.0);
        assert_eq!(window.snapshot().min, Some(1.0));
        window.record(3.0); // evicts the 1.0 minimum
        let snap = window.snapshot();
        assert_eq!(snap.readings, vec![5.0, 3.0]);
        assert_eq!(snap.min, Some(3.0));
        assert_eq!(snap.max, Some(5.0));
    }

    #[test]
    fn mean_equals_arithmetic_mean_of_contents() {
        let mut window = TelemetryWindow::new(20);
        let values = [18.2, 19.9, 23.1, 27.8, 15.0, 30.2, 22.2];
        for v in values {
            window.record(v);
        }
        let expected = values.iter().sum::<f64>() / values.len() as f64;
        assert!((window.average().unwrap() - expected).abs() < 1e-9);
    }
}
