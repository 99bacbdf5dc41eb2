//! Rate-over-window excursion detection.
//!
//! The detector compares each new temperature against the oldest sample still
//! in the window, so it catches both a single spike and a fast sustained rise
//! that spans several polls. The window is never cleared; old samples age out.

use std::collections::VecDeque;

use crate::config::EngineConfig;

/// Fixed-capacity FIFO of recent temperatures.
#[derive(Debug, Clone)]
pub struct AnomalyWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl AnomalyWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, temp: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(temp);
    }

    pub fn oldest(&self) -> Option<f64> {
        self.samples.front().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyFlag {
    None,
    Heat,
    Cold,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anomaly {
    pub flag: AnomalyFlag,
    pub severity: f64,
    /// `current - window[0]` at observation time; zero until two samples exist.
    pub delta: f64,
}

impl Anomaly {
    pub const NONE: Self = Self {
        flag: AnomalyFlag::None,
        severity: 0.0,
        delta: 0.0,
    };

    pub fn is_flagged(&self) -> bool {
        self.flag != AnomalyFlag::None
    }
}

// Delta at which a heat spike saturates severity at 1.0.
const HEAT_SEVERITY_SPAN: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    window: AnomalyWindow,
    heat_spike: f64,
    cold_spike: f64,
}

impl AnomalyDetector {
    pub fn new(capacity: usize, heat_spike: f64, cold_spike: f64) -> Self {
        Self {
            window: AnomalyWindow::with_capacity(capacity),
            heat_spike,
            cold_spike,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.window_capacity, config.heat_spike, config.cold_spike)
    }

    pub fn window(&self) -> &AnomalyWindow {
        &self.window
    }

    pub fn observe(&mut self, temp: f64) -> Anomaly {
        self.window.push(temp);

        if self.window.len() < 2 {
            return Anomaly::NONE;
        }
        let Some(reference) = self.window.oldest() else {
            return Anomaly::NONE;
        };

        let delta = temp - reference;
        if delta > self.heat_spike {
            Anomaly {
                flag: AnomalyFlag::Heat,
                severity: (delta / HEAT_SEVERITY_SPAN).min(1.0),
                delta,
            }
        } else if delta < self.cold_spike {
            // Sudden cold is always treated as maximal severity.
            Anomaly {
                flag: AnomalyFlag::Cold,
                severity: 1.0,
                delta,
            }
        } else {
            Anomaly {
                flag: AnomalyFlag::None,
                severity: 0.0,
                delta,
            }
        }
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sample_never_flags() {
        let mut detector = AnomalyDetector::default();
        assert_eq!(detector.observe(45.0), Anomaly::NONE);
    }

    #[test]
    fn heat_spike_scales_severity() {
        let mut detector = AnomalyDetector::default();
        detector.observe(27.0);
        let anomaly = detector.observe(29.0);

        assert_eq!(anomaly.flag, AnomalyFlag::Heat);
        assert!((anomaly.severity - 0.4).abs() < 1e-9);
        assert!((anomaly.delta - 2.0).abs() < 1e-9);
    }

    #[test]
    fn heat_severity_saturates() {
        let mut detector = AnomalyDetector::default();
        detector.observe(20.0);
        let anomaly = detector.observe(28.0);

        assert_eq!(anomaly.flag, AnomalyFlag::Heat);
        assert_eq!(anomaly.severity, 1.0);
    }

    #[test]
    fn cold_drop_is_always_maximal() {
        let mut detector = AnomalyDetector::default();
        detector.observe(25.0);
        let anomaly = detector.observe(20.5);

        assert_eq!(anomaly.flag, AnomalyFlag::Cold);
        assert_eq!(anomaly.severity, 1.0);
    }

    #[test]
    fn threshold_edges_are_exclusive() {
        let mut detector = AnomalyDetector::default();
        detector.observe(25.0);
        assert_eq!(detector.observe(26.5).flag, AnomalyFlag::None);

        let mut detector = AnomalyDetector::default();
        detector.observe(25.0);
        assert_eq!(detector.observe(21.0).flag, AnomalyFlag::None);
    }

    #[test]
    fn gradual_rise_across_window_is_caught() {
        let mut detector = AnomalyDetector::default();
        let mut last = Anomaly::NONE;
        for step in 0..5 {
            last = detector.observe(27.0 + step as f64 * 0.5);
        }

        // 27.0 -> 29.0 over five polls; no single step exceeds 0.5.
        assert_eq!(last.flag, AnomalyFlag::Heat);
    }

    #[test]
    fn eviction_moves_reference_point() {
        let mut detector = AnomalyDetector::new(3, 1.5, -4.0);
        for temp in [10.0, 20.0, 20.0, 20.0] {
            detector.observe(temp);
        }

        assert_eq!(detector.window().len(), 3);
        assert_eq!(detector.window().oldest(), Some(20.0));
        assert_eq!(detector.observe(20.5).flag, AnomalyFlag::None);
    }
}
