//! Backward-jump detection on a polled media clock.

/// A backward discontinuity of the media clock between two polls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopJump {
    /// Position at the previous poll (seconds)
    pub from: f64,
    /// Position at this poll (seconds)
    pub to: f64,
}

impl LoopJump {
    /// Size of the jump in seconds.
    #[must_use]
    pub fn magnitude(&self) -> f64 {
        (self.from - self.to).abs()
    }
}

/// Compares consecutive polled positions and reports jumps backwards larger
/// than a minor threshold.
///
/// Explicit seeks must call [`LoopDetector::rebase`] so they are never
/// mistaken for a wrap.
#[derive(Debug, Clone, Default)]
pub struct LoopDetector {
    minor_threshold: f64,
    previous: Option<f64>,
}

impl LoopDetector {
    #[must_use]
    pub const fn new(minor_threshold: f64) -> Self {
        Self {
            minor_threshold,
            previous: None,
        }
    }

    pub fn set_minor_threshold(&mut self, minor_threshold: f64) {
        self.minor_threshold = minor_threshold.max(0.0);
    }

    #[must_use]
    pub const fn minor_threshold(&self) -> f64 {
        self.minor_threshold
    }

    /// Record a polled position, returning the jump if it moved backwards by
    /// more than the minor threshold.
    pub fn observe(&mut self, position: f64) -> Option<LoopJump> {
        if !position.is_finite() {
            return None;
        }
        let previous = self.previous.replace(position)?;
        if position - previous < -self.minor_threshold {
            Some(LoopJump {
                from: previous,
                to: position,
            })
        } else {
            None
        }
    }

    /// Make `position` the new baseline without classifying the move.
    pub fn rebase(&mut self, position: f64) {
        if position.is_finite() {
            self.previous = Some(position);
        }
    }

    /// Forget the baseline entirely.
    pub fn clear(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jumps(detector: &mut LoopDetector, samples: &[f64]) -> Vec<Option<LoopJump>> {
        samples.iter().map(|t| detector.observe(*t)).collect()
    }

    #[test]
    fn test_wrap_detected_once_at_third_sample() {
        let mut detector = LoopDetector::new(0.5);
        let results = jumps(&mut detector, &[29.8, 29.9, 0.1]);
        assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);
        let jump = results[2].unwrap();
        assert!((jump.from - 29.9).abs() < 1e-12);
        assert!((jump.to - 0.1).abs() < 1e-12);
        assert!((jump.magnitude() - 29.8).abs() < 1e-9);
    }

    #[test]
    fn test_monotonic_sequence_has_no_jump() {
        let mut detector = LoopDetector::new(0.5);
        assert!(jumps(&mut detector, &[10.0, 10.5, 11.0]).iter().all(Option::is_none));
    }

    #[test]
    fn test_jitter_below_minor_threshold_is_ignored() {
        let mut detector = LoopDetector::new(0.5);
        assert!(jumps(&mut detector, &[10.0, 9.8, 10.1, 9.7]).iter().all(Option::is_none));
    }

    #[test]
    fn test_rebase_hides_explicit_seek() {
        let mut detector = LoopDetector::new(0.5);
        detector.observe(20.0);
        detector.rebase(5.0);
        assert!(detector.observe(5.02).is_none());
    }

    #[test]
    fn test_non_finite_samples_are_skipped() {
        let mut detector = LoopDetector::new(0.5);
        detector.observe(12.0);
        assert!(detector.observe(f64::NAN).is_none());
        assert!(detector.observe(1.0).is_some());
    }

    #[test]
    fn test_clear_forgets_baseline() {
        let mut detector = LoopDetector::new(0.5);
        detector.observe(12.0);
        detector.clear();
        assert!(detector.observe(1.0).is_none());
    }
}
