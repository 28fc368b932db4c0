//! Switch debouncing with median, hysteresis and sticky commit window
//!
//! Each stage handles one noise mode of a mechanical switch read through an
//! ADC line:
//!
//! ```text
//! raw ──► median(W) ──► hysteresis ──► debounce ──► sticky ──► stable bool
//!        (spikes)      (threshold     (short       (rapid
//!                       chatter)       glitches)    re-toggling)
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// Tuning knobs for one switch filter
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwitchFilterSettings {
    /// Median window size in samples
    pub window: usize,
    /// Median at or below this classifies as released
    pub off_threshold: u8,
    /// Median at or above this classifies as pressed
    pub on_threshold: u8,
    /// Time a candidate must hold before it is committed
    pub debounce: Duration,
    /// Minimum time between two commits
    pub sticky: Duration,
}

impl Default for SwitchFilterSettings {
    fn default() -> Self {
        Self {
            window: 3,
            off_threshold: 5,
            on_threshold: 10,
            debounce: Duration::from_millis(20),
            sticky: Duration::from_millis(60),
        }
    }
}

/// Per-switch state machine turning raw 0..=255 samples into a stable boolean
#[derive(Debug, Clone)]
pub struct SwitchFilter {
    settings: SwitchFilterSettings,
    samples: VecDeque<u8>,
    committed: bool,
    // None until the median first crosses a threshold
    candidate: Option<bool>,
    candidate_since: Option<Instant>,
    committed_at: Option<Instant>,
}

impl SwitchFilter {
    pub fn new(settings: SwitchFilterSettings) -> Self {
        let window = settings.window.max(1);
        Self {
            settings: SwitchFilterSettings { window, ..settings },
            samples: VecDeque::with_capacity(window),
            committed: false,
            candidate: None,
            candidate_since: None,
            committed_at: None,
        }
    }

    pub fn settings(&self) -> &SwitchFilterSettings {
        &self.settings
    }

    /// Last committed value without feeding a sample
    pub fn state(&self) -> bool {
        self.committed
    }

    /// Feeds one raw sample taken at `now` and returns the stable value
    pub fn feed(&mut self, raw: u8, now: Instant) -> bool {
        if self.samples.len() == self.settings.window {
            self.samples.pop_front();
        }
        self.samples.push_back(raw);

        let median = self.median();
        let classified = if median <= self.settings.off_threshold {
            Some(false)
        } else if median >= self.settings.on_threshold {
            Some(true)
        } else {
            // Hysteresis band keeps the previous classification
            self.candidate
        };

        if classified != self.candidate {
            self.candidate = classified;
            self.candidate_since = Some(now);
        }

        if let Some(committed_at) = self.committed_at {
            if now.saturating_duration_since(committed_at) < self.settings.sticky {
                return self.committed;
            }
        }

        if let (Some(candidate), Some(since)) = (self.candidate, self.candidate_since) {
            if candidate != self.committed
                && now.saturating_duration_since(since) >= self.settings.debounce
            {
                debug!(
                    "Switch committed {} -> {} (median {})",
                    self.committed, candidate, median
                );
                self.committed = candidate;
                self.committed_at = Some(now);
            }
        }

        self.committed
    }

    fn median(&self) -> u8 {
        let mut sorted: Vec<u8> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            ((u16::from(sorted[mid - 1]) + u16::from(sorted[mid])) / 2) as u8
        } else {
            sorted[mid]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(window: usize, debounce_ms: u64, sticky_ms: u64) -> SwitchFilterSettings {
        SwitchFilterSettings {
            window,
            off_threshold: 64,
            on_threshold: 192,
            debounce: Duration::from_millis(debounce_ms),
            sticky: Duration::from_millis(sticky_ms),
        }
    }

    fn ms(base: Instant, offset: u64) -> Instant {
        base + Duration::from_millis(offset)
    }

    #[test]
    fn clean_press_commits_after_debounce() {
        let t0 = Instant::now();
        let mut filter = SwitchFilter::new(settings(1, 20, 0));

        assert!(!filter.feed(255, t0));
        assert!(!filter.feed(255, ms(t0, 10)));
        assert!(filter.feed(255, ms(t0, 20)));
        assert!(filter.state());
    }

    #[test]
    fn single_spike_is_rejected_by_median() {
        let t0 = Instant::now();
        let mut filter = SwitchFilter::new(settings(3, 0, 0));

        let samples = [0, 0, 255, 0, 0, 0];
        for (i, raw) in samples.into_iter().enumerate() {
            assert!(!filter.feed(raw, ms(t0, i as u64 * 5)), "spike leaked at sample {}", i);
        }
    }

    #[test]
    fn hysteresis_band_keeps_previous_classification() {
        let t0 = Instant::now();
        let mut filter = SwitchFilter::new(settings(1, 0, 0));

        assert!(filter.feed(200, t0));
        // Between thresholds: stays pressed
        assert!(filter.feed(120, ms(t0, 10)));
        assert!(filter.feed(70, ms(t0, 20)));
        assert!(!filter.feed(60, ms(t0, 30)));
        // Between thresholds again: stays released
        assert!(!filter.feed(180, ms(t0, 40)));
    }

    #[test]
    fn unclassified_start_stays_released() {
        let t0 = Instant::now();
        let mut filter = SwitchFilter::new(settings(1, 0, 0));

        for i in 0..10 {
            assert!(!filter.feed(128, ms(t0, i * 10)));
        }
    }

    #[test]
    fn short_glitch_does_not_survive_debounce() {
        let t0 = Instant::now();
        let mut filter = SwitchFilter::new(settings(1, 30, 0));

        assert!(!filter.feed(255, t0));
        assert!(!filter.feed(255, ms(t0, 10)));
        assert!(!filter.feed(0, ms(t0, 20)));
        // Candidate restarted at 40ms; held for less than 30ms
        assert!(!filter.feed(255, ms(t0, 40)));
        assert!(!filter.feed(255, ms(t0, 60)));
        assert!(filter.feed(255, ms(t0, 70)));
    }

    #[test]
    fn sticky_window_holds_committed_value() {
        let t0 = Instant::now();
        let mut filter = SwitchFilter::new(settings(1, 0, 100));

        assert!(filter.feed(255, t0));
        assert!(filter.feed(0, ms(t0, 10)));
        assert!(filter.feed(0, ms(t0, 99)));
        assert!(!filter.feed(0, ms(t0, 100)));
    }

    #[test]
    fn fast_oscillation_toggles_at_most_once_per_sticky_window() {
        let t0 = Instant::now();
        let sticky = 100u64;
        let mut filter = SwitchFilter::new(settings(3, 0, sticky));

        let mut last = filter.state();
        let mut toggles = Vec::new();
        for step in 0..400u64 {
            let raw = if step % 2 == 0 { 0 } else { 255 };
            let now = ms(t0, step * 5);
            let out = filter.feed(raw, now);
            if out != last {
                toggles.push(step * 5);
                last = out;
            }
        }

        assert!(!toggles.is_empty());
        for pair in toggles.windows(2) {
            assert!(
                pair[1] - pair[0] >= sticky,
                "toggled at {}ms and {}ms",
                pair[0],
                pair[1]
            );
        }
        assert!(toggles.len() as u64 <= 2000 / sticky + 1);
    }

    #[test]
    fn even_window_median_averages_middle_pair() {
        let t0 = Instant::now();
        let mut filter = SwitchFilter::new(settings(2, 0, 0));

        assert!(!filter.feed(130, t0));
        // median of (130, 255) = 192, exactly the on threshold
        assert!(filter.feed(255, ms(t0, 1)));
    }

    #[test]
    fn zero_window_is_treated_as_one() {
        let filter = SwitchFilter::new(settings(0, 0, 0));
        assert_eq!(filter.settings().window, 1);
    }
}
