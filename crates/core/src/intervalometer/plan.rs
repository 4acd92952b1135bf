//! Shooting plans and the slider scales that produce them.

/// Continuous sub-mode used when a plan does not name one.
pub const DEFAULT_CONT_SHOOTING_MODE: &str = "Continuous";

/// Highest slider position with a defined mapping on both scales.
pub const SLIDER_MAX: u32 = 108;

/// Interval slider position to milliseconds. Position 0 means burst.
///
/// | positions | step   | range         |
/// |-----------|--------|---------------|
/// | 1..=20    | 0.5 s  | 0.5 s - 10 s  |
/// | 21..=70   | 1 s    | 11 s - 60 s   |
/// | 71..=88   | 30 s   | 1.5 min - 10 min |
/// | 89..=107  | 1 min  | 11 min - 29 min |
/// | 108+      |        | 30 min        |
pub fn interval_from_slider(value: u32) -> u64 {
    let v = u64::from(value);
    match value {
        0 => 0,
        1..=20 => 500 * v,
        21..=70 => 1_000 * (v - 10),
        71..=88 => 30_000 * (v - 68),
        89..=107 => 60_000 * (v - 78),
        _ => 1_800_000,
    }
}

/// Shot-count slider position to a shot count; `None` is unbounded.
pub fn shots_from_slider(value: u32) -> Option<u32> {
    match value {
        0..=19 => Some(value + 1),
        20..=35 => Some(5 * (value - 15)),
        36..=55 => Some(20 * (value - 30)),
        56..=86 => Some(100 * (value - 50)),
        _ => None,
    }
}

/// What one run of the intervalometer does. Fixed for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalPlan {
    /// Time between shot starts; 0 means burst.
    pub interval_ms: u64,
    /// `None` runs until stopped.
    pub total_shots: Option<u32>,
    /// Continuous sub-mode for burst runs.
    pub cont_shooting_mode: String,
    /// Exposure length per shot when the shutter is set to BULB.
    pub bulb_duration_ms: i64,
}

impl IntervalPlan {
    pub fn burst(total_shots: Option<u32>) -> Self {
        Self::interval(0, total_shots)
    }

    pub fn interval(interval_ms: u64, total_shots: Option<u32>) -> Self {
        Self {
            interval_ms,
            total_shots,
            cont_shooting_mode: DEFAULT_CONT_SHOOTING_MODE.to_string(),
            bulb_duration_ms: 0,
        }
    }

    pub fn from_sliders(interval_slider: u32, shots_slider: u32) -> Self {
        Self::interval(
            interval_from_slider(interval_slider),
            shots_from_slider(shots_slider),
        )
    }

    pub fn with_bulb_duration(mut self, bulb_duration_ms: i64) -> Self {
        self.bulb_duration_ms = bulb_duration_ms;
        self
    }

    pub fn with_cont_shooting_mode(mut self, mode: &str) -> Self {
        self.cont_shooting_mode = mode.to_string();
        self
    }

    pub fn is_burst(&self) -> bool {
        self.interval_ms == 0
    }
}

/// Shots taken so far in a burst, from the camera's falling
/// recordable-image count.
///
/// The camera reports `-1` while the card is not ready; such readings say
/// nothing about progress and are ignored.
#[derive(Debug, Clone, Copy)]
pub struct BurstCounter {
    baseline: i64,
    total: Option<u32>,
}

/// One [`BurstCounter::observe`] outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstProgress {
    pub shots_taken: u32,
    /// The card is full or the requested count is reached.
    pub done: bool,
}

impl BurstCounter {
    pub fn new(baseline: i64, total: Option<u32>) -> Self {
        Self { baseline, total }
    }

    /// `None` for a negative (not ready) reading.
    pub fn observe(&self, recordable: i64) -> Option<BurstProgress> {
        if recordable < 0 {
            return None;
        }
        let taken = (self.baseline - recordable).clamp(0, i64::from(u32::MAX)) as u32;
        let card_full = recordable == 0;
        let reached = self.total.is_some_and(|total| taken >= total);
        Some(BurstProgress {
            shots_taken: taken,
            done: card_full || reached,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_boundaries() {
        assert_eq!(interval_from_slider(0), 0);
        assert_eq!(interval_from_slider(1), 500);
        assert_eq!(interval_from_slider(20), 10_000);
        assert_eq!(interval_from_slider(21), 11_000);
        assert_eq!(interval_from_slider(70), 60_000);
        assert_eq!(interval_from_slider(71), 90_000);
        assert_eq!(interval_from_slider(88), 600_000);
        assert_eq!(interval_from_slider(89), 660_000);
        assert_eq!(interval_from_slider(107), 1_740_000);
        assert_eq!(interval_from_slider(108), 1_800_000);
    }

    #[test]
    fn interval_scale_is_increasing() {
        for v in 1..=SLIDER_MAX {
            assert!(
                interval_from_slider(v) > interval_from_slider(v - 1),
                "slider {v}"
            );
        }
    }

    #[test]
    fn shots_boundaries() {
        assert_eq!(shots_from_slider(0), Some(1));
        assert_eq!(shots_from_slider(19), Some(20));
        assert_eq!(shots_from_slider(20), Some(25));
        assert_eq!(shots_from_slider(35), Some(100));
        assert_eq!(shots_from_slider(36), Some(120));
        assert_eq!(shots_from_slider(55), Some(500));
        assert_eq!(shots_from_slider(56), Some(600));
        assert_eq!(shots_from_slider(86), Some(3_600));
        assert_eq!(shots_from_slider(87), None);
        assert_eq!(shots_from_slider(SLIDER_MAX), None);
    }

    #[test]
    fn shots_scale_has_no_gaps_or_overlaps() {
        let mut prev = 0;
        for v in 0..=86 {
            let shots = shots_from_slider(v).unwrap();
            assert!(shots > prev, "slider {v}");
            prev = shots;
        }
    }

    #[test]
    fn burst_counting() {
        let counter = BurstCounter::new(100, None);
        let seen: Vec<_> = [100, 95, 90, 0]
            .into_iter()
            .filter_map(|count| counter.observe(count))
            .collect();
        let taken: Vec<_> = seen.iter().map(|p| p.shots_taken).collect();
        assert_eq!(taken, vec![0, 5, 10, 100]);
        assert_eq!(seen.iter().position(|p| p.done), Some(3));
    }

    #[test]
    fn burst_stops_at_requested_count() {
        let counter = BurstCounter::new(50, Some(10));
        assert!(!counter.observe(45).unwrap().done);
        assert!(counter.observe(40).unwrap().done);
        // count going up (card swapped, files deleted) is not negative
        assert_eq!(counter.observe(60).unwrap().shots_taken, 0);
    }

    #[test]
    fn not_ready_reading_is_ignored() {
        let counter = BurstCounter::new(100, Some(10));
        assert_eq!(counter.observe(-1), None);
        assert_eq!(
            counter.observe(95),
            Some(BurstProgress {
                shots_taken: 5,
                done: false
            })
        );
    }

    #[test]
    fn plan_from_sliders() {
        let plan = IntervalPlan::from_sliders(4, 2);
        assert_eq!(plan.interval_ms, 2_000);
        assert_eq!(plan.total_shots, Some(3));
        assert!(!plan.is_burst());
        assert!(IntervalPlan::from_sliders(0, 200).is_burst());
    }
}
