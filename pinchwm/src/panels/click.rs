//! Click / double-click classification of short pinches.

use crate::geometry::Vec2;

use super::panel::PanelConfig;

/// Outcome of a pinch that qualified as a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    Click,
    DoubleClick,
}

impl ClickKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::DoubleClick => "double-click",
        }
    }
}

/// Tracks the current pinch so its release can be classified.
#[derive(Debug, Clone, Default)]
pub struct ClickIntentTracker {
    was_pinching: bool,
    pinch_start_ms: f64,
    pinch_start_pos: Vec2,
    last_click_ms: Option<f64>,
}

impl ClickIntentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pinching(&self) -> bool {
        self.was_pinching
    }

    pub fn start_position(&self) -> Vec2 {
        self.pinch_start_pos
    }

    /// Record the start of a pinch.
    pub fn begin(&mut self, now_ms: f64, position: Vec2) {
        self.was_pinching = true;
        self.pinch_start_ms = now_ms;
        self.pinch_start_pos = position;
    }

    /// Forget the current pinch without classifying it.
    pub fn abandon(&mut self) {
        self.was_pinching = false;
    }

    /// Classify the end of a pinch.  `manipulated` is true when the pinch
    /// committed a drag or ran a resize; such a pinch is never a click.
    pub fn finish(
        &mut self,
        now_ms: f64,
        position: Vec2,
        manipulated: bool,
        config: &PanelConfig,
    ) -> Option<ClickKind> {
        if !std::mem::take(&mut self.was_pinching) || manipulated {
            return None;
        }
        let duration = now_ms - self.pinch_start_ms;
        let travel = position.distance(self.pinch_start_pos);
        if duration >= config.click_max_duration_ms || travel >= config.click_max_travel_px {
            return None;
        }
        let kind = match self.last_click_ms {
            Some(last) if now_ms - last < config.double_click_window_ms => ClickKind::DoubleClick,
            _ => ClickKind::Click,
        };
        // A double click consumes the pair; a third tap starts over.
        self.last_click_ms = match kind {
            ClickKind::Click => Some(now_ms),
            ClickKind::DoubleClick => None,
        };
        Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tap(t: &mut ClickIntentTracker, start: f64, end: f64, travel: f32) -> Option<ClickKind> {
        let cfg = PanelConfig::default();
        t.begin(start, Vec2::new(100.0, 100.0));
        t.finish(end, Vec2::new(100.0 + travel, 100.0), false, &cfg)
    }

    #[test]
    fn test_quick_short_pinch_is_click() {
        let mut t = ClickIntentTracker::new();
        assert_eq!(tap(&mut t, 0.0, 200.0, 5.0), Some(ClickKind::Click));
    }

    #[test]
    fn test_long_or_far_pinch_is_not_click() {
        let mut t = ClickIntentTracker::new();
        assert_eq!(tap(&mut t, 0.0, 900.0, 5.0), None);
        assert_eq!(tap(&mut t, 2000.0, 2100.0, 120.0), None);
    }

    #[test]
    fn test_manipulated_pinch_is_never_click() {
        let cfg = PanelConfig::default();
        let mut t = ClickIntentTracker::new();
        t.begin(0.0, Vec2::ZERO);
        assert_eq!(t.finish(100.0, Vec2::ZERO, true, &cfg), None);
        assert!(!t.is_pinching());
    }

    #[test]
    fn test_double_click_window() {
        let mut t = ClickIntentTracker::new();
        assert_eq!(tap(&mut t, 0.0, 100.0, 0.0), Some(ClickKind::Click));
        assert_eq!(tap(&mut t, 200.0, 300.0, 0.0), Some(ClickKind::DoubleClick));
        assert_eq!(tap(&mut t, 400.0, 450.0, 0.0), Some(ClickKind::Click));
        // Outside the window.
        assert_eq!(tap(&mut t, 1500.0, 1600.0, 0.0), Some(ClickKind::Click));
    }

    #[test]
    fn test_finish_without_begin() {
        let cfg = PanelConfig::default();
        let mut t = ClickIntentTracker::new();
        assert_eq!(t.finish(10.0, Vec2::ZERO, false, &cfg), None);
    }
}
