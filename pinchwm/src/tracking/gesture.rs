//! Hysteresis gesture state machine.
//!
//! Turns a per-frame closure signal (pinch distance or grip strength) into
//! the discrete modes OPEN / POINT / PINCH / LOCKED.  Entering a grab uses
//! the grab threshold; leaving a lock needs the signal past a separate
//! release threshold for several consecutive frames, unless it is past the
//! panic threshold, which releases at once.

use tracing::debug;

use crate::config::{
    GRIP_DEBOUNCE_FRAMES, GRIP_GRAB_THRESHOLD, GRIP_PANIC_THRESHOLD, GRIP_POINT_THRESHOLD,
    GRIP_RELEASE_THRESHOLD, PINCH_DEBOUNCE_FRAMES, PINCH_GRAB_THRESHOLD, PINCH_PANIC_THRESHOLD,
    PINCH_POINT_THRESHOLD, PINCH_RELEASE_THRESHOLD,
};

// ── Modes ──────────────────────────────────────────────────

/// Discrete gesture mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GestureMode {
    /// Hand present (or absent), fingers apart, nothing grabbed.
    Open,
    /// Hand present, closing toward a grab but not yet there.
    Point,
    /// Grab threshold crossed, nothing accepted the grab yet.
    Pinch,
    /// A body or panel is held.
    Locked,
}

impl GestureMode {
    /// String representation for IPC.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Point => "point",
            Self::Pinch => "pinch",
            Self::Locked => "locked",
        }
    }
}

/// Which direction of the signal means "closed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Smaller is closed (pinch distance).
    LowEngages,
    /// Larger is closed (grip strength).
    HighEngages,
}

/// Why a pinch or lock ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseCause {
    /// An unlocked pinch opened past the release threshold.
    Opened,
    /// A lock held past the release threshold for the debounce window.
    Debounced,
    /// The signal jumped past the panic threshold.
    Panic,
    /// The hand was missing for longer than the miss tolerance.
    HandLost,
    /// The grabbed target went away, or the surface changed.
    Cancelled,
}

impl ReleaseCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Debounced => "debounced",
            Self::Panic => "panic",
            Self::HandLost => "hand-lost",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the user deliberately let go (as opposed to a dropout or cancel).
    pub fn is_intentional(&self) -> bool {
        matches!(self, Self::Opened | Self::Debounced | Self::Panic)
    }
}

// ── Events ─────────────────────────────────────────────────

/// Events emitted by the gesture state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEvent {
    /// OPEN/POINT → PINCH.
    PinchStarted,
    /// PINCH → OPEN/POINT without anything being grabbed.
    PinchEnded { cause: ReleaseCause },
    /// PINCH → LOCKED; a consumer accepted the grab.
    Locked,
    /// LOCKED → OPEN/POINT.
    Released { cause: ReleaseCause },
}

impl GestureEvent {
    /// True for either flavor of "the pinch is over".
    pub fn ends_pinch(&self) -> bool {
        matches!(self, Self::PinchEnded { .. } | Self::Released { .. })
    }
}

// ── Config ─────────────────────────────────────────────────

/// Thresholds for one hysteresis machine.
#[derive(Debug, Clone)]
pub struct HysteresisConfig {
    pub polarity: Polarity,
    /// Crossing this enters PINCH.
    pub grab_threshold: f32,
    /// Crossing back past this (for `debounce_frames`) releases a lock.
    pub release_threshold: f32,
    /// Crossing this releases a lock immediately.
    pub panic_threshold: f32,
    /// Between this and the grab threshold the hand reads as POINT.
    pub point_threshold: f32,
    pub debounce_frames: u32,
    /// Pointer speed (px/frame) above which release counting pauses.
    pub fast_motion_px: Option<f32>,
}

impl HysteresisConfig {
    /// Defaults for the pinch-distance machine.
    pub fn pinch() -> Self {
        Self {
            polarity: Polarity::LowEngages,
            grab_threshold: PINCH_GRAB_THRESHOLD,
            release_threshold: PINCH_RELEASE_THRESHOLD,
            panic_threshold: PINCH_PANIC_THRESHOLD,
            point_threshold: PINCH_POINT_THRESHOLD,
            debounce_frames: PINCH_DEBOUNCE_FRAMES,
            fast_motion_px: None,
        }
    }

    /// Defaults for the grip-strength machine.
    pub fn grip() -> Self {
        Self {
            polarity: Polarity::HighEngages,
            grab_threshold: GRIP_GRAB_THRESHOLD,
            release_threshold: GRIP_RELEASE_THRESHOLD,
            panic_threshold: GRIP_PANIC_THRESHOLD,
            point_threshold: GRIP_POINT_THRESHOLD,
            debounce_frames: GRIP_DEBOUNCE_FRAMES,
            fast_motion_px: None,
        }
    }

    /// True if `a` is strictly more open than `b`.
    fn more_open(&self, a: f32, b: f32) -> bool {
        match self.polarity {
            Polarity::LowEngages => a > b,
            Polarity::HighEngages => a < b,
        }
    }

    fn engaged(&self, value: f32) -> bool {
        self.more_open(self.grab_threshold, value)
    }

    fn past_release(&self, value: f32) -> bool {
        self.more_open(value, self.release_threshold)
    }

    fn past_panic(&self, value: f32) -> bool {
        self.more_open(value, self.panic_threshold)
    }

    fn idle_mode(&self, value: f32) -> GestureMode {
        if self.more_open(self.point_threshold, value) {
            GestureMode::Point
        } else {
            GestureMode::Open
        }
    }

    /// Restore the ordering grab < release < panic (in the open direction)
    /// after an external edit, and keep the debounce at least one frame.
    pub fn sanitize(&mut self) {
        self.debounce_frames = self.debounce_frames.max(1);
        if !self.more_open(self.release_threshold, self.grab_threshold) {
            self.release_threshold = self.grab_threshold;
        }
        if !self.more_open(self.panic_threshold, self.release_threshold) {
            self.panic_threshold = self.release_threshold;
        }
    }

    /// Generate s-expression for IPC config.
    pub fn config_sexp(&self) -> String {
        format!(
            "(:polarity :{} :grab-threshold {:.3} :release-threshold {:.3} :panic-threshold {:.3} :point-threshold {:.3} :debounce-frames {} :fast-motion-px {})",
            match self.polarity {
                Polarity::LowEngages => "low",
                Polarity::HighEngages => "high",
            },
            self.grab_threshold,
            self.release_threshold,
            self.panic_threshold,
            self.point_threshold,
            self.debounce_frames,
            self.fast_motion_px
                .map(|v| format!("{:.1}", v))
                .unwrap_or_else(|| "nil".to_string()),
        )
    }
}

// ── State machine ──────────────────────────────────────────

/// One hysteresis gesture machine.
#[derive(Debug, Clone)]
pub struct GestureMachine {
    pub config: HysteresisConfig,
    mode: GestureMode,
    debounce_count: u32,
    release_progress: f32,
}

impl GestureMachine {
    pub fn new(config: HysteresisConfig) -> Self {
        Self {
            config,
            mode: GestureMode::Open,
            debounce_count: 0,
            release_progress: 0.0,
        }
    }

    pub fn mode(&self) -> GestureMode {
        self.mode
    }

    pub fn release_progress(&self) -> f32 {
        self.release_progress
    }

    pub fn is_locked(&self) -> bool {
        self.mode == GestureMode::Locked
    }

    /// Feed one tracked frame.
    ///
    /// `speed_px` is the pointer's per-frame displacement, used only when
    /// fast-motion release suppression is configured.
    pub fn update(&mut self, value: f32, speed_px: f32) -> Vec<GestureEvent> {
        let mut events = Vec::new();

        if self.mode != GestureMode::Locked {
            self.release_progress = 0.0;
        }
        if !value.is_finite() {
            return events;
        }

        match self.mode {
            GestureMode::Open | GestureMode::Point => {
                if self.config.engaged(value) {
                    self.mode = GestureMode::Pinch;
                    debug!(value, "pinch started");
                    events.push(GestureEvent::PinchStarted);
                } else {
                    self.mode = self.config.idle_mode(value);
                }
            }
            GestureMode::Pinch => {
                if self.config.past_release(value) {
                    self.mode = self.config.idle_mode(value);
                    events.push(GestureEvent::PinchEnded {
                        cause: ReleaseCause::Opened,
                    });
                }
            }
            GestureMode::Locked => {
                if self.config.past_panic(value) {
                    events.push(self.release(value, ReleaseCause::Panic));
                } else if self.config.past_release(value) {
                    let moving_fast = self
                        .config
                        .fast_motion_px
                        .map_or(false, |limit| speed_px > limit);
                    if !moving_fast {
                        self.debounce_count += 1;
                        let frames = self.config.debounce_frames.max(1);
                        self.release_progress =
                            (self.debounce_count as f32 / frames as f32).min(1.0);
                        if self.debounce_count >= frames {
                            events.push(self.release(value, ReleaseCause::Debounced));
                        }
                    }
                } else {
                    // Firmly gripped again.
                    self.debounce_count = 0;
                    self.release_progress = 0.0;
                }
            }
        }

        events
    }

    /// PINCH → LOCKED when a consumer accepts the grab.
    pub fn lock(&mut self) -> Option<GestureEvent> {
        if self.mode != GestureMode::Pinch {
            return None;
        }
        self.mode = GestureMode::Locked;
        self.debounce_count = 0;
        self.release_progress = 0.0;
        debug!("gesture locked");
        Some(GestureEvent::Locked)
    }

    /// The hand exceeded the miss tolerance: end whatever was in progress.
    pub fn hand_lost(&mut self) -> Vec<GestureEvent> {
        let event = match self.mode {
            GestureMode::Locked => Some(GestureEvent::Released {
                cause: ReleaseCause::HandLost,
            }),
            GestureMode::Pinch => Some(GestureEvent::PinchEnded {
                cause: ReleaseCause::HandLost,
            }),
            GestureMode::Open | GestureMode::Point => None,
        };
        self.reset();
        event.into_iter().collect()
    }

    /// Drop a lock whose target disappeared.  The hand is still closed,
    /// so the machine falls back to PINCH.
    pub fn cancel(&mut self) -> Option<GestureEvent> {
        if self.mode != GestureMode::Locked {
            return None;
        }
        self.mode = GestureMode::Pinch;
        self.debounce_count = 0;
        self.release_progress = 0.0;
        debug!("gesture lock cancelled");
        Some(GestureEvent::Released {
            cause: ReleaseCause::Cancelled,
        })
    }

    /// Reset to OPEN.
    pub fn reset(&mut self) {
        self.mode = GestureMode::Open;
        self.debounce_count = 0;
        self.release_progress = 0.0;
    }

    fn release(&mut self, value: f32, cause: ReleaseCause) -> GestureEvent {
        self.mode = self.config.idle_mode(value);
        self.debounce_count = 0;
        self.release_progress = 1.0;
        debug!(value, cause = cause.as_str(), "gesture released");
        GestureEvent::Released { cause }
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:mode :{} :debounce-count {} :release-progress {:.2})",
            self.mode.as_str(),
            self.debounce_count,
            self.release_progress,
        )
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive a machine into LOCKED at `value`.
    fn locked(config: HysteresisConfig, value: f32) -> GestureMachine {
        let mut m = GestureMachine::new(config);
        let events = m.update(value, 0.0);
        assert_eq!(events, vec![GestureEvent::PinchStarted]);
        assert_eq!(m.lock(), Some(GestureEvent::Locked));
        m
    }

    fn pinch_variants() -> Vec<HysteresisConfig> {
        vec![
            HysteresisConfig::pinch(),
            HysteresisConfig {
                grab_threshold: 0.25,
                release_threshold: 0.40,
                panic_threshold: 0.90,
                debounce_frames: 3,
                ..HysteresisConfig::pinch()
            },
            HysteresisConfig {
                grab_threshold: 0.12,
                release_threshold: 0.22,
                panic_threshold: 0.70,
                debounce_frames: 8,
                ..HysteresisConfig::pinch()
            },
        ]
    }

    #[test]
    fn test_new_machine_open() {
        let m = GestureMachine::new(HysteresisConfig::pinch());
        assert_eq!(m.mode(), GestureMode::Open);
        assert_eq!(m.release_progress(), 0.0);
    }

    #[test]
    fn test_open_point_classification() {
        let mut m = GestureMachine::new(HysteresisConfig::pinch());
        assert!(m.update(0.9, 0.0).is_empty());
        assert_eq!(m.mode(), GestureMode::Open);
        assert!(m.update(0.4, 0.0).is_empty());
        assert_eq!(m.mode(), GestureMode::Point);
    }

    #[test]
    fn test_pinch_starts_below_grab_threshold() {
        let mut m = GestureMachine::new(HysteresisConfig::pinch());
        assert!(m.update(0.19, 0.0).is_empty());
        assert_eq!(m.update(0.17, 0.0), vec![GestureEvent::PinchStarted]);
        assert_eq!(m.mode(), GestureMode::Pinch);
    }

    #[test]
    fn test_lock_only_from_pinch() {
        let mut m = GestureMachine::new(HysteresisConfig::pinch());
        assert_eq!(m.lock(), None);
        m.update(0.1, 0.0);
        assert_eq!(m.lock(), Some(GestureEvent::Locked));
        assert_eq!(m.lock(), None);
    }

    #[test]
    fn test_unlocked_pinch_ends_past_release_threshold() {
        let mut m = GestureMachine::new(HysteresisConfig::pinch());
        m.update(0.1, 0.0);
        // Inside the hysteresis band: still pinching.
        assert!(m.update(0.25, 0.0).is_empty());
        assert_eq!(m.mode(), GestureMode::Pinch);
        assert_eq!(
            m.update(0.35, 0.0),
            vec![GestureEvent::PinchEnded { cause: ReleaseCause::Opened }]
        );
        assert_eq!(m.mode(), GestureMode::Point);
    }

    #[test]
    fn test_lock_survives_single_noisy_frames() {
        for cfg in pinch_variants() {
            let release = cfg.release_threshold;
            let panic = cfg.panic_threshold;
            let frames = cfg.debounce_frames;
            let mut m = locked(cfg, 0.05);
            let noisy = (release + panic) / 2.0;
            for _ in 0..50 {
                // Alternate: noisy open frame, then firm grip.
                assert!(m.update(noisy, 0.0).is_empty());
                assert!(m.update(0.05, 0.0).is_empty());
                assert!(m.is_locked());
                assert_eq!(m.release_progress(), 0.0);
            }
            // Runs one frame short of the debounce never release either.
            for _ in 0..frames - 1 {
                assert!(m.update(noisy, 0.0).is_empty());
            }
            assert!(m.is_locked());
        }
    }

    #[test]
    fn test_band_values_never_release() {
        let mut m = locked(HysteresisConfig::pinch(), 0.05);
        // Above grab, below release: the hysteresis band holds the lock.
        for _ in 0..100 {
            assert!(m.update(0.25, 0.0).is_empty());
        }
        assert!(m.is_locked());
    }

    #[test]
    fn test_debounced_release_progress_monotonic() {
        for cfg in pinch_variants() {
            let frames = cfg.debounce_frames;
            let value = (cfg.release_threshold + cfg.panic_threshold) / 2.0;
            let mut m = locked(cfg, 0.10);
            let mut last = 0.0;
            for i in 1..=frames {
                let events = m.update(value, 0.0);
                let progress = m.release_progress();
                assert!(progress > last, "progress must rise every frame");
                last = progress;
                if i < frames {
                    assert!(events.is_empty());
                    assert!(m.is_locked());
                } else {
                    assert_eq!(
                        events,
                        vec![GestureEvent::Released { cause: ReleaseCause::Debounced }]
                    );
                    assert_eq!(progress, 1.0);
                }
            }
            assert!(!m.is_locked());
            // Progress clears on the next frame.
            m.update(value, 0.0);
            assert_eq!(m.release_progress(), 0.0);
        }
    }

    #[test]
    fn test_regrip_resets_progress() {
        let mut m = locked(HysteresisConfig::pinch(), 0.1);
        m.update(0.5, 0.0);
        m.update(0.5, 0.0);
        assert!(m.release_progress() > 0.0);
        m.update(0.1, 0.0);
        assert_eq!(m.release_progress(), 0.0);
        // A full debounce window is needed again.
        for _ in 0..PINCH_DEBOUNCE_FRAMES - 1 {
            assert!(m.update(0.5, 0.0).is_empty());
        }
        assert!(m.is_locked());
    }

    #[test]
    fn test_panic_release_is_immediate() {
        let mut m = locked(HysteresisConfig::pinch(), 0.1);
        assert_eq!(
            m.update(0.95, 0.0),
            vec![GestureEvent::Released { cause: ReleaseCause::Panic }]
        );
        assert_eq!(m.mode(), GestureMode::Open);
    }

    #[test]
    fn test_fast_motion_pauses_release() {
        let cfg = HysteresisConfig {
            fast_motion_px: Some(30.0),
            ..HysteresisConfig::pinch()
        };
        let mut m = locked(cfg, 0.1);
        for _ in 0..20 {
            assert!(m.update(0.5, 80.0).is_empty());
        }
        assert!(m.is_locked());
        // Panic still wins while moving fast.
        assert_eq!(
            m.update(0.95, 80.0),
            vec![GestureEvent::Released { cause: ReleaseCause::Panic }]
        );
    }

    #[test]
    fn test_hand_lost_releases_lock() {
        let mut m = locked(HysteresisConfig::pinch(), 0.1);
        assert_eq!(
            m.hand_lost(),
            vec![GestureEvent::Released { cause: ReleaseCause::HandLost }]
        );
        assert_eq!(m.mode(), GestureMode::Open);
        assert!(m.hand_lost().is_empty());
    }

    #[test]
    fn test_cancel_falls_back_to_pinch() {
        let mut m = locked(HysteresisConfig::pinch(), 0.1);
        assert_eq!(
            m.cancel(),
            Some(GestureEvent::Released { cause: ReleaseCause::Cancelled })
        );
        assert_eq!(m.mode(), GestureMode::Pinch);
        assert_eq!(m.cancel(), None);
    }

    #[test]
    fn test_grip_machine_high_engages() {
        let mut m = GestureMachine::new(HysteresisConfig::grip());
        assert!(m.update(0.1, 0.0).is_empty());
        assert_eq!(m.mode(), GestureMode::Open);
        assert!(m.update(0.3, 0.0).is_empty());
        assert_eq!(m.mode(), GestureMode::Point);
        assert_eq!(m.update(0.8, 0.0), vec![GestureEvent::PinchStarted]);
        m.lock();
        // 0.38 is inside the band (release is 0.35).
        for _ in 0..10 {
            assert!(m.update(0.38, 0.0).is_empty());
        }
        for _ in 0..GRIP_DEBOUNCE_FRAMES - 1 {
            assert!(m.update(0.3, 0.0).is_empty());
        }
        assert_eq!(
            m.update(0.3, 0.0),
            vec![GestureEvent::Released { cause: ReleaseCause::Debounced }]
        );
    }

    #[test]
    fn test_sanitize_restores_ordering() {
        let mut cfg = HysteresisConfig {
            release_threshold: 0.1,
            panic_threshold: 0.05,
            debounce_frames: 0,
            ..HysteresisConfig::pinch()
        };
        cfg.sanitize();
        assert_eq!(cfg.release_threshold, cfg.grab_threshold);
        assert_eq!(cfg.panic_threshold, cfg.grab_threshold);
        assert_eq!(cfg.debounce_frames, 1);
    }

    #[test]
    fn test_non_finite_value_ignored() {
        let mut m = locked(HysteresisConfig::pinch(), 0.1);
        assert!(m.update(f32::NAN, 0.0).is_empty());
        assert!(m.is_locked());
    }

    #[test]
    fn test_sexp_output_parses() {
        let m = GestureMachine::new(HysteresisConfig::pinch());
        assert!(lexpr::from_str(&m.status_sexp()).is_ok());
        assert!(lexpr::from_str(&m.config.config_sexp()).is_ok());
    }
}
