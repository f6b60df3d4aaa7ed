//! Pointer stabilization: safe-zone remap, adaptive smoothing, and
//! dropout tolerance.
//!
//! The stabilizer owns the single process-lifetime `PointerState`.  Each
//! tick it receives either fresh `HandMetrics` or nothing, and reports
//! whether the hand is tracked, coasting through a short detector dropout,
//! or lost.

use tracing::debug;

use crate::config::{
    Viewport, EXTENSION_GAIN, MAX_ALPHA, MIN_ALPHA_PANELS, MIN_ALPHA_PHYSICS,
    MISS_TOLERANCE_FRAMES, PINCH_SMOOTHING, SAFE_ZONE_MAX, SAFE_ZONE_MIN, SMOOTHING_DISTANCE_PX,
    TILT_SMOOTHING,
};
use crate::geometry::{lerp, Vec2};

use super::gesture::GestureMode;
use super::landmarks::HandMetrics;

/// Which smoothing floor to use.  Panel surfaces want precision,
/// physics surfaces tolerate more damping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothingProfile {
    Precise,
    Physics,
}

/// Stabilizer configuration.
#[derive(Debug, Clone)]
pub struct StabilizerConfig {
    /// Lower edge of the reachable camera sub-rectangle (both axes).
    pub safe_zone_min: f32,
    /// Upper edge of the reachable camera sub-rectangle (both axes).
    pub safe_zone_max: f32,
    /// How far the centroid is pushed along the wrist→knuckle vector.
    pub extension_gain: f32,
    /// Mirror horizontally (front-facing camera).
    pub mirror_x: bool,
    /// Movement in pixels at which smoothing is fully relaxed.
    pub smoothing_distance_px: f32,
    pub max_alpha: f32,
    pub min_alpha_precise: f32,
    pub min_alpha_physics: f32,
    pub pinch_smoothing: f32,
    pub tilt_smoothing: f32,
    /// Consecutive absent frames tolerated before the pointer hides.
    pub miss_tolerance_frames: u32,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            safe_zone_min: SAFE_ZONE_MIN,
            safe_zone_max: SAFE_ZONE_MAX,
            extension_gain: EXTENSION_GAIN,
            mirror_x: true,
            smoothing_distance_px: SMOOTHING_DISTANCE_PX,
            max_alpha: MAX_ALPHA,
            min_alpha_precise: MIN_ALPHA_PANELS,
            min_alpha_physics: MIN_ALPHA_PHYSICS,
            pinch_smoothing: PINCH_SMOOTHING,
            tilt_smoothing: TILT_SMOOTHING,
            miss_tolerance_frames: MISS_TOLERANCE_FRAMES,
        }
    }
}

impl StabilizerConfig {
    fn min_alpha(&self, profile: SmoothingProfile) -> f32 {
        match profile {
            SmoothingProfile::Precise => self.min_alpha_precise,
            SmoothingProfile::Physics => self.min_alpha_physics,
        }
    }

    /// Pull every field back into a usable range after an external edit.
    pub fn sanitize(&mut self) {
        self.max_alpha = self.max_alpha.clamp(0.01, 1.0);
        self.min_alpha_precise = self.min_alpha_precise.clamp(0.0, self.max_alpha);
        self.min_alpha_physics = self.min_alpha_physics.clamp(0.0, self.max_alpha);
        self.pinch_smoothing = self.pinch_smoothing.clamp(0.01, 1.0);
        self.tilt_smoothing = self.tilt_smoothing.clamp(0.01, 1.0);
        self.smoothing_distance_px = self.smoothing_distance_px.max(1.0);
    }

    /// Generate s-expression for IPC config.
    pub fn config_sexp(&self) -> String {
        format!(
            "(:safe-zone ({:.2} {:.2}) :extension-gain {:.2} :mirror {} :min-alpha-panels {:.3} :min-alpha-physics {:.3} :max-alpha {:.3} :miss-tolerance {})",
            self.safe_zone_min,
            self.safe_zone_max,
            self.extension_gain,
            if self.mirror_x { "t" } else { "nil" },
            self.min_alpha_precise,
            self.min_alpha_physics,
            self.max_alpha,
            self.miss_tolerance_frames,
        )
    }
}

/// The single pointer shared by every consumer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerState {
    /// Smoothed screen position (px).
    pub position: Vec2,
    pub previous_position: Vec2,
    pub timestamp_ms: f64,
    pub previous_timestamp_ms: f64,
    pub mode: GestureMode,
    /// Smoothed pinch distance (hand-scale units).
    pub pinch_value: f32,
    pub grip_strength: f32,
    /// Fraction of the release debounce satisfied (0..1).
    pub release_progress: f32,
    pub tilt: f32,
    pub roll: f32,
    pub visible: bool,
    pub missed_frame_count: u32,
}

impl Default for PointerState {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            previous_position: Vec2::ZERO,
            timestamp_ms: 0.0,
            previous_timestamp_ms: 0.0,
            mode: GestureMode::Open,
            pinch_value: 1.0,
            grip_strength: 0.0,
            release_progress: 0.0,
            tilt: 0.0,
            roll: 0.0,
            visible: false,
            missed_frame_count: 0,
        }
    }
}

impl PointerState {
    /// Displacement since the previous frame (px/frame).
    pub fn velocity(&self) -> Vec2 {
        self.position - self.previous_position
    }

    pub fn speed(&self) -> f32 {
        self.velocity().length()
    }

    pub fn is_pinching(&self) -> bool {
        matches!(self.mode, GestureMode::Pinch | GestureMode::Locked)
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:x {:.1} :y {:.1} :mode :{} :pinch {:.3} :grip {:.3} :release-progress {:.2} :tilt {:.3} :roll {:.3} :visible {} :missed {})",
            self.position.x,
            self.position.y,
            self.mode.as_str(),
            self.pinch_value,
            self.grip_strength,
            self.release_progress,
            self.tilt,
            self.roll,
            if self.visible { "t" } else { "nil" },
            self.missed_frame_count,
        )
    }
}

/// Result of feeding one frame to the stabilizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Fresh metrics were applied.
    Tracked,
    /// Hand absent, still within the miss tolerance; state is held.
    Coasting,
    /// Miss tolerance exceeded; the pointer is hidden.
    Lost,
}

/// Pointer stabilizer state.
#[derive(Debug, Clone)]
pub struct Stabilizer {
    pub config: StabilizerConfig,
    pointer: PointerState,
}

impl Stabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        Self {
            config,
            pointer: PointerState::default(),
        }
    }

    pub fn pointer(&self) -> &PointerState {
        &self.pointer
    }

    /// Copy the gesture machine's verdict into the shared pointer.
    pub fn set_gesture(&mut self, mode: GestureMode, release_progress: f32) {
        self.pointer.mode = mode;
        self.pointer.release_progress = release_progress;
    }

    /// Hide the pointer immediately (terminal camera state, surface reset).
    pub fn hide(&mut self) {
        self.pointer.visible = false;
        self.pointer.mode = GestureMode::Open;
        self.pointer.release_progress = 0.0;
        self.pointer.previous_position = self.pointer.position;
    }

    /// Apply one frame's metrics (or their absence).
    pub fn update(
        &mut self,
        metrics: Option<&HandMetrics>,
        viewport: Viewport,
        profile: SmoothingProfile,
        timestamp_ms: f64,
    ) -> Presence {
        let p = &mut self.pointer;
        p.previous_timestamp_ms = p.timestamp_ms;
        p.timestamp_ms = timestamp_ms;

        let Some(m) = metrics else {
            p.previous_position = p.position;
            p.missed_frame_count = p.missed_frame_count.saturating_add(1);
            if p.missed_frame_count > self.config.miss_tolerance_frames {
                if p.visible {
                    debug!(missed = p.missed_frame_count, "hand lost");
                }
                p.visible = false;
                return Presence::Lost;
            }
            return if p.visible {
                Presence::Coasting
            } else {
                Presence::Lost
            };
        };

        let target = map_to_screen(m, viewport, &self.config);
        let p = &mut self.pointer;
        p.missed_frame_count = 0;

        if !p.visible {
            // Fresh acquisition: snap instead of sweeping in from a stale spot.
            debug!(x = target.x, y = target.y, "hand acquired");
            p.position = target;
            p.previous_position = target;
            p.pinch_value = m.pinch_distance;
            p.tilt = m.tilt;
            p.visible = true;
        } else {
            let alpha = adaptive_alpha(
                target.distance(p.position),
                self.config.min_alpha(profile),
                self.config.max_alpha,
                self.config.smoothing_distance_px,
            );
            p.previous_position = p.position;
            p.position = p.position.lerp(target, alpha);
            p.pinch_value = lerp(p.pinch_value, m.pinch_distance, self.config.pinch_smoothing);
            p.tilt = lerp(p.tilt, m.tilt, self.config.tilt_smoothing);
        }
        p.grip_strength = m.grip_strength;
        p.roll = m.roll;
        Presence::Tracked
    }
}

/// `minAlpha + (maxAlpha - minAlpha) * min(d / D, 1)^2`
pub fn adaptive_alpha(distance: f32, min_alpha: f32, max_alpha: f32, full_at: f32) -> f32 {
    let t = if full_at > 0.0 {
        (distance / full_at).min(1.0)
    } else {
        1.0
    };
    min_alpha + (max_alpha - min_alpha) * t * t
}

/// Linearly stretch `[min, max]` onto `[0, 1]`, clamped.
pub fn safe_zone_remap(v: f32, min: f32, max: f32) -> f32 {
    let span = max - min;
    if span <= f32::EPSILON {
        return v.clamp(0.0, 1.0);
    }
    ((v - min) / span).clamp(0.0, 1.0)
}

/// Project the palm centroid into screen pixels.
fn map_to_screen(m: &HandMetrics, viewport: Viewport, config: &StabilizerConfig) -> Vec2 {
    let reach = m.palm_centroid + (m.palm_centroid - m.wrist) * config.extension_gain;
    let nx = safe_zone_remap(reach.x, config.safe_zone_min, config.safe_zone_max);
    let ny = safe_zone_remap(reach.y, config.safe_zone_min, config.safe_zone_max);
    let nx = if config.mirror_x { 1.0 - nx } else { nx };
    Vec2::new(nx * viewport.width, ny * viewport.height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics_at(x: f32, y: f32) -> HandMetrics {
        HandMetrics {
            scale: 0.1,
            pinch_distance: 0.8,
            grip_strength: 0.0,
            tilt: 0.0,
            roll: 0.0,
            palm_centroid: Vec2::new(x, y),
            // Wrist directly under the centroid: no extension along x.
            wrist: Vec2::new(x, y),
        }
    }

    fn viewport() -> Viewport {
        Viewport::new(1000.0, 500.0)
    }

    #[test]
    fn test_safe_zone_remap() {
        assert_eq!(safe_zone_remap(0.2, 0.2, 0.8), 0.0);
        assert_eq!(safe_zone_remap(0.8, 0.2, 0.8), 1.0);
        assert!((safe_zone_remap(0.5, 0.2, 0.8) - 0.5).abs() < 1e-6);
        assert_eq!(safe_zone_remap(0.05, 0.2, 0.8), 0.0);
        assert_eq!(safe_zone_remap(0.95, 0.2, 0.8), 1.0);
    }

    #[test]
    fn test_adaptive_alpha_curve() {
        assert_eq!(adaptive_alpha(0.0, 0.05, 0.75, 100.0), 0.05);
        assert!((adaptive_alpha(50.0, 0.05, 0.75, 100.0) - (0.05 + 0.7 * 0.25)).abs() < 1e-6);
        assert_eq!(adaptive_alpha(500.0, 0.05, 0.75, 100.0), 0.75);
    }

    #[test]
    fn test_first_frame_snaps_and_mirrors() {
        let mut s = Stabilizer::new(StabilizerConfig::default());
        let presence = s.update(Some(&metrics_at(0.35, 0.5)), viewport(), SmoothingProfile::Precise, 0.0);
        assert_eq!(presence, Presence::Tracked);
        let p = s.pointer();
        assert!(p.visible);
        // 0.35 → 0.25 in the safe zone, mirrored to 0.75.
        assert!((p.position.x - 750.0).abs() < 1e-3);
        assert!((p.position.y - 250.0).abs() < 1e-3);
        assert_eq!(p.velocity(), Vec2::ZERO);
    }

    #[test]
    fn test_extension_pushes_along_palm_direction() {
        let cfg = StabilizerConfig {
            mirror_x: false,
            ..StabilizerConfig::default()
        };
        let mut m = metrics_at(0.5, 0.5);
        m.wrist = Vec2::new(0.5, 0.6);
        let target = map_to_screen(&m, viewport(), &cfg);
        // Knuckles above the wrist: the pointer reaches further up.
        assert!(target.y < 250.0);
        assert!((target.x - 500.0).abs() < 1e-3);
    }

    #[test]
    fn test_small_jitter_heavily_damped() {
        let mut s = Stabilizer::new(StabilizerConfig {
            mirror_x: false,
            ..StabilizerConfig::default()
        });
        s.update(Some(&metrics_at(0.5, 0.5)), viewport(), SmoothingProfile::Precise, 0.0);
        let before = s.pointer().position;
        // 0.003 in image space → 5 px on screen.
        s.update(Some(&metrics_at(0.503, 0.5)), viewport(), SmoothingProfile::Precise, 16.0);
        let moved = s.pointer().position.distance(before);
        assert!(moved > 0.0);
        assert!(moved < 0.5, "jitter moved the pointer {moved}px");
    }

    #[test]
    fn test_large_move_nearly_undamped() {
        let mut s = Stabilizer::new(StabilizerConfig {
            mirror_x: false,
            ..StabilizerConfig::default()
        });
        s.update(Some(&metrics_at(0.3, 0.5)), viewport(), SmoothingProfile::Physics, 0.0);
        s.update(Some(&metrics_at(0.7, 0.5)), viewport(), SmoothingProfile::Physics, 16.0);
        let p = s.pointer();
        let jump = p.position.x - p.previous_position.x;
        // 666 px of target travel, alpha saturates at 0.75.
        assert!((jump - 0.75 * (1000.0 * (0.5 / 0.6) - 1000.0 * (0.1 / 0.6))).abs() < 0.5);
    }

    #[test]
    fn test_physics_profile_smooths_more_than_precise() {
        let run = |profile| {
            let mut s = Stabilizer::new(StabilizerConfig::default());
            s.update(Some(&metrics_at(0.5, 0.5)), viewport(), profile, 0.0);
            s.update(Some(&metrics_at(0.506, 0.5)), viewport(), profile, 16.0);
            s.pointer().speed()
        };
        assert!(run(SmoothingProfile::Physics) > run(SmoothingProfile::Precise));
    }

    #[test]
    fn test_miss_tolerance() {
        let mut s = Stabilizer::new(StabilizerConfig::default());
        s.update(Some(&metrics_at(0.5, 0.5)), viewport(), SmoothingProfile::Precise, 0.0);
        let held = s.pointer().position;
        for i in 1..=MISS_TOLERANCE_FRAMES {
            assert_eq!(s.update(None, viewport(), SmoothingProfile::Precise, i as f64), Presence::Coasting);
            assert!(s.pointer().visible);
            assert_eq!(s.pointer().position, held);
        }
        assert_eq!(s.update(None, viewport(), SmoothingProfile::Precise, 99.0), Presence::Lost);
        assert!(!s.pointer().visible);
    }

    #[test]
    fn test_dropout_resets_miss_counter() {
        let mut s = Stabilizer::new(StabilizerConfig::default());
        s.update(Some(&metrics_at(0.5, 0.5)), viewport(), SmoothingProfile::Precise, 0.0);
        for _ in 0..5 {
            s.update(None, viewport(), SmoothingProfile::Precise, 0.0);
        }
        s.update(Some(&metrics_at(0.5, 0.5)), viewport(), SmoothingProfile::Precise, 0.0);
        assert_eq!(s.pointer().missed_frame_count, 0);
        for _ in 0..5 {
            assert_eq!(s.update(None, viewport(), SmoothingProfile::Precise, 0.0), Presence::Coasting);
        }
    }

    #[test]
    fn test_never_seen_hand_is_lost() {
        let mut s = Stabilizer::new(StabilizerConfig::default());
        assert_eq!(s.update(None, viewport(), SmoothingProfile::Precise, 0.0), Presence::Lost);
    }

    #[test]
    fn test_pinch_value_smoothing() {
        let mut s = Stabilizer::new(StabilizerConfig::default());
        s.update(Some(&metrics_at(0.5, 0.5)), viewport(), SmoothingProfile::Precise, 0.0);
        let mut m = metrics_at(0.5, 0.5);
        m.pinch_distance = 0.0;
        s.update(Some(&m), viewport(), SmoothingProfile::Precise, 16.0);
        assert!((s.pointer().pinch_value - 0.8 * (1.0 - PINCH_SMOOTHING)).abs() < 1e-5);
    }

    #[test]
    fn test_status_sexp_parses() {
        let s = Stabilizer::new(StabilizerConfig::default());
        assert!(lexpr::from_str(&s.pointer().status_sexp()).is_ok());
        assert!(lexpr::from_str(&s.config.config_sexp()).is_ok());
    }
}
