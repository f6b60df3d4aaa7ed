//! Tuned constants and the aggregate engine configuration.
//!
//! Every threshold the gesture pipeline, physics worlds and panel manager
//! depend on is named here.  Module config structs take their `Default`
//! from these values; `EngineConfig` bundles them with the viewport size
//! so the CLI and IPC layers have a single place to apply overrides.

use crate::panels::PanelConfig;
use crate::physics::WorldConfig;
use crate::tracking::gesture::HysteresisConfig;
use crate::tracking::landmarks::NormalizerConfig;
use crate::tracking::stabilizer::StabilizerConfig;

// ── Normalizer ─────────────────────────────────────────────

/// Average fingertip-to-wrist distance (in hand-scale units) of an open hand.
pub const GRIP_OPEN_REFERENCE: f32 = 0.55;
/// Average fingertip-to-wrist distance (in hand-scale units) of a fist.
pub const GRIP_CLOSED_REFERENCE: f32 = 0.20;
/// Floor for the hand scale so degenerate frames never divide by zero.
pub const MIN_HAND_SCALE: f32 = 1e-4;

// ── Stabilizer ─────────────────────────────────────────────

pub const SAFE_ZONE_MIN: f32 = 0.2;
pub const SAFE_ZONE_MAX: f32 = 0.8;
/// Wrist→knuckle extension gain, applied in image space before the remap.
pub const EXTENSION_GAIN: f32 = 0.9;
/// Movement (px) at which adaptive smoothing reaches `MAX_ALPHA`.
pub const SMOOTHING_DISTANCE_PX: f32 = 100.0;
pub const MAX_ALPHA: f32 = 0.75;
pub const MIN_ALPHA_PANELS: f32 = 0.05;
pub const MIN_ALPHA_PHYSICS: f32 = 0.12;
pub const PINCH_SMOOTHING: f32 = 0.3;
pub const TILT_SMOOTHING: f32 = 0.15;
pub const MISS_TOLERANCE_FRAMES: u32 = 8;

// ── Gesture state machine ──────────────────────────────────

pub const PINCH_GRAB_THRESHOLD: f32 = 0.18;
pub const PINCH_RELEASE_THRESHOLD: f32 = 0.30;
pub const PINCH_PANIC_THRESHOLD: f32 = 0.80;
/// Pinch values below this (but above the grab threshold) read as POINT.
pub const PINCH_POINT_THRESHOLD: f32 = 0.60;
pub const PINCH_DEBOUNCE_FRAMES: u32 = 5;

pub const GRIP_GRAB_THRESHOLD: f32 = 0.40;
pub const GRIP_RELEASE_THRESHOLD: f32 = 0.35;
pub const GRIP_PANIC_THRESHOLD: f32 = 0.10;
pub const GRIP_POINT_THRESHOLD: f32 = 0.20;
pub const GRIP_DEBOUNCE_FRAMES: u32 = 3;

// ── Physics ────────────────────────────────────────────────

pub const SHAPES_GRAB_MARGIN: f32 = 60.0;
pub const SHAPES_CONVERGENCE: f32 = 0.92;
pub const SHAPES_THROW_SCALE: f32 = 0.9;
pub const SHAPES_MAX_THROW_SPEED: f32 = 40.0;
pub const SHAPES_SETTLE_SPEED: f32 = 0.5;

pub const TOOLS_GRAVITY: f32 = 0.55;
pub const TOOLS_AIR_RESISTANCE: f32 = 0.99;
pub const TOOLS_FLOOR_INSET: f32 = 50.0;
pub const TOOLS_FLOOR_RESTITUTION: f32 = 0.45;
pub const TOOLS_FLOOR_FRICTION: f32 = 0.92;
pub const TOOLS_WALL_RESTITUTION: f32 = 0.6;
pub const TOOLS_SETTLE_SPEED: f32 = 1.5;
pub const TOOLS_ANGULAR_DRAG: f32 = 0.98;
pub const TOOLS_FLOOR_ANGULAR_DAMPING: f32 = 0.8;
pub const TOOLS_GRAB_RADIUS: f32 = 160.0;
pub const TOOLS_CONVERGENCE: f32 = 0.9;
pub const TOOLS_THROW_SCALE: f32 = 1.0;
pub const TOOLS_MAX_THROW_SPEED: f32 = 25.0;
pub const TOOLS_PUSH_RADIUS: f32 = 80.0;
pub const TOOLS_PUSH_IMPULSE: f32 = 3.0;
pub const TOOLS_ANGLE_SMOOTHING: f32 = 0.2;
pub const TOOLS_SPAWN_Y: f32 = 100.0;

pub const MIN_BODY_RADIUS: f32 = 4.0;
pub const MAX_BODY_RADIUS: f32 = 400.0;
pub const MIN_BODY_MASS: f32 = 0.01;
pub const MAX_RESTITUTION: f32 = 0.99;

// ── Panels ─────────────────────────────────────────────────

pub const HEADER_HEIGHT: f32 = 48.0;
pub const RESIZE_HANDLE_RADIUS: f32 = 60.0;
pub const DRAG_DEADZONE_PX: f32 = 40.0;
pub const MIN_PANEL_WIDTH: f32 = 300.0;
pub const MIN_PANEL_HEIGHT: f32 = 200.0;
pub const CLICK_MAX_DURATION_MS: f64 = 800.0;
pub const CLICK_MAX_TRAVEL_PX: f32 = 80.0;
pub const DOUBLE_CLICK_WINDOW_MS: f64 = 500.0;
pub const CONTROL_BUTTON_WIDTH: f32 = 40.0;
pub const NEW_PANEL_WIDTH: f32 = 800.0;
pub const NEW_PANEL_HEIGHT: f32 = 500.0;
pub const NEW_PANEL_CASCADE_PX: f32 = 40.0;
pub const NEW_PANEL_ORIGIN_FRACTION: f32 = 0.15;
pub const TILT_SCROLL_THRESHOLD: f32 = 0.6;
pub const TILT_SCROLL_SPEED: f32 = 30.0;
pub const INTENT_SCROLL_STEP_PX: f32 = 400.0;
pub const HOME_URL: &str = "https://www.bing.com";
pub const SEARCH_URL_PREFIX: &str = "https://www.bing.com/search?q=";

// ── Frame driver ───────────────────────────────────────────

pub const DEFAULT_VIEWPORT_WIDTH: f32 = 1920.0;
pub const DEFAULT_VIEWPORT_HEIGHT: f32 = 1080.0;
pub const DEFAULT_FPS: u32 = 60;

/// Screen size the pointer is mapped into and bodies collide against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: DEFAULT_VIEWPORT_WIDTH,
            height: DEFAULT_VIEWPORT_HEIGHT,
        }
    }
}

impl Viewport {
    /// Build a viewport, clamping each side to at least one pixel.
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width: sanitize_extent(width),
            height: sanitize_extent(height),
        }
    }

    /// Parse a "WxH" resolution string. Returns None on malformed input.
    pub fn parse(s: &str) -> Option<Self> {
        let (w, h) = s.split_once('x')?;
        let w = w.trim().parse::<f32>().ok()?;
        let h = h.trim().parse::<f32>().ok()?;
        if w > 0.0 && h > 0.0 {
            Some(Self::new(w, h))
        } else {
            None
        }
    }
}

fn sanitize_extent(v: f32) -> f32 {
    if v.is_finite() {
        v.max(1.0)
    } else {
        1.0
    }
}

/// Aggregate configuration for one engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub viewport: Viewport,
    pub normalizer: NormalizerConfig,
    pub stabilizer: StabilizerConfig,
    pub pinch: HysteresisConfig,
    pub grip: HysteresisConfig,
    pub shapes: WorldConfig,
    pub tools: WorldConfig,
    pub panels: PanelConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            normalizer: NormalizerConfig::default(),
            stabilizer: StabilizerConfig::default(),
            pinch: HysteresisConfig::pinch(),
            grip: HysteresisConfig::grip(),
            shapes: WorldConfig::shapes(),
            tools: WorldConfig::tools(),
            panels: PanelConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Default configuration for a specific viewport.
    pub fn with_viewport(viewport: Viewport) -> Self {
        Self {
            viewport,
            ..Self::default()
        }
    }

    /// Generate s-expression for IPC config queries.
    pub fn config_sexp(&self) -> String {
        format!(
            "(:viewport (:width {:.0} :height {:.0}) :pinch {} :grip {} :stabilizer {})",
            self.viewport.width,
            self.viewport.height,
            self.pinch.config_sexp(),
            self.grip.config_sexp(),
            self.stabilizer.config_sexp(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_threshold_above_grab() {
        assert!(PINCH_RELEASE_THRESHOLD > PINCH_GRAB_THRESHOLD);
        assert!(PINCH_PANIC_THRESHOLD > PINCH_RELEASE_THRESHOLD);
        // Grip engages high, so its band runs the other way.
        assert!(GRIP_RELEASE_THRESHOLD < GRIP_GRAB_THRESHOLD);
        assert!(GRIP_PANIC_THRESHOLD < GRIP_RELEASE_THRESHOLD);
    }

    #[test]
    fn test_parse_viewport() {
        assert_eq!(Viewport::parse("1280x720"), Some(Viewport::new(1280.0, 720.0)));
        assert_eq!(Viewport::parse("1280"), None);
        assert_eq!(Viewport::parse("0x720"), None);
        assert_eq!(Viewport::parse("axb"), None);
    }

    #[test]
    fn test_viewport_clamps_degenerate_sizes() {
        let v = Viewport::new(-5.0, f32::NAN);
        assert_eq!(v.width, 1.0);
        assert_eq!(v.height, 1.0);
    }

    #[test]
    fn test_config_sexp_parses() {
        let cfg = EngineConfig::default();
        let sexp = cfg.config_sexp();
        assert!(sexp.contains(":width 1920"));
        assert!(lexpr::from_str(&sexp).is_ok());
    }
}
