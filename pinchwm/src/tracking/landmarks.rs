//! Hand landmark frames and scale-invariant hand metrics.
//!
//! Models the 21 points per hand produced by the upstream landmark
//! detector (x, y in normalized image space, z relative depth) and
//! derives the measurements the rest of the pipeline keys off:
//! pinch distance, grip strength, tilt, roll and palm centroid.

use tracing::debug;

use crate::config::{GRIP_CLOSED_REFERENCE, GRIP_OPEN_REFERENCE, MIN_HAND_SCALE};
use crate::geometry::Vec2;

// ── Landmark definitions ───────────────────────────────────

/// The 21 hand landmarks, in detector output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandLandmark {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexMcp,
    IndexPip,
    IndexDip,
    IndexTip,
    MiddleMcp,
    MiddlePip,
    MiddleDip,
    MiddleTip,
    RingMcp,
    RingPip,
    RingDip,
    RingTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Total number of landmarks per hand.
pub const LANDMARK_COUNT: usize = 21;

impl HandLandmark {
    /// Convert landmark enum to array index (0-20).
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// String representation for IPC.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wrist => "wrist",
            Self::ThumbCmc => "thumb-cmc",
            Self::ThumbMcp => "thumb-mcp",
            Self::ThumbIp => "thumb-ip",
            Self::ThumbTip => "thumb-tip",
            Self::IndexMcp => "index-mcp",
            Self::IndexPip => "index-pip",
            Self::IndexDip => "index-dip",
            Self::IndexTip => "index-tip",
            Self::MiddleMcp => "middle-mcp",
            Self::MiddlePip => "middle-pip",
            Self::MiddleDip => "middle-dip",
            Self::MiddleTip => "middle-tip",
            Self::RingMcp => "ring-mcp",
            Self::RingPip => "ring-pip",
            Self::RingDip => "ring-dip",
            Self::RingTip => "ring-tip",
            Self::PinkyMcp => "pinky-mcp",
            Self::PinkyPip => "pinky-pip",
            Self::PinkyDip => "pinky-dip",
            Self::PinkyTip => "pinky-tip",
        }
    }

    /// Fingertips that curl toward the wrist in a fist (thumb excluded).
    pub fn curling_tips() -> [HandLandmark; 4] {
        [Self::IndexTip, Self::MiddleTip, Self::RingTip, Self::PinkyTip]
    }

    /// Knuckles whose distance to the wrist defines the hand scale.
    pub fn scale_knuckles() -> [HandLandmark; 3] {
        [Self::IndexMcp, Self::MiddleMcp, Self::PinkyMcp]
    }
}

// ── Frames ─────────────────────────────────────────────────

/// A single tracked point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl LandmarkPoint {
    pub fn xy(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// One detector output for a present hand.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkFrame {
    points: [LandmarkPoint; LANDMARK_COUNT],
}

impl LandmarkFrame {
    /// Build a frame from raw `[x, y, z]` triples.
    ///
    /// Returns None unless there are exactly 21 finite points; the caller
    /// treats that the same as "no hand".
    pub fn from_points(raw: &[[f32; 3]]) -> Option<Self> {
        if raw.len() != LANDMARK_COUNT {
            debug!(
                "landmark frame: expected {} points, got {}",
                LANDMARK_COUNT,
                raw.len()
            );
            return None;
        }
        if raw.iter().flatten().any(|v| !v.is_finite()) {
            debug!("landmark frame: non-finite coordinate, dropping frame");
            return None;
        }
        let mut points = [LandmarkPoint::default(); LANDMARK_COUNT];
        for (dst, src) in points.iter_mut().zip(raw) {
            *dst = LandmarkPoint {
                x: src[0],
                y: src[1],
                z: src[2],
            };
        }
        Some(Self { points })
    }

    pub fn point(&self, landmark: HandLandmark) -> LandmarkPoint {
        self.points[landmark.index()]
    }

    /// Image-plane position of a landmark.
    pub fn xy(&self, landmark: HandLandmark) -> Vec2 {
        self.point(landmark).xy()
    }

    pub fn points(&self) -> &[LandmarkPoint; LANDMARK_COUNT] {
        &self.points
    }
}

// ── Metrics ────────────────────────────────────────────────

/// Which fingers may close a pinch against the thumb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinchFingers {
    /// Thumb to index fingertip only.
    Index,
    /// The closer of thumb-to-index and thumb-to-middle.
    IndexOrMiddle,
}

/// Normalizer configuration.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub pinch_fingers: PinchFingers,
    /// Open-hand fingertip-to-wrist distance, in hand-scale units.
    pub grip_open_reference: f32,
    /// Fist fingertip-to-wrist distance, in hand-scale units.
    pub grip_closed_reference: f32,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            pinch_fingers: PinchFingers::Index,
            grip_open_reference: GRIP_OPEN_REFERENCE,
            grip_closed_reference: GRIP_CLOSED_REFERENCE,
        }
    }
}

/// Hand-scale-invariant measurements for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandMetrics {
    pub scale: f32,
    pub pinch_distance: f32,
    /// 0 = open hand, 1 = closed fist.
    pub grip_strength: f32,
    /// Middle fingertip height relative to the wrist; positive when the
    /// fingertip is below the wrist in image space.
    pub tilt: f32,
    /// Angle (radians) of the index-knuckle → pinky-knuckle vector.
    pub roll: f32,
    pub palm_centroid: Vec2,
    pub wrist: Vec2,
}

/// Derive hand metrics from a landmark frame.
pub fn normalize(frame: &LandmarkFrame, config: &NormalizerConfig) -> HandMetrics {
    let wrist = frame.xy(HandLandmark::Wrist);

    let scale = HandLandmark::scale_knuckles()
        .iter()
        .map(|k| frame.xy(*k).distance(wrist))
        .fold(0.0_f32, f32::max)
        .max(MIN_HAND_SCALE);

    let thumb = frame.xy(HandLandmark::ThumbTip);
    let to_index = thumb.distance(frame.xy(HandLandmark::IndexTip));
    let raw_pinch = match config.pinch_fingers {
        PinchFingers::Index => to_index,
        PinchFingers::IndexOrMiddle => to_index.min(thumb.distance(frame.xy(HandLandmark::MiddleTip))),
    };

    let tips = HandLandmark::curling_tips();
    let avg_tip = tips
        .iter()
        .map(|t| frame.xy(*t).distance(wrist))
        .sum::<f32>()
        / tips.len() as f32;
    let grip_strength = grip_from_distance(avg_tip / scale, config);

    let tilt = (frame.xy(HandLandmark::MiddleTip).y - wrist.y) / scale;

    let index_knuckle = frame.xy(HandLandmark::IndexMcp);
    let pinky_knuckle = frame.xy(HandLandmark::PinkyMcp);
    let across = pinky_knuckle - index_knuckle;
    let roll = across.y.atan2(across.x);

    let middle_knuckle = frame.xy(HandLandmark::MiddleMcp);
    let palm_centroid = Vec2::new(
        (index_knuckle.x + middle_knuckle.x + pinky_knuckle.x) / 3.0,
        (index_knuckle.y + middle_knuckle.y + pinky_knuckle.y) / 3.0,
    );

    HandMetrics {
        scale,
        pinch_distance: raw_pinch / scale,
        grip_strength,
        tilt,
        roll,
        palm_centroid,
        wrist,
    }
}

/// Map a scale-relative fingertip distance onto 0 (open) .. 1 (closed).
fn grip_from_distance(distance: f32, config: &NormalizerConfig) -> f32 {
    let span = config.grip_open_reference - config.grip_closed_reference;
    if span.abs() < f32::EPSILON {
        return if distance <= config.grip_closed_reference { 1.0 } else { 0.0 };
    }
    ((config.grip_open_reference - distance) / span).clamp(0.0, 1.0)
}

// ── Test helpers ───────────────────────────────────────────

/// A right hand held upright in the middle of the frame.
///
/// Knuckles sit 0.1 above the wrist (scale 0.1), fingertips are spread
/// and the thumb tip is far from the index tip.
#[cfg(test)]
pub(crate) fn open_hand() -> Vec<[f32; 3]> {
    let mut pts = vec![[0.5, 0.6, 0.0]; LANDMARK_COUNT];
    let mut set = |l: HandLandmark, x: f32, y: f32| pts[l.index()] = [x, y, 0.0];
    set(HandLandmark::Wrist, 0.5, 0.6);
    set(HandLandmark::IndexMcp, 0.46, 0.5);
    set(HandLandmark::MiddleMcp, 0.5, 0.5);
    set(HandLandmark::RingMcp, 0.53, 0.505);
    set(HandLandmark::PinkyMcp, 0.56, 0.51);
    set(HandLandmark::ThumbTip, 0.38, 0.52);
    set(HandLandmark::IndexTip, 0.45, 0.42);
    set(HandLandmark::MiddleTip, 0.5, 0.41);
    set(HandLandmark::RingTip, 0.54, 0.42);
    set(HandLandmark::PinkyTip, 0.58, 0.44);
    pts
}

/// `open_hand` with the thumb tip moved onto the index tip.
#[cfg(test)]
pub(crate) fn pinched_hand() -> Vec<[f32; 3]> {
    let mut pts = open_hand();
    pts[HandLandmark::ThumbTip.index()] = [0.452, 0.421, 0.0];
    pts
}

#[cfg(test)]
pub(crate) fn make_frame(points: &[[f32; 3]]) -> LandmarkFrame {
    LandmarkFrame::from_points(points).unwrap()
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_count() {
        assert_eq!(HandLandmark::PinkyTip.index(), LANDMARK_COUNT - 1);
        assert_eq!(HandLandmark::IndexTip.index(), 8);
        assert_eq!(HandLandmark::MiddleMcp.as_str(), "middle-mcp");
    }

    #[test]
    fn test_wrong_point_count_rejected() {
        assert!(LandmarkFrame::from_points(&[[0.0; 3]; 20]).is_none());
        assert!(LandmarkFrame::from_points(&[[0.0; 3]; 22]).is_none());
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut pts = open_hand();
        pts[3][1] = f32::NAN;
        assert!(LandmarkFrame::from_points(&pts).is_none());
    }

    #[test]
    fn test_scale_is_max_knuckle_distance() {
        let m = normalize(&make_frame(&open_hand()), &NormalizerConfig::default());
        // Middle knuckle is exactly 0.1 above the wrist; the others are farther.
        let expected = Vec2::new(0.56, 0.51).distance(Vec2::new(0.5, 0.6));
        assert!((m.scale - expected).abs() < 1e-5);
        assert!(m.scale >= 0.1);
    }

    #[test]
    fn test_scale_survives_one_collapsed_knuckle() {
        let mut pts = open_hand();
        // Occluded index knuckle reported on top of the wrist.
        pts[HandLandmark::IndexMcp.index()] = pts[HandLandmark::Wrist.index()];
        let m = normalize(&make_frame(&pts), &NormalizerConfig::default());
        assert!(m.scale >= 0.1);
    }

    #[test]
    fn test_pinch_distance_is_scale_invariant() {
        let cfg = NormalizerConfig::default();
        let small = normalize(&make_frame(&open_hand()), &cfg);
        let doubled: Vec<[f32; 3]> = open_hand()
            .iter()
            .map(|p| [0.5 + (p[0] - 0.5) * 2.0, 0.6 + (p[1] - 0.6) * 2.0, 0.0])
            .collect();
        let big = normalize(&make_frame(&doubled), &cfg);
        assert!((small.pinch_distance - big.pinch_distance).abs() < 1e-4);
        assert!((small.tilt - big.tilt).abs() < 1e-4);
    }

    #[test]
    fn test_pinched_hand_reads_small() {
        let cfg = NormalizerConfig::default();
        let open = normalize(&make_frame(&open_hand()), &cfg);
        let pinched = normalize(&make_frame(&pinched_hand()), &cfg);
        assert!(open.pinch_distance > 0.6);
        assert!(pinched.pinch_distance < 0.05);
    }

    #[test]
    fn test_index_or_middle_pinch() {
        let mut pts = open_hand();
        pts[HandLandmark::ThumbTip.index()] = [0.5, 0.411, 0.0];
        let index_only = normalize(&make_frame(&pts), &NormalizerConfig::default());
        let either = normalize(
            &make_frame(&pts),
            &NormalizerConfig {
                pinch_fingers: PinchFingers::IndexOrMiddle,
                ..NormalizerConfig::default()
            },
        );
        assert!(either.pinch_distance < 0.05);
        assert!(index_only.pinch_distance > either.pinch_distance);
    }

    #[test]
    fn test_grip_strength_bounds() {
        let cfg = NormalizerConfig::default();
        assert_eq!(grip_from_distance(5.0, &cfg), 0.0);
        assert_eq!(grip_from_distance(0.0, &cfg), 1.0);
        let mid = (GRIP_OPEN_REFERENCE + GRIP_CLOSED_REFERENCE) / 2.0;
        assert!((grip_from_distance(mid, &cfg) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_fist_grip_strength() {
        let mut pts = open_hand();
        // Curl every fingertip onto the wrist.
        for tip in HandLandmark::curling_tips() {
            pts[tip.index()] = [0.5, 0.59, 0.0];
        }
        let m = normalize(&make_frame(&pts), &NormalizerConfig::default());
        assert!(m.grip_strength > 0.9);
    }

    #[test]
    fn test_tilt_sign_and_roll() {
        let m = normalize(&make_frame(&open_hand()), &NormalizerConfig::default());
        // Fingers point up (smaller y), so tilt is negative.
        assert!(m.tilt < 0.0);
        // Pinky knuckle is to the right of the index knuckle: roll near zero.
        assert!(m.roll.abs() < 0.3);
    }

    #[test]
    fn test_palm_centroid() {
        let m = normalize(&make_frame(&open_hand()), &NormalizerConfig::default());
        assert!((m.palm_centroid.x - (0.46 + 0.5 + 0.56) / 3.0).abs() < 1e-5);
        assert!((m.palm_centroid.y - (0.5 + 0.5 + 0.51) / 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_degenerate_frame_does_not_divide_by_zero() {
        let pts = vec![[0.5, 0.5, 0.0]; LANDMARK_COUNT];
        let m = normalize(&make_frame(&pts), &NormalizerConfig::default());
        assert!(m.pinch_distance.is_finite());
        assert!(m.tilt.is_finite());
    }
}
