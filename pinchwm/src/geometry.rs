//! 2D points and axis-aligned rectangles in screen pixels.

use std::ops::{Add, Mul, Sub};

/// A 2D vector / point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(&self, other: Vec2) -> f32 {
        (*self - other).length()
    }

    /// Scale down to `max_len` if longer; direction is preserved.
    pub fn clamp_length(self, max_len: f32) -> Vec2 {
        let len = self.length();
        if len > max_len && len > 0.0 {
            self * (max_len / len)
        } else {
            self
        }
    }

    /// Unit vector, or zero for a zero-length input.
    pub fn normalized(self) -> Vec2 {
        let len = self.length();
        if len > f32::EPSILON {
            self * (1.0 / len)
        } else {
            Vec2::ZERO
        }
    }

    pub fn lerp(self, target: Vec2, t: f32) -> Vec2 {
        Vec2::new(lerp(self.x, target.x, t), lerp(self.y, target.y, t))
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Axis-aligned rectangle; `(x, y)` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn top_right(&self) -> Vec2 {
        Vec2::new(self.right(), self.y)
    }

    /// Half-open containment: left/top edges inclusive, right/bottom exclusive.
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }
}

/// Linear interpolation.
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Replace NaN/inf with `fallback`, then clamp into `[min, max]`.
pub fn clamp_finite(v: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v.clamp(min, max)
    } else {
        fallback.clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_length_preserves_direction() {
        let v = Vec2::new(30.0, 40.0).clamp_length(10.0);
        assert!((v.length() - 10.0).abs() < 1e-4);
        assert!((v.x / v.y - 0.75).abs() < 1e-4);
    }

    #[test]
    fn test_clamp_length_short_vector_untouched() {
        let v = Vec2::new(1.0, 1.0);
        assert_eq!(v.clamp_length(10.0), v);
    }

    #[test]
    fn test_normalized_zero() {
        assert_eq!(Vec2::ZERO.normalized(), Vec2::ZERO);
    }

    #[test]
    fn test_rect_contains_edges() {
        let r = Rect::new(10.0, 10.0, 100.0, 50.0);
        assert!(r.contains(Vec2::new(10.0, 10.0)));
        assert!(!r.contains(Vec2::new(110.0, 30.0)));
        assert!(!r.contains(Vec2::new(50.0, 60.0)));
        assert_eq!(r.top_right(), Vec2::new(110.0, 10.0));
    }

    #[test]
    fn test_clamp_finite_nan() {
        assert_eq!(clamp_finite(f32::NAN, 0.0, 1.0, 0.5), 0.5);
        assert_eq!(clamp_finite(5.0, 0.0, 1.0, 0.5), 1.0);
    }
}
