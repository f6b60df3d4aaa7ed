//! Rigid bodies: shape kinds, their default coefficients, and clamping.

use std::cell::Cell;
use std::rc::Rc;

use crate::config::{MAX_BODY_RADIUS, MAX_RESTITUTION, MIN_BODY_MASS, MIN_BODY_RADIUS};
use crate::geometry::{clamp_finite, Vec2};

/// Body identifier, unique across every world sharing one `BodyIds`.
pub type BodyId = u64;

/// Id allocator.  Clones share the same counter, so worlds built from
/// clones of one allocator never hand out the same id.
#[derive(Debug, Clone)]
pub struct BodyIds {
    next: Rc<Cell<BodyId>>,
}

impl Default for BodyIds {
    fn default() -> Self {
        Self {
            next: Rc::new(Cell::new(1)),
        }
    }
}

impl BodyIds {
    pub fn allocate(&self) -> BodyId {
        let id = self.next.get();
        self.next.set(id + 1);
        id
    }
}

/// Enumerated body shapes: playground shapes and tool variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyKind {
    Orb,
    Cube,
    Pyramid,
    Katana,
    Bottle,
    Bucket,
    Ball,
}

impl BodyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orb => "orb",
            Self::Cube => "cube",
            Self::Pyramid => "pyramid",
            Self::Katana => "katana",
            Self::Bottle => "bottle",
            Self::Bucket => "bucket",
            Self::Ball => "ball",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "orb" => Some(Self::Orb),
            "cube" => Some(Self::Cube),
            "pyramid" => Some(Self::Pyramid),
            "katana" => Some(Self::Katana),
            "bottle" => Some(Self::Bottle),
            "bucket" => Some(Self::Bucket),
            "ball" => Some(Self::Ball),
            _ => None,
        }
    }

    /// Tools live in the gravity world and rotate.
    pub fn is_tool(&self) -> bool {
        matches!(self, Self::Katana | Self::Bottle | Self::Bucket | Self::Ball)
    }

    /// Default coefficients for this kind.
    pub fn spec(&self) -> BodySpec {
        match self {
            Self::Orb => BodySpec::new(50.0, 1.0, 0.97, 0.85, 1.0),
            Self::Cube => BodySpec::new(55.0, 1.5, 0.95, 0.6, 1.0),
            Self::Pyramid => BodySpec::new(50.0, 0.8, 0.98, 0.9, 1.0),
            Self::Katana => BodySpec::tool(2.5),
            Self::Bottle | Self::Bucket | Self::Ball => BodySpec::tool(2.0),
        }
    }
}

/// Physical coefficients for a body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodySpec {
    pub radius: f32,
    pub mass: f32,
    /// Per-frame velocity multiplier (1.0 = no friction).
    pub friction: f32,
    pub restitution: f32,
    /// Visual scale for tool sprites.
    pub scale: f32,
}

impl BodySpec {
    const fn new(radius: f32, mass: f32, friction: f32, restitution: f32, scale: f32) -> Self {
        Self {
            radius,
            mass,
            friction,
            restitution,
            scale,
        }
    }

    /// Tools: collision radius follows sprite scale; floor and air
    /// resistance do the slowing down.
    fn tool(scale: f32) -> Self {
        Self::new(15.0 * scale, 1.0, 1.0, 0.45, scale)
    }

    /// Clamp every coefficient into its valid range.
    pub fn clamped(self) -> Self {
        Self {
            radius: clamp_finite(self.radius, MIN_BODY_RADIUS, MAX_BODY_RADIUS, MIN_BODY_RADIUS),
            mass: clamp_finite(self.mass, MIN_BODY_MASS, f32::MAX, 1.0),
            friction: clamp_finite(self.friction, 0.0, 1.0, 1.0),
            restitution: clamp_finite(self.restitution, 0.0, MAX_RESTITUTION, 0.5),
            scale: clamp_finite(self.scale, 0.1, 10.0, 1.0),
        }
    }
}

/// A simulated body.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsBody {
    pub id: BodyId,
    pub kind: BodyKind,
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    pub mass: f32,
    pub friction: f32,
    pub restitution: f32,
    pub scale: f32,
    pub angle: f32,
    pub angular_velocity: f32,
    pub grabbed: bool,
    pub hovered: bool,
}

impl PhysicsBody {
    pub fn new(id: BodyId, kind: BodyKind, position: Vec2) -> Self {
        Self::with_spec(id, kind, position, kind.spec())
    }

    /// Build a body with explicit coefficients (clamped, never rejected).
    pub fn with_spec(id: BodyId, kind: BodyKind, position: Vec2, spec: BodySpec) -> Self {
        let spec = spec.clamped();
        Self {
            id,
            kind,
            position: if position.is_finite() { position } else { Vec2::ZERO },
            velocity: Vec2::ZERO,
            radius: spec.radius,
            mass: spec.mass,
            friction: spec.friction,
            restitution: spec.restitution,
            scale: spec.scale,
            angle: 0.0,
            angular_velocity: 0.0,
            grabbed: false,
            hovered: false,
        }
    }

    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    /// Generate s-expression for IPC.
    pub fn to_sexp(&self) -> String {
        format!(
            "(:id {} :kind :{} :x {:.1} :y {:.1} :vx {:.2} :vy {:.2} :radius {:.1} :angle {:.3} :grabbed {} :hovered {})",
            self.id,
            self.kind.as_str(),
            self.position.x,
            self.position.y,
            self.velocity.x,
            self.velocity.y,
            self.radius,
            self.angle,
            if self.grabbed { "t" } else { "nil" },
            if self.hovered { "t" } else { "nil" },
        )
    }
}
