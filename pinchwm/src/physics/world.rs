//! Physics world: integration, wall/floor collision, and pointer-driven
//! grab / throw.

use tracing::{debug, info};

use crate::config::{
    Viewport, SHAPES_CONVERGENCE, SHAPES_GRAB_MARGIN, SHAPES_MAX_THROW_SPEED,
    SHAPES_SETTLE_SPEED, SHAPES_THROW_SCALE, TOOLS_AIR_RESISTANCE, TOOLS_ANGLE_SMOOTHING,
    TOOLS_ANGULAR_DRAG, TOOLS_CONVERGENCE, TOOLS_FLOOR_ANGULAR_DAMPING, TOOLS_FLOOR_FRICTION,
    TOOLS_FLOOR_INSET, TOOLS_FLOOR_RESTITUTION, TOOLS_GRAB_RADIUS, TOOLS_GRAVITY,
    TOOLS_MAX_THROW_SPEED, TOOLS_PUSH_IMPULSE, TOOLS_PUSH_RADIUS, TOOLS_SETTLE_SPEED,
    TOOLS_SPAWN_Y, TOOLS_THROW_SCALE, TOOLS_WALL_RESTITUTION,
};
use crate::geometry::{lerp, Vec2};

use super::body::{BodyId, BodyIds, BodyKind, PhysicsBody};

/// Velocity components below this snap to zero while coasting.
const REST_EPSILON: f32 = 0.01;

/// How close the pointer must be for a grab.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GrabReach {
    /// `radius + margin` from the body center.
    Margin(f32),
    /// Fixed distance from the body center, whatever its size.
    Radius(f32),
}

/// Floor line above the viewport bottom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloorConfig {
    /// Distance of the floor above the viewport bottom edge.
    pub inset: f32,
    pub restitution: f32,
    /// Horizontal velocity multiplier on floor contact.
    pub friction: f32,
    /// Angular velocity multiplier on floor contact.
    pub angular_damping: f32,
}

/// Repulsion from a nearby, non-grabbing hand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PushConfig {
    pub radius: f32,
    pub impulse: f32,
}

/// World configuration.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Downward acceleration (px/frame²).
    pub gravity: f32,
    /// Per-frame velocity multiplier.
    pub air_resistance: f32,
    /// Post-bounce speeds below this are zeroed.
    pub settle_speed: f32,
    /// Overrides body restitution on the side walls (and ceiling).
    pub wall_restitution: Option<f32>,
    pub floor: Option<FloorConfig>,
    pub angular_drag: f32,
    pub grab_reach: GrabReach,
    /// Per-frame blend of a grabbed body toward the pointer.
    pub convergence: f32,
    pub throw_scale: f32,
    pub max_throw_speed: f32,
    /// Angular velocity per px/frame of horizontal throw.
    pub throw_spin: f32,
    pub push: Option<PushConfig>,
    /// Grabbed bodies turn toward palm roll + π/2 with this smoothing.
    pub follow_roll: Option<f32>,
}

impl WorldConfig {
    /// Zero-gravity playground for shapes.
    pub fn shapes() -> Self {
        Self {
            gravity: 0.0,
            air_resistance: 1.0,
            settle_speed: SHAPES_SETTLE_SPEED,
            wall_restitution: None,
            floor: None,
            angular_drag: 1.0,
            grab_reach: GrabReach::Margin(SHAPES_GRAB_MARGIN),
            convergence: SHAPES_CONVERGENCE,
            throw_scale: SHAPES_THROW_SCALE,
            max_throw_speed: SHAPES_MAX_THROW_SPEED,
            throw_spin: 0.0,
            push: None,
            follow_roll: None,
        }
    }

    /// Gravity playground for tools.
    pub fn tools() -> Self {
        Self {
            gravity: TOOLS_GRAVITY,
            air_resistance: TOOLS_AIR_RESISTANCE,
            settle_speed: TOOLS_SETTLE_SPEED,
            wall_restitution: Some(TOOLS_WALL_RESTITUTION),
            floor: Some(FloorConfig {
                inset: TOOLS_FLOOR_INSET,
                restitution: TOOLS_FLOOR_RESTITUTION,
                friction: TOOLS_FLOOR_FRICTION,
                angular_damping: TOOLS_FLOOR_ANGULAR_DAMPING,
            }),
            angular_drag: TOOLS_ANGULAR_DRAG,
            grab_reach: GrabReach::Radius(TOOLS_GRAB_RADIUS),
            convergence: TOOLS_CONVERGENCE,
            throw_scale: TOOLS_THROW_SCALE,
            max_throw_speed: TOOLS_MAX_THROW_SPEED,
            throw_spin: 0.02,
            push: Some(PushConfig {
                radius: TOOLS_PUSH_RADIUS,
                impulse: TOOLS_PUSH_IMPULSE,
            }),
            follow_roll: Some(TOOLS_ANGLE_SMOOTHING),
        }
    }
}

/// A set of bodies sharing one configuration and one boundary.
#[derive(Debug, Clone)]
pub struct PhysicsWorld {
    pub config: WorldConfig,
    bounds: Viewport,
    bodies: Vec<PhysicsBody>,
    grabbed: Option<BodyId>,
    ids: BodyIds,
}

impl PhysicsWorld {
    pub fn new(config: WorldConfig, bounds: Viewport) -> Self {
        Self::with_ids(config, bounds, BodyIds::default())
    }

    /// A world drawing body ids from a shared allocator.
    pub fn with_ids(config: WorldConfig, bounds: Viewport, ids: BodyIds) -> Self {
        Self {
            config,
            bounds,
            bodies: Vec::new(),
            grabbed: None,
            ids,
        }
    }

    /// Orb, cube and pyramid side by side at mid height.
    pub fn populate_default_shapes(&mut self) {
        let w = self.bounds.width;
        let y = self.bounds.height / 2.0;
        self.spawn(BodyKind::Orb, Vec2::new(w * 0.3, y));
        self.spawn(BodyKind::Cube, Vec2::new(w * 0.5, y));
        self.spawn(BodyKind::Pyramid, Vec2::new(w * 0.7, y));
    }

    /// Where a new tool drops in.
    pub fn tool_spawn_point(&self) -> Vec2 {
        Vec2::new(self.bounds.width / 2.0, TOOLS_SPAWN_Y)
    }

    pub fn bodies(&self) -> &[PhysicsBody] {
        &self.bodies
    }

    pub fn body(&self, id: BodyId) -> Option<&PhysicsBody> {
        self.bodies.iter().find(|b| b.id == id)
    }

    pub fn grabbed(&self) -> Option<BodyId> {
        self.grabbed
    }

    pub fn bounds(&self) -> Viewport {
        self.bounds
    }

    /// Add a body of the given kind, clamped inside the boundary.
    pub fn spawn(&mut self, kind: BodyKind, position: Vec2) -> BodyId {
        self.spawn_body(PhysicsBody::new(0, kind, position))
    }

    /// Add a pre-built body; its id is reassigned.
    pub fn spawn_body(&mut self, mut body: PhysicsBody) -> BodyId {
        let id = self.ids.allocate();
        body.id = id;
        body.grabbed = false;
        body.position = self.clamp_inside(body.position, body.radius);
        debug!(id, kind = body.kind.as_str(), "body spawned");
        self.bodies.push(body);
        id
    }

    /// Delete a body.  Returns true if it existed.
    pub fn remove(&mut self, id: BodyId) -> bool {
        let before = self.bodies.len();
        self.bodies.retain(|b| b.id != id);
        if self.grabbed == Some(id) {
            self.grabbed = None;
        }
        self.bodies.len() < before
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
        self.grabbed = None;
    }

    /// Resize the boundary and pull every body back inside it.
    pub fn set_bounds(&mut self, bounds: Viewport) {
        self.bounds = bounds;
        for i in 0..self.bodies.len() {
            let (pos, r) = (self.bodies[i].position, self.bodies[i].radius);
            self.bodies[i].position = self.clamp_inside(pos, r);
        }
    }

    fn reach(&self, body: &PhysicsBody) -> f32 {
        match self.config.grab_reach {
            GrabReach::Margin(m) => body.radius + m,
            GrabReach::Radius(r) => r,
        }
    }

    /// Grab the nearest body within reach of `pointer`.
    ///
    /// At most one body is ever grabbed; returns None if one already is
    /// or nothing is in range.
    pub fn try_grab(&mut self, pointer: Vec2) -> Option<BodyId> {
        if self.grabbed.is_some() {
            return None;
        }
        let (idx, dist) = self
            .bodies
            .iter()
            .enumerate()
            .map(|(i, b)| (i, b.position.distance(pointer)))
            .filter(|(i, d)| *d <= self.reach(&self.bodies[*i]))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;
        let body = &mut self.bodies[idx];
        body.grabbed = true;
        body.velocity = Vec2::ZERO;
        body.angular_velocity = 0.0;
        self.grabbed = Some(body.id);
        info!(id = body.id, kind = body.kind.as_str(), dist, "body grabbed");
        Some(body.id)
    }

    /// Pull the grabbed body toward the pointer.  `roll` (palm roll)
    /// steers its angle when the world follows roll.
    pub fn drive_grabbed(&mut self, pointer: Vec2, roll: Option<f32>) {
        let Some(id) = self.grabbed else {
            return;
        };
        let convergence = self.config.convergence.clamp(0.0, 1.0);
        let follow = self.config.follow_roll;
        let bounds = self.bounds_with_floor();
        if let Some(body) = self.bodies.iter_mut().find(|b| b.id == id) {
            body.position = body.position.lerp(pointer, convergence);
            body.position = clamp_point(body.position, body.radius, bounds);
            body.velocity = Vec2::ZERO;
            if let (Some(smoothing), Some(roll)) = (follow, roll) {
                let target = roll + std::f32::consts::FRAC_PI_2;
                body.angle = lerp(body.angle, target, smoothing);
            }
        }
    }

    /// Let go of the grabbed body, throwing it with the pointer's last
    /// per-frame displacement.  Returns the body id and its new velocity.
    pub fn release(&mut self, pointer_delta: Vec2) -> Option<(BodyId, Vec2)> {
        let id = self.grabbed.take()?;
        let delta = if pointer_delta.is_finite() {
            pointer_delta
        } else {
            Vec2::ZERO
        };
        let velocity = (delta * self.config.throw_scale).clamp_length(self.config.max_throw_speed);
        let spin = (velocity.x * self.config.throw_spin).clamp(-0.3, 0.3);
        let body = self.bodies.iter_mut().find(|b| b.id == id)?;
        body.grabbed = false;
        body.velocity = velocity;
        body.angular_velocity = spin;
        info!(id, vx = velocity.x, vy = velocity.y, "body thrown");
        Some((id, velocity))
    }

    /// Drop the grabbed body in place (surface switch, cancellation).
    pub fn cancel_grab(&mut self) -> Option<BodyId> {
        let id = self.grabbed.take()?;
        if let Some(body) = self.bodies.iter_mut().find(|b| b.id == id) {
            body.grabbed = false;
            body.velocity = Vec2::ZERO;
        }
        Some(id)
    }

    /// Mark bodies within reach of the pointer as hovered.
    pub fn update_hover(&mut self, pointer: Option<Vec2>) {
        for i in 0..self.bodies.len() {
            let hovered = match pointer {
                Some(p) => self.bodies[i].position.distance(p) <= self.reach(&self.bodies[i]),
                None => false,
            };
            self.bodies[i].hovered = hovered;
        }
    }

    /// Nudge free bodies away from a nearby hand.
    pub fn apply_push(&mut self, hand: Vec2) {
        let Some(push) = self.config.push else {
            return;
        };
        for body in self.bodies.iter_mut().filter(|b| !b.grabbed) {
            let away = body.position - hand;
            if away.length() < push.radius {
                body.velocity = body.velocity + away.normalized() * push.impulse;
            }
        }
    }

    /// Advance every free body by one frame.
    pub fn step(&mut self) {
        let cfg = &self.config;
        let bounds = self.bounds;
        for body in self.bodies.iter_mut().filter(|b| !b.grabbed) {
            integrate(body, cfg, bounds);
        }
    }

    fn clamp_inside(&self, p: Vec2, radius: f32) -> Vec2 {
        clamp_point(p, radius, self.bounds_with_floor())
    }

    fn bounds_with_floor(&self) -> Viewport {
        Viewport {
            width: self.bounds.width,
            height: self.floor_y(),
        }
    }

    fn floor_y(&self) -> f32 {
        floor_line(&self.config, self.bounds)
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        let mut bodies = String::from("(");
        for (i, b) in self.bodies.iter().enumerate() {
            if i > 0 {
                bodies.push(' ');
            }
            bodies.push_str(&b.to_sexp());
        }
        bodies.push(')');
        format!(
            "(:body-count {} :grabbed {} :gravity {:.2} :bodies {})",
            self.bodies.len(),
            self.grabbed
                .map(|id| id.to_string())
                .unwrap_or_else(|| "nil".to_string()),
            self.config.gravity,
            bodies,
        )
    }
}

fn floor_line(cfg: &WorldConfig, bounds: Viewport) -> f32 {
    match cfg.floor {
        Some(floor) => (bounds.height - floor.inset).max(1.0),
        None => bounds.height,
    }
}

/// Keep a circle inside `[0, w] × [0, h]`; centers it if it cannot fit.
fn clamp_point(p: Vec2, radius: f32, bounds: Viewport) -> Vec2 {
    Vec2::new(
        clamp_axis(p.x, radius, bounds.width),
        clamp_axis(p.y, radius, bounds.height),
    )
}

fn clamp_axis(v: f32, radius: f32, extent: f32) -> f32 {
    if 2.0 * radius >= extent {
        extent / 2.0
    } else if v.is_finite() {
        v.clamp(radius, extent - radius)
    } else {
        extent / 2.0
    }
}

/// Reflect a velocity component, settling it to zero when the bounce is
/// too weak to matter.
fn bounce(v: f32, restitution: f32, settle_speed: f32) -> f32 {
    let reflected = -v * restitution;
    if reflected.abs() < settle_speed {
        0.0
    } else {
        reflected
    }
}

fn integrate(body: &mut PhysicsBody, cfg: &WorldConfig, bounds: Viewport) {
    body.velocity.y += cfg.gravity;
    body.velocity = body.velocity * cfg.air_resistance * body.friction;
    if body.velocity.x.abs() < REST_EPSILON {
        body.velocity.x = 0.0;
    }
    if body.velocity.y.abs() < REST_EPSILON {
        body.velocity.y = 0.0;
    }
    body.position = body.position + body.velocity;

    body.angle += body.angular_velocity;
    body.angular_velocity *= cfg.angular_drag;

    let r = body.radius;
    let wall_e = cfg.wall_restitution.unwrap_or(body.restitution);
    let settle = cfg.settle_speed;

    // Side walls.
    if body.position.x - r < 0.0 {
        body.position.x = r.min(bounds.width / 2.0);
        if body.velocity.x < 0.0 {
            body.velocity.x = bounce(body.velocity.x, wall_e, settle);
        }
    } else if body.position.x + r > bounds.width {
        body.position.x = (bounds.width - r).max(bounds.width / 2.0);
        if body.velocity.x > 0.0 {
            body.velocity.x = bounce(body.velocity.x, wall_e, settle);
        }
    }

    // Ceiling.
    if body.position.y - r < 0.0 {
        body.position.y = r;
        if body.velocity.y < 0.0 {
            body.velocity.y = bounce(body.velocity.y, wall_e, settle);
        }
    }

    // Floor (or bottom wall).
    let floor_y = floor_line(cfg, bounds);
    if body.position.y + r > floor_y {
        body.position.y = (floor_y - r).max(r.min(floor_y / 2.0));
        if body.velocity.y > 0.0 {
            let floor_e = cfg.floor.map_or(wall_e, |f| f.restitution);
            body.velocity.y = bounce(body.velocity.y, floor_e, settle);
        }
        if let Some(floor) = cfg.floor {
            body.velocity.x *= floor.friction;
            body.angular_velocity *= floor.angular_damping;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body::BodySpec;

    fn frictionless(restitution: f32) -> BodySpec {
        BodySpec {
            radius: 20.0,
            mass: 1.0,
            friction: 1.0,
            restitution,
            scale: 1.0,
        }
    }

    fn shapes_world() -> PhysicsWorld {
        PhysicsWorld::new(WorldConfig::shapes(), Viewport::new(1000.0, 800.0))
    }

    #[test]
    fn test_default_shapes_scene() {
        let mut w = shapes_world();
        w.populate_default_shapes();
        let kinds: Vec<BodyKind> = w.bodies().iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![BodyKind::Orb, BodyKind::Cube, BodyKind::Pyramid]);
        assert_eq!(w.bodies()[1].position, Vec2::new(500.0, 400.0));
    }

    #[test]
    fn test_grab_picks_nearest() {
        let mut w = shapes_world();
        let far = w.spawn(BodyKind::Orb, Vec2::new(300.0, 400.0));
        let near = w.spawn(BodyKind::Orb, Vec2::new(400.0, 400.0));
        // Both within radius + margin (110) of the pointer.
        let grabbed = w.try_grab(Vec2::new(360.0, 400.0));
        assert_eq!(grabbed, Some(near));
        assert!(w.body(near).unwrap().grabbed);
        assert!(!w.body(far).unwrap().grabbed);
        assert_eq!(w.bodies().iter().filter(|b| b.grabbed).count(), 1);
    }

    #[test]
    fn test_grab_is_exclusive() {
        let mut w = shapes_world();
        w.spawn(BodyKind::Orb, Vec2::new(300.0, 400.0));
        w.spawn(BodyKind::Orb, Vec2::new(400.0, 400.0));
        assert!(w.try_grab(Vec2::new(300.0, 400.0)).is_some());
        assert_eq!(w.try_grab(Vec2::new(400.0, 400.0)), None);
        assert_eq!(w.bodies().iter().filter(|b| b.grabbed).count(), 1);
    }

    #[test]
    fn test_grab_out_of_reach() {
        let mut w = shapes_world();
        w.spawn(BodyKind::Orb, Vec2::new(300.0, 400.0));
        // Orb radius 50 + margin 60.
        assert_eq!(w.try_grab(Vec2::new(411.0, 400.0)), None);
        assert!(w.try_grab(Vec2::new(409.0, 400.0)).is_some());
    }

    #[test]
    fn test_grabbed_body_converges() {
        let mut w = shapes_world();
        let id = w.spawn(BodyKind::Orb, Vec2::new(300.0, 400.0));
        w.try_grab(Vec2::new(350.0, 400.0));
        w.drive_grabbed(Vec2::new(400.0, 400.0), None);
        let b = w.body(id).unwrap().clone();
        assert!((b.position.x - (300.0 + 100.0 * SHAPES_CONVERGENCE)).abs() < 1e-3);
        assert_eq!(b.velocity, Vec2::ZERO);
        // Grabbed bodies are not integrated.
        w.step();
        assert!((w.body(id).unwrap().position.x - b.position.x).abs() < 1e-6);
    }

    #[test]
    fn test_throw_speed_clamped() {
        for delta in [
            Vec2::new(5.0, 0.0),
            Vec2::new(300.0, -400.0),
            Vec2::new(-1e6, 1e6),
            Vec2::new(f32::NAN, 1.0),
        ] {
            let mut w = shapes_world();
            w.spawn(BodyKind::Cube, Vec2::new(500.0, 400.0));
            w.try_grab(Vec2::new(500.0, 400.0));
            let (_, v) = w.release(delta).unwrap();
            assert!(v.length() <= SHAPES_MAX_THROW_SPEED + 1e-3, "speed {}", v.length());
        }
    }

    #[test]
    fn test_throw_uses_scaled_delta() {
        let mut w = shapes_world();
        let id = w.spawn(BodyKind::Cube, Vec2::new(500.0, 400.0));
        w.try_grab(Vec2::new(500.0, 400.0));
        let (released, v) = w.release(Vec2::new(10.0, -4.0)).unwrap();
        assert_eq!(released, id);
        assert!((v.x - 9.0).abs() < 1e-4);
        assert!((v.y + 3.6).abs() < 1e-4);
        assert_eq!(w.grabbed(), None);
        assert!(!w.body(id).unwrap().grabbed);
    }

    #[test]
    fn test_wall_bounce_scales_by_restitution() {
        for e in [0.3_f32, 0.6, 0.85] {
            let mut w = shapes_world();
            let id = w.spawn_body(PhysicsBody::with_spec(
                0,
                BodyKind::Orb,
                Vec2::new(975.0, 400.0),
                frictionless(e),
            ));
            w.bodies.iter_mut().for_each(|b| b.velocity = Vec2::new(10.0, 0.0));
            w.step();
            let b = w.body(id).unwrap();
            assert!((b.velocity.x + 10.0 * e).abs() < 1e-4);
            assert_eq!(b.position.x, 980.0);
        }
    }

    #[test]
    fn test_weak_bounce_settles() {
        let mut w = shapes_world();
        let id = w.spawn_body(PhysicsBody::with_spec(
            0,
            BodyKind::Orb,
            Vec2::new(20.5, 400.0),
            frictionless(0.5),
        ));
        w.bodies.iter_mut().for_each(|b| b.velocity = Vec2::new(-0.8, 0.0));
        w.step();
        // 0.8 × 0.5 = 0.4 < settle speed.
        assert_eq!(w.body(id).unwrap().velocity.x, 0.0);
    }

    #[test]
    fn test_friction_slows_and_rests() {
        let mut w = shapes_world();
        let id = w.spawn(BodyKind::Orb, Vec2::new(500.0, 400.0));
        w.bodies.iter_mut().for_each(|b| b.velocity = Vec2::new(2.0, 0.0));
        for _ in 0..400 {
            w.step();
        }
        assert_eq!(w.body(id).unwrap().velocity, Vec2::ZERO);
    }

    #[test]
    fn test_tools_fall_and_settle_on_floor() {
        let mut w = PhysicsWorld::new(WorldConfig::tools(), Viewport::new(1000.0, 800.0));
        let id = w.spawn(BodyKind::Ball, w.tool_spawn_point());
        for _ in 0..600 {
            w.step();
        }
        let b = w.body(id).unwrap();
        assert!((b.position.y - (800.0 - TOOLS_FLOOR_INSET - b.radius)).abs() < 1.0);
        assert!(b.velocity.y.abs() <= TOOLS_GRAVITY + 1e-3);
    }

    #[test]
    fn test_tools_grab_radius_and_roll_follow() {
        let mut w = PhysicsWorld::new(WorldConfig::tools(), Viewport::new(1000.0, 800.0));
        let id = w.spawn(BodyKind::Katana, Vec2::new(500.0, 400.0));
        assert_eq!(w.try_grab(Vec2::new(500.0, 561.0)), None);
        assert_eq!(w.try_grab(Vec2::new(500.0, 550.0)), Some(id));
        w.drive_grabbed(Vec2::new(500.0, 400.0), Some(0.0));
        let expected = std::f32::consts::FRAC_PI_2 * TOOLS_ANGLE_SMOOTHING;
        assert!((w.body(id).unwrap().angle - expected).abs() < 1e-4);
    }

    #[test]
    fn test_tools_throw_clamped_to_25() {
        let mut w = PhysicsWorld::new(WorldConfig::tools(), Viewport::new(1000.0, 800.0));
        w.spawn(BodyKind::Bottle, Vec2::new(500.0, 400.0));
        w.try_grab(Vec2::new(500.0, 400.0));
        let (_, v) = w.release(Vec2::new(90.0, -90.0)).unwrap();
        assert!(v.length() <= TOOLS_MAX_THROW_SPEED + 1e-3);
    }

    #[test]
    fn test_push_impulse_only_for_free_bodies() {
        let mut w = PhysicsWorld::new(WorldConfig::tools(), Viewport::new(1000.0, 800.0));
        let a = w.spawn(BodyKind::Ball, Vec2::new(500.0, 400.0));
        let b = w.spawn(BodyKind::Ball, Vec2::new(800.0, 400.0));
        w.apply_push(Vec2::new(450.0, 400.0));
        assert!((w.body(a).unwrap().velocity.x - TOOLS_PUSH_IMPULSE).abs() < 1e-4);
        assert_eq!(w.body(b).unwrap().velocity, Vec2::ZERO);

        w.try_grab(Vec2::new(800.0, 400.0));
        w.apply_push(Vec2::new(790.0, 400.0));
        assert_eq!(w.body(b).unwrap().velocity, Vec2::ZERO);
    }

    #[test]
    fn test_shapes_have_no_push() {
        let mut w = shapes_world();
        let id = w.spawn(BodyKind::Orb, Vec2::new(500.0, 400.0));
        w.apply_push(Vec2::new(490.0, 400.0));
        assert_eq!(w.body(id).unwrap().velocity, Vec2::ZERO);
    }

    #[test]
    fn test_remove_grabbed_clears_grab() {
        let mut w = shapes_world();
        let id = w.spawn(BodyKind::Orb, Vec2::new(500.0, 400.0));
        w.try_grab(Vec2::new(500.0, 400.0));
        assert!(w.remove(id));
        assert_eq!(w.grabbed(), None);
        assert!(!w.remove(id));
        assert_eq!(w.release(Vec2::new(1.0, 1.0)), None);
    }

    #[test]
    fn test_spawn_clamps_inside_bounds() {
        let mut w = shapes_world();
        let id = w.spawn(BodyKind::Orb, Vec2::new(-500.0, 5000.0));
        assert_eq!(w.body(id).unwrap().position, Vec2::new(50.0, 750.0));
        w.set_bounds(Viewport::new(400.0, 300.0));
        assert_eq!(w.body(id).unwrap().position, Vec2::new(50.0, 250.0));
    }

    #[test]
    fn test_hover_tracks_pointer() {
        let mut w = shapes_world();
        let id = w.spawn(BodyKind::Orb, Vec2::new(500.0, 400.0));
        w.update_hover(Some(Vec2::new(520.0, 400.0)));
        assert!(w.body(id).unwrap().hovered);
        w.update_hover(None);
        assert!(!w.body(id).unwrap().hovered);
    }

    #[test]
    fn test_status_sexp_parses() {
        let mut w = shapes_world();
        w.populate_default_shapes();
        assert!(lexpr::from_str(&w.status_sexp()).is_ok());
    }
}
