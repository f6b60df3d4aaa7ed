//! 2D rigid-body playground driven by the pointer.

pub mod body;
pub mod world;

pub use body::{BodyId, BodyIds, BodyKind, BodySpec, PhysicsBody};
pub use world::{FloorConfig, GrabReach, PhysicsWorld, PushConfig, WorldConfig};
