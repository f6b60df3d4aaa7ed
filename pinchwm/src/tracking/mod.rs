//! Hand tracking pipeline: landmark normalization, pointer stabilization
//! and the hysteresis gesture machine.

pub mod gesture;
pub mod landmarks;
pub mod stabilizer;

pub use gesture::{GestureEvent, GestureMachine, GestureMode, HysteresisConfig, ReleaseCause};
pub use landmarks::{HandMetrics, LandmarkFrame, NormalizerConfig};
pub use stabilizer::{PointerState, Presence, SmoothingProfile, Stabilizer, StabilizerConfig};
