//! pinchwm: turns hand landmarks into a stable pointer, a hysteresis
//! gesture stream, grab-and-throw physics and a spatial panel manager.

pub mod backend;
pub mod config;
pub mod detector;
pub mod engine;
pub mod frame_timing;
pub mod geometry;
pub mod ipc;
pub mod panels;
pub mod physics;
pub mod sexp;
pub mod state;
pub mod tracking;
