//! Central driver state.
//!
//! A single `PinchState` owns the engine, the detector source and the IPC
//! server, and is passed as `&mut` to every event-loop callback.

use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::detector::{FrameSource, LandmarkSource};
use crate::engine::{Engine, FrameSnapshot};
use crate::frame_timing::FrameTiming;
use crate::ipc::dispatch::format_engine_event;
use crate::ipc::IpcServer;

/// Monotonic milliseconds since startup, plus wall-clock time for IPC.
#[derive(Debug, Clone)]
pub struct Clock {
    start: Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Milliseconds since the Unix epoch.
    pub fn unix_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as i64)
    }
}

/// Everything the frame loop owns.
#[derive(Debug)]
pub struct PinchState {
    pub engine: Engine,
    pub source: FrameSource,
    pub ipc_server: IpcServer,
    pub clock: Clock,
    pub timing: FrameTiming,
    pub running: bool,
}

impl PinchState {
    pub fn new(engine: Engine, source: FrameSource, socket_path: PathBuf, fps: u32) -> Self {
        info!(source = source.name(), fps, "driver state initialized");
        Self {
            engine,
            source,
            ipc_server: IpcServer::new(socket_path),
            clock: Clock::new(),
            timing: FrameTiming::for_fps(fps),
            running: true,
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Run exactly one engine tick: detect, process, publish.
    pub fn tick(&mut self) -> FrameSnapshot {
        let start = self.clock.now_ms();
        let detection = self.source.poll();
        let detected = self.clock.now_ms();

        let snapshot = self.engine.tick(detection, detected);
        let processed = self.clock.now_ms();

        for event in &snapshot.events {
            debug!(event = event.name(), tick = snapshot.tick, "engine event");
            self.ipc_server.broadcast_event(&format_engine_event(event));
        }
        let published = self.clock.now_ms();

        self.timing.record_tick(
            start,
            detected - start,
            processed - detected,
            published - processed,
        );

        if self.running && self.source.replay_finished() {
            info!(ticks = snapshot.tick, "replay finished, stopping");
            self.running = false;
        }
        snapshot
    }
}
