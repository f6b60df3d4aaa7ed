//! Frame driver backends.

pub mod headless;

use std::path::PathBuf;
use std::time::Duration;

use crate::config::DEFAULT_FPS;

/// IPC socket configuration.
#[derive(Debug, Clone, Default)]
pub struct IpcConfig {
    /// Socket path; `None` uses `$XDG_RUNTIME_DIR/pinchwm-ipc.sock`.
    pub socket_path: Option<PathBuf>,
    /// Log every IPC message.
    pub trace: bool,
}

/// Frame loop configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub fps: u32,
    /// Exit after N seconds (CI).
    pub exit_after: Option<u64>,
    /// Seconds between status log lines.
    pub status_interval_secs: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            exit_after: None,
            status_interval_secs: 60,
        }
    }
}

impl DriverConfig {
    /// One tick per frame interval.  `fps` is clamped to 1..=240.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.clamp(1, 240) as f64)
    }
}
