//! pinchwm: gesture-to-interaction engine driven by an external hand
//! landmark detector.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use pinchwm::backend::{self, DriverConfig, IpcConfig};
use pinchwm::config::{EngineConfig, Viewport, DEFAULT_FPS};
use pinchwm::detector::{FrameSource, LatestFrameSlot, ReplaySource};
use pinchwm::engine::{Engine, Surface};

#[derive(Parser, Debug)]
#[command(name = "pinchwm", about = "Gesture-to-interaction engine")]
struct Cli {
    /// Viewport width in pixels
    #[arg(long, default_value_t = 1920.0)]
    width: f32,

    /// Viewport height in pixels
    #[arg(long, default_value_t = 1080.0)]
    height: f32,

    /// Engine ticks per second
    #[arg(long, default_value_t = DEFAULT_FPS)]
    fps: u32,

    /// Initial surface: shapes, tools, or panels
    #[arg(long, default_value = "shapes")]
    surface: String,

    /// Replay landmark frames from a file instead of reading them over IPC
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Loop the replay file
    #[arg(long)]
    replay_loop: bool,

    /// IPC socket path (default: $XDG_RUNTIME_DIR/pinchwm-ipc.sock)
    #[arg(long)]
    ipc_socket: Option<PathBuf>,

    /// Log all IPC messages to stderr
    #[arg(long)]
    ipc_trace: bool,

    /// Exit after N seconds
    #[arg(long)]
    exit_after: Option<u64>,

    /// Pinch distance (hand-scale units) that starts a pinch
    #[arg(long)]
    grab_threshold: Option<f32>,

    /// Pinch distance that releases a lock after the debounce
    #[arg(long)]
    release_threshold: Option<f32>,

    /// Frames past the release threshold before an intentional release
    #[arg(long)]
    debounce_frames: Option<u32>,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::with_viewport(Viewport::new(self.width, self.height));
        if let Some(v) = self.grab_threshold {
            config.pinch.grab_threshold = v;
        }
        if let Some(v) = self.release_threshold {
            config.pinch.release_threshold = v;
        }
        if let Some(v) = self.debounce_frames {
            config.pinch.debounce_frames = v;
        }
        config.pinch.sanitize();
        config
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("pinchwm {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pinchwm=info".into()),
        )
        .init();

    info!("pinchwm v{} starting", env!("CARGO_PKG_VERSION"));

    let surface = Surface::parse(&cli.surface).with_context(|| {
        format!("unknown surface: {}. Use: shapes, tools, or panels", cli.surface)
    })?;

    let source = match &cli.replay {
        Some(path) => FrameSource::Replay {
            replay: ReplaySource::from_path(path, cli.replay_loop)
                .with_context(|| format!("loading replay {}", path.display()))?,
            slot: LatestFrameSlot::new(),
        },
        None => FrameSource::Ipc(LatestFrameSlot::new()),
    };

    let engine = Engine::new(cli.engine_config(), surface);

    backend::headless::run(
        engine,
        source,
        IpcConfig {
            socket_path: cli.ipc_socket.clone(),
            trace: cli.ipc_trace,
        },
        DriverConfig {
            fps: cli.fps,
            exit_after: cli.exit_after,
            ..DriverConfig::default()
        },
    )
}
