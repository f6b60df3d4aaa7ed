//! Headless frame driver.
//!
//! A calloop `Timer` fires once per frame interval and runs exactly one
//! engine tick; between ticks the loop services IPC clients.  Handles
//! SIGINT/SIGTERM, an optional exit timer and periodic status logging.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use calloop::timer::{TimeoutAction, Timer};
use calloop::EventLoop;
use tracing::{info, warn};

use super::{DriverConfig, IpcConfig};
use crate::detector::FrameSource;
use crate::engine::Engine;
use crate::ipc::IpcServer;
use crate::state::PinchState;

static STOP_SIGNALLED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_stop_signal(_sig: libc::c_int) {
    STOP_SIGNALLED.store(true, Ordering::SeqCst);
}

/// Route SIGINT and SIGTERM to `STOP_SIGNALLED`.
fn trap_stop_signals() {
    for sig in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: the handler only performs an atomic store.
        unsafe {
            libc::signal(sig, on_stop_signal as libc::sighandler_t);
        }
    }
}

/// Why the frame driver left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Signal,
    ExitTimer,
    ReplayFinished,
}

impl StopReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Signal => "signal",
            Self::ExitTimer => "exit-timer",
            Self::ReplayFinished => "replay-finished",
        }
    }
}

/// First stop condition that holds, checked once per loop iteration.
fn stop_reason(running: bool, elapsed: Duration, exit_after: Option<Duration>) -> Option<StopReason> {
    if STOP_SIGNALLED.load(Ordering::SeqCst) {
        Some(StopReason::Signal)
    } else if exit_after.is_some_and(|limit| elapsed >= limit) {
        Some(StopReason::ExitTimer)
    } else if !running {
        Some(StopReason::ReplayFinished)
    } else {
        None
    }
}

/// Next deadline for a repeating frame timer.  A late tick reschedules
/// from now instead of bursting to catch up.
fn next_deadline(deadline: Instant, interval: Duration, now: Instant) -> Instant {
    let next = deadline + interval;
    if next <= now {
        now + interval
    } else {
        next
    }
}

/// Run the engine until a signal, the exit timer or the end of a replay.
pub fn run(
    engine: Engine,
    source: FrameSource,
    ipc_config: IpcConfig,
    config: DriverConfig,
) -> anyhow::Result<()> {
    let mut event_loop = EventLoop::<PinchState>::try_new()?;

    let ipc_path = ipc_config
        .socket_path
        .unwrap_or_else(IpcServer::default_socket_path);
    let mut state = PinchState::new(engine, source, ipc_path.clone(), config.fps);
    state.ipc_server.ipc_trace = ipc_config.trace;
    IpcServer::bind(&ipc_path, &event_loop.handle())?;

    trap_stop_signals();

    let interval = config.frame_interval();
    event_loop
        .handle()
        .insert_source(Timer::from_duration(interval), move |deadline, _, state| {
            state.tick();
            state.ipc_server.flush_all();
            TimeoutAction::ToInstant(next_deadline(deadline, interval, Instant::now()))
        })
        .map_err(|e| anyhow::anyhow!("failed to insert frame timer: {:?}", e))?;

    let started = Instant::now();
    let exit_after = config.exit_after.map(Duration::from_secs);
    let status_every = Duration::from_secs(config.status_interval_secs.max(1));
    let mut next_status = started + status_every;

    info!(
        fps = config.fps,
        surface = state.engine.surface().as_str(),
        source = state.source_name(),
        socket = %ipc_path.display(),
        "frame driver running"
    );

    let reason = loop {
        if let Some(reason) = stop_reason(state.running, started.elapsed(), exit_after) {
            break reason;
        }

        if Instant::now() >= next_status {
            log_status(&state);
            next_status += status_every;
        }

        IpcServer::poll_clients(&mut state);
        event_loop.dispatch(Some(interval), &mut state)?;
    };
    state.running = false;

    if let Err(e) = std::fs::remove_file(&state.ipc_server.socket_path) {
        warn!(path = %state.ipc_server.socket_path.display(), "could not remove IPC socket: {}", e);
    }
    info!(
        reason = reason.as_str(),
        ticks = state.engine.tick_count(),
        uptime_secs = started.elapsed().as_secs(),
        "frame driver stopped"
    );
    Ok(())
}

fn log_status(state: &PinchState) {
    let stats = state.timing.stats();
    info!(
        ticks = stats.total_ticks,
        fps = stats.fps,
        over_budget_pct = stats.over_budget_pct,
        surface = state.engine.surface().as_str(),
        camera = state.engine.camera().as_str(),
        ipc_clients = state.ipc_server.clients.len(),
        "driver status"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_deadline_on_time() {
        let t0 = Instant::now();
        let interval = Duration::from_millis(16);
        let next = next_deadline(t0, interval, t0 + Duration::from_millis(2));
        assert_eq!(next, t0 + interval);
    }

    #[test]
    fn test_next_deadline_late_does_not_burst() {
        let t0 = Instant::now();
        let interval = Duration::from_millis(16);
        let now = t0 + Duration::from_millis(50);
        assert_eq!(next_deadline(t0, interval, now), now + interval);
    }

    #[test]
    fn test_stop_reasons() {
        let secs = Duration::from_secs;
        assert_eq!(stop_reason(true, secs(5), None), None);
        assert_eq!(stop_reason(true, secs(5), Some(secs(10))), None);
        assert_eq!(
            stop_reason(true, secs(10), Some(secs(10))),
            Some(StopReason::ExitTimer)
        );
        assert_eq!(
            stop_reason(false, secs(1), None),
            Some(StopReason::ReplayFinished)
        );
    }
}
