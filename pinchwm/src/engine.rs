//! The per-tick gesture-to-interaction pipeline.
//!
//! One `Engine` owns the pointer, both gesture machines, both physics
//! worlds and the panel manager.  Each tick applies queued commands, runs
//! landmarks → metrics → pointer → gesture, then hands the result to
//! exactly one consumer chosen by the active `Surface`.

use std::collections::VecDeque;

use tracing::{debug, error, info};

use crate::config::{EngineConfig, Viewport};
use crate::detector::{Detection, DetectionError};
use crate::geometry::Vec2;
use crate::panels::{Intent, Panel, PanelEvent, PanelId, PanelManager};
use crate::physics::{BodyId, BodyIds, BodyKind, PhysicsBody, PhysicsWorld};
use crate::sexp::{bool_atom, escape_string};
use crate::tracking::gesture::HysteresisConfig;
use crate::tracking::landmarks::{normalize, NormalizerConfig};
use crate::tracking::{
    GestureEvent, GestureMachine, GestureMode, PointerState, Presence, ReleaseCause,
    SmoothingProfile, Stabilizer, StabilizerConfig,
};

/// The interaction surface consuming the gesture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Zero-gravity shape playground, pinch to grab.
    Shapes,
    /// Gravity playground with tools, fist to grab.
    Tools,
    /// Panel manager, pinch to drag/resize/click.
    Panels,
}

impl Surface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shapes => "shapes",
            Self::Tools => "tools",
            Self::Panels => "panels",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "shapes" => Some(Self::Shapes),
            "tools" => Some(Self::Tools),
            "panels" => Some(Self::Panels),
            _ => None,
        }
    }

    pub fn profile(&self) -> SmoothingProfile {
        match self {
            Self::Panels => SmoothingProfile::Precise,
            Self::Shapes | Self::Tools => SmoothingProfile::Physics,
        }
    }

    /// The tools surface grabs with a fist instead of a pinch.
    pub fn uses_grip(&self) -> bool {
        matches!(self, Self::Tools)
    }
}

/// Camera lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    Active,
    /// Terminal until `Command::RestoreCamera`.
    Denied,
}

impl CameraState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Denied => "denied",
        }
    }
}

/// Work queued from outside the frame loop, applied at the start of the
/// next tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Intent(Intent),
    SetSurface(Surface),
    /// `position` defaults to the world's spawn point.
    SpawnBody {
        kind: BodyKind,
        position: Option<Vec2>,
    },
    DeleteBody(BodyId),
    ResetPhysics,
    PanelInput {
        id: PanelId,
        text: String,
    },
    /// Explicit user action after a camera denial.
    RestoreCamera,
}

/// Observable results of one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    GestureLocked { surface: Surface },
    GestureReleased { cause: ReleaseCause },
    BodyGrabbed { id: BodyId, kind: BodyKind },
    BodyThrown { id: BodyId, velocity: Vec2 },
    Panel(PanelEvent),
    CameraDenied,
    SurfaceChanged { from: Surface, to: Surface },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GestureLocked { .. } => "gesture-locked",
            Self::GestureReleased { .. } => "gesture-released",
            Self::BodyGrabbed { .. } => "body-grabbed",
            Self::BodyThrown { .. } => "body-thrown",
            Self::CameraDenied => "camera-denied",
            Self::SurfaceChanged { .. } => "surface-changed",
            Self::Panel(e) => match e {
                PanelEvent::Created { .. } => "panel-created",
                PanelEvent::Closed { .. } => "panel-closed",
                PanelEvent::ControlClicked { .. } => "panel-click",
                PanelEvent::ContentClicked { .. } => "content-click",
                PanelEvent::Scrolled { .. } => "panel-scroll",
                PanelEvent::Navigated { .. } => "panel-navigated",
                PanelEvent::SearchRequested { .. } => "search-requested",
                PanelEvent::ListeningStopped => "listening-stopped",
            },
        }
    }

    /// Event payload as `(key, rendered value)` pairs.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::GestureLocked { surface } => vec![("surface", format!(":{}", surface.as_str()))],
            Self::GestureReleased { cause } => vec![("cause", format!(":{}", cause.as_str()))],
            Self::BodyGrabbed { id, kind } => vec![
                ("id", id.to_string()),
                ("kind", format!(":{}", kind.as_str())),
            ],
            Self::BodyThrown { id, velocity } => vec![
                ("id", id.to_string()),
                ("vx", format!("{:.2}", velocity.x)),
                ("vy", format!("{:.2}", velocity.y)),
            ],
            Self::CameraDenied => Vec::new(),
            Self::SurfaceChanged { from, to } => vec![
                ("from", format!(":{}", from.as_str())),
                ("to", format!(":{}", to.as_str())),
            ],
            Self::Panel(e) => match e {
                PanelEvent::Created { id }
                | PanelEvent::Closed { id }
                | PanelEvent::SearchRequested { id } => vec![("id", id.to_string())],
                PanelEvent::ControlClicked { id, control } => vec![
                    ("id", id.to_string()),
                    ("control", format!(":{}", control.as_str())),
                ],
                PanelEvent::ContentClicked { id, position, kind } => vec![
                    ("id", id.to_string()),
                    ("x", format!("{:.1}", position.x)),
                    ("y", format!("{:.1}", position.y)),
                    ("kind", format!(":{}", kind.as_str())),
                ],
                PanelEvent::Scrolled { id, delta } => {
                    vec![("id", id.to_string()), ("delta", format!("{:.1}", delta))]
                }
                PanelEvent::Navigated { id, url } => vec![
                    ("id", id.to_string()),
                    ("url", format!("\"{}\"", escape_string(url))),
                ],
                PanelEvent::ListeningStopped => Vec::new(),
            },
        }
    }
}

/// Immutable per-tick view handed to rendering and IPC.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub tick: u64,
    pub timestamp_ms: f64,
    pub surface: Surface,
    pub camera: CameraState,
    pub pointer: PointerState,
    /// Bodies of the active physics world (empty on the panels surface).
    pub bodies: Vec<PhysicsBody>,
    pub panels: Vec<Panel>,
    pub events: Vec<EngineEvent>,
}

impl FrameSnapshot {
    /// Generate s-expression for IPC.
    pub fn to_sexp(&self) -> String {
        let bodies: Vec<String> = self.bodies.iter().map(|b| b.to_sexp()).collect();
        let panels: Vec<String> = self.panels.iter().map(|p| p.to_sexp()).collect();
        let events: Vec<&str> = self.events.iter().map(|e| e.name()).collect();
        format!(
            "(:tick {} :timestamp {:.1} :surface :{} :camera :{} :pointer {} :bodies ({}) :panels ({}) :events ({}))",
            self.tick,
            self.timestamp_ms,
            self.surface.as_str(),
            self.camera.as_str(),
            self.pointer.status_sexp(),
            bodies.join(" "),
            panels.join(" "),
            events.join(" "),
        )
    }
}

/// The engine.  Single-threaded; every mutation happens inside `tick` or
/// through `&mut self` between ticks.
#[derive(Debug)]
pub struct Engine {
    viewport: Viewport,
    surface: Surface,
    camera: CameraState,
    normalizer: NormalizerConfig,
    stabilizer: Stabilizer,
    pinch: GestureMachine,
    grip: GestureMachine,
    shapes: PhysicsWorld,
    tools: PhysicsWorld,
    panels: PanelManager,
    commands: VecDeque<Command>,
    ticks: u64,
    last_snapshot: Option<FrameSnapshot>,
}

impl Engine {
    pub fn new(config: EngineConfig, surface: Surface) -> Self {
        let viewport = config.viewport;
        let ids = BodyIds::default();
        let mut shapes = PhysicsWorld::with_ids(config.shapes, viewport, ids.clone());
        shapes.populate_default_shapes();
        let mut tools = PhysicsWorld::with_ids(config.tools, viewport, ids);
        populate_default_tools(&mut tools);
        info!(
            width = viewport.width,
            height = viewport.height,
            surface = surface.as_str(),
            "engine created"
        );
        Self {
            viewport,
            surface,
            camera: CameraState::Active,
            normalizer: config.normalizer,
            stabilizer: Stabilizer::new(config.stabilizer),
            pinch: GestureMachine::new(config.pinch),
            grip: GestureMachine::new(config.grip),
            shapes,
            tools,
            panels: PanelManager::new(config.panels, viewport),
            commands: VecDeque::new(),
            ticks: 0,
            last_snapshot: None,
        }
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn camera(&self) -> CameraState {
        self.camera
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn pointer(&self) -> &PointerState {
        self.stabilizer.pointer()
    }

    pub fn panels(&self) -> &PanelManager {
        &self.panels
    }

    pub fn shapes(&self) -> &PhysicsWorld {
        &self.shapes
    }

    pub fn tools(&self) -> &PhysicsWorld {
        &self.tools
    }

    /// World consumed by the active surface, if it is a physics surface.
    pub fn active_world(&self) -> Option<&PhysicsWorld> {
        match self.surface {
            Surface::Shapes => Some(&self.shapes),
            Surface::Tools => Some(&self.tools),
            Surface::Panels => None,
        }
    }

    /// Gesture machine used by the active surface.
    pub fn gesture(&self) -> &GestureMachine {
        if self.surface.uses_grip() {
            &self.grip
        } else {
            &self.pinch
        }
    }

    pub fn pinch_gesture(&self) -> &GestureMachine {
        &self.pinch
    }

    pub fn grip_gesture(&self) -> &GestureMachine {
        &self.grip
    }

    pub fn pinch_config_mut(&mut self) -> &mut HysteresisConfig {
        &mut self.pinch.config
    }

    pub fn grip_config_mut(&mut self) -> &mut HysteresisConfig {
        &mut self.grip.config
    }

    pub fn normalizer_config_mut(&mut self) -> &mut NormalizerConfig {
        &mut self.normalizer
    }

    pub fn stabilizer_config_mut(&mut self) -> &mut StabilizerConfig {
        &mut self.stabilizer.config
    }

    pub fn panel_config_mut(&mut self) -> &mut crate::panels::PanelConfig {
        &mut self.panels.config
    }

    pub fn last_snapshot(&self) -> Option<&FrameSnapshot> {
        self.last_snapshot.as_ref()
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Queue a command for the next tick.
    pub fn enqueue(&mut self, command: Command) {
        debug!(?command, "command queued");
        self.commands.push_back(command);
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    /// Run one frame.
    pub fn tick(&mut self, detection: Detection, now_ms: f64) -> FrameSnapshot {
        self.ticks += 1;
        let mut events = Vec::new();

        while let Some(command) = self.commands.pop_front() {
            self.apply_command(command, &mut events);
        }

        let frame = match detection {
            Err(DetectionError::CameraDenied) => {
                if self.camera == CameraState::Active {
                    error!("camera access denied; gesture input stopped");
                    self.camera = CameraState::Denied;
                    self.cancel_interactions(&mut events);
                    events.push(EngineEvent::CameraDenied);
                }
                None
            }
            Err(DetectionError::Unavailable(reason)) => {
                debug!(reason = %reason, "detection unavailable; treating as missed frame");
                None
            }
            Ok(frame) => frame,
        };

        if self.camera == CameraState::Denied {
            self.stabilizer.hide();
            return self.snapshot(now_ms, events);
        }

        let metrics = frame.map(|f| normalize(&f, &self.normalizer));
        let presence = self.stabilizer.update(
            metrics.as_ref(),
            self.viewport,
            self.surface.profile(),
            now_ms,
        );

        match self.surface {
            Surface::Shapes | Surface::Tools => self.tick_physics(presence, &mut events),
            Surface::Panels => self.tick_panels(presence, now_ms, &mut events),
        }

        self.snapshot(now_ms, events)
    }

    /// Advance the active gesture machine for this frame's presence.
    fn run_gesture(&mut self, presence: Presence) -> Vec<GestureEvent> {
        let pointer = *self.stabilizer.pointer();
        let (machine, value) = if self.surface.uses_grip() {
            (&mut self.grip, pointer.grip_strength)
        } else {
            (&mut self.pinch, pointer.pinch_value)
        };
        let events = match presence {
            Presence::Tracked => machine.update(value, pointer.speed()),
            // Hold the current mode through short dropouts.
            Presence::Coasting => Vec::new(),
            Presence::Lost => machine.hand_lost(),
        };
        self.sync_pointer();
        events
    }

    fn sync_pointer(&mut self) {
        let machine = if self.surface.uses_grip() {
            &self.grip
        } else {
            &self.pinch
        };
        let (mode, progress) = (machine.mode(), machine.release_progress());
        self.stabilizer.set_gesture(mode, progress);
    }

    fn tick_physics(&mut self, presence: Presence, events: &mut Vec<EngineEvent>) {
        let gesture = self.run_gesture(presence);
        let pointer = *self.stabilizer.pointer();
        let surface = self.surface;
        let (machine, world) = match surface {
            Surface::Tools => (&mut self.grip, &mut self.tools),
            _ => (&mut self.pinch, &mut self.shapes),
        };

        for event in &gesture {
            if let GestureEvent::Released { cause } = event {
                if let Some((id, velocity)) = world.release(pointer.velocity()) {
                    events.push(EngineEvent::BodyThrown { id, velocity });
                }
                events.push(EngineEvent::GestureReleased { cause: *cause });
            }
        }

        // The grabbed body vanished (deleted, reset) while locked.
        if machine.is_locked() && world.grabbed().is_none() {
            if let Some(GestureEvent::Released { cause }) = machine.cancel() {
                events.push(EngineEvent::GestureReleased { cause });
            }
        }

        if machine.mode() == GestureMode::Pinch && pointer.visible {
            if let Some(id) = world.try_grab(pointer.position) {
                if machine.lock().is_some() {
                    let kind = world.body(id).map_or(BodyKind::Orb, |b| b.kind);
                    events.push(EngineEvent::BodyGrabbed { id, kind });
                    events.push(EngineEvent::GestureLocked { surface });
                }
            }
        }

        if world.grabbed().is_some() {
            world.drive_grabbed(pointer.position, Some(pointer.roll));
        }
        if pointer.visible {
            world.apply_push(pointer.position);
        }
        world.update_hover(pointer.visible.then_some(pointer.position));
        world.step();
        self.sync_pointer();
    }

    fn tick_panels(&mut self, presence: Presence, now_ms: f64, events: &mut Vec<EngineEvent>) {
        let gesture = self.run_gesture(presence);
        let pointer = *self.stabilizer.pointer();

        for event in &gesture {
            if let GestureEvent::Released { cause } = event {
                events.push(EngineEvent::GestureReleased { cause: *cause });
            }
        }

        let frame = self.panels.on_gesture(&pointer, &gesture, now_ms);
        if frame.lock && self.pinch.lock().is_some() {
            events.push(EngineEvent::GestureLocked {
                surface: Surface::Panels,
            });
        }
        // The session's panel was closed under the lock.
        if self.pinch.is_locked() && self.panels.session_panel().is_none() {
            if let Some(GestureEvent::Released { cause }) = self.pinch.cancel() {
                events.push(EngineEvent::GestureReleased { cause });
            }
        }
        events.extend(frame.events.into_iter().map(EngineEvent::Panel));
        self.sync_pointer();
    }

    fn apply_command(&mut self, command: Command, events: &mut Vec<EngineEvent>) {
        match command {
            Command::Intent(intent) => {
                let out = self.panels.apply_intent(&intent);
                events.extend(out.into_iter().map(EngineEvent::Panel));
            }
            Command::SetSurface(to) => {
                if to == self.surface {
                    return;
                }
                let from = self.surface;
                self.cancel_interactions(events);
                self.surface = to;
                info!(from = from.as_str(), to = to.as_str(), "surface changed");
                events.push(EngineEvent::SurfaceChanged { from, to });
            }
            Command::SpawnBody { kind, position } => {
                let world = if kind.is_tool() {
                    &mut self.tools
                } else {
                    &mut self.shapes
                };
                let position = position.unwrap_or_else(|| {
                    if kind.is_tool() {
                        world.tool_spawn_point()
                    } else {
                        let b = world.bounds();
                        Vec2::new(b.width / 2.0, b.height / 2.0)
                    }
                });
                world.spawn(kind, position);
            }
            Command::DeleteBody(id) => {
                if !self.shapes.remove(id) && !self.tools.remove(id) {
                    debug!(id, "delete: no such body");
                }
            }
            Command::ResetPhysics => {
                self.shapes.clear();
                self.shapes.populate_default_shapes();
                self.tools.clear();
                populate_default_tools(&mut self.tools);
                info!("physics reset");
            }
            Command::PanelInput { id, text } => {
                if let Some(e) = self.panels.submit_input(id, &text) {
                    events.push(EngineEvent::Panel(e));
                }
            }
            Command::RestoreCamera => {
                if self.camera == CameraState::Denied {
                    info!("camera restored");
                    self.camera = CameraState::Active;
                }
            }
        }
    }

    /// Drop every grab and session and return both machines to OPEN.
    fn cancel_interactions(&mut self, events: &mut Vec<EngineEvent>) {
        let was_locked = self.pinch.is_locked() || self.grip.is_locked();
        self.pinch.reset();
        self.grip.reset();
        self.shapes.cancel_grab();
        self.tools.cancel_grab();
        self.panels.cancel_session();
        self.stabilizer.set_gesture(GestureMode::Open, 0.0);
        if was_locked {
            events.push(EngineEvent::GestureReleased {
                cause: ReleaseCause::Cancelled,
            });
        }
    }

    fn snapshot(&mut self, now_ms: f64, events: Vec<EngineEvent>) -> FrameSnapshot {
        let snapshot = FrameSnapshot {
            tick: self.ticks,
            timestamp_ms: now_ms,
            surface: self.surface,
            camera: self.camera,
            pointer: *self.stabilizer.pointer(),
            bodies: self
                .active_world()
                .map(|w| w.bodies().to_vec())
                .unwrap_or_default(),
            panels: self.panels.panels().to_vec(),
            events,
        };
        self.last_snapshot = Some(snapshot.clone());
        snapshot
    }

    /// Generate s-expression for IPC surface status.
    pub fn surface_sexp(&self) -> String {
        format!(
            "(:surface :{} :camera :{} :locked {} :pending-commands {})",
            self.surface.as_str(),
            self.camera.as_str(),
            bool_atom(self.gesture().is_locked()),
            self.commands.len(),
        )
    }
}

/// The tools world starts with one of each tool dropped from the top.
fn populate_default_tools(world: &mut PhysicsWorld) {
    let spawn = world.tool_spawn_point();
    let kinds = [BodyKind::Katana, BodyKind::Bottle, BodyKind::Bucket, BodyKind::Ball];
    let spacing = world.bounds().width / (kinds.len() as f32 + 1.0);
    for (i, kind) in kinds.into_iter().enumerate() {
        world.spawn(kind, Vec2::new(spacing * (i as f32 + 1.0), spawn.y));
    }
}
