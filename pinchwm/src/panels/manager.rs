//! Panel collection: z-order, hit testing, drag/resize sessions, clicks
//! and command intents.
//!
//! Every mutation of the panel list goes through `&mut PanelManager`, so a
//! queued intent and a frame-loop drag update are applied one after the
//! other, never interleaved.

use tracing::{debug, info};

use crate::config::Viewport;
use crate::geometry::{clamp_finite, Rect, Vec2};
use crate::tracking::{GestureEvent, PointerState};

use super::click::{ClickIntentTracker, ClickKind};
use super::intent::Intent;
use super::panel::{HeaderControl, Panel, PanelConfig, PanelId};

/// Observable results of panel interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    Created { id: PanelId },
    Closed { id: PanelId },
    /// A header control was clicked.
    ControlClicked { id: PanelId, control: HeaderControl },
    /// Pass-through click into embedded content, in panel-local coordinates.
    ContentClicked { id: PanelId, position: Vec2, kind: ClickKind },
    Scrolled { id: PanelId, delta: f32 },
    Navigated { id: PanelId, url: String },
    /// The header search box was clicked and is waiting for input.
    SearchRequested { id: PanelId },
    ListeningStopped,
}

/// What one gesture update asked of the caller.
#[derive(Debug, Default)]
pub struct PanelFrame {
    pub events: Vec<PanelEvent>,
    /// A drag or resize session started; the gesture should lock.
    pub lock: bool,
}

/// The single live manipulation.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Manipulation {
    Idle,
    Drag {
        panel: PanelId,
        pointer_start: Vec2,
        origin: Vec2,
        committed: bool,
    },
    /// Like a drag, a resize only commits past the deadzone, so a tap on a
    /// header control inside the corner handle still clicks.
    Resize {
        panel: PanelId,
        pointer_start: Vec2,
        start: Rect,
        committed: bool,
    },
}

/// Owns every open panel.
#[derive(Debug)]
pub struct PanelManager {
    pub config: PanelConfig,
    viewport: Viewport,
    /// Creation order.
    panels: Vec<Panel>,
    next_id: PanelId,
    next_z: u64,
    session: Manipulation,
    click: ClickIntentTracker,
}

impl PanelManager {
    pub fn new(config: PanelConfig, viewport: Viewport) -> Self {
        Self {
            config,
            viewport,
            panels: Vec::new(),
            next_id: 1,
            next_z: 1,
            session: Manipulation::Idle,
            click: ClickIntentTracker::new(),
        }
    }

    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    pub fn panel(&self, id: PanelId) -> Option<&Panel> {
        self.panels.iter().find(|p| p.id == id)
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// The focused panel: highest z-order.
    pub fn focused(&self) -> Option<PanelId> {
        self.panels.iter().max_by_key(|p| p.z).map(|p| p.id)
    }

    /// Panel being dragged or resized, if any.
    pub fn session_panel(&self) -> Option<PanelId> {
        match self.session {
            Manipulation::Idle => None,
            Manipulation::Drag { panel, .. } | Manipulation::Resize { panel, .. } => Some(panel),
        }
    }

    pub fn is_resizing(&self) -> bool {
        matches!(self.session, Manipulation::Resize { .. })
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.session, Manipulation::Drag { .. })
    }

    /// Open a new panel at the cascade position and focus it.
    pub fn create(&mut self, url: Option<String>) -> PanelId {
        let id = self.next_id;
        self.next_id += 1;
        let origin = self.config.cascade_origin(self.viewport, self.panels.len());
        let rect = Rect::new(
            origin.x,
            origin.y,
            self.config.new_panel_width,
            self.config.new_panel_height,
        );
        let z = self.bump_z();
        let url = url.unwrap_or_else(|| self.config.home_url.clone());
        info!(panel_id = id, url = %url, "panel created");
        self.panels.push(Panel::new(id, rect, z, url));
        id
    }

    /// Close a panel, ending any session that targeted it.
    pub fn close(&mut self, id: PanelId) -> bool {
        let before = self.panels.len();
        self.panels.retain(|p| p.id != id);
        if self.panels.len() == before {
            return false;
        }
        if self.session_panel() == Some(id) {
            self.session = Manipulation::Idle;
            self.click.abandon();
        }
        info!(panel_id = id, "panel closed");
        true
    }

    /// Give `id` a new maximum z-order value.
    pub fn raise(&mut self, id: PanelId) {
        let Some(idx) = self.index_of(id) else {
            return;
        };
        let z = self.bump_z();
        self.panels[idx].z = z;
    }

    /// Toggle maximize.  Maximizing one panel restores every other one.
    pub fn toggle_maximize(&mut self, id: PanelId) {
        let maximize = self.panel(id).map_or(false, |p| !p.maximized);
        self.set_maximized(id, maximize);
    }

    fn set_maximized(&mut self, id: PanelId, maximize: bool) {
        for p in &mut self.panels {
            if p.id == id {
                p.maximized = maximize;
                p.collapsed = false;
            } else if maximize {
                p.maximized = false;
            }
        }
    }

    pub fn toggle_collapse(&mut self, id: PanelId) {
        if let Some(p) = self.panel_mut(id) {
            p.collapsed = !p.collapsed;
            p.maximized = false;
        }
    }

    /// Drop any live session without classifying the pinch.
    pub fn cancel_session(&mut self) {
        if self.session != Manipulation::Idle {
            debug!("panel session cancelled");
        }
        self.session = Manipulation::Idle;
        self.click.abandon();
    }

    /// Feed one frame of pointer state and gesture events.
    pub fn on_gesture(
        &mut self,
        pointer: &PointerState,
        events: &[GestureEvent],
        now_ms: f64,
    ) -> PanelFrame {
        let mut frame = PanelFrame::default();
        let pos = pointer.position;

        for event in events {
            match event {
                GestureEvent::PinchStarted => {
                    self.click.begin(now_ms, pos);
                    frame.lock |= self.begin_session(pos);
                }
                GestureEvent::PinchEnded { cause } | GestureEvent::Released { cause } => {
                    let manipulated = match self.session {
                        Manipulation::Drag { committed, .. }
                        | Manipulation::Resize { committed, .. } => committed,
                        Manipulation::Idle => false,
                    };
                    self.session = Manipulation::Idle;
                    if !cause.is_intentional() {
                        self.click.abandon();
                        continue;
                    }
                    if let Some(kind) = self.click.finish(now_ms, pos, manipulated, &self.config) {
                        self.dispatch_click(pos, kind, &mut frame.events);
                    }
                }
                GestureEvent::Locked => {}
            }
        }

        if pointer.is_pinching() {
            self.update_session(pos);
        }
        if pointer.visible && self.session == Manipulation::Idle {
            if let Some(e) = self.tilt_scroll(pos, pointer.tilt) {
                frame.events.push(e);
            }
        }
        frame
    }

    /// Hit-test a pinch start.  Returns true if a session started.
    fn begin_session(&mut self, p: Vec2) -> bool {
        let vp = self.viewport;
        let Some(hit) = self.hit_order().into_iter().find(|&id| {
            self.panel(id).map_or(false, |panel| {
                panel.on_resize_handle(p, vp, &self.config)
                    || panel.effective_rect(vp, &self.config).contains(p)
            })
        }) else {
            return false;
        };
        let Some(panel) = self.panel(hit).cloned() else {
            return false;
        };

        if panel.on_resize_handle(p, vp, &self.config) {
            debug!(panel_id = hit, "resize started");
            self.session = Manipulation::Resize {
                panel: hit,
                pointer_start: p,
                start: panel.rect,
                committed: false,
            };
            self.raise(hit);
            return true;
        }
        // Controls consume the pinch; they act on release as a click.
        if panel.control_at(p, vp, &self.config).is_some() {
            return false;
        }
        if panel.header_rect(vp, &self.config).contains(p) && !panel.maximized {
            debug!(panel_id = hit, "drag started");
            self.session = Manipulation::Drag {
                panel: hit,
                pointer_start: p,
                origin: Vec2::new(panel.rect.x, panel.rect.y),
                committed: false,
            };
            self.raise(hit);
            return true;
        }
        false
    }

    fn update_session(&mut self, p: Vec2) {
        let (id, pointer_start) = match self.session {
            Manipulation::Idle => return,
            Manipulation::Drag {
                panel,
                pointer_start,
                ..
            }
            | Manipulation::Resize {
                panel,
                pointer_start,
                ..
            } => (panel, pointer_start),
        };
        let delta = p - pointer_start;
        let past_deadzone = delta.length() > self.config.drag_deadzone_px;
        let vp = self.viewport;
        let (min_w, min_h) = (self.config.min_width, self.config.min_height);
        let header = self.config.header_height;

        match &mut self.session {
            Manipulation::Drag { committed, .. } | Manipulation::Resize { committed, .. } => {
                if !*committed && past_deadzone {
                    *committed = true;
                    debug!(panel_id = id, "manipulation committed");
                }
                if !*committed {
                    return;
                }
            }
            Manipulation::Idle => return,
        }

        match self.session {
            Manipulation::Drag { origin, .. } => {
                let Some(panel) = self.panel_mut(id) else {
                    return;
                };
                let w = panel.rect.width;
                // Keep part of the header on screen.
                let min_x = -(w - 100.0).max(0.0);
                let max_x = (vp.width - 100.0).max(min_x);
                let max_y = (vp.height - header).max(0.0);
                panel.rect.x = clamp_finite(origin.x + delta.x, min_x, max_x, origin.x);
                panel.rect.y = clamp_finite(origin.y + delta.y, 0.0, max_y, origin.y);
            }
            Manipulation::Resize { start, .. } => {
                let Some(panel) = self.panel_mut(id) else {
                    return;
                };
                let w = clamp_finite(start.width + delta.x, min_w, f32::MAX, start.width);
                let h = clamp_finite(start.height - delta.y, min_h, f32::MAX, start.height);
                panel.rect.width = w;
                panel.rect.height = h;
                // Bottom edge stays put.
                panel.rect.y = start.y + start.height - h;
            }
            Manipulation::Idle => {}
        }
    }

    fn dispatch_click(&mut self, p: Vec2, kind: ClickKind, out: &mut Vec<PanelEvent>) {
        let vp = self.viewport;
        if self.config.new_panel_button(vp).contains(p) {
            let id = self.create(None);
            out.push(PanelEvent::Created { id });
            return;
        }
        let Some(id) = self.hit_order().into_iter().find(|&id| {
            self.panel(id)
                .map_or(false, |panel| panel.effective_rect(vp, &self.config).contains(p))
        }) else {
            return;
        };
        let Some(panel) = self.panel(id).cloned() else {
            return;
        };

        if let Some(control) = panel.control_at(p, vp, &self.config) {
            debug!(panel_id = id, control = control.as_str(), "header control");
            out.push(PanelEvent::ControlClicked { id, control });
            match control {
                HeaderControl::Close => {
                    if self.close(id) {
                        out.push(PanelEvent::Closed { id });
                    }
                }
                HeaderControl::Maximize => {
                    self.raise(id);
                    self.toggle_maximize(id);
                }
                HeaderControl::Collapse => {
                    self.raise(id);
                    self.toggle_collapse(id);
                }
                HeaderControl::Reload => {
                    self.raise(id);
                    if let Some(panel) = self.panel_mut(id) {
                        panel.reload();
                    }
                }
            }
            return;
        }

        self.raise(id);
        if panel.search_rect(vp, &self.config).contains(p) {
            if let Some(panel) = self.panel_mut(id) {
                panel.listening = true;
            }
            debug!(panel_id = id, "search requested");
            out.push(PanelEvent::SearchRequested { id });
        } else if !panel.header_rect(vp, &self.config).contains(p) {
            let r = panel.effective_rect(vp, &self.config);
            out.push(PanelEvent::ContentClicked {
                id,
                position: Vec2::new(p.x - r.x, p.y - r.y),
                kind,
            });
        }
    }

    /// Scroll the panel under the pointer when the palm is tilted past the
    /// threshold.
    fn tilt_scroll(&mut self, p: Vec2, tilt: f32) -> Option<PanelEvent> {
        if !tilt.is_finite() || tilt.abs() <= self.config.tilt_scroll_threshold {
            return None;
        }
        let vp = self.viewport;
        let id = self.hit_order().into_iter().find(|&id| {
            self.panel(id)
                .map_or(false, |panel| panel.effective_rect(vp, &self.config).contains(p))
        })?;
        let delta = tilt * self.config.tilt_scroll_speed;
        self.scroll(id, delta)
    }

    fn scroll(&mut self, id: PanelId, delta: f32) -> Option<PanelEvent> {
        let panel = self.panel_mut(id)?;
        panel.scroll_y = (panel.scroll_y + delta).max(0.0);
        Some(PanelEvent::Scrolled { id, delta })
    }

    /// Resolve a 1-based creation-order index, defaulting to the focused
    /// panel.
    pub fn resolve_target(&self, target: Option<usize>) -> Option<PanelId> {
        match target {
            Some(n) => n
                .checked_sub(1)
                .and_then(|i| self.panels.get(i))
                .map(|p| p.id),
            None => self.focused(),
        }
    }

    /// Apply one command intent.  Unresolvable targets are no-ops.
    pub fn apply_intent(&mut self, intent: &Intent) -> Vec<PanelEvent> {
        let mut out = Vec::new();
        let resolve = |mgr: &Self, target: Option<usize>| {
            let id = mgr.resolve_target(target);
            if id.is_none() {
                debug!(intent = intent.name(), ?target, "intent target not found");
            }
            id
        };

        match intent {
            Intent::OpenPanel { url } => {
                let url = url.as_deref().map(navigation_url);
                let id = self.create(url);
                out.push(PanelEvent::Created { id });
            }
            Intent::ClosePanel { target } => {
                if let Some(id) = resolve(self, *target) {
                    if self.close(id) {
                        out.push(PanelEvent::Closed { id });
                    }
                }
            }
            Intent::SwitchPanel { target } => {
                if let Some(id) = resolve(self, Some(*target)) {
                    self.raise(id);
                }
            }
            Intent::Minimize { target } => {
                if let Some(panel) = resolve(self, *target).and_then(|id| self.panel_mut(id)) {
                    panel.collapsed = true;
                    panel.maximized = false;
                }
            }
            Intent::Maximize { target } => {
                if let Some(id) = resolve(self, *target) {
                    self.raise(id);
                    self.set_maximized(id, true);
                }
            }
            Intent::Navigate { target, url } => {
                if let Some(id) = resolve(self, *target) {
                    out.extend(self.navigate(id, navigation_url(url)));
                }
            }
            Intent::Search { target, query } => {
                if let Some(id) = resolve(self, *target) {
                    let url = self.config.search_url(query);
                    out.extend(self.navigate(id, url));
                }
            }
            Intent::Scroll { direction } => {
                if let Some(id) = resolve(self, None) {
                    let delta = direction.sign() * self.config.intent_scroll_step_px;
                    out.extend(self.scroll(id, delta));
                }
            }
            Intent::GoHome { target } => {
                if let Some(id) = resolve(self, *target) {
                    let home = self.config.home_url.clone();
                    out.extend(self.navigate(id, home));
                }
            }
            Intent::Stop => {
                for p in &mut self.panels {
                    p.listening = false;
                }
                out.push(PanelEvent::ListeningStopped);
            }
        }
        info!(intent = intent.name(), events = out.len(), "intent applied");
        out
    }

    /// Submit text typed (or dictated) into a panel's search box.
    pub fn submit_input(&mut self, id: PanelId, text: &str) -> Option<PanelEvent> {
        if text.trim().is_empty() {
            return None;
        }
        let url = self.config.resolve_input(text);
        self.navigate(id, url)
    }

    fn navigate(&mut self, id: PanelId, url: String) -> Option<PanelEvent> {
        let panel = self.panel_mut(id)?;
        panel.navigate(url.clone());
        debug!(panel_id = id, url = %url, "panel navigated");
        Some(PanelEvent::Navigated { id, url })
    }

    /// Generate s-expression for IPC panel listing.
    pub fn list_sexp(&self) -> String {
        let items: Vec<String> = self.panels.iter().map(|p| p.to_sexp()).collect();
        format!(
            "(:focused {} :session {} :panels ({}))",
            self.focused().map_or("nil".to_string(), |id| id.to_string()),
            match self.session {
                Manipulation::Idle => ":idle",
                Manipulation::Drag { .. } => ":drag",
                Manipulation::Resize { .. } => ":resize",
            },
            items.join(" ")
        )
    }

    fn hit_order(&self) -> Vec<PanelId> {
        let mut ordered: Vec<&Panel> = self.panels.iter().collect();
        ordered.sort_by(|a, b| b.z.cmp(&a.z));
        ordered.into_iter().map(|p| p.id).collect()
    }

    fn index_of(&self, id: PanelId) -> Option<usize> {
        self.panels.iter().position(|p| p.id == id)
    }

    fn panel_mut(&mut self, id: PanelId) -> Option<&mut Panel> {
        self.panels.iter_mut().find(|p| p.id == id)
    }

    fn bump_z(&mut self) -> u64 {
        let z = self.next_z;
        self.next_z += 1;
        z
    }

    #[cfg(test)]
    pub(crate) fn place(&mut self, id: PanelId, rect: Rect) {
        if let Some(p) = self.panel_mut(id) {
            p.rect = rect;
        }
    }
}

/// Bare host names get an https scheme; anything with a scheme is kept.
fn navigation_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}
