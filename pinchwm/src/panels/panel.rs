//! Panel geometry, header controls, and content references.

use crate::config::{
    Viewport, CLICK_MAX_DURATION_MS, CLICK_MAX_TRAVEL_PX, CONTROL_BUTTON_WIDTH,
    DOUBLE_CLICK_WINDOW_MS, DRAG_DEADZONE_PX, HEADER_HEIGHT, HOME_URL, INTENT_SCROLL_STEP_PX,
    MIN_PANEL_HEIGHT, MIN_PANEL_WIDTH, NEW_PANEL_CASCADE_PX, NEW_PANEL_HEIGHT,
    NEW_PANEL_ORIGIN_FRACTION, NEW_PANEL_WIDTH, RESIZE_HANDLE_RADIUS, SEARCH_URL_PREFIX,
    TILT_SCROLL_SPEED, TILT_SCROLL_THRESHOLD,
};
use crate::geometry::{Rect, Vec2};
use crate::sexp::{bool_atom, escape_string};

/// Panel identifier.
pub type PanelId = u64;

/// Panel manager configuration.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub header_height: f32,
    pub resize_handle_radius: f32,
    pub drag_deadzone_px: f32,
    pub min_width: f32,
    pub min_height: f32,
    pub click_max_duration_ms: f64,
    pub click_max_travel_px: f32,
    pub double_click_window_ms: f64,
    pub control_button_width: f32,
    pub new_panel_width: f32,
    pub new_panel_height: f32,
    pub cascade_px: f32,
    pub tilt_scroll_threshold: f32,
    pub tilt_scroll_speed: f32,
    pub intent_scroll_step_px: f32,
    pub home_url: String,
    pub search_url_prefix: String,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            header_height: HEADER_HEIGHT,
            resize_handle_radius: RESIZE_HANDLE_RADIUS,
            drag_deadzone_px: DRAG_DEADZONE_PX,
            min_width: MIN_PANEL_WIDTH,
            min_height: MIN_PANEL_HEIGHT,
            click_max_duration_ms: CLICK_MAX_DURATION_MS,
            click_max_travel_px: CLICK_MAX_TRAVEL_PX,
            double_click_window_ms: DOUBLE_CLICK_WINDOW_MS,
            control_button_width: CONTROL_BUTTON_WIDTH,
            new_panel_width: NEW_PANEL_WIDTH,
            new_panel_height: NEW_PANEL_HEIGHT,
            cascade_px: NEW_PANEL_CASCADE_PX,
            tilt_scroll_threshold: TILT_SCROLL_THRESHOLD,
            tilt_scroll_speed: TILT_SCROLL_SPEED,
            intent_scroll_step_px: INTENT_SCROLL_STEP_PX,
            home_url: HOME_URL.to_string(),
            search_url_prefix: SEARCH_URL_PREFIX.to_string(),
        }
    }
}

impl PanelConfig {
    /// The fixed "new panel" button in the top-right of the viewport.
    pub fn new_panel_button(&self, viewport: Viewport) -> Rect {
        Rect::new(viewport.width - 80.0, 30.0, 60.0, 60.0)
    }

    /// Where the `n`-th concurrently open panel is placed.
    pub fn cascade_origin(&self, viewport: Viewport, n: usize) -> Vec2 {
        let offset = self.cascade_px * n as f32;
        Vec2::new(
            viewport.width * NEW_PANEL_ORIGIN_FRACTION + offset,
            viewport.height * NEW_PANEL_ORIGIN_FRACTION + offset,
        )
    }

    /// Turn free text into a URL: text starting with "http" is used as-is,
    /// anything else becomes a search.
    pub fn resolve_input(&self, text: &str) -> String {
        let text = text.trim();
        if text.starts_with("http") {
            text.to_string()
        } else {
            self.search_url(text)
        }
    }

    pub fn search_url(&self, query: &str) -> String {
        format!("{}{}", self.search_url_prefix, encode_query(query.trim()))
    }

    /// Generate s-expression for IPC config.
    pub fn config_sexp(&self) -> String {
        format!(
            "(:header-height {:.0} :resize-handle-radius {:.0} :drag-deadzone {:.0} :min-width {:.0} :min-height {:.0} :click-max-ms {:.0} :click-max-travel {:.0} :double-click-ms {:.0} :tilt-scroll-threshold {:.2})",
            self.header_height,
            self.resize_handle_radius,
            self.drag_deadzone_px,
            self.min_width,
            self.min_height,
            self.click_max_duration_ms,
            self.click_max_travel_px,
            self.double_click_window_ms,
            self.tilt_scroll_threshold,
        )
    }
}

/// Header buttons, listed right-to-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderControl {
    Close,
    Maximize,
    Collapse,
    Reload,
}

impl HeaderControl {
    /// Hit-test order, rightmost first.
    pub const RIGHT_TO_LEFT: [HeaderControl; 4] =
        [Self::Close, Self::Maximize, Self::Collapse, Self::Reload];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Maximize => "maximize",
            Self::Collapse => "collapse",
            Self::Reload => "reload",
        }
    }
}

/// A rectangular, z-ordered content panel.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub id: PanelId,
    /// Restored geometry; maximize/collapse are applied on top.
    pub rect: Rect,
    pub z: u64,
    pub maximized: bool,
    pub collapsed: bool,
    /// Opaque content reference.
    pub url: String,
    /// Bumped to force the host to reload content.
    pub render_generation: u64,
    /// The header search box is waiting for input.
    pub listening: bool,
    /// Accumulated scroll offset requested for the content.
    pub scroll_y: f32,
}

impl Panel {
    pub fn new(id: PanelId, rect: Rect, z: u64, url: String) -> Self {
        Self {
            id,
            rect,
            z,
            maximized: false,
            collapsed: false,
            url,
            render_generation: 0,
            listening: false,
            scroll_y: 0.0,
        }
    }

    /// Geometry as currently displayed.
    pub fn effective_rect(&self, viewport: Viewport, config: &PanelConfig) -> Rect {
        let base = if self.maximized {
            Rect::new(0.0, 0.0, viewport.width, viewport.height)
        } else {
            self.rect
        };
        if self.collapsed {
            Rect::new(base.x, base.y, base.width, config.header_height)
        } else {
            base
        }
    }

    pub fn header_rect(&self, viewport: Viewport, config: &PanelConfig) -> Rect {
        let r = self.effective_rect(viewport, config);
        Rect::new(r.x, r.y, r.width, config.header_height.min(r.height))
    }

    /// Search/URL box inside the header.
    pub fn search_rect(&self, viewport: Viewport, config: &PanelConfig) -> Rect {
        let r = self.effective_rect(viewport, config);
        Rect::new(r.x + 50.0, r.y + 8.0, (r.width - 240.0).max(0.0), 32.0)
    }

    /// Header button under `p`, if any.  Buttons are laid out right-to-left
    /// from the header's right edge.
    pub fn control_at(&self, p: Vec2, viewport: Viewport, config: &PanelConfig) -> Option<HeaderControl> {
        let header = self.header_rect(viewport, config);
        if !header.contains(p) {
            return None;
        }
        let from_right = header.right() - p.x;
        HeaderControl::RIGHT_TO_LEFT
            .iter()
            .enumerate()
            .find(|(i, _)| from_right < config.control_button_width * (*i as f32 + 1.0))
            .map(|(_, c)| *c)
    }

    /// Whether `p` is on the top-right resize handle.
    pub fn on_resize_handle(&self, p: Vec2, viewport: Viewport, config: &PanelConfig) -> bool {
        if self.maximized {
            return false;
        }
        let corner = self.effective_rect(viewport, config).top_right();
        corner.distance(p) <= config.resize_handle_radius
    }

    /// Point the panel at new content and force a reload.
    pub fn navigate(&mut self, url: String) {
        self.url = url;
        self.scroll_y = 0.0;
        self.listening = false;
        self.render_generation += 1;
    }

    pub fn reload(&mut self) {
        self.render_generation += 1;
    }

    /// Generate s-expression for IPC.
    pub fn to_sexp(&self) -> String {
        format!(
            "(:id {} :x {:.1} :y {:.1} :width {:.1} :height {:.1} :z {} :maximized {} :collapsed {} :listening {} :url \"{}\" :generation {} :scroll {:.0})",
            self.id,
            self.rect.x,
            self.rect.y,
            self.rect.width,
            self.rect.height,
            self.z,
            bool_atom(self.maximized),
            bool_atom(self.collapsed),
            bool_atom(self.listening),
            escape_string(&self.url),
            self.render_generation,
            self.scroll_y,
        )
    }
}

/// Percent-encode a query component.  Leaves `A-Z a-z 0-9 - _ . ! ~ * ' ( )`
/// untouched and escapes every other UTF-8 byte.
pub fn encode_query(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
