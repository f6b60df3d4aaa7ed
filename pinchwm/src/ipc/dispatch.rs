//! IPC message dispatch: parse s-expressions and route to handlers.

use lexpr::Value;
use tracing::{debug, info, warn};

use crate::detector::{parse_points, DetectorStatus};
use crate::engine::{CameraState, Command, EngineEvent, Surface};
use crate::geometry::Vec2;
use crate::panels::Intent;
use crate::physics::BodyKind;
use crate::sexp::{escape_string, get_bool, get_float, get_int, get_keyword, get_string, plist_get};
use crate::state::PinchState;

/// Protocol version spoken by this server.
pub const PROTOCOL_VERSION: i64 = 1;

/// Parse an s-expression message and dispatch to the appropriate handler.
/// Returns an optional response string (s-expression).
pub fn handle_message(state: &mut PinchState, client_id: u64, raw: &str) -> Option<String> {
    let value = match lexpr::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(client_id, "malformed s-expression: {}", e);
            return Some(error_response(0, &format!("malformed s-expression: {e}")));
        }
    };

    let msg_type = get_keyword(&value, "type");
    let msg_id = get_int(&value, "id").unwrap_or(0);

    let is_authenticated = state
        .ipc_server
        .clients
        .get(&client_id)
        .map_or(false, |c| c.authenticated);

    match msg_type.as_deref() {
        Some("hello") => handle_hello(state, client_id, msg_id, &value),
        _ if !is_authenticated => Some(error_response(msg_id, "hello handshake required")),
        Some("ping") => handle_ping(state, msg_id, &value),
        // Detector boundary
        Some("landmark-frame") => handle_landmark_frame(state, msg_id, &value),
        Some("detector-status") => handle_detector_status(state, msg_id, &value),
        // Surfaces and intents
        Some("intent") => handle_intent(state, msg_id, &value),
        Some("surface-set") => handle_surface_set(state, msg_id, &value),
        Some("surface-status") => handle_surface_status(state, msg_id),
        // Queries
        Some("pointer-state") => handle_pointer_state(state, msg_id),
        Some("snapshot") => handle_snapshot(state, msg_id),
        Some("engine-timing") => handle_engine_timing(state, msg_id),
        // Gesture tuning
        Some("gesture-status") => handle_gesture_status(state, msg_id),
        Some("gesture-config") => handle_gesture_config(state, msg_id, &value),
        Some("stabilizer-config") => handle_stabilizer_config(state, msg_id, &value),
        // Physics
        Some("physics-status") => handle_physics_status(state, msg_id),
        Some("physics-spawn") => handle_physics_spawn(state, msg_id, &value),
        Some("physics-delete") => handle_physics_delete(state, msg_id, &value),
        Some("physics-reset") => handle_physics_reset(state, msg_id),
        // Panels
        Some("panel-list") => handle_panel_list(state, msg_id),
        Some("panel-input") => handle_panel_input(state, msg_id, &value),
        Some("panel-config") => handle_panel_config(state, msg_id, &value),
        // IPC security
        Some("ipc-client-info") => handle_ipc_client_info(state, client_id, msg_id),
        Some("ipc-rate-limit") => handle_ipc_rate_limit(state, client_id, msg_id, &value),
        Some(other) => Some(error_response(
            msg_id,
            &format!("unknown message type: {other}"),
        )),
        None => Some(error_response(msg_id, "missing :type field")),
    }
}

// ── Handlers ────────────────────────────────────────────────

fn handle_hello(
    state: &mut PinchState,
    client_id: u64,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    let version = get_int(value, "version").unwrap_or(0);
    if version != PROTOCOL_VERSION {
        return Some(error_response(
            msg_id,
            &format!("unsupported protocol version: {version}"),
        ));
    }

    // SO_PEERCRED: only the user running the engine may drive it.
    if let Some(client) = state.ipc_server.clients.get(&client_id) {
        if let Some(peer_uid) = client.peer_uid {
            let our_uid = unsafe { libc::getuid() };
            if peer_uid != our_uid {
                warn!(client_id, peer_uid, our_uid, "rejecting client: UID mismatch");
                return Some(error_response(msg_id, "authentication failed: UID mismatch"));
            }
        }
    }

    let client_name = get_string(value, "client").unwrap_or_default();
    debug!(client_id, client_name, "hello handshake (authenticated)");

    let peer_pid = match state.ipc_server.clients.get_mut(&client_id) {
        Some(client) => {
            client.authenticated = true;
            client.peer_pid
        }
        None => None,
    };

    let pid_field = peer_pid
        .map(|p| format!(" :peer-pid {}", p))
        .unwrap_or_default();
    Some(format!(
        "(:type :hello :id {} :version {} :server \"pinchwm\" :surface :{} :source :{}{})",
        msg_id,
        PROTOCOL_VERSION,
        state.engine.surface().as_str(),
        state.source_name(),
        pid_field
    ))
}

fn handle_ping(state: &mut PinchState, msg_id: i64, value: &Value) -> Option<String> {
    let client_ts = get_int(value, "timestamp").unwrap_or(0);
    let server_ts = state.clock.unix_millis();

    Some(format!(
        "(:type :response :id {} :status :ok :client-timestamp {} :server-timestamp {})",
        msg_id, client_ts, server_ts
    ))
}

/// Frames stream at camera rate, so success is silent unless the sender
/// asked for an acknowledgement with `:id`.
fn handle_landmark_frame(state: &mut PinchState, msg_id: i64, value: &Value) -> Option<String> {
    let frame = if get_bool(value, "absent") == Some(true) {
        None
    } else {
        let Some(points) = plist_get(value, "points") else {
            return Some(error_response(msg_id, "missing :points or :absent"));
        };
        match parse_points(points) {
            Ok(frame) => Some(frame),
            Err(reason) => {
                debug!(reason = %reason, "rejecting landmark frame");
                return Some(error_response(msg_id, &reason));
            }
        }
    };
    state.source.slot_mut().publish(frame);

    if plist_get(value, "id").is_some() {
        Some(ok_response(msg_id))
    } else {
        None
    }
}

fn handle_detector_status(state: &mut PinchState, msg_id: i64, value: &Value) -> Option<String> {
    let status = match get_keyword(value, "status").as_deref().and_then(DetectorStatus::parse) {
        Some(s) => s,
        None => return Some(error_response(msg_id, "missing or invalid :status (ok, unavailable, denied)")),
    };
    let reason = get_string(value, "reason").unwrap_or_default();
    state.source.slot_mut().set_status(status, reason);

    // An explicit :ok after a denial is the user re-granting the camera.
    if status == DetectorStatus::Ok && state.engine.camera() == CameraState::Denied {
        state.engine.enqueue(Command::RestoreCamera);
    }
    Some(format!(
        "(:type :response :id {} :status :ok :detector :{} :camera :{})",
        msg_id,
        status.as_str(),
        state.engine.camera().as_str()
    ))
}

fn handle_intent(state: &mut PinchState, msg_id: i64, value: &Value) -> Option<String> {
    let name = match get_keyword(value, "intent") {
        Some(n) => n,
        None => return Some(error_response(msg_id, "missing :intent")),
    };
    let target = match get_int(value, "target") {
        Some(t) if t < 1 => return Some(error_response(msg_id, ":target is 1-based")),
        Some(t) => Some(t as usize),
        None => None,
    };
    let direction = get_keyword(value, "direction");
    let intent = Intent::from_parts(
        &name,
        target,
        get_string(value, "url"),
        get_string(value, "query"),
        direction.as_deref(),
    );
    let Some(intent) = intent else {
        return Some(error_response(
            msg_id,
            &format!("unknown intent or missing argument: {name}"),
        ));
    };

    info!(intent = intent.name(), "intent queued");
    state.engine.enqueue(Command::Intent(intent));
    Some(format!(
        "(:type :response :id {} :status :ok :intent :{} :queued t)",
        msg_id, name
    ))
}

fn handle_surface_set(state: &mut PinchState, msg_id: i64, value: &Value) -> Option<String> {
    let surface = match get_keyword(value, "surface").as_deref().and_then(Surface::parse) {
        Some(s) => s,
        None => return Some(error_response(msg_id, "missing or invalid :surface (shapes, tools, panels)")),
    };
    state.engine.enqueue(Command::SetSurface(surface));
    Some(format!(
        "(:type :response :id {} :status :ok :surface :{} :queued t)",
        msg_id,
        surface.as_str()
    ))
}

fn handle_surface_status(state: &mut PinchState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :surface-status {})",
        msg_id,
        state.engine.surface_sexp()
    ))
}

fn handle_pointer_state(state: &mut PinchState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :pointer {})",
        msg_id,
        state.engine.pointer().status_sexp()
    ))
}

fn handle_snapshot(state: &mut PinchState, msg_id: i64) -> Option<String> {
    let snapshot = state
        .engine
        .last_snapshot()
        .map_or_else(|| "nil".to_string(), |s| s.to_sexp());
    Some(format!(
        "(:type :response :id {} :status :ok :snapshot {})",
        msg_id, snapshot
    ))
}

fn handle_engine_timing(state: &mut PinchState, msg_id: i64) -> Option<String> {
    let slot = state.source.slot();
    Some(format!(
        "(:type :response :id {} :status :ok :timing {} :frames-received {} :frames-overwritten {})",
        msg_id,
        state.timing.stats_sexp(),
        slot.received(),
        slot.overwritten()
    ))
}

fn handle_gesture_status(state: &mut PinchState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :active :{} :pinch {} :grip {})",
        msg_id,
        if state.engine.surface().uses_grip() { "grip" } else { "pinch" },
        state.engine.pinch_gesture().status_sexp(),
        state.engine.grip_gesture().status_sexp()
    ))
}

fn handle_gesture_config(state: &mut PinchState, msg_id: i64, value: &Value) -> Option<String> {
    {
        let pinch = state.engine.pinch_config_mut();
        if let Some(v) = get_float(value, "grab-threshold") {
            pinch.grab_threshold = v as f32;
        }
        if let Some(v) = get_float(value, "release-threshold") {
            pinch.release_threshold = v as f32;
        }
        if let Some(v) = get_float(value, "panic-threshold") {
            pinch.panic_threshold = v as f32;
        }
        if let Some(v) = get_int(value, "debounce-frames") {
            pinch.debounce_frames = v.clamp(1, 600) as u32;
        }
        if plist_get(value, "fast-motion-px").is_some() {
            pinch.fast_motion_px = get_float(value, "fast-motion-px").map(|v| v as f32);
        }
        pinch.sanitize();
    }
    {
        let grip = state.engine.grip_config_mut();
        if let Some(v) = get_float(value, "grip-grab-threshold") {
            grip.grab_threshold = v as f32;
        }
        if let Some(v) = get_float(value, "grip-release-threshold") {
            grip.release_threshold = v as f32;
        }
        grip.sanitize();
    }
    debug!("gesture config updated");

    let pinch = state.engine.pinch_config_mut().config_sexp();
    let grip = state.engine.grip_config_mut().config_sexp();
    Some(format!(
        "(:type :response :id {} :status :ok :pinch {} :grip {})",
        msg_id, pinch, grip
    ))
}

fn handle_stabilizer_config(state: &mut PinchState, msg_id: i64, value: &Value) -> Option<String> {
    let config = state.engine.stabilizer_config_mut();
    if let Some(v) = get_float(value, "min-alpha-panels") {
        config.min_alpha_precise = v as f32;
    }
    if let Some(v) = get_float(value, "min-alpha-physics") {
        config.min_alpha_physics = v as f32;
    }
    if let Some(v) = get_float(value, "max-alpha") {
        config.max_alpha = v as f32;
    }
    if let Some(v) = get_int(value, "miss-tolerance") {
        config.miss_tolerance_frames = v.clamp(0, 600) as u32;
    }
    config.sanitize();
    Some(format!(
        "(:type :response :id {} :status :ok :stabilizer {})",
        msg_id,
        config.config_sexp()
    ))
}

fn handle_physics_status(state: &mut PinchState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :surface :{} :shapes {} :tools {})",
        msg_id,
        state.engine.surface().as_str(),
        state.engine.shapes().status_sexp(),
        state.engine.tools().status_sexp()
    ))
}

fn handle_physics_spawn(state: &mut PinchState, msg_id: i64, value: &Value) -> Option<String> {
    let kind = match get_keyword(value, "kind").as_deref().and_then(BodyKind::parse) {
        Some(k) => k,
        None => return Some(error_response(msg_id, "missing or invalid :kind")),
    };
    let position = match (get_float(value, "x"), get_float(value, "y")) {
        (Some(x), Some(y)) => Some(Vec2::new(x as f32, y as f32)),
        (None, None) => None,
        _ => return Some(error_response(msg_id, ":x and :y must be given together")),
    };
    state.engine.enqueue(Command::SpawnBody { kind, position });
    Some(format!(
        "(:type :response :id {} :status :ok :kind :{} :queued t)",
        msg_id,
        kind.as_str()
    ))
}

fn handle_physics_delete(state: &mut PinchState, msg_id: i64, value: &Value) -> Option<String> {
    let id = match get_int(value, "body") {
        Some(id) if id >= 0 => id as u64,
        _ => return Some(error_response(msg_id, "missing :body")),
    };
    let exists = state.engine.shapes().body(id).is_some() || state.engine.tools().body(id).is_some();
    if !exists {
        return Some(error_response(msg_id, &format!("no such body: {id}")));
    }
    state.engine.enqueue(Command::DeleteBody(id));
    Some(ok_response(msg_id))
}

fn handle_physics_reset(state: &mut PinchState, msg_id: i64) -> Option<String> {
    state.engine.enqueue(Command::ResetPhysics);
    Some(ok_response(msg_id))
}

fn handle_panel_list(state: &mut PinchState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :panels {})",
        msg_id,
        state.engine.panels().list_sexp()
    ))
}

fn handle_panel_input(state: &mut PinchState, msg_id: i64, value: &Value) -> Option<String> {
    let id = match get_int(value, "panel") {
        Some(id) if id >= 0 => id as u64,
        _ => return Some(error_response(msg_id, "missing :panel")),
    };
    let text = match get_string(value, "text") {
        Some(t) => t,
        None => return Some(error_response(msg_id, "missing :text")),
    };
    if state.engine.panels().panel(id).is_none() {
        return Some(error_response(msg_id, &format!("no such panel: {id}")));
    }
    state.engine.enqueue(Command::PanelInput { id, text });
    Some(ok_response(msg_id))
}

fn handle_panel_config(state: &mut PinchState, msg_id: i64, value: &Value) -> Option<String> {
    let config = state.engine.panel_config_mut();
    if let Some(v) = get_float(value, "tilt-scroll-threshold") {
        config.tilt_scroll_threshold = (v as f32).max(0.0);
    }
    if let Some(v) = get_float(value, "tilt-scroll-speed") {
        config.tilt_scroll_speed = v as f32;
    }
    if let Some(v) = get_float(value, "drag-deadzone") {
        config.drag_deadzone_px = (v as f32).max(0.0);
    }
    if let Some(v) = get_float(value, "double-click-ms") {
        config.double_click_window_ms = v.max(0.0);
    }
    if let Some(url) = get_string(value, "home-url") {
        config.home_url = url;
    }
    if let Some(prefix) = get_string(value, "search-url-prefix") {
        config.search_url_prefix = prefix;
    }
    Some(format!(
        "(:type :response :id {} :status :ok :panel-config {} :home-url \"{}\")",
        msg_id,
        config.config_sexp(),
        escape_string(&config.home_url)
    ))
}

fn handle_ipc_client_info(state: &mut PinchState, client_id: u64, msg_id: i64) -> Option<String> {
    if let Some(client) = state.ipc_server.clients.get(&client_id) {
        let uid = client.peer_uid.map_or_else(|| "nil".to_string(), |u| u.to_string());
        let pid = client.peer_pid.map_or_else(|| "nil".to_string(), |p| p.to_string());
        Some(format!(
            "(:type :response :id {} :status :ok :client-id {} :peer-uid {} :peer-pid {} :authenticated t :rate-limit {} :dropped-events {})",
            msg_id, client_id, uid, pid, client.rate_limiter.max_per_second, client.dropped_events
        ))
    } else {
        Some(error_response(msg_id, "client not found"))
    }
}

fn handle_ipc_rate_limit(
    state: &mut PinchState,
    client_id: u64,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    let new_limit = match get_int(value, "limit") {
        Some(n) if n > 0 && n <= 10000 => n as u32,
        Some(_) => return Some(error_response(msg_id, "limit must be 1-10000")),
        None => return Some(error_response(msg_id, "missing :limit parameter")),
    };

    if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
        client.rate_limiter.max_per_second = new_limit;
        debug!(client_id, new_limit, "rate limit updated");
    }
    Some(ok_response(msg_id))
}

// ── Helpers ────────────────────────────────────────────────

pub fn ok_response(id: i64) -> String {
    format!("(:type :response :id {} :status :ok)", id)
}

pub fn error_response(id: i64, reason: &str) -> String {
    format!(
        "(:type :response :id {} :status :error :reason \"{}\")",
        id,
        escape_string(reason)
    )
}

/// Format an IPC event s-expression.
pub fn format_event(event_type: &str, fields: &[(&str, &str)]) -> String {
    let mut s = format!("(:type :event :event :{}", event_type);
    for (key, val) in fields {
        s.push_str(&format!(" :{} {}", key, val));
    }
    s.push(')');
    s
}

/// Render an engine event for broadcast.
pub fn format_engine_event(event: &EngineEvent) -> String {
    let fields = event.fields();
    let borrowed: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
    format_event(event.name(), &borrowed)
}
