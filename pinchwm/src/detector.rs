//! Landmark detector boundary.
//!
//! The vision model itself is external.  Frames reach the engine either
//! through the IPC latest-frame slot or from a replay file; both implement
//! `LandmarkSource` and are polled once per tick.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use lexpr::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::sexp::{as_number, get_bool, get_string, is_nil, list_items, plist_get};
use crate::tracking::landmarks::{LandmarkFrame, LANDMARK_COUNT};

/// Why a tick produced no usable detection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectionError {
    /// Detector missing, erroring or stalled; treated as a missed frame.
    #[error("detector unavailable: {0}")]
    Unavailable(String),
    /// The camera was refused.  Terminal until explicitly cleared.
    #[error("camera access denied")]
    CameraDenied,
}

/// Errors loading a replay file.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// One tick's detector output.
pub type Detection = Result<Option<LandmarkFrame>, DetectionError>;

/// Anything that yields one detection per tick.
pub trait LandmarkSource {
    fn poll(&mut self) -> Detection;
    fn name(&self) -> &'static str;
}

/// Health reported by the external detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorStatus {
    Ok,
    Unavailable,
    Denied,
}

impl DetectorStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(Self::Ok),
            "unavailable" => Some(Self::Unavailable),
            "denied" => Some(Self::Denied),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Unavailable => "unavailable",
            Self::Denied => "denied",
        }
    }
}

/// Single-slot mailbox fed by IPC.  A newer frame overwrites an unconsumed
/// one; frames are never queued.
#[derive(Debug)]
pub struct LatestFrameSlot {
    pending: Option<Option<LandmarkFrame>>,
    status: DetectorStatus,
    reason: String,
    received: u64,
    overwritten: u64,
}

impl Default for LatestFrameSlot {
    fn default() -> Self {
        Self {
            pending: None,
            status: DetectorStatus::Ok,
            reason: String::new(),
            received: 0,
            overwritten: 0,
        }
    }
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the newest detection (`None` = no hand).
    pub fn publish(&mut self, frame: Option<LandmarkFrame>) {
        if self.pending.is_some() {
            self.overwritten += 1;
        }
        self.received += 1;
        self.pending = Some(frame);
    }

    pub fn set_status(&mut self, status: DetectorStatus, reason: impl Into<String>) {
        if status != self.status {
            info!(status = status.as_str(), "detector status changed");
        }
        self.status = status;
        self.reason = reason.into();
    }

    pub fn status(&self) -> DetectorStatus {
        self.status
    }

    /// Frames replaced before a tick consumed them.
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }

    pub fn received(&self) -> u64 {
        self.received
    }
}

impl LandmarkSource for LatestFrameSlot {
    /// A tick without a fresh frame reads as "no hand".
    fn poll(&mut self) -> Detection {
        match self.status {
            DetectorStatus::Denied => Err(DetectionError::CameraDenied),
            DetectorStatus::Unavailable => {
                self.pending = None;
                Err(DetectionError::Unavailable(self.reason.clone()))
            }
            DetectorStatus::Ok => Ok(self.pending.take().flatten()),
        }
    }

    fn name(&self) -> &'static str {
        "ipc"
    }
}

/// One recorded tick.
#[derive(Debug, Clone, PartialEq)]
enum ReplayEntry {
    Frame(LandmarkFrame),
    Absent,
    Error(String),
    Denied,
}

/// Plays back a recorded detection stream, one line per tick.
///
/// Each non-empty, non-`;` line is one of:
/// `nil` / `()` (no hand), `(:points ((x y z) ...))`, `(:absent t)`,
/// `(:error "reason")` or `(:denied t)`.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    entries: Vec<ReplayEntry>,
    cursor: usize,
    looping: bool,
}

impl ReplaySource {
    pub fn from_path(path: &Path, looping: bool) -> Result<Self, ReplayError> {
        let file = File::open(path)?;
        let source = Self::from_reader(BufReader::new(file), looping)?;
        info!(path = %path.display(), frames = source.len(), looping, "replay loaded");
        Ok(source)
    }

    pub fn from_reader<R: BufRead>(reader: R, looping: bool) -> Result<Self, ReplayError> {
        let mut entries = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with(';') {
                continue;
            }
            let entry = parse_entry(trimmed).map_err(|reason| ReplayError::Parse {
                line: idx + 1,
                reason,
            })?;
            entries.push(entry);
        }
        Ok(Self {
            entries,
            cursor: 0,
            looping,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries consumed and not looping.
    pub fn is_finished(&self) -> bool {
        !self.looping && self.cursor >= self.entries.len()
    }
}

impl LandmarkSource for ReplaySource {
    fn poll(&mut self) -> Detection {
        if self.cursor >= self.entries.len() {
            if !self.looping || self.entries.is_empty() {
                return Ok(None);
            }
            debug!("replay wrapped");
            self.cursor = 0;
        }
        let entry = &self.entries[self.cursor];
        self.cursor += 1;
        match entry {
            ReplayEntry::Frame(frame) => Ok(Some(frame.clone())),
            ReplayEntry::Absent => Ok(None),
            ReplayEntry::Error(reason) => Err(DetectionError::Unavailable(reason.clone())),
            ReplayEntry::Denied => Err(DetectionError::CameraDenied),
        }
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}

fn parse_entry(line: &str) -> Result<ReplayEntry, String> {
    let value = lexpr::from_str(line).map_err(|e| format!("invalid s-expression: {}", e))?;
    if is_nil(&value) || get_bool(&value, "absent") == Some(true) {
        return Ok(ReplayEntry::Absent);
    }
    if get_bool(&value, "denied") == Some(true) {
        return Ok(ReplayEntry::Denied);
    }
    if let Some(reason) = get_string(&value, "error") {
        return Ok(ReplayEntry::Error(reason));
    }
    let points = plist_get(&value, "points").ok_or("expected :points, :absent, :error or :denied")?;
    parse_points(points).map(ReplayEntry::Frame)
}

/// Parse `((x y z) ...)` into a landmark frame.  `z` may be omitted.
pub fn parse_points(value: &Value) -> Result<LandmarkFrame, String> {
    let items = list_items(value);
    if items.len() != LANDMARK_COUNT {
        return Err(format!(
            "expected {} points, got {}",
            LANDMARK_COUNT,
            items.len()
        ));
    }
    let mut raw = Vec::with_capacity(LANDMARK_COUNT);
    for (i, item) in items.into_iter().enumerate() {
        let coords: Vec<f64> = list_items(item).into_iter().filter_map(as_number).collect();
        let point = match coords.as_slice() {
            [x, y] => [*x as f32, *y as f32, 0.0],
            [x, y, z] => [*x as f32, *y as f32, *z as f32],
            _ => return Err(format!("point {}: expected (x y [z])", i)),
        };
        raw.push(point);
    }
    LandmarkFrame::from_points(&raw).ok_or_else(|| "non-finite coordinate".to_string())
}

/// Either source, chosen at startup.
#[derive(Debug)]
pub enum FrameSource {
    Ipc(LatestFrameSlot),
    Replay {
        replay: ReplaySource,
        /// Status overrides still arrive over IPC.
        slot: LatestFrameSlot,
    },
}

impl FrameSource {
    /// The IPC slot, used for frames or status in both modes.
    pub fn slot_mut(&mut self) -> &mut LatestFrameSlot {
        match self {
            Self::Ipc(slot) => slot,
            Self::Replay { slot, .. } => slot,
        }
    }

    pub fn slot(&self) -> &LatestFrameSlot {
        match self {
            Self::Ipc(slot) => slot,
            Self::Replay { slot, .. } => slot,
        }
    }

    pub fn replay_finished(&self) -> bool {
        matches!(self, Self::Replay { replay, .. } if replay.is_finished())
    }
}

impl LandmarkSource for FrameSource {
    fn poll(&mut self) -> Detection {
        match self {
            Self::Ipc(slot) => slot.poll(),
            Self::Replay { replay, slot } => {
                // A denial reported over IPC wins over recorded frames.
                if slot.status() == DetectorStatus::Denied {
                    return Err(DetectionError::CameraDenied);
                }
                replay.poll()
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Ipc(slot) => slot.name(),
            Self::Replay { replay, .. } => replay.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::landmarks::{make_frame, open_hand, pinched_hand};
    use std::io::Cursor;

    fn open() -> LandmarkFrame {
        make_frame(&open_hand())
    }

    fn pinched() -> LandmarkFrame {
        make_frame(&pinched_hand())
    }

    fn replay(text: &str, looping: bool) -> ReplaySource {
        ReplaySource::from_reader(Cursor::new(text.to_string()), looping).unwrap()
    }

    fn frame_to_line(frame: Option<&LandmarkFrame>) -> String {
        let Some(frame) = frame else {
            return "nil".to_string();
        };
        let pts: Vec<String> = frame
            .points()
            .iter()
            .map(|p| format!("({} {} {})", p.x, p.y, p.z))
            .collect();
        format!("(:points ({}))", pts.join(" "))
    }

    #[test]
    fn test_slot_overwrites_unconsumed_frame() {
        let mut slot = LatestFrameSlot::new();
        slot.publish(Some(open()));
        slot.publish(Some(pinched()));
        assert_eq!(slot.overwritten(), 1);
        assert_eq!(slot.poll(), Ok(Some(pinched())));
        // Nothing new this tick.
        assert_eq!(slot.poll(), Ok(None));
    }

    #[test]
    fn test_slot_status() {
        let mut slot = LatestFrameSlot::new();
        slot.publish(Some(open()));
        slot.set_status(DetectorStatus::Unavailable, "model crashed");
        assert_eq!(
            slot.poll(),
            Err(DetectionError::Unavailable("model crashed".to_string()))
        );
        slot.set_status(DetectorStatus::Denied, "");
        assert_eq!(slot.poll(), Err(DetectionError::CameraDenied));
        assert_eq!(slot.poll(), Err(DetectionError::CameraDenied));
        slot.set_status(DetectorStatus::Ok, "");
        assert_eq!(slot.poll(), Ok(None));
    }

    #[test]
    fn test_replay_entries() {
        let line = frame_to_line(Some(&open()));
        let text = format!(
            "; recorded session\n{}\n\nnil\n(:error \"timeout\")\n(:denied t)\n",
            line
        );
        let mut r = replay(&text, false);
        assert_eq!(r.len(), 4);
        assert_eq!(r.poll(), Ok(Some(open())));
        assert_eq!(r.poll(), Ok(None));
        assert_eq!(
            r.poll(),
            Err(DetectionError::Unavailable("timeout".to_string()))
        );
        assert_eq!(r.poll(), Err(DetectionError::CameraDenied));
        assert!(r.is_finished());
        assert_eq!(r.poll(), Ok(None));
    }

    #[test]
    fn test_replay_loops() {
        let mut r = replay(&format!("{}\nnil\n", frame_to_line(Some(&open()))), true);
        let polled: Vec<bool> = (0..5).map(|_| matches!(r.poll(), Ok(Some(_)))).collect();
        assert_eq!(polled, vec![true, false, true, false, true]);
        assert!(!r.is_finished());
    }

    #[test]
    fn test_replay_parse_error_reports_line() {
        let err = ReplaySource::from_reader(Cursor::new("nil\n(:points ((1 2 3)))\n"), false)
            .unwrap_err();
        match err {
            ReplayError::Parse { line, reason } => {
                assert_eq!(line, 2);
                assert!(reason.contains("expected 21 points"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_parse_points_accepts_2d() {
        let pts: Vec<String> = (0..21).map(|i| format!("({} 0.5)", i as f32 / 21.0)).collect();
        let value = lexpr::from_str(&format!("({})", pts.join(" "))).unwrap();
        let frame = parse_points(&value).unwrap();
        assert_eq!(frame.points()[0].z, 0.0);
    }

    #[test]
    fn test_replay_source_ignores_slot_frames_but_honors_denial() {
        let mut source = FrameSource::Replay {
            replay: replay("nil\n", true),
            slot: LatestFrameSlot::new(),
        };
        assert_eq!(source.poll(), Ok(None));
        source.slot_mut().set_status(DetectorStatus::Denied, "");
        assert_eq!(source.poll(), Err(DetectionError::CameraDenied));
    }
}
