//! Spatial panel manager driven by the pinch gesture stream.

pub mod click;
pub mod intent;
pub mod manager;
pub mod panel;

pub use click::{ClickIntentTracker, ClickKind};
pub use intent::{Intent, ScrollDirection};
pub use manager::{PanelEvent, PanelFrame, PanelManager};
pub use panel::{HeaderControl, Panel, PanelConfig, PanelId};
