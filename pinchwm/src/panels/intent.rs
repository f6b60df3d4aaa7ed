//! High-level commands injected by an external command interpreter.

/// Scroll direction for the `scroll` intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }

    /// Sign applied to scroll deltas (positive scrolls down).
    pub fn sign(&self) -> f32 {
        match self {
            Self::Up => -1.0,
            Self::Down => 1.0,
        }
    }
}

/// A discrete panel command.  `target` is a 1-based index over open
/// panels in creation order; `None` means the focused panel.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    OpenPanel { url: Option<String> },
    ClosePanel { target: Option<usize> },
    SwitchPanel { target: usize },
    Minimize { target: Option<usize> },
    Maximize { target: Option<usize> },
    Navigate { target: Option<usize>, url: String },
    Search { target: Option<usize>, query: String },
    Scroll { direction: ScrollDirection },
    GoHome { target: Option<usize> },
    Stop,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenPanel { .. } => "open-panel",
            Self::ClosePanel { .. } => "close-panel",
            Self::SwitchPanel { .. } => "switch-panel",
            Self::Minimize { .. } => "minimize",
            Self::Maximize { .. } => "maximize",
            Self::Navigate { .. } => "navigate",
            Self::Search { .. } => "search",
            Self::Scroll { .. } => "scroll",
            Self::GoHome { .. } => "go-home",
            Self::Stop => "stop",
        }
    }

    /// Build an intent from its keyword name and optional arguments.
    /// Returns None when the name is unknown or a required argument is
    /// missing.
    pub fn from_parts(
        name: &str,
        target: Option<usize>,
        url: Option<String>,
        query: Option<String>,
        direction: Option<&str>,
    ) -> Option<Self> {
        let intent = match name {
            "open-panel" => Self::OpenPanel { url },
            "close-panel" => Self::ClosePanel { target },
            "switch-panel" => Self::SwitchPanel { target: target? },
            "minimize" => Self::Minimize { target },
            "maximize" => Self::Maximize { target },
            "navigate" => Self::Navigate { target, url: url? },
            "search" => Self::Search {
                target,
                query: query?,
            },
            "scroll" => Self::Scroll {
                direction: ScrollDirection::parse(direction?)?,
            },
            "go-home" => Self::GoHome { target },
            "stop" => Self::Stop,
            _ => return None,
        };
        Some(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts() {
        assert_eq!(
            Intent::from_parts("switch-panel", Some(2), None, None, None),
            Some(Intent::SwitchPanel { target: 2 })
        );
        assert_eq!(
            Intent::from_parts("scroll", None, None, None, Some("up")),
            Some(Intent::Scroll {
                direction: ScrollDirection::Up
            })
        );
        assert_eq!(
            Intent::from_parts("open-panel", None, None, None, None),
            Some(Intent::OpenPanel { url: None })
        );
    }

    #[test]
    fn test_from_parts_missing_arguments() {
        assert_eq!(Intent::from_parts("switch-panel", None, None, None, None), None);
        assert_eq!(Intent::from_parts("navigate", Some(1), None, None, None), None);
        assert_eq!(Intent::from_parts("scroll", None, None, None, Some("left")), None);
        assert_eq!(Intent::from_parts("dance", None, None, None, None), None);
    }

    #[test]
    fn test_names_round_trip() {
        let stop = Intent::Stop;
        assert_eq!(
            Intent::from_parts(stop.name(), None, None, None, None),
            Some(stop)
        );
    }
}
