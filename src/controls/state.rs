use crate::media::MediaKind;

/// Visual state of a save control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlState {
    Idle,
    Saving,
    Saved,
    Retryable,
    /// The backend channel is gone; only a reload helps.
    Disabled,
}

impl ControlState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Saving => "saving",
            Self::Saved => "saved",
            Self::Retryable => "retryable",
            Self::Disabled => "disabled",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "idle" => Some(Self::Idle),
            "saving" => Some(Self::Saving),
            "saved" => Some(Self::Saved),
            "retryable" => Some(Self::Retryable),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }

    /// Text shown on a control of the given kind.
    #[must_use]
    pub fn label(self, kind: MediaKind) -> &'static str {
        match self {
            Self::Idle => kind.label(),
            Self::Saving => "Saving…",
            Self::Saved => "Saved",
            Self::Retryable => "Retry",
            Self::Disabled => "Unavailable",
        }
    }

    /// Whether a click starts a save.
    #[must_use]
    pub fn accepts_click(self) -> bool {
        !matches!(self, Self::Saving | Self::Disabled)
    }

    /// Whether a save started from this state overwrites an existing record.
    #[must_use]
    pub fn forces_update(self) -> bool {
        matches!(self, Self::Saved | Self::Retryable)
    }
}
