//! Clip state as reported to controllers and the UI.

/// What a grid cell should display for its clip.
///
/// Queued variants mean the change is requested and will happen on the
/// next bar boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GridState {
    /// No audio attached.
    #[default]
    Empty,
    /// Loaded, silent.
    Stopped,
    PlayQueued,
    Playing,
    RecordQueued,
    Recording,
    /// Playing or recording, will stop at the next bar.
    StopQueued,
}

impl GridState {
    /// Short label for status lines.
    pub fn label(self) -> &'static str {
        match self {
            GridState::Empty => "empty",
            GridState::Stopped => "stopped",
            GridState::PlayQueued => "play-queued",
            GridState::Playing => "playing",
            GridState::RecordQueued => "rec-queued",
            GridState::Recording => "recording",
            GridState::StopQueued => "stop-queued",
        }
    }

    /// True while a transition waits for the next bar.
    pub fn is_queued(self) -> bool {
        matches!(
            self,
            GridState::PlayQueued | GridState::RecordQueued | GridState::StopQueued
        )
    }
}

impl core::fmt::Display for GridState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.pad(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty() {
        assert_eq!(GridState::default(), GridState::Empty);
    }

    #[test]
    fn queued_variants() {
        assert!(GridState::PlayQueued.is_queued());
        assert!(GridState::StopQueued.is_queued());
        assert!(!GridState::Recording.is_queued());
    }

    #[test]
    fn display_uses_label() {
        assert_eq!(alloc::format!("{}", GridState::RecordQueued), "rec-queued");
    }
}
