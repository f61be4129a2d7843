//! Presentation state of an endpoint's health indicator.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// How long a status flip stays "recent".
pub const TRANSITION_WINDOW: Duration = Duration::from_millis(2000);

/// The last recorded status flip of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    /// Status before the flip.
    pub previous: bool,
    /// When the batch that observed the flip completed.
    pub at: Instant,
}

impl StatusTransition {
    /// Whether the flip is younger than `window` at `now`.
    pub fn is_recent(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.at) < window
    }
}

/// What a health indicator should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentationState {
    /// A probe is in flight.
    Neutral,
    GoingOnline,
    GoingOffline,
    SteadyOnline,
    SteadyOffline,
}

impl PresentationState {
    pub fn label(&self) -> &'static str {
        match self {
            PresentationState::Neutral => "checking",
            PresentationState::GoingOnline => "going online",
            PresentationState::GoingOffline => "going offline",
            PresentationState::SteadyOnline => "online",
            PresentationState::SteadyOffline => "offline",
        }
    }
}

impl fmt::Display for PresentationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify `url` with the default [`TRANSITION_WINDOW`].
pub fn classify(
    url: &str,
    is_online: bool,
    transitions: &HashMap<String, StatusTransition>,
    is_validating: bool,
    now: Instant,
) -> PresentationState {
    classify_in_window(url, is_online, transitions, is_validating, now, TRANSITION_WINDOW)
}

/// Rules, first match wins:
///
/// 1. a probe is in flight: `Neutral`
/// 2. a flip younger than `window` from offline to online: `GoingOnline`,
///    from online to offline: `GoingOffline`
/// 3. otherwise steady by `is_online`
///
/// A recent flip that does not match the current status (it flipped back
/// since) falls through to the steady state.
pub fn classify_in_window(
    url: &str,
    is_online: bool,
    transitions: &HashMap<String, StatusTransition>,
    is_validating: bool,
    now: Instant,
    window: Duration,
) -> PresentationState {
    if is_validating {
        return PresentationState::Neutral;
    }

    if let Some(transition) = transitions.get(url) {
        if transition.is_recent(now, window) {
            match (transition.previous, is_online) {
                (false, true) => return PresentationState::GoingOnline,
                (true, false) => return PresentationState::GoingOffline,
                _ => {}
            }
        }
    }

    if is_online {
        PresentationState::SteadyOnline
    } else {
        PresentationState::SteadyOffline
    }
}
