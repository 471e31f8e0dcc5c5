//! Network reachability with edge-triggered transition detection.

use crossbeam_channel::Receiver;

/// Source of raw path updates (`true` = a usable path exists).
pub trait PathMonitor: Send + Sync {
    /// Start observing. The channel disconnects when monitoring stops.
    fn path_updates(&self) -> Receiver<bool>;
}

/// A change worth publishing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub available: bool,
    /// The path went from unavailable to available.
    pub recovered: bool,
}

/// Last-known availability; suppresses repeated identical updates.
#[derive(Debug, Default)]
pub struct ReachabilityTracker {
    last: Option<bool>,
}

impl ReachabilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<bool> {
        self.last
    }

    /// Record a raw update. Returns the transition to publish, if any.
    pub fn observe(&mut self, available: bool) -> Option<Transition> {
        match self.last.replace(available) {
            None => Some(Transition {
                available,
                recovered: false,
            }),
            Some(previous) if previous == available => None,
            Some(previous) => Some(Transition {
                available,
                recovered: !previous && available,
            }),
        }
    }
}
