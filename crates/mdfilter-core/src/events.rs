use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::models::StatusSelection;
use crate::page::ObserveScope;
use crate::route::Route;

/// Maximum number of events retained in the ring buffer.
const EVENT_LOG_CAPACITY: usize = 200;

/// A typed event from the filter pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterEvent {
    PassApplied {
        selection: StatusSelection,
        shown: usize,
        hidden: usize,
        skipped: usize,
    },
    NoCards {
        selection: StatusSelection,
    },
    StaleDiscarded {
        selection: StatusSelection,
        generation: u64,
    },
    FetchFailed {
        selection: StatusSelection,
        message: String,
    },
    ObserverAttached {
        scope: ObserveScope,
    },
    ObserverDetached {
        reason: DetachReason,
    },
    RetryFired {
        after_ms: u64,
    },
    Reset,
    /// The filter stopped without repainting, e.g. when leaving the search page.
    Cancelled,
    Navigated {
        route: Route,
    },
    ConfigIncomplete {
        missing: Vec<&'static str>,
    },
    LoginFailed {
        message: String,
    },
}

/// Why the mutation observer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachReason {
    CardsFound,
    TimedOut,
    Superseded,
    PageGone,
}

/// A timestamped event entry.
pub type EventEntry = (DateTime<Utc>, FilterEvent);

/// Bounded ring buffer of filter events.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<EventEntry>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(EVENT_LOG_CAPACITY),
        }
    }

    /// Push a new event, evicting the oldest if at capacity.
    pub fn push(&mut self, event: FilterEvent) {
        if self.entries.len() >= EVENT_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back((Utc::now(), event));
    }

    /// Return a snapshot of all entries (newest last).
    pub fn snapshot(&self) -> Vec<EventEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Events only, newest last.
    pub fn events(&self) -> Vec<FilterEvent> {
        self.entries.iter().map(|(_, e)| e.clone()).collect()
    }
}

/// Thread-safe handle to the event log.
pub type SharedEventLog = Arc<Mutex<EventLog>>;

/// Create a new shared event log.
pub fn shared_event_log() -> SharedEventLog {
    Arc::new(Mutex::new(EventLog::new()))
}

/// Append to a shared log, tolerating a poisoned lock.
pub fn record(log: &SharedEventLog, event: FilterEvent) {
    log.lock().unwrap_or_else(|e| e.into_inner()).push(event);
}
