//! The filter re-application state machine.
//!
//! A *pass* fetches the status data a selection needs and writes the
//! visibility of every rendered title card. Passes are idempotent, so the
//! engine re-runs them freely: once immediately, on page mutations while no
//! cards have rendered yet, and at fixed delays after a restore.
//!
//! Every `apply`/`restore`/`reset` takes a new generation. A pass whose
//! generation is no longer current when its fetch returns throws the data
//! away instead of painting a stale filter over a newer one.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use mdfilter_api::{StatusMap, StatusSource};

use crate::config::FilterConfig;
use crate::events::{self, DetachReason, FilterEvent, SharedEventLog};
use crate::models::StatusSelection;
use crate::page::{ObserveScope, Page};

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("status fetch failed: {0}")]
    Fetch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Fetching,
    Applying,
}

/// Identifies one `apply`/`restore`/`reset` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub generation: u64,
    pub selection: StatusSelection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub shown: usize,
    pub hidden: usize,
    /// Title links without a parseable id; left as they were.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Applied(PassStats),
    /// The fetch succeeded but no title card is rendered yet.
    NoCards,
    /// A newer request took over while this pass was fetching.
    Stale,
}

/// When to re-run passes after the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlePolicy {
    /// Unconditional re-runs, measured from the start of the settle run.
    pub retry_delays: Vec<Duration>,
    /// How long to keep watching mutations for late cards.
    pub observe_timeout: Duration,
}

impl SettlePolicy {
    pub fn from_config(config: &FilterConfig) -> Self {
        Self {
            retry_delays: config.retry_delays(),
            observe_timeout: config.observe_timeout(),
        }
    }

    /// Mutation-driven retries only.
    pub fn observe_only(observe_timeout: Duration) -> Self {
        Self {
            retry_delays: Vec::new(),
            observe_timeout,
        }
    }
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            retry_delays: vec![Duration::from_secs(3), Duration::from_secs(5)],
            observe_timeout: Duration::from_secs(30),
        }
    }
}

/// What a settle run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettleReport {
    pub passes: usize,
    pub applied: usize,
    pub errors: Vec<String>,
    pub superseded: bool,
    pub last: Option<PassOutcome>,
}

impl SettleReport {
    fn record(&mut self, result: &Result<PassOutcome, FilterError>) {
        self.passes += 1;
        match result {
            Ok(outcome) => {
                if matches!(outcome, PassOutcome::Applied(_)) {
                    self.applied += 1;
                }
                self.last = Some(*outcome);
            }
            Err(e) => self.errors.push(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Active {
    generation: u64,
    selection: StatusSelection,
}

pub struct FilterEngine<S, P> {
    source: Arc<S>,
    page: Arc<P>,
    policy: SettlePolicy,
    active: Mutex<Active>,
    state: watch::Sender<EngineState>,
    in_flight: AtomicUsize,
    events: SharedEventLog,
}

impl<S, P> FilterEngine<S, P>
where
    S: StatusSource,
    P: Page,
{
    pub fn new(source: Arc<S>, page: Arc<P>, policy: SettlePolicy) -> Self {
        Self {
            source,
            page,
            policy,
            active: Mutex::new(Active {
                generation: 0,
                selection: StatusSelection::All,
            }),
            state: watch::Sender::new(EngineState::Idle),
            in_flight: AtomicUsize::new(0),
            events: events::shared_event_log(),
        }
    }

    pub fn with_event_log(mut self, events: SharedEventLog) -> Self {
        self.events = events;
        self
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn page(&self) -> &Arc<P> {
        &self.page
    }

    pub fn events(&self) -> SharedEventLog {
        self.events.clone()
    }

    pub fn state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    fn active(&self) -> Active {
        *self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The selection of the most recent request.
    pub fn active_selection(&self) -> StatusSelection {
        self.active().selection
    }

    /// Start a new request, superseding every earlier one.
    pub fn begin(&self, selection: StatusSelection) -> Ticket {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.generation += 1;
        active.selection = selection;
        Ticket {
            generation: active.generation,
            selection,
        }
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.active().generation == ticket.generation
    }

    /// User pressed Apply: one pass now, then follow mutations until cards show up.
    pub async fn apply(&self, selection: StatusSelection) -> SettleReport {
        let ticket = self.begin(selection);
        let policy = SettlePolicy::observe_only(self.policy.observe_timeout);
        self.settle(ticket, &policy).await
    }

    /// Re-apply a persisted selection after the controls were (re)built.
    ///
    /// `All` needs no work and returns an empty report.
    pub async fn restore(&self, selection: StatusSelection) -> SettleReport {
        if selection == StatusSelection::All {
            return SettleReport::default();
        }
        let ticket = self.begin(selection);
        let policy = self.policy.clone();
        self.settle(ticket, &policy).await
    }

    /// Supersede any running request without touching the cards.
    pub fn cancel(&self) {
        let ticket = self.begin(StatusSelection::All);
        tracing::debug!(generation = ticket.generation, "filter cancelled");
        events::record(&self.events, FilterEvent::Cancelled);
    }

    /// Drop any running request and show every card.
    pub fn reset(&self) -> PassStats {
        self.begin(StatusSelection::All);
        events::record(&self.events, FilterEvent::Reset);
        self.paint(StatusSelection::All, None)
    }

    /// One fetch + apply pass for `ticket`.
    pub async fn run_pass(&self, ticket: Ticket) -> Result<PassOutcome, FilterError> {
        if !self.is_current(ticket) {
            return Ok(PassOutcome::Stale);
        }

        let _guard = PassGuard::enter(self);
        let selection = ticket.selection;

        let statuses = if selection.needs_fetch() {
            self.state.send_replace(EngineState::Fetching);
            match self.fetch(selection).await {
                Ok(map) => Some(map),
                Err(e) => {
                    tracing::warn!(%selection, error = %e, "filter pass failed");
                    events::record(
                        &self.events,
                        FilterEvent::FetchFailed {
                            selection,
                            message: e.to_string(),
                        },
                    );
                    return Err(e);
                }
            }
        } else {
            None
        };

        if !self.is_current(ticket) {
            tracing::debug!(%selection, generation = ticket.generation, "discarding stale statuses");
            events::record(
                &self.events,
                FilterEvent::StaleDiscarded {
                    selection,
                    generation: ticket.generation,
                },
            );
            return Ok(PassOutcome::Stale);
        }

        self.state.send_replace(EngineState::Applying);
        if self.page.title_links().is_empty() {
            tracing::debug!(%selection, "no title cards rendered yet");
            events::record(&self.events, FilterEvent::NoCards { selection });
            return Ok(PassOutcome::NoCards);
        }

        let stats = self.paint(selection, statuses.as_ref());
        tracing::debug!(
            %selection,
            shown = stats.shown,
            hidden = stats.hidden,
            skipped = stats.skipped,
            "filter applied"
        );
        events::record(
            &self.events,
            FilterEvent::PassApplied {
                selection,
                shown: stats.shown,
                hidden: stats.hidden,
                skipped: stats.skipped,
            },
        );
        Ok(PassOutcome::Applied(stats))
    }

    async fn fetch(&self, selection: StatusSelection) -> Result<StatusMap, FilterError> {
        let result = match selection {
            StatusSelection::All => return Ok(StatusMap::new()),
            StatusSelection::NotAdded => self.source.get_all_statuses().await,
            StatusSelection::Status(status) => self.source.get_filtered_statuses(status).await,
        };
        result.map_err(|e| FilterError::Fetch(e.to_string()))
    }

    /// Write visibility for every parseable card. `statuses` is `None` only for `All`.
    fn paint(&self, selection: StatusSelection, statuses: Option<&StatusMap>) -> PassStats {
        let mut stats = PassStats::default();
        for link in self.page.title_links() {
            let Some(title_id) = link.title_id() else {
                tracing::trace!(href = %link.href, "skipping card without a title id");
                stats.skipped += 1;
                continue;
            };
            let visible = match statuses {
                Some(map) => selection.is_visible(title_id, map),
                None => true,
            };
            self.page.set_visible(link.key, visible);
            if visible {
                stats.shown += 1;
            } else {
                stats.hidden += 1;
            }
        }
        stats
    }

    async fn pass_recorded(&self, ticket: Ticket, report: &mut SettleReport) -> Option<PassOutcome> {
        let result = self.run_pass(ticket).await;
        report.record(&result);
        result.ok()
    }

    fn attach_observer(&self) -> Option<watch::Receiver<u64>> {
        let (scope, rx) = match self.page.observe(ObserveScope::CardList) {
            Some(rx) => (ObserveScope::CardList, rx),
            None => (ObserveScope::Document, self.page.observe(ObserveScope::Document)?),
        };
        tracing::debug!(?scope, "waiting for title cards");
        events::record(&self.events, FilterEvent::ObserverAttached { scope });
        Some(rx)
    }

    fn detach_observer(&self, observer: &mut Option<watch::Receiver<u64>>, reason: DetachReason) {
        if observer.take().is_some() {
            events::record(&self.events, FilterEvent::ObserverDetached { reason });
        }
    }

    /// Run passes for `ticket` until the policy is exhausted or a newer
    /// request supersedes it.
    pub async fn settle(&self, ticket: Ticket, policy: &SettlePolicy) -> SettleReport {
        let started = Instant::now();
        let mut report = SettleReport::default();

        let first = self.pass_recorded(ticket, &mut report).await;
        let mut observer = match first {
            Some(PassOutcome::NoCards) => self.attach_observer(),
            _ => None,
        };

        let mut retries: VecDeque<Duration> = policy.retry_delays.iter().copied().collect();
        retries.make_contiguous().sort();
        let observe_deadline = started + policy.observe_timeout;

        loop {
            if !self.is_current(ticket) {
                report.superseded = true;
                self.detach_observer(&mut observer, DetachReason::Superseded);
                break;
            }

            let next_retry = retries.front().copied();
            if next_retry.is_none() && observer.is_none() {
                break;
            }
            let retry_at = started + next_retry.unwrap_or(policy.observe_timeout);
            let observing = observer.is_some();

            tokio::select! {
                _ = tokio::time::sleep_until(retry_at), if next_retry.is_some() => {
                    retries.pop_front();
                    let after_ms = next_retry.map(|d| d.as_millis() as u64).unwrap_or_default();
                    tracing::debug!(after_ms, "scheduled filter retry");
                    events::record(&self.events, FilterEvent::RetryFired { after_ms });
                    if let Some(PassOutcome::Applied(_)) = self.pass_recorded(ticket, &mut report).await {
                        self.detach_observer(&mut observer, DetachReason::CardsFound);
                    }
                }
                alive = next_mutation(&mut observer), if observing => {
                    if !alive {
                        self.detach_observer(&mut observer, DetachReason::PageGone);
                        continue;
                    }
                    if let Some(PassOutcome::Applied(_)) = self.pass_recorded(ticket, &mut report).await {
                        self.detach_observer(&mut observer, DetachReason::CardsFound);
                    }
                }
                _ = tokio::time::sleep_until(observe_deadline), if observing => {
                    tracing::debug!("gave up waiting for title cards");
                    self.detach_observer(&mut observer, DetachReason::TimedOut);
                }
                else => break,
            }
        }

        if report.superseded {
            tracing::debug!(generation = ticket.generation, "settle run superseded");
        }
        report
    }
}

async fn next_mutation(observer: &mut Option<watch::Receiver<u64>>) -> bool {
    match observer {
        Some(rx) => rx.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}

/// Tracks overlapping passes; the engine reads `Idle` once the last one ends.
struct PassGuard<'a> {
    in_flight: &'a AtomicUsize,
    state: &'a watch::Sender<EngineState>,
}

impl<'a> PassGuard<'a> {
    fn enter<S, P>(engine: &'a FilterEngine<S, P>) -> Self {
        engine.in_flight.fetch_add(1, Ordering::SeqCst);
        Self {
            in_flight: &engine.in_flight,
            state: &engine.state,
        }
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.send_replace(EngineState::Idle);
        }
    }
}
