use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mdfilter_api::{Credentials, ReadingStatus, StatusMap, StatusSource};
use mdfilter_core::engine::{EngineState, FilterEngine, PassOutcome, PassStats, SettlePolicy};
use mdfilter_core::events::{DetachReason, FilterEvent};
use mdfilter_core::models::{CardKey, StatusSelection};
use mdfilter_core::page::{MemoryPage, ObserveScope, Page};

const READING: &str = "a1c7c817-4e59-43b7-9365-09675a149a6f";
const COMPLETED: &str = "b0b721ff-c388-4486-aa0f-c2b0bb321512";
const UNTRACKED: &str = "32d76d19-8a05-4db0-9fc2-e0b0648fe9d0";

const COMPLETED_FILTER: StatusSelection = StatusSelection::Status(ReadingStatus::Completed);

#[derive(Debug, thiserror::Error)]
#[error("status source unavailable")]
struct Unavailable;

#[derive(Default)]
struct FakeSource {
    statuses: StatusMap,
    delay: Duration,
    fail: AtomicBool,
    all_calls: AtomicUsize,
    filtered_calls: AtomicUsize,
}

impl FakeSource {
    fn library() -> Self {
        Self {
            statuses: [(READING, "reading"), (COMPLETED, "completed")]
                .into_iter()
                .collect(),
            ..Default::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::library()
        }
    }

    fn fetches(&self) -> usize {
        self.all_calls.load(Ordering::SeqCst) + self.filtered_calls.load(Ordering::SeqCst)
    }

    async fn respond(&self, map: StatusMap) -> Result<StatusMap, Unavailable> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Unavailable);
        }
        Ok(map)
    }
}

impl StatusSource for FakeSource {
    type Error = Unavailable;

    async fn authenticate(&self) -> Result<(), Unavailable> {
        Ok(())
    }

    async fn update_credentials(&self, _credentials: Credentials) {}

    async fn get_status(&self, title_id: &str) -> Result<Option<ReadingStatus>, Unavailable> {
        Ok(self.statuses.get(title_id).and_then(ReadingStatus::from_api_str))
    }

    async fn get_all_statuses(&self) -> Result<StatusMap, Unavailable> {
        self.all_calls.fetch_add(1, Ordering::SeqCst);
        self.respond(self.statuses.clone()).await
    }

    async fn get_filtered_statuses(&self, status: ReadingStatus) -> Result<StatusMap, Unavailable> {
        self.filtered_calls.fetch_add(1, Ordering::SeqCst);
        let map = self
            .statuses
            .iter()
            .filter(|(_, s)| *s == Some(status.as_api_str()))
            .map(|(id, s)| (id, s.unwrap_or_default()))
            .collect();
        self.respond(map).await
    }
}

fn href(id: &str) -> String {
    format!("/title/{id}/some-title")
}

fn search_page() -> Arc<MemoryPage> {
    Arc::new(MemoryPage::with_links([
        href(READING),
        href(COMPLETED),
        href(UNTRACKED),
    ]))
}

fn engine(
    source: &Arc<FakeSource>,
    page: &Arc<MemoryPage>,
) -> Arc<FilterEngine<FakeSource, MemoryPage>> {
    Arc::new(FilterEngine::new(
        source.clone(),
        page.clone(),
        SettlePolicy::default(),
    ))
}

fn events(engine: &FilterEngine<FakeSource, MemoryPage>) -> Vec<FilterEvent> {
    engine.events().lock().unwrap().events()
}

#[tokio::test]
async fn test_all_shows_every_card_without_fetching() {
    let source = Arc::new(FakeSource::library());
    let page = search_page();
    page.set_visible(CardKey(1), false);
    let engine = engine(&source, &page);

    let report = engine.apply(StatusSelection::All).await;

    assert_eq!(report.applied, 1);
    assert_eq!(page.visible_hrefs().len(), 3);
    assert_eq!(source.fetches(), 0);
}

#[tokio::test]
async fn test_not_added_shows_titles_missing_from_full_map() {
    let source = Arc::new(FakeSource::library());
    let page = search_page();
    let engine = engine(&source, &page);

    let report = engine.apply(StatusSelection::NotAdded).await;

    assert_eq!(
        report.last,
        Some(PassOutcome::Applied(PassStats {
            shown: 1,
            hidden: 2,
            skipped: 0
        }))
    );
    assert_eq!(page.visible_hrefs(), vec![href(UNTRACKED)]);
    assert_eq!(source.all_calls.load(Ordering::SeqCst), 1);
    assert_eq!(source.filtered_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_named_status_shows_titles_in_filtered_map() {
    let source = Arc::new(FakeSource::library());
    let page = search_page();
    let engine = engine(&source, &page);

    engine.apply(COMPLETED_FILTER).await;

    assert_eq!(page.visible_hrefs(), vec![href(COMPLETED)]);
    assert_eq!(source.filtered_calls.load(Ordering::SeqCst), 1);
    assert_eq!(source.all_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_applying_twice_gives_same_visible_set() {
    let source = Arc::new(FakeSource::library());
    let page = search_page();
    let engine = engine(&source, &page);

    engine.apply(StatusSelection::NotAdded).await;
    let first = page.visible_hrefs();
    engine.apply(StatusSelection::NotAdded).await;

    assert_eq!(page.visible_hrefs(), first);
}

#[tokio::test]
async fn test_cards_without_title_id_are_left_alone() {
    let source = Arc::new(FakeSource::library());
    let page = search_page();
    let odd = page.push_links(["/title/not-an-id"])[0];
    let engine = engine(&source, &page);

    let report = engine.apply(COMPLETED_FILTER).await;
    assert_eq!(page.is_visible(odd), Some(true));
    assert!(matches!(
        report.last,
        Some(PassOutcome::Applied(PassStats { skipped: 1, .. }))
    ));

    page.set_visible(odd, false);
    engine.apply(StatusSelection::All).await;
    assert_eq!(page.is_visible(odd), Some(false));
}

#[tokio::test(start_paused = true)]
async fn test_restore_waits_for_late_cards_and_retries_on_schedule() {
    let source = Arc::new(FakeSource::library());
    let page = Arc::new(MemoryPage::new());
    let engine = engine(&source, &page);

    let task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.restore(COMPLETED_FILTER).await }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    page.push_links([href(READING), href(COMPLETED), href(UNTRACKED)]);

    let report = task.await.unwrap();

    // immediate, first mutation, 3s, 5s
    assert_eq!(report.passes, 4);
    assert_eq!(report.applied, 3);
    assert!(!report.superseded);
    assert_eq!(source.fetches(), 4);
    assert_eq!(page.visible_hrefs(), vec![href(COMPLETED)]);

    let log = events(&engine);
    assert!(log.contains(&FilterEvent::ObserverAttached {
        scope: ObserveScope::CardList
    }));
    assert!(log.contains(&FilterEvent::ObserverDetached {
        reason: DetachReason::CardsFound
    }));
}

#[tokio::test(start_paused = true)]
async fn test_observer_stops_after_first_pass_with_cards() {
    let source = Arc::new(FakeSource::library());
    let page = Arc::new(MemoryPage::new());
    let engine = engine(&source, &page);

    let task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.apply(COMPLETED_FILTER).await }
    });

    tokio::time::sleep(Duration::from_millis(500)).await;
    page.touch();
    tokio::time::sleep(Duration::from_millis(500)).await;
    page.push_links([href(COMPLETED)]);

    let report = task.await.unwrap();
    page.push_links([href(READING)]);
    tokio::time::sleep(Duration::from_secs(1)).await;

    // immediate, touch (still empty), cards
    assert_eq!(report.passes, 3);
    assert_eq!(report.applied, 1);
    assert_eq!(source.fetches(), 3);
    // Rendered after the observer stopped, so nobody hid it.
    assert_eq!(page.visible_hrefs().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_retries_fire_even_when_first_pass_found_cards() {
    let source = Arc::new(FakeSource::library());
    let page = search_page();
    let engine = engine(&source, &page);
    let started = tokio::time::Instant::now();

    let report = engine.restore(StatusSelection::NotAdded).await;

    assert_eq!(report.passes, 3);
    assert_eq!(report.applied, 3);
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(!events(&engine)
        .iter()
        .any(|e| matches!(e, FilterEvent::ObserverAttached { .. })));
    assert_eq!(
        events(&engine)
            .iter()
            .filter(|e| matches!(e, FilterEvent::RetryFired { .. }))
            .count(),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn test_restore_of_all_does_nothing() {
    let source = Arc::new(FakeSource::library());
    let page = search_page();
    page.set_visible(CardKey(0), false);
    let engine = engine(&source, &page);

    let report = engine.restore(StatusSelection::All).await;

    assert_eq!(report.passes, 0);
    assert_eq!(page.is_visible(CardKey(0)), Some(false));
}

#[tokio::test(start_paused = true)]
async fn test_observer_falls_back_to_document_scope() {
    let source = Arc::new(FakeSource::library());
    let page = Arc::new(MemoryPage::new());
    page.set_card_list_present(false);
    let engine = engine(&source, &page);

    let task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.apply(StatusSelection::NotAdded).await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    page.push_links([href(UNTRACKED), href(READING)]);
    let report = task.await.unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(page.visible_hrefs(), vec![href(UNTRACKED)]);
    assert!(events(&engine).contains(&FilterEvent::ObserverAttached {
        scope: ObserveScope::Document
    }));
}

#[tokio::test(start_paused = true)]
async fn test_observer_gives_up_after_timeout() {
    let source = Arc::new(FakeSource::library());
    let page = Arc::new(MemoryPage::new());
    let engine = engine(&source, &page);
    let started = tokio::time::Instant::now();

    let report = engine.apply(COMPLETED_FILTER).await;

    assert_eq!(report.passes, 1);
    assert_eq!(report.last, Some(PassOutcome::NoCards));
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert!(events(&engine).contains(&FilterEvent::ObserverDetached {
        reason: DetachReason::TimedOut
    }));
}

#[tokio::test(start_paused = true)]
async fn test_stale_response_is_discarded() {
    let source = Arc::new(FakeSource::slow(Duration::from_secs(2)));
    let page = search_page();
    let engine = engine(&source, &page);

    let slow = tokio::spawn({
        let engine = engine.clone();
        async move { engine.apply(COMPLETED_FILTER).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.reset();

    let report = slow.await.unwrap();

    assert!(report.superseded);
    assert_eq!(report.last, Some(PassOutcome::Stale));
    assert_eq!(page.visible_hrefs().len(), 3);
    assert_eq!(engine.active_selection(), StatusSelection::All);
    assert!(events(&engine)
        .iter()
        .any(|e| matches!(e, FilterEvent::StaleDiscarded { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_retries_without_repainting() {
    let source = Arc::new(FakeSource::library());
    let page = search_page();
    let engine = engine(&source, &page);

    let task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.restore(COMPLETED_FILTER).await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(page.visible_hrefs(), vec![href(COMPLETED)]);

    engine.cancel();
    assert_eq!(page.visible_hrefs(), vec![href(COMPLETED)]);

    // A different page renders its own cards; the 3s and 5s retries must
    // not touch them.
    page.clear();
    page.push_links([href(READING), href(UNTRACKED)]);
    let report = task.await.unwrap();

    assert!(report.superseded);
    assert_eq!(report.applied, 1);
    assert_eq!(source.fetches(), 1);
    assert_eq!(page.visible_hrefs().len(), 2);
    assert!(events(&engine).contains(&FilterEvent::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn test_newer_selection_wins_over_slower_older_one() {
    let source = Arc::new(FakeSource::slow(Duration::from_secs(2)));
    let page = search_page();
    let engine = engine(&source, &page);

    let older = tokio::spawn({
        let engine = engine.clone();
        async move { engine.apply(StatusSelection::NotAdded).await }
    });
    tokio::time::sleep(Duration::from_millis(500)).await;
    let newer = engine.apply(COMPLETED_FILTER).await;
    let older = older.await.unwrap();

    assert!(older.superseded);
    assert_eq!(newer.applied, 1);
    assert_eq!(page.visible_hrefs(), vec![href(COMPLETED)]);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failures_leave_cards_untouched() {
    let source = Arc::new(FakeSource::library());
    source.fail.store(true, Ordering::SeqCst);
    let page = search_page();
    page.set_visible(CardKey(2), false);
    let engine = engine(&source, &page);

    let report = engine.restore(COMPLETED_FILTER).await;

    assert_eq!(report.passes, 3);
    assert_eq!(report.errors.len(), 3);
    assert_eq!(report.applied, 0);
    assert_eq!(page.visible_hrefs(), vec![href(READING), href(COMPLETED)]);
}

#[tokio::test(start_paused = true)]
async fn test_state_follows_pass() {
    let source = Arc::new(FakeSource::slow(Duration::from_secs(1)));
    let page = search_page();
    let engine = engine(&source, &page);
    let state = engine.state();
    assert_eq!(*state.borrow(), EngineState::Idle);

    let task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.apply(StatusSelection::NotAdded).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(*state.borrow(), EngineState::Fetching);

    task.await.unwrap();
    assert_eq!(*state.borrow(), EngineState::Idle);
}
