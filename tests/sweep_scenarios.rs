//! End-to-end sweep scenarios against the in-memory host
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use job_feed_filter::domain::SweepStatus;
use job_feed_filter::host::{DetailFixture, MemoryPage};
use job_feed_filter::sweep::ItemRegistry;
use job_feed_filter::{
    FilterSettings, HostPage, ItemKey, ItemStatus, LiveSettings, ProgressEvent, ProgressSink,
    SweepConfig, SweepContext, SweepOrchestrator, SweepOutcome, SweepReport, ThrottleController,
};

type Hook = Box<dyn Fn(usize) + Send + Sync>;

/// Records every event; the optional hook runs after each update
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
    hook: Mutex<Option<Hook>>,
}

impl RecordingSink {
    fn set_hook(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn on_start(&self, total: usize) {
        self.events.lock().unwrap().push(ProgressEvent::Started { total });
    }

    fn on_update(&self, processed: usize, found: usize) {
        self.events
            .lock()
            .unwrap()
            .push(ProgressEvent::Updated { processed, found });
        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook(processed);
        }
    }

    fn on_finish(&self, message: &str) {
        self.events.lock().unwrap().push(ProgressEvent::Finished {
            message: message.to_string(),
        });
    }
}

/// Panics on the first progress update only
#[derive(Default)]
struct CrashingSink {
    crashed: AtomicBool,
}

impl ProgressSink for CrashingSink {
    fn on_start(&self, _total: usize) {}

    fn on_update(&self, _processed: usize, _found: usize) {
        if !self.crashed.swap(true, Ordering::SeqCst) {
            panic!("progress display went away");
        }
    }

    fn on_finish(&self, _message: &str) {}
}

struct Harness {
    page: Arc<MemoryPage>,
    settings: Arc<LiveSettings>,
    sink: Arc<RecordingSink>,
    throttle: Arc<ThrottleController>,
    orchestrator: Arc<SweepOrchestrator>,
}

fn harness(page: MemoryPage) -> Harness {
    harness_with(page, SweepConfig::default())
}

fn harness_with(page: MemoryPage, config: SweepConfig) -> Harness {
    let page = Arc::new(page);
    let settings = Arc::new(LiveSettings::default());
    let sink = Arc::new(RecordingSink::default());
    let ctx = SweepContext::new(page.clone(), settings.clone(), sink.clone(), config);
    Harness {
        page,
        settings,
        sink,
        throttle: ctx.throttle.clone(),
        orchestrator: Arc::new(SweepOrchestrator::new(ctx)),
    }
}

fn key(n: usize) -> ItemKey {
    ItemKey::new(job_id(n)).unwrap()
}

fn job_id(n: usize) -> String {
    (4000 + n).to_string()
}

fn title(n: usize) -> String {
    format!("Role {n:03} Engineer")
}

/// Wrapper `li` plus inner card for each job, as the live feed renders them
fn feed(count: usize) -> String {
    let cards: String = (1..=count)
        .map(|n| {
            let id = job_id(n);
            let title = title(n);
            format!(
                r#"<li data-occludable-job-id="{id}" class="scaffold-layout__list-item">
                     <div class="job-card-container" data-job-id="{id}">
                       <a class="job-card-list__title" href="/jobs/view/{id}/">{title}</a>
                       <span>Acme Corp</span>
                     </div>
                   </li>"#
            )
        })
        .collect();
    format!(r#"<ul class="scaffold-layout__list">{cards}</ul>"#)
}

fn clean(n: usize) -> DetailFixture {
    DetailFixture::new(title(n), "Acme Corp · Berlin · 2 days ago")
}

fn reposted(n: usize) -> DetailFixture {
    DetailFixture::new(title(n), "Acme Corp · Berlin · Reposted 1 week ago")
}

fn page_with(count: usize, fixture: impl Fn(usize) -> DetailFixture) -> MemoryPage {
    (1..=count).fold(MemoryPage::new(feed(count)), |page, n| {
        page.with_detail(job_id(n), fixture(n))
    })
}

fn wrapper(page: &MemoryPage, n: usize) -> job_feed_filter::SurfaceId {
    page.find("data-occludable-job-id", &job_id(n)).unwrap()
}

fn report(outcome: SweepOutcome) -> SweepReport {
    match outcome {
        SweepOutcome::Finished(report) => report,
        other => panic!("expected a finished sweep, got {other:?}"),
    }
}

fn activation_gaps(page: &MemoryPage) -> Vec<Duration> {
    page.activations()
        .windows(2)
        .map(|pair| pair[1].at.duration_since(pair[0].at))
        .collect()
}

#[tokio::test]
async fn registry_deduplicates_surfaces_by_key() {
    // surfaces 1-8 carry their own keys, 9 and 10 repeat the key of 3
    let keys = [1, 2, 3, 4, 5, 6, 7, 8, 3, 3];
    let cards: String = keys
        .iter()
        .map(|k| {
            format!(
                r#"<li class="jobs-search-results-list__list-item" data-job-id="{}">Job</li>"#,
                job_id(*k)
            )
        })
        .collect();
    let page = Arc::new(MemoryPage::new(format!("<ul>{cards}</ul>")));
    let registry = ItemRegistry::new(page.clone(), SweepConfig::default().selectors);

    let catalog = registry.collect().await;
    let third = ItemKey::new(job_id(3)).unwrap();

    assert_eq!(registry.discover().await.len(), 10);
    assert_eq!(catalog.len(), 8);
    assert_eq!(catalog.duplicates(&third).len(), 2);
    assert_eq!(catalog.surfaces(&third).len(), 3);
    assert_eq!(catalog.unkeyed(), 0);
}

#[tokio::test(start_paused = true)]
async fn matching_panel_with_clean_description_is_not_flagged() {
    let page = MemoryPage::new(
        r#"<li data-occludable-job-id="4001" class="scaffold-layout__list-item">
             <a class="job-card-list__title" href="/jobs/view/4001/">Backend Engineer</a>
           </li>"#,
    )
    .with_detail(
        "4001",
        DetailFixture::new("Senior Backend Engineer", "Acme Corp · 3 days ago")
            .with_latency(Duration::from_millis(500)),
    );
    let h = harness(page);

    let report = report(h.orchestrator.run().await);

    assert_eq!((report.total, report.processed, report.found), (1, 1, 0));
    assert!(report.unverified.is_empty());
    assert_eq!(h.page.attribute_now(wrapper(&h.page, 1), "data-reposted"), None);
    assert!(!h.page.is_hidden(wrapper(&h.page, 1)));
}

#[tokio::test(start_paused = true)]
async fn reposted_item_is_flagged_on_every_surface() {
    let h = harness(page_with(3, |n| if n == 2 { reposted(n) } else { clean(n) }));

    let report = report(h.orchestrator.run().await);

    assert_eq!((report.total, report.processed, report.found), (3, 3, 1));
    let inner = h.page.find("data-job-id", &job_id(2)).unwrap();
    for surface in [wrapper(&h.page, 2), inner] {
        assert_eq!(h.page.attribute_now(surface, "data-reposted").as_deref(), Some("true"));
        assert!(h.page.is_hidden(surface));
    }
    assert!(!h.page.is_hidden(wrapper(&h.page, 1)));
    assert_eq!(report.message(), "Scan complete: 1 reposted jobs hidden");
    assert_eq!(h.orchestrator.status(), SweepStatus::Completed);
    assert_eq!(h.page.scroll_count(), 3);
    assert_eq!(h.orchestrator.verified_status(&key(1)).await, ItemStatus::VerifiedClear);
    assert_eq!(h.orchestrator.verified_status(&key(2)).await, ItemStatus::VerifiedFlagged);
}

#[tokio::test(start_paused = true)]
async fn batch_cooldown_after_fifteen_visits() {
    let h = harness(page_with(20, clean));

    let report = report(h.orchestrator.run().await);
    assert_eq!(report.processed, 20);

    let gaps = activation_gaps(&h.page);
    assert_eq!(gaps.len(), 19);
    // gaps[14] spans activation 15 → 16
    assert!(gaps[14] >= Duration::from_millis(8_000 + 1_200));
    for (i, gap) in gaps.iter().enumerate().filter(|(i, _)| *i != 14) {
        assert!(*gap >= Duration::from_millis(1_200), "gap {i} too short: {gap:?}");
        assert!(*gap < Duration::from_millis(8_000), "gap {i} too long: {gap:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn disabling_reposted_cancels_after_current_item() {
    let h = harness(page_with(20, clean));
    let settings = h.settings.clone();
    h.sink.set_hook(move |processed| {
        if processed == 5 {
            settings.update(FilterSettings {
                hide_reposted: false,
                ..FilterSettings::default()
            });
        }
    });

    let report = report(h.orchestrator.run().await);

    assert_eq!(report.status, SweepStatus::Cancelled);
    assert_eq!(report.processed, 5);
    assert_eq!(h.page.activations().len(), 5);
    assert_eq!(report.message(), "Scan cancelled after 5/20 jobs (0 reposted hidden)");
    assert!(matches!(
        h.sink.events().last(),
        Some(ProgressEvent::Finished { message }) if message.starts_with("Scan cancelled")
    ));
}

#[tokio::test(start_paused = true)]
async fn request_cancel_stops_at_next_checkpoint() {
    let h = harness(page_with(6, clean));
    let orchestrator = h.orchestrator.clone();
    let running = h.orchestrator.spawn();

    tokio::time::sleep(Duration::from_millis(3_000)).await;
    orchestrator.request_cancel();
    let report = report(running.await.unwrap());

    assert!(report.is_cancelled());
    assert!(report.processed < 6);
    assert_eq!(h.orchestrator.status(), SweepStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn cancel_right_after_spawn_reaches_the_new_session() {
    let h = harness(page_with(3, clean));

    let running = h.orchestrator.spawn();
    h.orchestrator.request_cancel();
    let cancelled = report(running.await.unwrap());

    assert_eq!(cancelled.status, SweepStatus::Cancelled);
    assert_eq!(cancelled.processed, 0);
    assert!(h.page.activations().is_empty());

    // the cancel was spent on that session, the next one runs normally
    let next = report(h.orchestrator.run().await);
    assert_eq!((next.status, next.processed), (SweepStatus::Completed, 3));
}

#[tokio::test(start_paused = true)]
async fn cancel_while_idle_does_not_affect_the_next_sweep() {
    let h = harness(page_with(2, clean));

    h.orchestrator.request_cancel();
    let report = report(h.orchestrator.run().await);

    assert_eq!((report.status, report.processed), (SweepStatus::Completed, 2));
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_and_later_sweeps() {
    let h = harness(page_with(3, clean));

    let running = h.orchestrator.spawn();
    h.orchestrator.shutdown();
    let first = report(running.await.unwrap());
    let later = report(h.orchestrator.run().await);

    for report in [first, later] {
        assert_eq!((report.status, report.processed), (SweepStatus::Cancelled, 0));
    }
    assert!(h.page.activations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn panicking_sink_releases_the_running_state() {
    let page = Arc::new(page_with(3, clean));
    let ctx = SweepContext::new(
        page.clone(),
        Arc::new(LiveSettings::default()),
        Arc::new(CrashingSink::default()),
        SweepConfig::default(),
    );
    let orchestrator = Arc::new(SweepOrchestrator::new(ctx));

    let crashed = orchestrator.spawn().await;

    assert!(crashed.unwrap_err().is_panic());
    assert_eq!(orchestrator.status(), SweepStatus::Cancelled);
    let retry = report(orchestrator.run().await);
    assert_eq!((retry.status, retry.processed), (SweepStatus::Completed, 3));
}

#[tokio::test(start_paused = true)]
async fn aborted_sweep_task_releases_the_running_state() {
    let h = harness(page_with(5, clean));
    let running = h.orchestrator.spawn();
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(h.orchestrator.is_running());

    running.abort();
    assert!(running.await.unwrap_err().is_cancelled());

    assert_eq!(h.orchestrator.status(), SweepStatus::Cancelled);
    assert!(matches!(h.orchestrator.run().await, SweepOutcome::Finished(_)));
}

#[tokio::test(start_paused = true)]
async fn sweep_is_disabled_when_reposted_filter_is_off() {
    let h = harness(page_with(2, clean));
    h.settings.update(FilterSettings {
        hide_reposted: false,
        ..FilterSettings::default()
    });

    assert_eq!(h.orchestrator.run().await, SweepOutcome::Disabled);
    assert!(h.page.activations().is_empty());
    assert!(h.sink.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rerun_skips_flagged_items() {
    let h = harness(page_with(5, |n| if n % 2 == 1 { reposted(n) } else { clean(n) }));

    let first = report(h.orchestrator.run().await);
    assert_eq!((first.total, first.found), (5, 3));
    let visited_before = h.page.activations().len();

    let second = report(h.orchestrator.run().await);
    assert_eq!((second.total, second.processed, second.found), (2, 2, 0));

    let revisited: Vec<String> = h.page.activated_keys().split_off(visited_before);
    assert_eq!(revisited, vec![job_id(2), job_id(4)]);
}

#[tokio::test(start_paused = true)]
async fn progress_is_monotonic_and_bounded() {
    let h = harness(page_with(8, |n| if n % 3 == 0 { reposted(n) } else { clean(n) }));
    report(h.orchestrator.run().await);

    let events = h.sink.events();
    assert_eq!(events.first(), Some(&ProgressEvent::Started { total: 8 }));

    let mut last = (0, 0);
    for event in &events {
        if let ProgressEvent::Updated { processed, found } = *event {
            assert!(processed >= last.0 && found >= last.1);
            assert!(found <= processed && processed <= 8);
            last = (processed, found);
        }
    }
    assert_eq!(last, (8, 2));
}

#[tokio::test(start_paused = true)]
async fn consecutive_misses_trigger_backoff() {
    let h = harness(page_with(4, |n| {
        if n <= 3 { clean(n).unresponsive() } else { clean(n) }
    }));

    let report = report(h.orchestrator.run().await);

    let gaps = activation_gaps(&h.page);
    // third miss → backoff before item 4
    assert!(gaps[0] < Duration::from_millis(5_000));
    assert!(gaps[2] >= Duration::from_millis(2_000 + 15_000));
    assert_eq!(report.processed, 4);
    assert_eq!(report.unverified.len(), 3);
    assert_eq!(h.orchestrator.verified_status(&key(1)).await, ItemStatus::Unknown);
    assert_eq!(
        report.message(),
        "Scan complete: 0 reposted jobs hidden, 3 could not be verified"
    );
}

#[tokio::test(start_paused = true)]
async fn miss_streak_carries_over_into_the_next_sweep() {
    let mut config = SweepConfig::default();
    config.rounds.max_rounds = 1;
    let h = harness_with(
        page_with(3, |n| if n == 1 { reposted(n) } else { clean(n).unresponsive() }),
        config,
    );

    let first = report(h.orchestrator.run().await);
    assert_eq!((first.found, first.unverified.len()), (1, 2));
    assert_eq!(h.throttle.consecutive_misses(), 2);

    // job 1 is flagged now, so the second sweep opens with job 2: third miss in a row
    let second = report(h.orchestrator.run().await);
    assert_eq!(second.total, 2);

    let gaps = activation_gaps(&h.page);
    assert_eq!(gaps.len(), 4);
    assert!(gaps[1] < Duration::from_millis(5_000));
    assert!(gaps[3] >= Duration::from_millis(2_000 + 15_000));
}

#[tokio::test(start_paused = true)]
async fn host_error_counts_as_miss_and_is_retried() {
    let h = harness(page_with(3, clean));
    h.page.fail_activations(1);

    let report = report(h.orchestrator.run().await);

    assert_eq!(report.processed, 3);
    assert!(report.unverified.is_empty());
    // the rejected click on job 1 is not recorded; its retry comes after round 1
    assert_eq!(h.page.activated_keys(), vec![job_id(2), job_id(3), job_id(1)]);
    assert_eq!(h.page.scroll_count(), 4);
    assert_eq!(h.orchestrator.verified_status(&key(1)).await, ItemStatus::VerifiedClear);
}

#[tokio::test(start_paused = true)]
async fn missed_item_is_retried_in_next_round() {
    let h = harness(page_with(3, |n| {
        if n == 2 { reposted(n).failing(1) } else { clean(n) }
    }));

    let report = report(h.orchestrator.run().await);

    assert_eq!((report.processed, report.found), (3, 1));
    assert!(report.unverified.is_empty());
    assert_eq!(
        h.page.activated_keys(),
        vec![job_id(1), job_id(2), job_id(3), job_id(2)]
    );
    assert!(h.page.is_hidden(wrapper(&h.page, 2)));
}

#[tokio::test(start_paused = true)]
async fn detached_item_is_skipped_silently() {
    let h = harness(page_with(3, clean));
    let page = h.page.clone();
    let second = wrapper(&h.page, 2);
    h.sink.set_hook(move |processed| {
        if processed == 1 {
            page.detach(second);
        }
    });

    let report = report(h.orchestrator.run().await);

    assert_eq!((report.total, report.processed), (3, 2));
    assert_eq!(h.page.activated_keys(), vec![job_id(1), job_id(3)]);
    assert!(report.unverified.is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_trigger_while_running_is_dropped() {
    let h = harness(page_with(3, clean));
    let running = h.orchestrator.spawn();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(h.orchestrator.is_running());
    assert_eq!(h.orchestrator.run().await, SweepOutcome::AlreadyRunning);

    let report = report(running.await.unwrap());
    assert_eq!(report.processed, 3);
    assert_eq!(h.page.activations().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn skeleton_and_hidden_cards_are_not_swept() {
    let html = format!(
        r#"{}
           <li data-occludable-job-id="4900" class="scaffold-layout__list-item jobs-list-skeleton__artdeco-card--no-top-right-radius">
             <a class="job-card-list__title" href="/jobs/view/4900/">Loading</a>
           </li>
           <li data-occludable-job-id="4901" class="scaffold-layout__list-item" style="display: none">
             <a class="job-card-list__title" href="/jobs/view/4901/">Hidden Role</a>
           </li>"#,
        feed(2)
    );
    let h = harness(
        MemoryPage::new(html)
            .with_detail(job_id(1), clean(1))
            .with_detail(job_id(2), clean(2)),
    );

    let report = report(h.orchestrator.run().await);

    assert_eq!(report.total, 2);
    assert_eq!(h.page.activated_keys(), vec![job_id(1), job_id(2)]);
}

/// Known gap: a card without a readable title is accepted against whatever
/// the panel currently shows, here the previous (reposted) posting.
#[tokio::test(start_paused = true)]
async fn empty_title_proceeds_against_whatever_panel_shows() {
    let html = format!(
        r#"{}
           <li data-occludable-job-id="4077" class="scaffold-layout__list-item"></li>"#,
        feed(1)
    );
    let h = harness(MemoryPage::new(html).with_detail(job_id(1), reposted(1)));

    let report = report(h.orchestrator.run().await);

    let untitled = h.page.find("data-occludable-job-id", "4077").unwrap();
    assert_eq!(report.found, 2);
    assert_eq!(h.page.attribute_now(untitled, "data-reposted").as_deref(), Some("true"));
}

#[tokio::test(start_paused = true)]
async fn paused_while_page_is_hidden() {
    let h = harness(page_with(2, clean));
    h.page.set_foreground(false);
    let page = h.page.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        page.set_foreground(true);
    });

    report(h.orchestrator.run().await);

    let gaps = activation_gaps(&h.page);
    assert!(gaps[0] >= Duration::from_secs(25));
    assert!(h.page.is_foreground().await);
}
