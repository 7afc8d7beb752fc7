//! Update queue between the interception channel and the consumer.
//!
//! Events are queued as they arrive and processed in batches by a delayed
//! drain. New rows produced by one drain reach the [`RowSink`] in a single
//! `add_rows` call; changes to rows the consumer already shows are applied one
//! by one. The drain is single-flight: an attempt that finds another drain in
//! progress is skipped, and the running drain re-checks the queue before it
//! lets go of the guard.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, instrument, trace};

use super::correlator::{Applied, Correlator, RequestRecord, RowUpdate};
use super::event::{LifecycleEvent, RequestId};
use crate::settings::ViewSettings;

/// Delay between the first queued event and the drain that processes it.
pub const DEFAULT_DRAIN_DELAY: Duration = Duration::from_millis(50);

/// Consumer of row changes (a table widget, a terminal printer, a test probe).
pub trait RowSink: Send + Sync {
    /// Rows that became visible during one drain, in creation order.
    fn add_rows(&self, rows: Vec<RequestRecord>);

    /// A visible row changed.
    fn update_row(&self, update: RowUpdate);

    /// Replace everything shown with `rows`.
    fn reset(&self, rows: Vec<RequestRecord>);
}

struct Shared {
    queue: Mutex<Vec<LifecycleEvent>>,
    correlator: Mutex<Correlator>,
    view: watch::Sender<Arc<ViewSettings>>,
    sink: Arc<dyn RowSink>,
    draining: AtomicBool,
    scheduled: AtomicBool,
    drain_delay: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What one drain does to the rows already shown.
enum RowChange {
    Add(Vec<RequestRecord>),
    Redraw(Vec<RequestRecord>),
}

/// Batched event dispatcher. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("queued", &lock(&self.shared.queue).len())
            .field("draining", &self.shared.draining.load(Ordering::Relaxed))
            .field("drain_delay", &self.shared.drain_delay)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new(sink: Arc<dyn RowSink>, view: ViewSettings) -> Self {
        Self::with_drain_delay(sink, view, DEFAULT_DRAIN_DELAY)
    }

    #[must_use]
    pub fn with_drain_delay(sink: Arc<dyn RowSink>, view: ViewSettings, drain_delay: Duration) -> Self {
        let (view, _) = watch::channel(Arc::new(view));
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Vec::new()),
                correlator: Mutex::new(Correlator::new()),
                view,
                sink,
                draining: AtomicBool::new(false),
                scheduled: AtomicBool::new(false),
                drain_delay,
            }),
        }
    }

    /// Queues an event and schedules a drain.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn push(&self, event: LifecycleEvent) {
        lock(&self.shared.queue).push(event);
        self.schedule();
    }

    /// Number of events waiting for a drain.
    #[must_use]
    pub fn queued(&self) -> usize {
        lock(&self.shared.queue).len()
    }

    fn schedule(&self) {
        if self.shared.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.shared.drain_delay).await;
            this.shared.scheduled.store(false, Ordering::Release);
            this.drain();
        });
    }

    /// Processes every queued event. Returns how many were processed, or 0
    /// when another drain already holds the guard.
    pub fn drain(&self) -> usize {
        if self
            .shared
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("drain already running, attempt skipped");
            return 0;
        }

        let mut processed = 0;
        loop {
            let batch = std::mem::take(&mut *lock(&self.shared.queue));
            if batch.is_empty() {
                break;
            }
            processed += batch.len();
            self.process(batch);
        }
        self.shared.draining.store(false, Ordering::Release);

        // Events pushed while the guard was held may have had their drain skipped.
        if self.queued() > 0 {
            self.schedule();
        }
        if processed > 0 {
            trace!(processed, "drain finished");
        }
        processed
    }

    fn process(&self, batch: Vec<LifecycleEvent>) {
        let view = Arc::clone(&self.shared.view.borrow());
        let (updates, change) = self.correlate(batch, &view);

        // The correlator is released here, so the sink may call back in.
        for update in updates {
            self.shared.sink.update_row(update);
        }
        match change {
            RowChange::Redraw(rows) => self.shared.sink.reset(rows),
            RowChange::Add(rows) if !rows.is_empty() => self.shared.sink.add_rows(rows),
            RowChange::Add(_) => {}
        }
    }

    /// Applies a batch and works out what the sink has to hear about.
    fn correlate(&self, batch: Vec<LifecycleEvent>, view: &ViewSettings) -> (Vec<RowUpdate>, RowChange) {
        let mut correlator = lock(&self.shared.correlator);
        let mut updates: Vec<RowUpdate> = Vec::new();
        let mut fresh: Vec<RequestId> = Vec::new();
        let mut fresh_set: HashSet<RequestId> = HashSet::new();
        let mut redraw = false;

        for event in batch {
            match correlator.apply(event) {
                Applied::Created(id) => {
                    if fresh_set.insert(id.clone()) {
                        fresh.push(id);
                    }
                }
                Applied::Updated(update) => {
                    if fresh_set.contains(&update.row.id) {
                        // Built with the batch below.
                        continue;
                    }
                    let tab = update.row.tab_id;
                    let was_visible = view.accepts(update.previous_kind, tab);
                    let now_visible = view.accepts(update.row.kind, tab);
                    match (was_visible, now_visible) {
                        (true, true) => updates.push(update),
                        (false, true) => {
                            debug!(id = %update.row.id, kind = %update.row.kind, "hidden row promoted into view");
                            fresh_set.insert(update.row.id.clone());
                            fresh.push(update.row.id);
                        }
                        (true, false) => redraw = true,
                        (false, false) => {}
                    }
                }
                Applied::Stashed => {}
            }
        }

        if redraw {
            return (updates, RowChange::Redraw(visible_rows(&correlator, view)));
        }

        let rows: Vec<RequestRecord> = fresh
            .iter()
            .filter_map(|id| correlator.get(id))
            .filter(|row| view.accepts(row.kind, row.tab_id))
            .cloned()
            .collect();
        (updates, RowChange::Add(rows))
    }

    /// Pumps the interception channel until it closes, then flushes.
    #[instrument(level = "debug", skip_all)]
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<LifecycleEvent>) {
        while let Some(event) = events.recv().await {
            self.push(event);
        }
        debug!("event channel closed");
        self.flush().await;
    }

    /// Drains until the queue is empty and no drain is in progress.
    pub async fn flush(&self) {
        loop {
            self.drain();
            if self.queued() == 0 && !self.shared.draining.load(Ordering::Acquire) {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    /// Current view snapshot.
    #[must_use]
    pub fn view(&self) -> Arc<ViewSettings> {
        Arc::clone(&self.shared.view.borrow())
    }

    /// Replaces the view and redraws the consumer.
    pub fn set_view(&self, view: ViewSettings) {
        self.shared.view.send_replace(Arc::new(view));
        let view = self.view();
        let rows = visible_rows(&lock(&self.shared.correlator), &view);
        debug!(rows = rows.len(), "view changed, redrawing");
        self.shared.sink.reset(rows);
    }

    /// Drops every record and pending event, then clears the consumer.
    pub fn clear(&self) {
        lock(&self.shared.queue).clear();
        lock(&self.shared.correlator).clear();
        self.shared.sink.reset(Vec::new());
    }

    /// Snapshot of every record in creation order, ignoring the view.
    #[must_use]
    pub fn records(&self) -> Vec<RequestRecord> {
        lock(&self.shared.correlator).records().cloned().collect()
    }
}

fn visible_rows(correlator: &Correlator, view: &ViewSettings) -> Vec<RequestRecord> {
    correlator
        .records()
        .filter(|row| view.accepts(row.kind, row.tab_id))
        .cloned()
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::capture::event::{BodyCapture, RequestInfo, TabId};
    use crate::classify::Kind;
    use crate::settings::KindFilter;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Add(Vec<String>),
        Update(String),
        Reset(Vec<String>),
    }

    #[derive(Default)]
    struct Probe {
        calls: Mutex<Vec<Call>>,
    }

    impl Probe {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn ids(rows: &[RequestRecord]) -> Vec<String> {
        rows.iter().map(|r| r.id.as_str().to_string()).collect()
    }

    impl RowSink for Probe {
        fn add_rows(&self, rows: Vec<RequestRecord>) {
            self.calls.lock().unwrap().push(Call::Add(ids(&rows)));
        }
        fn update_row(&self, update: RowUpdate) {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Update(update.row.id.as_str().to_string()));
        }
        fn reset(&self, rows: Vec<RequestRecord>) {
            self.calls.lock().unwrap().push(Call::Reset(ids(&rows)));
        }
    }

    fn started(id: &str, tab: i64, kind: Kind) -> LifecycleEvent {
        let mut info = RequestInfo::new(id, TabId(tab), "GET", format!("https://host/{id}"));
        info.kind = kind;
        LifecycleEvent::RequestStarted(info)
    }

    fn completed(id: &str) -> LifecycleEvent {
        LifecycleEvent::RequestCompleted(RequestInfo::new(id, TabId(1), "GET", "https://host/"))
    }

    fn dispatcher(view: ViewSettings) -> (Dispatcher, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let dispatcher = Dispatcher::new(probe.clone(), view);
        (dispatcher, probe)
    }

    #[tokio::test]
    async fn test_burst_is_flushed_as_one_batch() {
        let (dispatcher, probe) = dispatcher(ViewSettings::default());
        for id in ["1", "2", "3"] {
            dispatcher.push(started(id, 1, Kind::Html));
        }
        dispatcher.push(completed("2"));

        assert_eq!(dispatcher.drain(), 4);
        assert_eq!(probe.calls(), vec![Call::Add(vec!["1".into(), "2".into(), "3".into()])]);
    }

    #[tokio::test]
    async fn test_existing_rows_are_updated_incrementally() {
        let (dispatcher, probe) = dispatcher(ViewSettings::default());
        dispatcher.push(started("1", 1, Kind::Html));
        dispatcher.drain();
        dispatcher.push(completed("1"));
        dispatcher.drain();

        assert_eq!(
            probe.calls(),
            vec![Call::Add(vec!["1".into()]), Call::Update("1".into())]
        );
    }

    #[tokio::test]
    async fn test_drain_is_skipped_while_another_runs() {
        let (dispatcher, _probe) = dispatcher(ViewSettings::default());
        dispatcher.push(started("1", 1, Kind::Html));
        dispatcher.shared.draining.store(true, Ordering::SeqCst);

        assert_eq!(dispatcher.drain(), 0);
        assert_eq!(dispatcher.queued(), 1);

        dispatcher.shared.draining.store(false, Ordering::SeqCst);
        assert_eq!(dispatcher.drain(), 1);
    }

    #[tokio::test]
    async fn test_scheduled_drain_delivers_without_manual_drain() {
        let probe = Arc::new(Probe::default());
        let dispatcher =
            Dispatcher::with_drain_delay(probe.clone(), ViewSettings::default(), Duration::from_millis(5));
        dispatcher.push(started("1", 1, Kind::Js));
        dispatcher.push(started("2", 1, Kind::Js));

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(probe.calls(), vec![Call::Add(vec!["1".into(), "2".into()])]);
        assert_eq!(dispatcher.queued(), 0);
    }

    #[tokio::test]
    async fn test_hidden_rows_are_not_sent() {
        let view = ViewSettings {
            kinds: KindFilter::only([Kind::Media]),
            tab_filter: None,
        };
        let (dispatcher, probe) = dispatcher(view);
        dispatcher.push(started("1", 1, Kind::Html));
        dispatcher.drain();
        dispatcher.push(completed("1"));
        dispatcher.drain();

        assert!(probe.calls().is_empty());
        assert_eq!(dispatcher.records().len(), 1);
    }

    #[tokio::test]
    async fn test_promotion_into_view_adds_row() {
        let view = ViewSettings {
            kinds: KindFilter::only([Kind::Streaming]),
            tab_filter: None,
        };
        let (dispatcher, probe) = dispatcher(view);
        dispatcher.push(started("1", 1, Kind::Etc));
        dispatcher.drain();
        dispatcher.push(LifecycleEvent::BodyCaptured(BodyCapture {
            id: RequestId::new("1"),
            tab_id: TabId(1),
            length: 8,
            chunks: Some(vec![Bytes::from_static(b"#EXTM3U\n")]),
            success: true,
        }));
        dispatcher.drain();

        assert_eq!(probe.calls(), vec![Call::Add(vec!["1".into()])]);
    }

    #[tokio::test]
    async fn test_set_view_redraws_in_creation_order() {
        let (dispatcher, probe) = dispatcher(ViewSettings::default());
        dispatcher.push(started("b", 1, Kind::Css));
        dispatcher.push(started("a", 2, Kind::Css));
        dispatcher.push(started("c", 1, Kind::Css));
        dispatcher.drain();

        dispatcher.set_view(ViewSettings {
            kinds: KindFilter::all(),
            tab_filter: Some(TabId(1)),
        });

        assert_eq!(
            probe.calls().last().unwrap(),
            &Call::Reset(vec!["b".into(), "c".into()])
        );
    }

    #[tokio::test]
    async fn test_clear_empties_records_and_sink() {
        let (dispatcher, probe) = dispatcher(ViewSettings::default());
        dispatcher.push(started("1", 1, Kind::Css));
        dispatcher.drain();
        dispatcher.push(started("2", 1, Kind::Css));

        dispatcher.clear();

        assert_eq!(dispatcher.queued(), 0);
        assert!(dispatcher.records().is_empty());
        assert_eq!(probe.calls().last().unwrap(), &Call::Reset(Vec::new()));
    }

    #[tokio::test]
    async fn test_run_flushes_after_channel_closes() {
        let (dispatcher, probe) = dispatcher(ViewSettings::default());
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(started("1", 1, Kind::Data)).unwrap();
        tx.send(started("2", 1, Kind::Data)).unwrap();
        drop(tx);

        dispatcher.run(rx).await;

        let added: Vec<String> = probe
            .calls()
            .into_iter()
            .flat_map(|call| match call {
                Call::Add(ids) => ids,
                _ => Vec::new(),
            })
            .collect();
        assert_eq!(added, ["1", "2"]);
    }

    /// Sink that reads the dispatcher's records from inside its callbacks.
    #[derive(Default)]
    struct Inspector {
        dispatcher: std::sync::OnceLock<Dispatcher>,
        seen: Mutex<Vec<usize>>,
    }

    impl Inspector {
        fn look(&self) {
            let count = self.dispatcher.get().map_or(0, |d| d.records().len());
            self.seen.lock().unwrap().push(count);
        }
    }

    impl RowSink for Inspector {
        fn add_rows(&self, _rows: Vec<RequestRecord>) {
            self.look();
        }
        fn update_row(&self, _update: RowUpdate) {
            self.look();
        }
        fn reset(&self, _rows: Vec<RequestRecord>) {
            self.look();
        }
    }

    #[tokio::test]
    async fn test_sink_can_call_back_into_dispatcher() {
        let inspector = Arc::new(Inspector::default());
        let dispatcher = Dispatcher::new(inspector.clone(), ViewSettings::default());
        inspector.dispatcher.set(dispatcher.clone()).unwrap();

        dispatcher.push(started("1", 1, Kind::Html));
        dispatcher.push(started("2", 1, Kind::Html));
        assert_eq!(dispatcher.drain(), 2);
        dispatcher.push(completed("1"));
        assert_eq!(dispatcher.drain(), 1);

        assert_eq!(*inspector.seen.lock().unwrap(), vec![2, 2]);
    }
}
