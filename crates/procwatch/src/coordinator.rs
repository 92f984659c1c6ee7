use std::sync::mpsc::{Sender, SyncSender, TrySendError, sync_channel};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use log::{debug, warn};

use crate::config::{Config, SortMode};
use crate::event::Event;
use crate::sampler::{ProcessSnapshot, Sampler};
use crate::selection::{ResolvedCursor, SelectionState, reconcile};
use crate::view::{self, DisplayList, ViewState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
    Paused,
}

/// What asked for a refresh. Only used for logging; every trigger runs the
/// same pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Timer,
    Manual,
    FilterChanged,
    SortChanged,
    AutoRefreshChanged,
    PostKill,
}

impl Trigger {
    fn describe(self) -> &'static str {
        match self {
            Trigger::Startup => "startup",
            Trigger::Timer => "timer tick",
            Trigger::Manual => "manual refresh",
            Trigger::FilterChanged => "filter change",
            Trigger::SortChanged => "sort change",
            Trigger::AutoRefreshChanged => "auto-refresh change",
            Trigger::PostKill => "post-kill resync",
        }
    }
}

struct SampleRequest {
    prime: Option<u32>,
}

/// Result of one completed pipeline, handed to the caller for the atomic
/// table swap. On failure the previous table must stay untouched.
pub enum CycleOutcome {
    Applied {
        rows: DisplayList,
        cursor: ResolvedCursor,
    },
    Failed {
        error: String,
    },
}

/// Owns the refresh/reconciliation loop: the view and selection state, the
/// single-flight gate, the sampling worker, and the periodic tick
/// producer.
///
/// Sampling runs on its own thread so slow enumeration and the CPU
/// priming delay never block input handling. Requests flow to the worker
/// over a bounded queue of depth one; a trigger arriving while a cycle is
/// in flight is dropped, not queued, so at most one pipeline runs at any
/// instant. Completed snapshots come back through the shared event
/// channel and are folded into a display list and cursor in `complete`,
/// the only place the visible table is allowed to change.
pub struct RefreshCoordinator {
    view: ViewState,
    selection: SelectionState,
    state: RefreshState,
    requests: SyncSender<SampleRequest>,
}

impl RefreshCoordinator {
    /// Spawn the sampling worker and the tick producer, both feeding the
    /// given event channel.
    pub fn start<S>(mut sampler: S, events: Sender<Event>, config: &Config) -> Self
    where
        S: Sampler + Send + 'static,
    {
        let (requests, request_rx) = sync_channel::<SampleRequest>(1);

        let worker_events = events.clone();
        thread::spawn(move || {
            while let Ok(request) = request_rx.recv() {
                let outcome = sampler.sample(request.prime);
                if worker_events.send(Event::SampleDone(outcome)).is_err() {
                    break;
                }
            }
        });

        let tick = Duration::from_millis(config.refresh_rate_ms.max(100));
        thread::spawn(move || {
            loop {
                thread::sleep(tick);
                if events.send(Event::Tick).is_err() {
                    break;
                }
            }
        });

        let view = ViewState::new(
            config.initial_filter.clone().unwrap_or_default(),
            config.initial_sort,
            config.auto_refresh,
        );
        let state = if config.auto_refresh {
            RefreshState::Idle
        } else {
            RefreshState::Paused
        };

        Self {
            view,
            selection: SelectionState::default(),
            state,
            requests,
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn state(&self) -> RefreshState {
        self.state
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    /// Periodic tick. Ignored while paused; coalesced while a cycle is in
    /// flight.
    pub fn on_tick(&mut self) {
        match self.state {
            RefreshState::Paused => {}
            RefreshState::Refreshing => debug!("tick coalesced; refresh in flight"),
            RefreshState::Idle => {
                self.request(Trigger::Timer);
            }
        }
    }

    /// Manual trigger. Returns whether a new cycle actually started;
    /// overlapping requests are dropped under the single-flight rule.
    pub fn trigger_now(&mut self, trigger: Trigger) -> bool {
        if self.state == RefreshState::Refreshing {
            debug!("{} coalesced; refresh in flight", trigger.describe());
            return false;
        }
        self.request(trigger)
    }

    fn request(&mut self, trigger: Trigger) -> bool {
        let request = SampleRequest {
            prime: self.selection.last_pid,
        };
        match self.requests.try_send(request) {
            Ok(()) => {
                debug!("refresh started ({})", trigger.describe());
                self.state = RefreshState::Refreshing;
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!("{} dropped; request queue full", trigger.describe());
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("sampling worker is gone; {} dropped", trigger.describe());
                false
            }
        }
    }

    /// Fold a finished sampling cycle into the next visible state. Filter
    /// and sort read the view state as of now, so an edit made while the
    /// sample was in flight still lands in this frame.
    pub fn complete(&mut self, outcome: Result<ProcessSnapshot>) -> CycleOutcome {
        self.state = if self.view.auto_refresh {
            RefreshState::Idle
        } else {
            RefreshState::Paused
        };

        match outcome {
            Ok(snapshot) => {
                let rows = view::apply(&snapshot, &self.view);
                let cursor = reconcile(&rows, &mut self.selection);
                debug!(
                    "refresh complete: {} of {} rows visible",
                    rows.len(),
                    snapshot.len()
                );
                CycleOutcome::Applied { rows, cursor }
            }
            Err(error) => {
                warn!("sampling failed, keeping previous table: {error:#}");
                CycleOutcome::Failed {
                    error: format!("refresh failed: {error}"),
                }
            }
        }
    }

    pub fn set_search_text(&mut self, text: String) {
        self.view.search_text = text;
        self.trigger_now(Trigger::FilterChanged);
    }

    pub fn set_sort_mode(&mut self, mode: SortMode) {
        self.view.sort_mode = mode;
        self.trigger_now(Trigger::SortChanged);
    }

    pub fn toggle_sort_mode(&mut self) -> SortMode {
        let mode = self.view.sort_mode.toggled();
        self.set_sort_mode(mode);
        mode
    }

    pub fn set_auto_refresh(&mut self, enabled: bool) {
        self.view.auto_refresh = enabled;
        match (enabled, self.state) {
            (false, RefreshState::Idle) => self.state = RefreshState::Paused,
            (true, RefreshState::Paused) => self.state = RefreshState::Idle,
            _ => {}
        }
        self.trigger_now(Trigger::AutoRefreshChanged);
    }

    /// Record a user-driven cursor move so the next reconciliation starts
    /// from it.
    pub fn record_cursor(&mut self, row: usize, column: usize, pid: Option<u32>) {
        self.selection.last_row = row;
        self.selection.last_column = column;
        self.selection.last_pid = pid;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::{Receiver, channel};
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;

    use super::*;
    use crate::config::Theme;
    use crate::sampler::{ProcessRecord, ProcessState};

    struct ScriptedSampler {
        calls: Arc<AtomicUsize>,
        script: Arc<Mutex<VecDeque<Result<ProcessSnapshot>>>>,
    }

    impl Sampler for ScriptedSampler {
        fn sample(&mut self, _prime: Option<u32>) -> Result<ProcessSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ProcessSnapshot { records: Vec::new() }))
        }
    }

    fn record(pid: u32, name: &str, cpu: f32, mem: f32) -> ProcessRecord {
        ProcessRecord {
            pid,
            name: name.to_string(),
            cpu_percent: cpu,
            mem_percent: mem,
            state: ProcessState::Running,
            started_at: None,
            owner: "tester".to_string(),
        }
    }

    fn snapshot(records: Vec<ProcessRecord>) -> Result<ProcessSnapshot> {
        Ok(ProcessSnapshot { records })
    }

    fn config() -> Config {
        Config {
            theme: Theme::Slate,
            // Long enough that the tick producer stays quiet during tests.
            refresh_rate_ms: 60_000,
            initial_filter: None,
            initial_sort: SortMode::Cpu,
            auto_refresh: true,
            log_file: None,
        }
    }

    fn harness(
        script: Vec<Result<ProcessSnapshot>>,
    ) -> (RefreshCoordinator, Receiver<Event>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let sampler = ScriptedSampler {
            calls: Arc::clone(&calls),
            script: Arc::new(Mutex::new(script.into_iter().collect())),
        };
        let (tx, rx) = channel();
        let coordinator = RefreshCoordinator::start(sampler, tx, &config());
        (coordinator, rx, calls)
    }

    fn wait_sample(rx: &Receiver<Event>) -> Result<ProcessSnapshot> {
        loop {
            match rx
                .recv_timeout(Duration::from_secs(5))
                .expect("worker should reply")
            {
                Event::SampleDone(outcome) => return outcome,
                _ => continue,
            }
        }
    }

    fn no_more_samples(rx: &Receiver<Event>) -> bool {
        let deadline = std::time::Instant::now() + Duration::from_millis(200);
        while std::time::Instant::now() < deadline {
            match rx.recv_timeout(Duration::from_millis(50)) {
                Ok(Event::SampleDone(_)) => return false,
                Ok(_) => continue,
                Err(_) => continue,
            }
        }
        true
    }

    #[test]
    fn single_flight_drops_overlapping_triggers() {
        let (mut coordinator, rx, calls) = harness(vec![snapshot(vec![record(1, "a", 1.0, 1.0)])]);

        assert!(coordinator.trigger_now(Trigger::Manual));
        assert_eq!(coordinator.state(), RefreshState::Refreshing);

        // Overlapping triggers are coalesced, not queued.
        assert!(!coordinator.trigger_now(Trigger::Manual));
        assert!(!coordinator.trigger_now(Trigger::PostKill));
        coordinator.on_tick();

        let outcome = wait_sample(&rx);
        match coordinator.complete(outcome) {
            CycleOutcome::Applied { rows, .. } => assert_eq!(rows.len(), 1),
            CycleOutcome::Failed { error } => panic!("unexpected failure: {error}"),
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(no_more_samples(&rx));
        assert_eq!(coordinator.state(), RefreshState::Idle);

        // A fresh trigger is accepted once the cycle has completed.
        assert!(coordinator.trigger_now(Trigger::Manual));
    }

    #[test]
    fn pipeline_filters_sorts_and_tracks_selection() {
        let rows = vec![
            record(10, "alpha", 5.0, 0.0),
            record(20, "beta", 90.0, 0.0),
            record(30, "gamma", 1.0, 0.0),
        ];
        let (mut coordinator, rx, _calls) =
            harness(vec![snapshot(rows.clone()), snapshot(rows)]);

        assert!(coordinator.trigger_now(Trigger::Startup));
        let outcome = coordinator.complete(wait_sample(&rx));
        let CycleOutcome::Applied { rows, cursor } = outcome else {
            panic!("expected applied cycle");
        };
        let pids: Vec<u32> = rows.iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![20, 10, 30]);
        assert_eq!(cursor, ResolvedCursor::Cell { row: 0, column: 0 });
        assert_eq!(coordinator.selection().last_pid, Some(20));

        // The user moves to pid 10; the next cycle must follow it.
        coordinator.record_cursor(1, 2, Some(10));
        assert!(coordinator.trigger_now(Trigger::Manual));
        let outcome = coordinator.complete(wait_sample(&rx));
        let CycleOutcome::Applied { cursor, .. } = outcome else {
            panic!("expected applied cycle");
        };
        assert_eq!(cursor, ResolvedCursor::Cell { row: 1, column: 2 });
        assert_eq!(coordinator.selection().last_pid, Some(10));
    }

    #[test]
    fn failed_sampling_keeps_selection_and_recovers() {
        let (mut coordinator, rx, _calls) = harness(vec![
            snapshot(vec![record(7, "keepme", 2.0, 0.0)]),
            Err(anyhow!("enumeration facility unavailable")),
        ]);

        assert!(coordinator.trigger_now(Trigger::Startup));
        coordinator.complete(wait_sample(&rx));
        assert_eq!(coordinator.selection().last_pid, Some(7));

        assert!(coordinator.trigger_now(Trigger::Manual));
        match coordinator.complete(wait_sample(&rx)) {
            CycleOutcome::Failed { error } => {
                assert!(error.contains("unavailable"), "{error}");
            }
            CycleOutcome::Applied { .. } => panic!("failure expected"),
        }

        // Selection survives the failed cycle and the loop keeps going.
        assert_eq!(coordinator.selection().last_pid, Some(7));
        assert_eq!(coordinator.state(), RefreshState::Idle);
        assert!(coordinator.trigger_now(Trigger::Manual));
    }

    #[test]
    fn paused_ignores_ticks_but_honors_manual_triggers() {
        let (mut coordinator, rx, calls) = harness(Vec::new());

        coordinator.set_auto_refresh(false);
        coordinator.complete(wait_sample(&rx));
        assert_eq!(coordinator.state(), RefreshState::Paused);
        let after_toggle = calls.load(Ordering::SeqCst);

        coordinator.on_tick();
        coordinator.on_tick();
        assert!(no_more_samples(&rx));
        assert_eq!(calls.load(Ordering::SeqCst), after_toggle);

        assert!(coordinator.trigger_now(Trigger::Manual));
        coordinator.complete(wait_sample(&rx));
        assert_eq!(coordinator.state(), RefreshState::Paused);

        coordinator.set_auto_refresh(true);
        coordinator.complete(wait_sample(&rx));
        assert_eq!(coordinator.state(), RefreshState::Idle);
    }

    #[test]
    fn view_mutations_trigger_refresh() {
        let (mut coordinator, rx, calls) = harness(Vec::new());

        coordinator.set_search_text("chrome".to_string());
        assert_eq!(coordinator.view().search_text, "chrome");
        coordinator.complete(wait_sample(&rx));

        let mode = coordinator.toggle_sort_mode();
        assert_eq!(mode, SortMode::Mem);
        coordinator.complete(wait_sample(&rx));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn filter_edit_during_flight_lands_in_current_cycle() {
        let rows = vec![
            record(1, "chrome", 1.0, 0.0),
            record(2, "bash", 1.0, 0.0),
        ];
        let (mut coordinator, rx, _calls) = harness(vec![snapshot(rows)]);

        assert!(coordinator.trigger_now(Trigger::Manual));
        // Typed while the sample is in flight; the trigger is dropped but
        // the text must still shape this cycle's output.
        coordinator.set_search_text("chr".to_string());

        let CycleOutcome::Applied { rows, .. } = coordinator.complete(wait_sample(&rx)) else {
            panic!("expected applied cycle");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "chrome");
    }
}
