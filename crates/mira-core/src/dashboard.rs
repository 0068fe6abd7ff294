// dashboard data provider - seed, poll, merge, persist
//
// The snapshot is a JSON object of independently updatable sections. Section
// contents are opaque here; only the top-level merge rules are enforced.

use crate::backend::BackendError;
use crate::storage::{SessionStore, DASHBOARD_DATA_KEY, DASHBOARD_GENERATED_AT_KEY};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// sections replaced wholesale when present in a payload
pub const SECTIONS: [&str; 6] = ["overview", "focus", "idle", "apps", "switches", "timeline"];
/// merged one level deeper
pub const SETTINGS: &str = "settings";

/// `GET /api/dashboard/` body
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DashboardPayload {
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    Applied,
    /// not strictly newer than what is held
    Stale,
    /// payload carried no data object
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    Merged(MergeOutcome),
    Cancelled,
    Failed,
}

fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw.trim()).ok()
}

/// held snapshot plus its freshness marker
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardState {
    data: Map<String, Value>,
    generated_at: Option<String>,
}

impl DashboardState {
    pub fn new(data: Map<String, Value>, generated_at: Option<String>) -> Self {
        Self { data, generated_at }
    }

    pub fn baseline() -> Self {
        Self::new(baseline_snapshot(), None)
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.data.clone())
    }

    pub fn generated_at(&self) -> Option<&str> {
        self.generated_at.as_deref()
    }

    /// Apply a payload unless it is not strictly newer than the held marker.
    /// A payload with no usable `generated_at` is merged but leaves the marker.
    pub fn apply(&mut self, payload: &DashboardPayload) -> MergeOutcome {
        let Some(Value::Object(incoming)) = &payload.data else {
            return MergeOutcome::Empty;
        };

        let incoming_ts = payload.generated_at.as_deref().and_then(parse_timestamp);
        let held_ts = self.generated_at.as_deref().and_then(parse_timestamp);
        if let (Some(next), Some(held)) = (incoming_ts, held_ts) {
            if next <= held {
                return MergeOutcome::Stale;
            }
        }

        merge_sections(&mut self.data, incoming);
        if incoming_ts.is_some() {
            self.generated_at.clone_from(&payload.generated_at);
        }
        MergeOutcome::Applied
    }
}

/// null sections count as absent
pub fn merge_sections(base: &mut Map<String, Value>, incoming: &Map<String, Value>) {
    for key in SECTIONS {
        match incoming.get(key) {
            Some(Value::Null) | None => {}
            Some(section) => {
                base.insert(key.to_string(), section.clone());
            }
        }
    }

    if let Some(Value::Object(settings)) = incoming.get(SETTINGS) {
        let target = base
            .entry(SETTINGS)
            .or_insert_with(|| Value::Object(Map::new()));
        if !target.is_object() {
            *target = Value::Object(Map::new());
        }
        if let Value::Object(target) = target {
            for (k, v) in settings {
                target.insert(k.clone(), v.clone());
            }
        }
    }
}

fn series() -> Value {
    json!({"points": [], "config": {}})
}

fn slices() -> Value {
    json!({"slices": [], "config": {}})
}

/// empty shape every section starts from when nothing was persisted
pub fn baseline_snapshot() -> Map<String, Value> {
    let value = json!({
        "overview": {
            "productivityBreakdown": slices(),
            "hourlyProductivity": series(),
            "contextSwitchTrend": series(),
            "weeklyProductivity": series(),
        },
        "focus": {
            "sessions": [],
            "categoryMinutes": series(),
            "sessionDistribution": series(),
            "focusScoreTrend": series(),
            "goalMinutes": 0,
        },
        "idle": {
            "idleOverTime": series(),
            "longBreaks": [],
            "trackedMinutes": 0,
        },
        "apps": {
            "usageByApp": series(),
            "categoryDistribution": slices(),
            "productiveVsUnproductive": series(),
            "sessions": [],
        },
        "switches": {
            "switchesOverTime": series(),
            "switchIntensity": series(),
            "topPairs": [],
        },
        "timeline": {
            "dailyTimeline": series(),
            "activityEvents": [],
        },
        "settings": {
            "thresholds": {"sessionSeconds": 0, "idleSeconds": 0, "breakMinutes": 0},
            "rules": [],
            "privacy": {"redactFilenames": false, "hideScreenshots": false, "anonymizeDomains": false},
            "dataManagement": {"retentionDays": 0, "exportLabel": "", "deleteLabel": ""},
        },
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// where dashboard payloads come from
pub trait DashboardSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<DashboardPayload, BackendError>> + Send;
}

type Observer = Arc<dyn Fn(&Value) + Send + Sync>;

struct ProviderInner<S> {
    source: S,
    state: Mutex<DashboardState>,
    store: Option<Arc<SessionStore>>,
    observer: Mutex<Option<Observer>>,
    inflight: Mutex<Option<(u64, CancellationToken)>>,
    refresh_seq: AtomicU64,
    refreshing: AtomicBool,
}

pub struct DashboardProvider<S> {
    inner: Arc<ProviderInner<S>>,
}

impl<S> Clone for DashboardProvider<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: DashboardSource> DashboardProvider<S> {
    /// Seed from the session store when it holds a snapshot, else `seed`.
    pub fn new(source: S, store: Option<Arc<SessionStore>>, seed: Map<String, Value>) -> Self {
        let state = store
            .as_deref()
            .and_then(load_persisted)
            .unwrap_or_else(|| DashboardState::new(seed, None));
        Self::with_state(source, store, state)
    }

    fn with_state(source: S, store: Option<Arc<SessionStore>>, state: DashboardState) -> Self {
        Self {
            inner: Arc::new(ProviderInner {
                source,
                state: Mutex::new(state),
                store,
                observer: Mutex::new(None),
                inflight: Mutex::new(None),
                refresh_seq: AtomicU64::new(0),
                refreshing: AtomicBool::new(false),
            }),
        }
    }

    /// called with the merged snapshot after every accepted payload
    pub fn set_observer<F>(&self, observer: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        *lock(&self.inner.observer) = Some(Arc::new(observer));
    }

    pub fn snapshot(&self) -> Value {
        lock(&self.inner.state).to_value()
    }

    pub fn generated_at(&self) -> Option<String> {
        lock(&self.inner.state).generated_at.clone()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.refreshing.load(Ordering::SeqCst)
    }

    /// Explicit refresh. Supersedes (cancels) whatever fetch is in flight,
    /// a poll included.
    pub async fn refresh(&self) -> FetchOutcome {
        self.supersede(CancellationToken::new()).await
    }

    /// Poll every `interval` (first fetch immediately). Stopping the returned
    /// handle cancels the in-flight fetch.
    pub fn spawn_polling(&self, interval: Duration) -> PollingHandle {
        let root = CancellationToken::new();
        let this = self.clone();
        let token = root.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let outcome = this.supersede(token.child_token()).await;
                debug!(?outcome, "dashboard poll");
            }
            debug!("dashboard polling stopped");
        });
        info!(?interval, "dashboard polling started");
        PollingHandle {
            token: root,
            task: Some(task),
        }
    }

    /// cancel the fetch that is still running, if any
    pub fn cancel_refresh(&self) {
        if let Some((_, token)) = lock(&self.inner.inflight).take() {
            token.cancel();
            self.inner.refreshing.store(false, Ordering::SeqCst);
        }
    }

    // polls and explicit refreshes share one in-flight slot; the newest wins
    async fn supersede(&self, token: CancellationToken) -> FetchOutcome {
        let seq = self.inner.refresh_seq.fetch_add(1, Ordering::SeqCst);
        if let Some((_, previous)) = lock(&self.inner.inflight).replace((seq, token.clone())) {
            previous.cancel();
        }

        self.inner.refreshing.store(true, Ordering::SeqCst);
        let outcome = self.fetch_once(&token).await;

        // only the latest fetch clears the slot and the flag
        let mut inflight = lock(&self.inner.inflight);
        if inflight.as_ref().is_some_and(|(current, _)| *current == seq) {
            *inflight = None;
            self.inner.refreshing.store(false, Ordering::SeqCst);
        }
        outcome
    }

    async fn fetch_once(&self, token: &CancellationToken) -> FetchOutcome {
        let result = tokio::select! {
            () = token.cancelled() => return FetchOutcome::Cancelled,
            result = self.inner.source.fetch() => result,
        };

        let payload = match result {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to hydrate dashboard data");
                return FetchOutcome::Failed;
            }
        };
        // a cancel that lands while the body was being parsed still wins
        if token.is_cancelled() {
            return FetchOutcome::Cancelled;
        }

        FetchOutcome::Merged(self.apply(&payload))
    }

    /// merge a payload obtained elsewhere; persists and notifies on success
    pub fn apply(&self, payload: &DashboardPayload) -> MergeOutcome {
        let (outcome, merged) = {
            let mut state = lock(&self.inner.state);
            let outcome = state.apply(payload);
            if outcome == MergeOutcome::Applied {
                if let Some(store) = &self.inner.store {
                    persist(store, &state);
                }
            }
            (outcome, (outcome == MergeOutcome::Applied).then(|| state.to_value()))
        };

        match outcome {
            MergeOutcome::Applied => debug!(generated_at = ?payload.generated_at, "dashboard merged"),
            MergeOutcome::Stale => debug!(generated_at = ?payload.generated_at, "ignoring stale dashboard payload"),
            MergeOutcome::Empty => debug!("dashboard payload without data"),
        }

        if let Some(merged) = merged {
            let observer = lock(&self.inner.observer).clone();
            if let Some(observer) = observer {
                observer(&merged);
            }
        }
        outcome
    }
}

fn load_persisted(store: &SessionStore) -> Option<DashboardState> {
    let raw = match store.get(DASHBOARD_DATA_KEY) {
        Ok(raw) => raw?,
        Err(e) => {
            warn!(error = %e, "failed to read persisted dashboard");
            return None;
        }
    };
    let Ok(Value::Object(data)) = serde_json::from_str::<Value>(&raw) else {
        warn!("persisted dashboard is not a JSON object, ignoring");
        return None;
    };
    let generated_at = store.get(DASHBOARD_GENERATED_AT_KEY).ok().flatten();
    info!(?generated_at, "seeded dashboard from session store");
    Some(DashboardState::new(data, generated_at))
}

fn persist(store: &SessionStore, state: &DashboardState) {
    let data = match serde_json::to_string(&state.data) {
        Ok(data) => data,
        Err(e) => {
            warn!(error = %e, "failed to serialize dashboard");
            return;
        }
    };
    let result = match state.generated_at() {
        Some(generated_at) => store.set_many(&[
            (DASHBOARD_DATA_KEY, data.as_str()),
            (DASHBOARD_GENERATED_AT_KEY, generated_at),
        ]),
        None => store.set(DASHBOARD_DATA_KEY, &data),
    };
    if let Err(e) = result {
        warn!(error = %e, "failed to persist dashboard");
    }
}

pub struct PollingHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollingHandle {
    /// stop polling and cancel whatever fetch is running
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn join(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
