// demo seed for the dashboard (MIRA_DEMO_MOCKS), anchored to local time

use crate::aggregate::{config_keys, filter_to_time_window, normalize_stack_to_percent, TimeWindow};
use crate::dashboard::baseline_snapshot;
use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime, Timelike};
use serde_json::{json, Map, Value};

/// without an override the tracked time stops growing at 13:00
const DEFAULT_CAP_MINUTES: i64 = 5 * 60;
const GOAL_MINUTES: u32 = 180;

/// Minutes tracked since 08:00. An explicit (non-negative) hour count wins and
/// is not capped.
pub fn tracked_minutes(now: NaiveDateTime, hours_from_8: Option<f64>) -> u32 {
    if let Some(hours) = hours_from_8.filter(|h| h.is_finite() && *h >= 0.0) {
        let minutes = (hours * 60.0).round().min(f64::from(u32::MAX));
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let minutes = minutes as u32;
        return minutes;
    }

    let eight = now.date().and_time(NaiveTime::MIN) + ChronoDuration::hours(8);
    let elapsed = (now - eight).num_minutes().clamp(0, DEFAULT_CAP_MINUTES);
    u32::try_from(elapsed).unwrap_or(0)
}

fn iso(t: NaiveDateTime) -> String {
    t.format("%Y-%m-%dT%H:%M:%S").to_string()
}

// smooth mid-day ramp in [0, 1]
fn ramp(idx: usize, len: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let phase = if len > 1 { idx as f64 / (len - 1) as f64 } else { 0.0 };
    (std::f64::consts::PI * phase).sin()
}

fn hourly_productivity(now: NaiveDateTime) -> Vec<Value> {
    const HOURS: usize = 9;
    let rows: Vec<Value> = (0..HOURS)
        .map(|i| {
            let back = i64::try_from(HOURS - 1 - i).unwrap_or(0);
            let at = now - ChronoDuration::hours(back);
            let shape = ramp(i, HOURS);
            json!({
                "name": format!("{:02}:00", at.hour()),
                "productive": (30.0 + 40.0 * shape).round(),
                "unproductive": (20.0 - 10.0 * shape).round().clamp(5.0, 35.0),
            })
        })
        .collect();

    // match the chart's default morning window unless that leaves nothing
    let windowed = filter_to_time_window(&rows, &TimeWindow::default());
    if windowed.is_empty() {
        rows
    } else {
        windowed
    }
}

fn idle_series(now: NaiveDateTime) -> Vec<Value> {
    const SLOTS: usize = 10;
    (0..SLOTS)
        .map(|i| {
            let back = i64::try_from((SLOTS - 1 - i) * 30).unwrap_or(0);
            let at = now - ChronoDuration::minutes(back);
            json!({
                "name": format!("{:02}:{:02}", at.hour(), at.minute()),
                "idleMin": (5.0 + 6.0 * ramp(i, SLOTS)).round(),
            })
        })
        .collect()
}

fn focus_sessions(now: NaiveDateTime) -> Vec<Value> {
    let recent = [
        ("VS Code", "Mira/src/components/", 72),
        ("Chrome", "github.com/project/issues", 34),
        ("Figma", "Dashboard v2", 58),
        ("Slack", "#product-team", 18),
        ("Terminal", "npm run dev", 25),
    ];
    recent
        .iter()
        .enumerate()
        .map(|(i, (app, window, minutes))| {
            let offset = i64::try_from(i).unwrap_or(0) * 15;
            let start = now - ChronoDuration::minutes(minutes + offset);
            json!({
                "id": (i + 1).to_string(),
                "start": iso(start),
                "end": iso(now),
                "durationSec": minutes * 60,
                "app": app,
                "window": window,
                "productivity": if *app == "Slack" { "neutral" } else { "productive" },
            })
        })
        .collect()
}

fn activity_events(now: NaiveDateTime) -> Vec<Value> {
    let events = [
        ("VS Code", "src/pages/sessions.tsx", None, 0, "Development", "productive"),
        ("Chrome", "openai.com/research", Some("openai.com"), 0, "Research", "productive"),
        ("Slack", "#design-review", Some("slack.com"), 0, "Communication", "neutral"),
        ("Twitter", "Home / X", Some("twitter.com"), 0, "Social", "unproductive"),
        ("System", "Idle", None, 300, "Idle", "idle"),
    ];
    events
        .iter()
        .enumerate()
        .map(|(i, (app, window, domain, idle_sec, category, productivity))| {
            let at = now - ChronoDuration::minutes(i64::try_from(i * 3).unwrap_or(0));
            json!({
                "ts": iso(at),
                "app": app,
                "window": window,
                "domain": domain,
                "idleSec": idle_sec,
                "category": category,
                "productivity": productivity,
            })
        })
        .collect()
}

fn set(section: &mut Map<String, Value>, key: &str, value: Value) {
    section.insert(key.to_string(), value);
}

// edit one section in place, starting from an empty object if it is missing
fn update<F>(snapshot: &mut Map<String, Value>, name: &str, edit: F)
where
    F: FnOnce(&mut Map<String, Value>),
{
    let mut section = match snapshot.remove(name) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    edit(&mut section);
    snapshot.insert(name.to_string(), Value::Object(section));
}

/// baseline shape with believable values filled in
pub fn demo_snapshot(now: NaiveDateTime, hours_from_8: Option<f64>) -> Map<String, Value> {
    let mut snapshot = baseline_snapshot();

    update(&mut snapshot, "overview", |overview| {
        set(
            overview,
            "productivityBreakdown",
            json!({
                "slices": [
                    {"name": "Productive", "value": 58},
                    {"name": "Unproductive", "value": 18},
                    {"name": "Neutral", "value": 14},
                    {"name": "Idle", "value": 7},
                    {"name": "Other", "value": 3},
                ],
                "config": {},
            }),
        );
        let config = json!({
            "productive": {"label": "Productive"},
            "unproductive": {"label": "Unproductive"},
        });
        // the hourly chart is a 100% stack over its configured series
        let points = normalize_stack_to_percent(&hourly_productivity(now), &config_keys(&config));
        set(
            overview,
            "hourlyProductivity",
            json!({"points": points, "config": config}),
        );
    });

    update(&mut snapshot, "focus", |focus| {
        set(focus, "sessions", Value::Array(focus_sessions(now)));
        set(
            focus,
            "categoryMinutes",
            json!({
                "points": [
                    {"name": "Coding", "minutes": 230},
                    {"name": "Design", "minutes": 120},
                    {"name": "Docs", "minutes": 65},
                    {"name": "Meetings", "minutes": 95},
                    {"name": "Email", "minutes": 40},
                    {"name": "Browsing", "minutes": 55},
                    {"name": "AI Ops", "minutes": 36},
                ],
                "config": {"minutes": {"label": "Focus Time (minutes)"}},
            }),
        );
        set(
            focus,
            "sessionDistribution",
            json!({
                "points": [
                    {"name": "0-15m", "sessions": 2},
                    {"name": "15-30m", "sessions": 4},
                    {"name": "30-45m", "sessions": 6},
                    {"name": "45-60m", "sessions": 7},
                    {"name": "60-90m", "sessions": 4},
                    {"name": "90m+", "sessions": 2},
                ],
                "config": {"sessions": {"label": "Sessions"}},
            }),
        );
        set(focus, "goalMinutes", json!(GOAL_MINUTES));
    });

    let today = now.date();
    let at = |h: u32, m: u32| today.and_hms_opt(h, m, 0).map(iso);
    update(&mut snapshot, "idle", |idle| {
        set(
            idle,
            "idleOverTime",
            json!({
                "points": idle_series(now),
                "config": {"idleMin": {"label": "Idle Minutes"}},
            }),
        );
        set(
            idle,
            "longBreaks",
            json!([
                {"start": at(12, 15), "end": at(12, 55), "durationMin": 40, "reason": "Lunch"},
                {"start": at(16, 20), "end": at(16, 45), "durationMin": 25, "reason": "Walk"},
            ]),
        );
        set(idle, "trackedMinutes", json!(tracked_minutes(now, hours_from_8)));
    });

    update(&mut snapshot, "timeline", |timeline| {
        set(timeline, "activityEvents", Value::Array(activity_events(now)));
    });

    snapshot
}

/// what the provider starts from when nothing was persisted
pub fn seed_snapshot(demo: bool, now: NaiveDateTime, hours_from_8: Option<f64>) -> Map<String, Value> {
    if demo {
        demo_snapshot(now, hours_from_8)
    } else {
        baseline_snapshot()
    }
}
