// chart-series helpers applied to dashboard sections before they are served

use serde_json::{Map, Value};

/// inclusive time-of-day window applied to time-labelled rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
    pub name_key: String,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            start: "08:00".to_string(),
            end: "13:00".to_string(),
            name_key: "name".to_string(),
        }
    }
}

/// Minutes since midnight for `HH:MM` / `H:MM` (24h) and compact 12h labels
/// such as `6a`, `12p`, `1p`.
pub fn parse_time_label(raw: &str) -> Option<u32> {
    let s = raw.trim().to_ascii_lowercase();
    if s.is_empty() {
        return None;
    }

    if let Some((h, m)) = s.split_once(':') {
        let valid_digits = |part: &str, lo: usize, hi: usize| {
            (lo..=hi).contains(&part.len()) && part.bytes().all(|b| b.is_ascii_digit())
        };
        if !valid_digits(h, 1, 2) || !valid_digits(m, 2, 2) {
            return None;
        }
        let (h, m): (u32, u32) = (h.parse().ok()?, m.parse().ok()?);
        return (h < 24 && m < 60).then_some(h * 60 + m);
    }

    let meridiem = s.chars().last()?;
    if meridiem != 'a' && meridiem != 'p' {
        return None;
    }
    let digits = &s[..s.len() - 1];
    if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour: u32 = digits.parse().ok()?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    let hour = match (meridiem, hour) {
        ('a', 12) => 0,
        ('a', h) | ('p', h @ 12) => h,
        (_, h) => h + 12,
    };
    Some(hour * 60)
}

fn row_minutes(row: &Value, key: &str) -> Option<u32> {
    row.get(key).and_then(Value::as_str).and_then(parse_time_label)
}

/// Keep rows whose label falls inside the window. Series that do not look
/// time-labelled (judged by the first row) or an unparseable window leave the
/// rows untouched; individual rows with bad labels are dropped.
pub fn filter_to_time_window(rows: &[Value], window: &TimeWindow) -> Vec<Value> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    if row_minutes(first, &window.name_key).is_none() {
        return rows.to_vec();
    }
    let (Some(a), Some(b)) = (parse_time_label(&window.start), parse_time_label(&window.end)) else {
        return rows.to_vec();
    };
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

    rows.iter()
        .filter(|row| row_minutes(row, &window.name_key).is_some_and(|m| (lo..=hi).contains(&m)))
        .cloned()
        .collect()
}

// loose numeric read: numbers and numeric strings, anything else is 0
fn number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        Some(Value::Bool(true)) => 1.0,
        _ => 0.0,
    }
}

/// Rescale `keys` in every row so they sum to 100. Rows summing to zero are
/// left as they are; other fields ride along.
pub fn normalize_stack_to_percent(rows: &[Value], keys: &[&str]) -> Vec<Value> {
    if keys.is_empty() {
        return rows.to_vec();
    }
    rows.iter()
        .map(|row| {
            let Value::Object(fields) = row else {
                return row.clone();
            };
            let total: f64 = keys.iter().map(|k| number(fields.get(*k))).sum();
            if !total.is_finite() || total.abs() < f64::EPSILON {
                return row.clone();
            }
            let mut out: Map<String, Value> = fields.clone();
            for key in keys {
                let pct = number(fields.get(*key)) / total * 100.0;
                out.insert((*key).to_string(), Value::from(pct));
            }
            Value::Object(out)
        })
        .collect()
}

/// keys of a chart config object, in order
pub fn config_keys(config: &Value) -> Vec<&str> {
    config
        .as_object()
        .map(|c| c.keys().map(String::as_str).collect())
        .unwrap_or_default()
}
