//! Engine record parsing
//!
//! The tracing engine emits one line per OOM kill: space-separated
//! `key="value"` tokens, with `\"` escapes honored inside values. Parsing is
//! pure with respect to the rest of the pipeline; a bad line produces a
//! [`ParseError`] and is dropped by the caller, it never halts ingestion.
//!
//! Keys the parser does not know by name are routed into the event's stat
//! buckets by prefix: `mm_*` and `oc_*` into memory stats, `memcg_*` into
//! cgroup stats, `proc_*` (and anything unrecognized) into process stats.
//! Duplicate keys resolve last-occurrence-wins.

use crate::models::{FieldValue, OomKillEvent, StatMap};
use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

/// Fields every record must carry. `timestamp` is also mandatory on the
/// event but is stamped at parse time when the engine omits `ts`.
pub const MANDATORY_FIELDS: &[&str] = &["host_pid", "oc_totalpages", "oc_chosen_points"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("record is missing mandatory field `{0}`")]
    MissingField(String),
    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Parse one engine record into a normalized event.
pub fn parse(line: &str) -> Result<OomKillEvent, ParseError> {
    let mut host_pid: Option<u32> = None;
    let mut ts: Option<DateTime<Utc>> = None;
    let mut container_id = String::new();
    let mut cgroup_path = String::new();
    let mut command = String::new();
    let mut memory_stats = StatMap::new();
    let mut cgroup_stats = StatMap::new();
    let mut process_stats = StatMap::new();

    for (key, value) in tokenize(line)? {
        match key.as_str() {
            "host_pid" => {
                let pid = value
                    .parse::<u32>()
                    .map_err(|_| ParseError::Malformed(format!("host_pid `{value}` is not a pid")))?;
                host_pid = Some(pid);
            }
            "ts" => {
                let millis = value
                    .parse::<i64>()
                    .map_err(|_| ParseError::Malformed(format!("ts `{value}` is not epoch millis")))?;
                ts = Utc.timestamp_millis_opt(millis).single();
            }
            "container_id" => container_id = value,
            "cgroup_path" => cgroup_path = value,
            "command" => command = value,
            _ => {
                let bucket = if key.starts_with("mm_") || key.starts_with("oc_") {
                    &mut memory_stats
                } else if key.starts_with("memcg_") {
                    &mut cgroup_stats
                } else {
                    &mut process_stats
                };
                bucket.insert(key, coerce(value));
            }
        }
    }

    let host_pid = host_pid.ok_or_else(|| ParseError::MissingField("host_pid".to_string()))?;
    for field in ["oc_totalpages", "oc_chosen_points"] {
        if !memory_stats.contains_key(field) {
            return Err(ParseError::MissingField(field.to_string()));
        }
    }

    let timestamp = ts.unwrap_or_else(Utc::now);

    // Identity is best-effort: a record without an explicit container_id may
    // still carry a runtime-shaped id inside its cgroup path. Failure to find
    // one leaves the field empty, it is never an error.
    if container_id.is_empty() && !cgroup_path.is_empty() {
        if let Some(id) = extract_container_id(&cgroup_path) {
            container_id = id;
        }
    }

    if !process_stats.contains_key("proc_uptime_ms") {
        if let Some(start_ms) = process_stats.get("proc_start_time_ms").and_then(FieldValue::as_int) {
            let uptime = timestamp.timestamp_millis() - start_ms;
            if uptime >= 0 {
                process_stats.insert("proc_uptime_ms".to_string(), FieldValue::Int(uptime));
            }
        }
    }

    Ok(OomKillEvent {
        timestamp,
        host_pid,
        container_id,
        cgroup_path,
        command,
        memory_stats,
        cgroup_stats,
        process_stats,
    })
}

/// Split a record into key/value pairs on unescaped whitespace outside quotes.
fn tokenize(line: &str) -> Result<Vec<(String, String)>, ParseError> {
    let mut pairs = Vec::new();
    let mut token = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in line.chars() {
        if escaped {
            token.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => {
                token.push(c);
                escaped = true;
            }
            '"' => {
                token.push(c);
                in_quotes = !in_quotes;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !token.is_empty() {
                    pairs.push(split_pair(&token)?);
                    token.clear();
                }
            }
            c => token.push(c),
        }
    }
    if in_quotes {
        return Err(ParseError::Malformed("unterminated quote".to_string()));
    }
    if !token.is_empty() {
        pairs.push(split_pair(&token)?);
    }
    if pairs.is_empty() {
        return Err(ParseError::Malformed("empty record".to_string()));
    }
    Ok(pairs)
}

/// Split one `key="value"` token and unescape the value.
fn split_pair(token: &str) -> Result<(String, String), ParseError> {
    let (key, raw) = token
        .split_once('=')
        .ok_or_else(|| ParseError::Malformed(format!("token `{token}` is not key=\"value\"")))?;
    if key.is_empty() {
        return Err(ParseError::Malformed(format!("token `{token}` has an empty key")));
    }
    let inner = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .ok_or_else(|| ParseError::Malformed(format!("value of `{key}` is not quoted")))?;

    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                value.push(next);
            }
        } else {
            value.push(c);
        }
    }
    Ok((key.to_string(), value))
}

fn coerce(value: String) -> FieldValue {
    match value.parse::<i64>() {
        Ok(v) => FieldValue::Int(v),
        Err(_) => FieldValue::Str(value),
    }
}

/// Extract a container id from a raw cgroup path.
///
/// Handles the common runtime formats:
/// - Docker: `/docker/<64-hex>` or `docker-<64-hex>.scope`
/// - containerd: `.../cri-containerd-<64-hex>.scope`
/// - CRI-O: `.../crio-<64-hex>.scope`
///
/// The path may hold several hierarchy entries joined by the engine's
/// delimiter; all of them are scanned.
pub fn extract_container_id(cgroup_path: &str) -> Option<String> {
    let parts: Vec<&str> = cgroup_path.split(['/', ',', ':']).collect();
    for part in parts.iter().rev() {
        let part = part.strip_suffix(".scope").unwrap_or(part);
        let id = part
            .strip_prefix("crio-")
            .or_else(|| part.strip_prefix("cri-containerd-"))
            .or_else(|| part.strip_prefix("docker-"))
            .unwrap_or(part);
        if id.len() == 64 && id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Some(id.to_string());
        }
    }
    None
}
