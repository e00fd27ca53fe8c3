use std::collections::BTreeMap;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub total_requests: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub per_capability: BTreeMap<String, u64>,
}

pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn write_session_summary(
    path: &Path,
    summary: &SessionSummary,
    extra: Option<&Map<String, Value>>,
) -> anyhow::Result<()> {
    let mut payload = Map::new();
    payload.insert(
        "session_id".to_string(),
        Value::String(summary.session_id.clone()),
    );
    payload.insert(
        "started_at".to_string(),
        Value::String(summary.started_at.clone()),
    );
    payload.insert(
        "finished_at".to_string(),
        Value::String(summary.finished_at.clone()),
    );
    payload.insert(
        "total_requests".to_string(),
        Value::Number(summary.total_requests.into()),
    );
    payload.insert("errors".to_string(), Value::Number(summary.errors.into()));
    payload.insert(
        "cache_hits".to_string(),
        Value::Number(summary.cache_hits.into()),
    );
    payload.insert(
        "per_capability".to_string(),
        Value::Object(
            summary
                .per_capability
                .iter()
                .map(|(name, count)| (name.clone(), Value::Number((*count).into())))
                .collect(),
        ),
    );
    payload.insert("ts".to_string(), Value::String(now_utc_iso()));
    if let Some(extra) = extra {
        for (key, value) in extra {
            payload.insert(key.clone(), value.clone());
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&Value::Object(payload))?)?;
    Ok(())
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::{json, Map, Value};

    use super::{new_session_id, write_session_summary, SessionSummary};

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(new_session_id(), new_session_id());
    }

    #[test]
    fn write_summary_generates_expected_payload() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("summary.json");

        let mut per_capability = BTreeMap::new();
        per_capability.insert("GENERAL".to_string(), 3u64);
        per_capability.insert("SENSOR".to_string(), 1u64);
        let summary = SessionSummary {
            session_id: "session-123".to_string(),
            started_at: "2026-08-06T00:00:00+00:00".to_string(),
            finished_at: "2026-08-06T00:10:00+00:00".to_string(),
            total_requests: 5,
            errors: 1,
            cache_hits: 2,
            per_capability,
        };
        let mut extra = Map::new();
        extra.insert("gateway".to_string(), Value::String("dryrun".to_string()));
        write_session_summary(&path, &summary, Some(&extra))?;

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        assert_eq!(parsed["session_id"], json!("session-123"));
        assert_eq!(parsed["total_requests"], json!(5));
        assert_eq!(parsed["per_capability"]["GENERAL"], json!(3));
        assert_eq!(parsed["gateway"], json!("dryrun"));
        assert!(parsed.get("ts").and_then(Value::as_str).is_some());
        Ok(())
    }
}
