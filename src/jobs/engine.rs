//! Job Correlation Engine
//!
//! Consumes one provider callback at a time: correlates it to the job
//! record that originated it (lazily reconstructing the record from context
//! embedded in the payload when the local one is missing), throttles
//! progress edits, and on a terminal status delivers the final outputs and
//! retires the record.
//!
//! Callbacks arrive at-least-once with no ordering guarantee. Every branch
//! must tolerate duplication and reordering: a terminal callback replayed
//! after the record was deleted is a no-op, never an error.

use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::jobs::classify::{classify_output, OutputKind};
use crate::jobs::progress::extract_percent;
use crate::jobs::store::{JobRecord, JobStore};
use crate::notify::Notifier;

/// Minimum percent delta before another progress edit is worth sending.
pub const PERCENT_DELTA: u8 = 5;

/// A progress edit is sent after this long even without a percent delta.
pub const UPDATE_INTERVAL_MS: i64 = 15_000;

/// Failure payloads are truncated to this many characters before sending.
const FAILURE_RENDER_LIMIT: usize = 2000;

/// One inbound callback from the remote job provider.
#[derive(Debug, Clone)]
pub struct CallbackEvent {
    pub job_id: Option<String>,
    pub status: Option<String>,
    pub payload: Value,
}

impl CallbackEvent {
    /// Parse a raw webhook body. Some providers nest the job body under a
    /// wrapper object; unwrap it so the rest of the engine sees one shape.
    pub fn from_payload(raw: Value) -> Self {
        let body = match raw.get("prediction") {
            Some(inner) if inner.is_object() => inner.clone(),
            _ => raw,
        };

        let job_id = body
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let status = body
            .get("status")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Self {
            job_id,
            status,
            payload: body,
        }
    }
}

/// Job status as reported by the provider, as a tagged variant so the state
/// machine is exhaustive. Unrecognized statuses (including "canceled") map
/// to [`JobStatus::Continuing`] and leave the record in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Continuing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn parse(status: Option<&str>) -> Self {
        match status {
            Some("succeeded") => JobStatus::Succeeded,
            Some("failed") | Some("error") => JobStatus::Failed,
            _ => JobStatus::Continuing,
        }
    }
}

/// Pure throttle predicate: notify when a known percent moved at least
/// [`PERCENT_DELTA`] past the last surfaced one (no prior percent counts as
/// moved), or when more than [`UPDATE_INTERVAL_MS`] elapsed since the last
/// notification regardless of percent.
pub fn should_notify(
    last_percent: Option<u8>,
    last_update_at_ms: i64,
    percent: Option<u8>,
    now_ms: i64,
) -> bool {
    let delta_ok = match (percent, last_percent) {
        (Some(p), Some(last)) => p as i16 - last as i16 >= PERCENT_DELTA as i16,
        (Some(_), None) => true,
        (None, _) => false,
    };

    delta_ok || now_ms - last_update_at_ms > UPDATE_INTERVAL_MS
}

/// The correlation engine. One logical writer per job id in the expected
/// deployment; concurrent callbacks for the same id may lose a progress
/// update but never a terminal delivery.
pub struct JobEngine {
    store: Mutex<JobStore>,
    notifier: Arc<dyn Notifier>,
}

impl JobEngine {
    pub fn new(store: JobStore, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store: Mutex::new(store),
            notifier,
        }
    }

    /// Start tracking a job at submission time, before any callback can
    /// arrive. Called by the command-dispatch path.
    pub async fn track(&self, job_id: &str, chat_id: i64, caption: &str) -> Result<()> {
        let record = JobRecord::new(job_id, chat_id, caption);
        self.store.lock().await.put(&record)?;
        Ok(())
    }

    /// Handle one callback event. Never fatal: uncorrelatable events are
    /// discarded, notifier failures are logged and swallowed.
    pub async fn handle_event(&self, event: CallbackEvent) -> Result<()> {
        let Some(mut record) = self.correlate(&event).await? else {
            debug!("Discarding uncorrelatable callback: {:?}", event.job_id);
            return Ok(());
        };

        let percent = extract_percent(&event.payload);
        let now_ms = chrono::Utc::now().timestamp_millis();

        if should_notify(record.last_percent, record.last_update_at_ms, percent, now_ms) {
            self.notify_progress(&mut record, percent, now_ms).await;
            self.store.lock().await.put(&record)?;
        }

        match JobStatus::parse(event.status.as_deref()) {
            JobStatus::Succeeded => {
                self.deliver_outputs(&mut record, &event.payload).await;
                self.store.lock().await.delete(&record.job_id)?;
            }
            JobStatus::Failed => {
                self.report_failure(&record, &event.payload).await;
                self.store.lock().await.delete(&record.job_id)?;
            }
            JobStatus::Continuing => {}
        }

        Ok(())
    }

    /// Resolve the event to a job record. Missing records are lazily
    /// synthesized from the payload's embedded input context when possible;
    /// otherwise the event is dropped.
    async fn correlate(&self, event: &CallbackEvent) -> Result<Option<JobRecord>> {
        let Some(job_id) = event.job_id.as_deref() else {
            // Nothing to correlate, with or without embedded context.
            return Ok(None);
        };

        let store = self.store.lock().await;
        if let Some(record) = store.get(job_id)? {
            return Ok(Some(record));
        }

        let Some((chat_id, caption)) = embedded_context(&event.payload) else {
            return Ok(None);
        };

        debug!("Recovering missing record for job {} from payload", job_id);
        let record = JobRecord::new(job_id, chat_id, &caption);
        store.put(&record)?;
        Ok(Some(record))
    }

    /// Send or edit the progress surface. Failures here are cosmetic: the
    /// next callback re-attempts naturally, so errors are logged and
    /// swallowed while the record still advances.
    async fn notify_progress(&self, record: &mut JobRecord, percent: Option<u8>, now_ms: i64) {
        let text = match percent {
            Some(p) => format!("Processing: {}%", p),
            None => "Processing: processing...".to_string(),
        };

        if let Some(message_id) = record.final_media_message_id {
            if let Err(e) = self
                .notifier
                .edit_caption(record.chat_id, message_id, &text)
                .await
            {
                warn!("Progress caption edit failed for {}: {}", record.job_id, e);
            }
        } else if let Some(message_id) = record.progress_message_id {
            let result = if record.progress_is_media {
                self.notifier
                    .edit_caption(record.chat_id, message_id, &text)
                    .await
            } else {
                self.notifier
                    .edit_text(record.chat_id, message_id, &text)
                    .await
            };
            if let Err(e) = result {
                warn!("Progress edit failed for {}: {}", record.job_id, e);
            }
        } else {
            match self.notifier.send_text(record.chat_id, &text).await {
                Ok(message_id) => {
                    record.progress_message_id = Some(message_id);
                    record.progress_is_media = false;
                }
                Err(e) => warn!("Progress send failed for {}: {}", record.job_id, e),
            }
        }

        if percent.is_some() {
            record.last_percent = percent;
        }
        record.last_update_at_ms = now_ms;
    }

    /// Deliver every non-empty terminal output through the capability
    /// matching its classified kind, attaching the stored caption.
    async fn deliver_outputs(&self, record: &mut JobRecord, payload: &Value) {
        let mut outputs = Vec::new();
        if let Some(output) = payload.get("output") {
            flatten_outputs(output, &mut outputs);
        }

        let mut delivered = 0usize;
        for value in &outputs {
            let Some((kind, content)) = classify_output(value) else {
                continue;
            };

            let chat_id = record.chat_id;
            let caption = record.caption.as_str();
            let result = match kind {
                OutputKind::Video => self.notifier.send_video(chat_id, &content, caption).await,
                OutputKind::Photo => self.notifier.send_photo(chat_id, &content, caption).await,
                // Audio goes through the document capability: voice notes
                // need bytes, which a remote URL does not provide.
                OutputKind::Audio | OutputKind::Document => {
                    self.notifier.send_document(chat_id, &content, caption).await
                }
                OutputKind::Text => self.notifier.send_text(chat_id, &content).await,
            };

            match result {
                Ok(message_id) => {
                    delivered += 1;
                    if kind != OutputKind::Text && record.final_media_message_id.is_none() {
                        record.final_media_message_id = Some(message_id);
                    }
                }
                Err(e) => warn!("Output delivery failed for {}: {}", record.job_id, e),
            }
        }

        if delivered == 0 {
            if let Err(e) = self
                .notifier
                .send_text(record.chat_id, "Job finished but produced no output.")
                .await
            {
                warn!("No-output notice failed for {}: {}", record.job_id, e);
            }
        }
    }

    /// Surface a terminal failure once, with a bounded rendering of the
    /// payload for diagnosis.
    async fn report_failure(&self, record: &JobRecord, payload: &Value) {
        let detail = payload
            .get("error")
            .filter(|v| !v.is_null())
            .unwrap_or(payload);
        let rendered = truncate_chars(&detail.to_string(), FAILURE_RENDER_LIMIT);
        let text = format!("Generation failed:\n{}", rendered);

        if let Err(e) = self.notifier.send_text(record.chat_id, &text).await {
            warn!("Failure notice failed for {}: {}", record.job_id, e);
        }
    }
}

/// Collect leaf output values, tolerating a single value, an array, or
/// nested arrays. Nulls are dropped.
fn flatten_outputs(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_outputs(item, out);
            }
        }
        Value::Null => {}
        other => out.push(other.clone()),
    }
}

/// Chat id and caption embedded in the payload's input block, if present.
/// This is the lazy-recovery source when the local record is missing.
fn embedded_context(payload: &Value) -> Option<(i64, String)> {
    let input = payload.get("input")?;
    let chat_id = match input.get("chat_id")? {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.parse().ok()?,
        _ => return None,
    };
    let caption = input
        .get("caption")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    Some((chat_id, caption))
}

fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        s.chars().take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    mod throttle {
        use super::super::*;

        #[test]
        fn test_first_known_percent_notifies() {
            assert!(should_notify(None, 0, Some(10), 1_000));
        }

        #[test]
        fn test_delta_at_threshold_notifies() {
            let now = 1_000_000;
            assert!(should_notify(Some(10), now - 1_000, Some(15), now));
        }

        #[test]
        fn test_small_delta_within_interval_suppressed() {
            let now = 1_000_000;
            assert!(!should_notify(Some(10), now - 1_000, Some(12), now));
        }

        #[test]
        fn test_lower_percent_within_interval_suppressed() {
            // The provider does not guarantee monotonic progress.
            let now = 1_000_000;
            assert!(!should_notify(Some(50), now - 1_000, Some(40), now));
        }

        #[test]
        fn test_elapsed_interval_notifies_without_delta() {
            let now = 1_000_000;
            assert!(should_notify(Some(10), now - 16_000, Some(10), now));
            assert!(should_notify(Some(10), now - 16_000, None, now));
        }

        #[test]
        fn test_unknown_percent_within_interval_suppressed() {
            let now = 1_000_000;
            assert!(!should_notify(Some(10), now - 1_000, None, now));
        }
    }

    mod status {
        use super::super::*;

        #[test]
        fn test_terminal_statuses() {
            assert_eq!(JobStatus::parse(Some("succeeded")), JobStatus::Succeeded);
            assert_eq!(JobStatus::parse(Some("failed")), JobStatus::Failed);
            assert_eq!(JobStatus::parse(Some("error")), JobStatus::Failed);
        }

        #[test]
        fn test_everything_else_continues() {
            assert_eq!(JobStatus::parse(Some("starting")), JobStatus::Continuing);
            assert_eq!(JobStatus::parse(Some("processing")), JobStatus::Continuing);
            // Known gap carried over from the source: canceled never
            // retires the record.
            assert_eq!(JobStatus::parse(Some("canceled")), JobStatus::Continuing);
            assert_eq!(JobStatus::parse(None), JobStatus::Continuing);
        }
    }

    mod event_parsing {
        use super::super::*;
        use serde_json::json;

        #[test]
        fn test_top_level_fields() {
            let event = CallbackEvent::from_payload(json!({
                "id": "pred-1", "status": "processing"
            }));
            assert_eq!(event.job_id.as_deref(), Some("pred-1"));
            assert_eq!(event.status.as_deref(), Some("processing"));
        }

        #[test]
        fn test_nested_body_unwrapped() {
            let event = CallbackEvent::from_payload(json!({
                "event": "completed",
                "prediction": {"id": "pred-2", "status": "succeeded"}
            }));
            assert_eq!(event.job_id.as_deref(), Some("pred-2"));
            assert_eq!(event.status.as_deref(), Some("succeeded"));
        }

        #[test]
        fn test_missing_fields() {
            let event = CallbackEvent::from_payload(json!({"logs": "hi"}));
            assert!(event.job_id.is_none());
            assert!(event.status.is_none());
        }
    }

    #[test]
    fn test_flatten_outputs_nested() {
        let mut out = Vec::new();
        flatten_outputs(&json!(["a", ["b", ["c"]], null, "d"]), &mut out);
        let items: Vec<&str> = out.iter().filter_map(|v| v.as_str()).collect();
        assert_eq!(items, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_embedded_context_variants() {
        assert_eq!(
            embedded_context(&json!({"input": {"chat_id": 7, "caption": "hi"}})),
            Some((7, "hi".to_string()))
        );
        assert_eq!(
            embedded_context(&json!({"input": {"chat_id": "7"}})),
            Some((7, String::new()))
        );
        assert_eq!(embedded_context(&json!({"input": {}})), None);
        assert_eq!(embedded_context(&json!({})), None);
    }

    #[test]
    fn test_truncate_chars_bounds() {
        assert_eq!(truncate_chars("short", 2000), "short");
        let long = "x".repeat(3000);
        assert_eq!(truncate_chars(&long, 2000).chars().count(), 2000);
    }
}
