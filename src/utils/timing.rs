use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

use crate::utils::http::truncate_for_log;
use crate::utils::logging::TIMING_TARGET;

#[derive(Debug)]
pub struct CommandTimer {
    command: String,
    args: String,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

impl CommandTimer {
    pub fn new(command: &str, args: &[String]) -> Self {
        CommandTimer {
            command: command.to_string(),
            args: truncate_for_log(&args.join(" ").replace('\n', " "), 300),
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "success".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn log_received(&self) {
        info!(
            target: TIMING_TARGET,
            "event=command_received command={} received_at={} args={:?}",
            self.command,
            self.started_at.to_rfc3339(),
            self.args
        );
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    /// Emits the completion event; returns false if it was already emitted.
    pub fn log_completed(&mut self) -> bool {
        if self.completed {
            return false;
        }
        self.completed = true;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: TIMING_TARGET,
            "event=command_completed command={} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.command,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
        true
    }
}

pub fn start_command_timer(command: &str, args: &[String]) -> CommandTimer {
    let timer = CommandTimer::new(command, args);
    timer.log_received();
    timer
}

pub fn complete_command_timer(timer: &mut CommandTimer, status: &str, detail: Option<String>) {
    timer.mark_status(status, detail);
    timer.log_completed();
}

pub async fn log_llm_timing<T, E, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: TIMING_TARGET,
        "event=llm_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let mut status = "success";
    let result = call().await;
    if result.is_err() {
        status = "error";
    }

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: TIMING_TARGET,
        "event=llm_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        provider,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_event_is_logged_once() {
        let mut timer = CommandTimer::new("portrait", &["--description".to_string()]);
        complete_command_timer(&mut timer, "error", Some("boom".to_string()));
        assert!(timer.completed);
        assert!(!timer.log_completed());

        complete_command_timer(&mut timer, "success", None);
        assert!(!timer.log_completed());
    }

    #[tokio::test]
    async fn llm_timing_passes_result_through() {
        let ok: Result<u32, String> =
            log_llm_timing("test", "model", "op", None, || async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));
        let err: Result<u32, String> =
            log_llm_timing("test", "model", "op", None, || async { Err("nope".to_string()) })
                .await;
        assert_eq!(err, Err("nope".to_string()));
    }
}
