//! Execute Task use case.
//!
//! Runs one task unit: splits oversized worldbook content into chunks, sends
//! the chunks sequentially to the unit's endpoint and merges the results.
//! Fail-fast within a task: the first failing chunk fails the whole task.

use crate::concurrency::ConcurrencyLimiter;
use crate::ports::ai_caller::{AiCallRequest, AiCaller, GatewayError};
use crate::ports::progress::ProgressSink;
use crate::ports::run_logger::{RunEvent, RunLogger};
use crate::use_cases::shared::with_endpoint_vars;
use conclave_domain::core::string::truncate;
use conclave_domain::task::{merge_chunk_results, split_content};
use conclave_domain::{
    PromptRenderer, RenderInput, TaskOutcome, TaskReport, TaskStatus, TaskUnit,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Use case for executing a single task unit.
pub struct TaskExecutor {
    caller: Arc<dyn AiCaller>,
    limiter: ConcurrencyLimiter,
    progress: Arc<dyn ProgressSink>,
    logger: Arc<dyn RunLogger>,
    chunk_size: usize,
    max_chunks: usize,
}

impl TaskExecutor {
    pub fn new(
        caller: Arc<dyn AiCaller>,
        limiter: ConcurrencyLimiter,
        progress: Arc<dyn ProgressSink>,
        logger: Arc<dyn RunLogger>,
    ) -> Self {
        Self {
            caller,
            limiter,
            progress,
            logger,
            chunk_size: 0,
            max_chunks: 0,
        }
    }

    pub fn with_chunking(mut self, chunk_size: usize, max_chunks: usize) -> Self {
        self.chunk_size = chunk_size;
        self.max_chunks = max_chunks;
        self
    }

    /// Execute `unit` with `input` as the base render variables.
    ///
    /// Never returns an error: failures and aborts are part of the report.
    /// The limiter permit is held for the whole task.
    pub async fn execute(
        &self,
        unit: &TaskUnit,
        input: &RenderInput,
        cancel: &CancellationToken,
    ) -> TaskReport {
        let id = unit.id();

        let Some(_permit) = self.limiter.acquire(cancel).await else {
            debug!("Task {} aborted while queued", id);
            return self.settle(unit, TaskOutcome::Aborted, 0, 0, None);
        };

        let plan = split_content(&unit.worldbook_content, self.chunk_size, self.max_chunks);
        if plan.dropped > 0 {
            warn!(
                "Task {}: content exceeds {} chunks, dropping the last {}",
                id, self.max_chunks, plan.dropped
            );
        }
        let total = plan.chunks.len();

        info!("Task {} started ({} chunk(s))", id, total);
        self.progress.update_task(&id, TaskStatus::Running, 0);
        self.logger.log(RunEvent::new(
            "task_started",
            json!({
                "task": id,
                "endpoint": unit.key.endpoint_id,
                "template": unit.key.template_id,
                "chunks": total,
                "dropped_chunks": plan.dropped,
            }),
        ));
        let started = Instant::now();

        let base = with_endpoint_vars(input, &unit.endpoint);
        let mut results = Vec::with_capacity(total);
        for (index, chunk) in plan.chunks.iter().enumerate() {
            if cancel.is_cancelled() {
                return self.settle(unit, TaskOutcome::Aborted, index, plan.dropped, Some(started));
            }

            let mut chunk_input = base.clone().with_worldbook_content(chunk.as_str());
            if total > 1 {
                chunk_input
                    .extra_vars
                    .insert("segment".to_string(), format!("{}/{}", index + 1, total));
            }
            let prompt = PromptRenderer::render(&unit.template, &chunk_input);
            let request = AiCallRequest::new(&unit.endpoint, prompt);

            match self.caller.call(request, cancel).await {
                Ok(text) => results.push(text),
                Err(GatewayError::Aborted) => {
                    return self.settle(
                        unit,
                        TaskOutcome::Aborted,
                        index + 1,
                        plan.dropped,
                        Some(started),
                    );
                }
                Err(e) => {
                    warn!("Task {} failed on chunk {}/{}: {}", id, index + 1, total, e);
                    return self.settle(
                        unit,
                        TaskOutcome::Failed(e.to_string()),
                        index + 1,
                        plan.dropped,
                        Some(started),
                    );
                }
            }

            let percent = ((index + 1) * 100 / total) as u8;
            if index + 1 < total {
                self.progress.update_task(&id, TaskStatus::Running, percent);
            }
        }

        // finished right as the abort fired: discard
        if cancel.is_cancelled() {
            return self.settle(unit, TaskOutcome::Aborted, total, plan.dropped, Some(started));
        }

        let merged = merge_chunk_results(&results);
        self.settle(
            unit,
            TaskOutcome::Completed(merged),
            total,
            plan.dropped,
            Some(started),
        )
    }

    fn settle(
        &self,
        unit: &TaskUnit,
        outcome: TaskOutcome,
        sent: usize,
        dropped: usize,
        started: Option<Instant>,
    ) -> TaskReport {
        let id = unit.id();
        let status = outcome.status();
        match &outcome {
            TaskOutcome::Completed(text) => {
                info!("Task {} completed", id);
                debug!("Task {} output: {}", id, truncate(text, 120));
            }
            TaskOutcome::Failed(reason) => warn!("Task {} failed: {}", id, reason),
            TaskOutcome::Aborted => info!("Task {} aborted", id),
        }
        self.progress.update_task(&id, status, 100);
        self.logger.log(RunEvent::new(
            "task_finished",
            json!({
                "task": id,
                "status": status.as_str(),
                "chunks_sent": sent,
                "duration_ms": started.map(|s| s.elapsed().as_millis() as u64),
                "error": match &outcome {
                    TaskOutcome::Failed(reason) => Some(reason.as_str()),
                    _ => None,
                },
            }),
        ));
        TaskReport::new(unit, outcome).with_chunks(sent, dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::progress::NoProgress;
    use crate::ports::run_logger::NoRunLogger;
    use crate::testing::{RecordingProgress, StubCaller};
    use conclave_domain::{Endpoint, PromptTemplate};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn unit(content: &str) -> TaskUnit {
        TaskUnit::new(
            Endpoint::new("a", "Alpha", "model-a"),
            PromptTemplate::new("p", "{worldbook_content}"),
        )
        .with_content(content)
    }

    fn executor(caller: Arc<StubCaller>) -> TaskExecutor {
        TaskExecutor::new(
            caller,
            ConcurrencyLimiter::new(2),
            Arc::new(NoProgress),
            Arc::new(NoRunLogger),
        )
    }

    /// Strip `[segment i/N]` banners from a merged result.
    fn unbanner(merged: &str, total: usize) -> String {
        let mut out = String::new();
        for i in 0..total {
            let banner = format!("[segment {}/{}]\n", i + 1, total);
            let start = merged.find(&banner).unwrap() + banner.len();
            let end = if i + 1 < total {
                let next = format!("\n\n[segment {}/{}]\n", i + 2, total);
                start + merged[start..].find(&next).unwrap()
            } else {
                merged.len()
            };
            out.push_str(&merged[start..end]);
        }
        out
    }

    #[tokio::test]
    async fn test_single_chunk_completes() {
        let caller = Arc::new(StubCaller::echo());
        let report = executor(caller.clone())
            .execute(&unit("lore"), &RenderInput::new("hi"), &CancellationToken::new())
            .await;
        assert_eq!(report.outcome, TaskOutcome::Completed("lore".into()));
        assert_eq!(report.chunks, 1);
        assert_eq!(caller.calls(), 1);
        assert_eq!(caller.requests()[0].model, "model-a");
    }

    #[tokio::test]
    async fn test_chunk_then_merge_round_trips() {
        let content = "First paragraph about the castle.\n\n\
                       Second paragraph. It has two sentences!\n\n\
                       Third paragraph is the last one.";
        let caller = Arc::new(StubCaller::echo());
        let report = executor(caller.clone())
            .with_chunking(40, 0)
            .execute(&unit(content), &RenderInput::new(""), &CancellationToken::new())
            .await;

        let merged = report.outcome.text().unwrap().to_string();
        assert!(report.chunks > 1);
        assert_eq!(caller.calls(), report.chunks);
        assert!(merged.starts_with("[segment 1/"));
        assert_eq!(unbanner(&merged, report.chunks), content);
    }

    #[tokio::test]
    async fn test_failing_chunk_stops_remaining_chunks() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let caller = Arc::new(StubCaller::responding(move |req| {
            if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                Err(GatewayError::RequestFailed("502".into()))
            } else {
                Ok(req.user_prompt.clone())
            }
        }));
        let content = "aaaa\n\nbbbb\n\ncccc\n\ndddd";
        let report = executor(caller.clone())
            .with_chunking(6, 0)
            .execute(&unit(content), &RenderInput::new(""), &CancellationToken::new())
            .await;

        assert!(report.outcome.is_failed());
        assert_eq!(caller.calls(), 2);
        assert_eq!(report.chunks, 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_is_aborted_without_calls() {
        let caller = Arc::new(StubCaller::echo());
        let token = CancellationToken::new();
        token.cancel();
        let report = executor(caller.clone())
            .execute(&unit("x"), &RenderInput::new(""), &token)
            .await;
        assert_eq!(report.outcome, TaskOutcome::Aborted);
        assert_eq!(caller.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_call_reports_aborted() {
        let caller = Arc::new(StubCaller::echo().with_delay(std::time::Duration::from_secs(5)));
        let progress = Arc::new(RecordingProgress::default());
        let exec = TaskExecutor::new(
            caller.clone(),
            ConcurrencyLimiter::unbounded(),
            progress.clone(),
            Arc::new(NoRunLogger),
        );
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let unit = unit("x");
        let report = exec.execute(&unit, &RenderInput::new(""), &token).await;
        assert!(report.outcome.is_aborted());
        assert_eq!(progress.final_status(&unit.id()), Some(TaskStatus::Aborted));
    }

    #[tokio::test]
    async fn test_dropped_chunks_are_reported() {
        let caller = Arc::new(StubCaller::echo());
        let report = executor(caller.clone())
            .with_chunking(6, 2)
            .execute(
                &unit("aaaa\n\nbbbb\n\ncccc\n\ndddd"),
                &RenderInput::new(""),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(report.chunks, 2);
        assert_eq!(report.dropped_chunks, 2);
        assert_eq!(caller.calls(), 2);
    }

    #[tokio::test]
    async fn test_endpoint_metadata_is_available_to_templates() {
        let caller = Arc::new(StubCaller::echo());
        let unit = TaskUnit::new(
            Endpoint::new("a", "Alpha", "model-a"),
            PromptTemplate::new("p", "{endpoint_name} on {model_name}"),
        );
        let report = executor(caller)
            .execute(&unit, &RenderInput::new(""), &CancellationToken::new())
            .await;
        assert_eq!(report.outcome.text(), Some("Alpha on model-a"));
    }
}
