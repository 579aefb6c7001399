//! Cabinet deliberation use case
//!
//! Scholars draft in parallel, review each other's previous round for the
//! configured number of rounds, and the chair merges the final round. Every
//! round is a full join: it only advances once all scholar calls settled.

use crate::cancellation::CancellationRegistry;
use crate::concurrency::ConcurrencyLimiter;
use crate::ports::ai_caller::{AiCaller, GatewayError};
use crate::ports::progress::ProgressSink;
use crate::ports::run_logger::{RunEvent, RunLogger};
use crate::use_cases::shared::call_template;
use conclave_domain::{
    CabinetPhase, CabinetSeat, CabinetState, DomainError, Endpoint, EndpointId, PromptTemplate,
    RenderInput, ScholarOutput, TaskStatus, TaskUnit,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Errors that can occur during cabinet deliberation
#[derive(Error, Debug)]
pub enum CabinetError {
    #[error("Cabinet mode is on but no chair is configured")]
    NoChair,

    #[error("Cabinet chair '{0}' is missing or disabled")]
    ChairUnavailable(EndpointId),

    #[error("Cabinet template '{0}' is not in the prompt pool")]
    UnknownTemplate(String),

    #[error("Cabinet deliberation cancelled")]
    Cancelled,

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Input for one deliberation.
#[derive(Debug, Clone)]
pub struct CabinetInput {
    /// One unit per scholar, carrying its worldbook content and template.
    pub scholars: Vec<TaskUnit>,
    pub chair: Endpoint,
    pub chair_template: PromptTemplate,
    /// Review rounds after the drafts (0 = basic mode).
    pub review_rounds: u8,
    pub base: RenderInput,
}

/// Result of a finished deliberation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CabinetOutcome {
    pub text: String,
    /// False when the chair failed and the unmerged outputs were surfaced.
    pub merged: bool,
    pub rounds: u8,
}

/// Use case for running a cabinet deliberation
pub struct CabinetDeliberation {
    caller: Arc<dyn AiCaller>,
    limiter: ConcurrencyLimiter,
    progress: Arc<dyn ProgressSink>,
    logger: Arc<dyn RunLogger>,
}

impl CabinetDeliberation {
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
        }
    }

    /// Progress/cancellation id of a scholar.
    pub fn scholar_task_id(endpoint_id: &EndpointId) -> String {
        format!("cabinet::{}", endpoint_id)
    }

    pub const CHAIR_TASK_ID: &'static str = "cabinet::chair";

    /// Run the deliberation.
    ///
    /// Global cancellation discards everything, including finished rounds,
    /// and returns [`CabinetError::Cancelled`].
    pub async fn run(
        &self,
        input: CabinetInput,
        registry: &Arc<CancellationRegistry>,
    ) -> Result<CabinetOutcome, CabinetError> {
        let seats = input
            .scholars
            .iter()
            .map(|u| CabinetSeat::new(u.endpoint.id.clone(), u.endpoint.display_name()))
            .collect();
        let mut state = CabinetState::new(seats, input.review_rounds);

        info!(
            "Cabinet: {} scholar(s), chair {}, {} review round(s)",
            input.scholars.len(),
            input.chair.id,
            input.review_rounds
        );
        for unit in &input.scholars {
            let id = Self::scholar_task_id(&unit.endpoint.id);
            self.progress
                .add_task(&id, unit.endpoint.display_name(), TaskStatus::Pending);
        }
        self.progress.add_task(
            Self::CHAIR_TASK_ID,
            &format!("{} (chair)", input.chair.display_name()),
            TaskStatus::Pending,
        );

        while matches!(
            state.phase(),
            CabinetPhase::Drafting | CabinetPhase::Reviewing { .. }
        ) {
            let phase = state.phase();
            let outputs = self.run_round(&state, &input, registry).await?;
            let failed = outputs.iter().filter(|o| o.failed).count();
            let next = state.complete_round(outputs)?;

            info!("Cabinet {} settled ({} failed), next: {}", phase, failed, next);
            self.logger.log(RunEvent::new(
                "cabinet_round",
                json!({
                    "phase": phase.to_string(),
                    "round": match phase {
                        CabinetPhase::Reviewing { round } => round,
                        _ => 0,
                    },
                    "scholars": state.outputs().len(),
                    "failed": failed,
                }),
            ));
        }

        for unit in &input.scholars {
            let id = Self::scholar_task_id(&unit.endpoint.id);
            self.progress.update_task(&id, TaskStatus::Completed, 100);
        }

        self.merge(&mut state, &input, registry).await
    }

    /// Launch every scholar of the current phase and wait for all of them.
    async fn run_round(
        &self,
        state: &CabinetState,
        input: &CabinetInput,
        registry: &Arc<CancellationRegistry>,
    ) -> Result<Vec<ScholarOutput>, CabinetError> {
        let phase = state.phase();
        let round = state.round();
        let total = input.review_rounds as usize + 1;
        let mut join_set = JoinSet::new();

        for unit in &input.scholars {
            let previous = match phase {
                CabinetPhase::Reviewing { .. } => state.peer_context(&unit.endpoint.id),
                _ => String::new(),
            };
            let render = input
                .base
                .clone()
                .with_worldbook_content(unit.worldbook_content.clone())
                .with_previous_results(previous)
                .with_var("role_name", unit.endpoint.display_name())
                .with_var("round", round.to_string());

            let id = Self::scholar_task_id(&unit.endpoint.id);
            let guard = registry.register(id.clone());
            self.progress.set_cancel_handle(&id, guard.handle());
            self.progress.update_task(
                &id,
                TaskStatus::Running,
                (round as usize * 100 / total) as u8,
            );

            let caller = Arc::clone(&self.caller);
            let limiter = self.limiter.clone();
            let endpoint = unit.endpoint.clone();
            let template = unit.template.clone();

            join_set.spawn(async move {
                let result = call_template(
                    caller.as_ref(),
                    &limiter,
                    &endpoint,
                    &template,
                    &render,
                    guard.token(),
                )
                .await;
                (endpoint.id, result)
            });
        }

        let root = registry.root_token();
        let mut outputs = Vec::with_capacity(input.scholars.len());
        loop {
            tokio::select! {
                biased;
                _ = root.cancelled() => {
                    join_set.abort_all();
                    info!("Cabinet {} cancelled, discarding round", phase);
                    return Err(CabinetError::Cancelled);
                }
                next = join_set.join_next() => match next {
                    None => break,
                    Some(Ok((endpoint_id, Ok(text)))) => {
                        debug!("Scholar {} settled in {}", endpoint_id, phase);
                        outputs.push(ScholarOutput::success(endpoint_id, text));
                    }
                    Some(Ok((endpoint_id, Err(e)))) => {
                        let reason = match &e {
                            GatewayError::Aborted => "aborted".to_string(),
                            other => other.to_string(),
                        };
                        warn!("Scholar {} failed in {}: {}", endpoint_id, phase, reason);
                        outputs.push(ScholarOutput::failure(endpoint_id, &reason));
                    }
                    Some(Err(e)) => warn!("Task join error: {}", e),
                }
            }
        }

        if root.is_cancelled() {
            return Err(CabinetError::Cancelled);
        }
        Ok(outputs)
    }

    async fn merge(
        &self,
        state: &mut CabinetState,
        input: &CabinetInput,
        registry: &Arc<CancellationRegistry>,
    ) -> Result<CabinetOutcome, CabinetError> {
        let render = input
            .base
            .clone()
            .with_previous_results(state.chair_context())
            .with_var("role_name", "chair")
            .with_var("round", state.round().to_string());

        let guard = registry.register(Self::CHAIR_TASK_ID);
        self.progress
            .set_cancel_handle(Self::CHAIR_TASK_ID, guard.handle());
        self.progress
            .update_task(Self::CHAIR_TASK_ID, TaskStatus::Running, 0);

        let result = call_template(
            self.caller.as_ref(),
            &self.limiter,
            &input.chair,
            &input.chair_template,
            &render,
            guard.token(),
        )
        .await;

        if registry.is_cancelled() {
            self.progress
                .update_task(Self::CHAIR_TASK_ID, TaskStatus::Aborted, 100);
            return Err(CabinetError::Cancelled);
        }

        let rounds = state.total_rounds();
        match result {
            Ok(text) => {
                info!("Cabinet chair {} merged the final round", input.chair.id);
                self.progress
                    .update_task(Self::CHAIR_TASK_ID, TaskStatus::Completed, 100);
                state.finish(text.clone())?;
                Ok(CabinetOutcome {
                    text,
                    merged: true,
                    rounds,
                })
            }
            Err(e) => {
                let status = if e.is_aborted() {
                    TaskStatus::Aborted
                } else {
                    TaskStatus::Failed
                };
                warn!(
                    "Cabinet chair {} did not merge ({}), surfacing unmerged outputs",
                    input.chair.id, e
                );
                self.progress.update_task(Self::CHAIR_TASK_ID, status, 100);
                Ok(CabinetOutcome {
                    text: state.unmerged_fallback(),
                    merged: false,
                    rounds,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::progress::NoProgress;
    use crate::ports::run_logger::NoRunLogger;
    use crate::testing::StubCaller;
    use std::time::Duration;

    fn scholar(id: &str) -> TaskUnit {
        TaskUnit::new(
            Endpoint::new(id, id.to_uppercase(), format!("model-{}", id)),
            PromptTemplate::new("draft", "{role_name} r{round}: {previous_results}"),
        )
    }

    fn input(scholars: &[&str], rounds: u8) -> CabinetInput {
        CabinetInput {
            scholars: scholars.iter().map(|s| scholar(s)).collect(),
            chair: Endpoint::new("chair", "Chair", "model-chair"),
            chair_template: PromptTemplate::new("merge", "MERGE\n{previous_results}"),
            review_rounds: rounds,
            base: RenderInput::new("question"),
        }
    }

    fn cabinet(caller: Arc<StubCaller>) -> CabinetDeliberation {
        CabinetDeliberation::new(
            caller,
            ConcurrencyLimiter::unbounded(),
            Arc::new(NoProgress),
            Arc::new(NoRunLogger),
        )
    }

    #[tokio::test]
    async fn test_basic_mode_issues_three_calls() {
        let caller = Arc::new(StubCaller::echo());
        let registry = Arc::new(CancellationRegistry::new());
        let outcome = cabinet(caller.clone())
            .run(input(&["a", "b"], 0), &registry)
            .await
            .unwrap();

        assert_eq!(caller.calls(), 3);
        assert!(outcome.merged);
        assert!(outcome.text.starts_with("MERGE\n--- A ---\nA r0:"));
        assert!(outcome.text.contains("--- B ---\nB r0:"));
        assert_eq!(registry.active(), 0);
    }

    #[tokio::test]
    async fn test_two_review_rounds_issue_seven_calls() {
        let caller = Arc::new(StubCaller::echo());
        let registry = Arc::new(CancellationRegistry::new());
        let outcome = cabinet(caller.clone())
            .run(input(&["a", "b"], 2), &registry)
            .await
            .unwrap();

        assert_eq!(caller.calls(), 7);
        assert_eq!(outcome.rounds, 2);

        // round 1 reviewers see only their peer's draft
        let requests = caller.requests();
        let a_round1 = requests
            .iter()
            .find(|r| r.model == "model-a" && r.user_prompt.starts_with("A r1:"))
            .unwrap();
        assert!(a_round1.user_prompt.contains("--- B ---\nB r0:"));
        assert!(!a_round1.user_prompt.contains("--- A ---"));
    }

    #[tokio::test]
    async fn test_empty_cabinet_still_runs_chair() {
        let caller = Arc::new(StubCaller::echo());
        let registry = Arc::new(CancellationRegistry::new());
        let outcome = cabinet(caller.clone())
            .run(input(&[], 0), &registry)
            .await
            .unwrap();
        assert_eq!(caller.calls(), 1);
        assert_eq!(outcome.text, "MERGE\n");
    }

    #[tokio::test]
    async fn test_failed_scholar_still_joins_round() {
        let caller = Arc::new(StubCaller::responding(|req| {
            if req.model == "model-b" {
                Err(GatewayError::Timeout)
            } else {
                Ok(req.user_prompt.clone())
            }
        }));
        let registry = Arc::new(CancellationRegistry::new());
        let outcome = cabinet(caller.clone())
            .run(input(&["a", "b"], 1), &registry)
            .await
            .unwrap();
        assert_eq!(caller.calls(), 5);
        assert!(outcome.text.contains("(no output: Timeout)"));
    }

    #[tokio::test]
    async fn test_chair_failure_surfaces_unmerged_outputs() {
        let caller = Arc::new(StubCaller::responding(|req| {
            if req.model == "model-chair" {
                Err(GatewayError::RequestFailed("500".into()))
            } else {
                Ok(format!("draft of {}", req.model))
            }
        }));
        let registry = Arc::new(CancellationRegistry::new());
        let outcome = cabinet(caller)
            .run(input(&["a", "b"], 0), &registry)
            .await
            .unwrap();
        assert!(!outcome.merged);
        assert_eq!(
            outcome.text,
            "--- A ---\ndraft of model-a\n\n--- B ---\ndraft of model-b"
        );
    }

    #[tokio::test]
    async fn test_global_cancel_mid_round_returns_nothing() {
        let caller = Arc::new(StubCaller::echo().with_delay(Duration::from_secs(5)));
        let registry = Arc::new(CancellationRegistry::new());
        let handle = registry.cancel_all_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });

        let result = cabinet(caller.clone())
            .run(input(&["a", "b"], 2), &registry)
            .await;
        assert!(matches!(result, Err(CabinetError::Cancelled)));
        assert_eq!(caller.calls(), 2);
    }
}
