//! Run Selective use case
//!
//! Orchestrates one user turn: build task units, run them (plain fan-out or
//! cabinet deliberation) concurrently with the auxiliary modules, apply the
//! optional aggregator re-pass and assemble the tagged output.

use crate::cancellation::CancellationRegistry;
use crate::concurrency::ConcurrencyLimiter;
use crate::config::EngineParams;
use crate::ports::ai_caller::{AiCaller, GatewayError};
use crate::ports::config_store::{ConfigStore, ConfigStoreError};
use crate::ports::progress::{NoProgress, ProgressSink};
use crate::ports::run_logger::{NoRunLogger, RunEvent, RunLogger};
use crate::ports::worldbook_store::WorldbookStore;
use crate::use_cases::auxiliary::AuxiliaryFanout;
use crate::use_cases::build_tasks::{TaskBuilder, TaskPlan};
use crate::use_cases::execute_task::TaskExecutor;
use crate::use_cases::run_cabinet::{CabinetDeliberation, CabinetError, CabinetInput};
use crate::use_cases::shared::call_template;
use conclave_domain::{
    AssemblyNote, AuxiliaryResult, ConfigIssue, ConfigSnapshot, DomainError,
    PatternTableClassifier, PromptTemplate, RenderInput, ResultAssembler, SelectedTemplate,
    TableClassifier, TaskKey, TaskOutcome, TaskReport, TaskStatus, TaskUnit, TemplateSelection,
    combine_labeled, live_binding, select_primary_templates,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Progress/cancellation id of the aggregator re-pass.
pub const AGGREGATOR_TASK_ID: &str = "aggregator";

/// Errors that end a turn
#[derive(Error, Debug)]
pub enum RunSelectiveError {
    #[error("No endpoints configured")]
    NoEndpoints,

    #[error("All endpoints are disabled")]
    AllEndpointsDisabled,

    #[error("No prompt templates configured")]
    NoPromptTemplates,

    #[error("All {count} task(s) failed")]
    AllTasksFailed { count: usize },

    #[error("Configuration store error: {0}")]
    ConfigStore(#[from] ConfigStoreError),
}

impl RunSelectiveError {
    fn from_config(error: DomainError) -> Option<Self> {
        match error {
            DomainError::NoEndpoints => Some(Self::NoEndpoints),
            DomainError::AllEndpointsDisabled => Some(Self::AllEndpointsDisabled),
            DomainError::NoPromptTemplates => Some(Self::NoPromptTemplates),
            _ => None,
        }
    }
}

/// Input for the RunSelective use case
#[derive(Debug, Clone)]
pub struct RunSelectiveInput {
    pub user_input: String,
    /// Chat context offered to templates as `{context}`.
    pub context: String,
}

impl RunSelectiveInput {
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            context: String::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    fn render_input(&self) -> RenderInput {
        RenderInput::new(self.user_input.clone()).with_context(self.context.clone())
    }
}

/// How the primary block was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryMode {
    FanOut,
    Cabinet,
    /// No primary tasks ran; auxiliary modules only.
    Standalone,
}

/// Result of a completed turn.
#[derive(Debug, Clone, Serialize)]
pub struct SelectiveOutput {
    /// Final tagged output.
    pub output: String,
    pub mode: PrimaryMode,
    /// Per-task reports of the plain fan-out, in build order.
    pub reports: Vec<TaskReport>,
    pub auxiliary: Vec<AuxiliaryResult>,
    /// Whether the aggregator re-pass replaced the primary block.
    pub aggregated: bool,
    #[serde(skip)]
    pub issues: Vec<ConfigIssue>,
    #[serde(skip)]
    pub notes: Vec<AssemblyNote>,
}

/// Outcome of a turn that did not hit a configuration error.
#[derive(Debug, Clone)]
pub enum SelectiveOutcome {
    Completed(SelectiveOutput),
    /// Global cancellation was requested; nothing is returned.
    Cancelled,
    /// Nothing to run: no task units and no auxiliary module.
    NoOp,
}

/// Primary pipeline result before the aggregator re-pass.
struct PrimaryResult {
    text: String,
    mode: PrimaryMode,
    reports: Vec<TaskReport>,
}

/// Marker for a globally cancelled primary pipeline.
struct Cancelled;

/// Use case for running selective mode over one user turn
pub struct SelectiveEngine {
    caller: Arc<dyn AiCaller>,
    store: Arc<dyn WorldbookStore>,
    classifier: Arc<dyn TableClassifier>,
    progress: Arc<dyn ProgressSink>,
    logger: Arc<dyn RunLogger>,
    params: EngineParams,
}

impl SelectiveEngine {
    pub fn new(
        caller: Arc<dyn AiCaller>,
        store: Arc<dyn WorldbookStore>,
        params: EngineParams,
    ) -> Self {
        let classifier = Arc::new(PatternTableClassifier::new(params.classifier));
        Self {
            caller,
            store,
            classifier,
            progress: Arc::new(NoProgress),
            logger: Arc::new(NoRunLogger),
            params,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn RunLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn TableClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Load the configuration from `store` and run one turn.
    pub async fn execute_from_store(
        &self,
        store: &dyn ConfigStore,
        input: RunSelectiveInput,
        registry: &Arc<CancellationRegistry>,
    ) -> Result<SelectiveOutcome, RunSelectiveError> {
        let snapshot = Arc::new(store.load().await?);
        self.execute(snapshot, input, registry).await
    }

    /// Run one turn against an immutable configuration snapshot.
    pub async fn execute(
        &self,
        snapshot: Arc<ConfigSnapshot>,
        input: RunSelectiveInput,
        registry: &Arc<CancellationRegistry>,
    ) -> Result<SelectiveOutcome, RunSelectiveError> {
        let started = Instant::now();
        let settings = &snapshot.settings;
        let aux_enabled = settings.auxiliary.any_enabled();

        if let Err(e) = snapshot.check_runnable() {
            if !aux_enabled {
                if let Some(err) = RunSelectiveError::from_config(e) {
                    return Err(err);
                }
            } else {
                warn!("{}; running auxiliary modules only", e);
            }
        }

        let mut issues = snapshot.validate();
        let selection = select_primary_templates(&snapshot);
        issues.extend(selection.issues.iter().cloned());
        for issue in &issues {
            warn!("Config: {}", issue.message);
        }

        let builder = TaskBuilder::new(Arc::clone(&self.store), Arc::clone(&self.classifier));
        let plan = builder.build(&snapshot, &selection).await;

        if plan.is_empty() && !aux_enabled {
            info!("No task units and no auxiliary module, nothing to do");
            return Ok(SelectiveOutcome::NoOp);
        }

        let limiter = ConcurrencyLimiter::new(self.params.max_concurrency);
        self.progress
            .set_cancel_all_handle(registry.cancel_all_handle());

        let base = input.render_input();
        let auxiliary = AuxiliaryFanout::new(
            Arc::clone(&self.caller),
            limiter.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.classifier),
            Arc::clone(&self.progress),
            Arc::clone(&self.logger),
        )
        .with_memory_retry(
            self.params.memory_retry_attempts,
            self.params.memory_retry_backoff,
        );

        let (primary, aux_results) = tokio::join!(
            self.run_primary(&snapshot, &selection, plan, &base, &limiter, registry),
            auxiliary.run(&snapshot, &base, registry),
        );

        let Ok(primary) = primary else {
            return Ok(self.cancelled(started));
        };

        // a global abort wins over any outcome that settled meanwhile
        if registry.is_cancelled() {
            return Ok(self.cancelled(started));
        }

        let ran = primary
            .reports
            .iter()
            .filter(|r| !r.outcome.is_aborted())
            .count();
        let failed = primary
            .reports
            .iter()
            .filter(|r| r.outcome.is_failed())
            .count();
        if ran > 0 && failed == ran {
            warn!("All {} task(s) failed", failed);
            self.log_finished("failed", &primary.reports, started);
            return Err(RunSelectiveError::AllTasksFailed { count: failed });
        }

        let (primary_text, aggregated) = self
            .aggregate(&snapshot, &selection, &primary, &base, &limiter, registry)
            .await;

        // results that settled while the abort fired are discarded
        if registry.is_cancelled() {
            return Ok(self.cancelled(started));
        }

        let assembly = ResultAssembler::new(&settings.output_tags)
            .assemble(Some(&primary_text), &aux_results);
        for note in &assembly.notes {
            match note {
                AssemblyNote::EchoedPlotDirective => {
                    warn!("Plot directive repeated its input verbatim, dropped")
                }
            }
        }

        self.log_finished("completed", &primary.reports, started);
        info!(
            "Turn finished in {:?}: {} task(s), {} auxiliary module(s)",
            started.elapsed(),
            primary.reports.len(),
            aux_results.len()
        );

        Ok(SelectiveOutcome::Completed(SelectiveOutput {
            output: assembly.output,
            mode: primary.mode,
            reports: primary.reports,
            auxiliary: aux_results,
            aggregated,
            issues,
            notes: assembly.notes,
        }))
    }

    async fn run_primary(
        &self,
        snapshot: &ConfigSnapshot,
        selection: &TemplateSelection,
        plan: TaskPlan,
        base: &RenderInput,
        limiter: &ConcurrencyLimiter,
        registry: &Arc<CancellationRegistry>,
    ) -> Result<PrimaryResult, Cancelled> {
        if plan.is_empty() {
            debug!("No primary tasks, auxiliary modules run standalone");
            return Ok(PrimaryResult {
                text: String::new(),
                mode: PrimaryMode::Standalone,
                reports: Vec::new(),
            });
        }

        if snapshot.settings.cabinet.is_enabled() {
            match self.cabinet_input(snapshot, selection, &plan, base).await {
                Ok(input) => {
                    let cabinet = CabinetDeliberation::new(
                        Arc::clone(&self.caller),
                        limiter.clone(),
                        Arc::clone(&self.progress),
                        Arc::clone(&self.logger),
                    );
                    match cabinet.run(input, registry).await {
                        Ok(outcome) => {
                            return Ok(PrimaryResult {
                                text: outcome.text,
                                mode: PrimaryMode::Cabinet,
                                reports: Vec::new(),
                            });
                        }
                        Err(CabinetError::Cancelled) => return Err(Cancelled),
                        Err(e) => warn!("Cabinet failed: {}; falling back to fan-out", e),
                    }
                }
                Err(e) => warn!("Cabinet unavailable: {}; falling back to fan-out", e),
            }
        }

        let reports = self.fan_out(plan.units, base, limiter, registry).await?;
        let text = combine_labeled(
            reports
                .iter()
                .filter_map(|r| r.outcome.text().map(|t| (r.display_name.as_str(), t))),
        );
        Ok(PrimaryResult {
            text,
            mode: PrimaryMode::FanOut,
            reports,
        })
    }

    /// Run every unit concurrently and join all of them.
    async fn fan_out(
        &self,
        units: Vec<TaskUnit>,
        base: &RenderInput,
        limiter: &ConcurrencyLimiter,
        registry: &Arc<CancellationRegistry>,
    ) -> Result<Vec<TaskReport>, Cancelled> {
        info!("Fan-out: {} task(s)", units.len());
        let executor = Arc::new(
            TaskExecutor::new(
                Arc::clone(&self.caller),
                limiter.clone(),
                Arc::clone(&self.progress),
                Arc::clone(&self.logger),
            )
            .with_chunking(self.params.chunk_size, self.params.max_chunks),
        );

        let mut join_set = JoinSet::new();
        for (index, unit) in units.into_iter().enumerate() {
            let id = unit.id();
            self.progress
                .add_task(&id, &unit.display_name, TaskStatus::Pending);
            let guard = registry.register(id.clone());
            self.progress.set_cancel_handle(&id, guard.handle());

            let executor = Arc::clone(&executor);
            let base = base.clone();
            join_set.spawn(async move {
                let report = executor.execute(&unit, &base, guard.token()).await;
                (index, report)
            });
        }

        let root = registry.root_token();
        let mut settled = Vec::new();
        loop {
            tokio::select! {
                biased;
                _ = root.cancelled() => {
                    join_set.abort_all();
                    info!("Global cancellation, discarding {} settled task(s)", settled.len());
                    return Err(Cancelled);
                }
                next = join_set.join_next() => match next {
                    None => break,
                    Some(Ok(result)) => settled.push(result),
                    Some(Err(e)) => warn!("Task join error: {}", e),
                }
            }
        }

        settled.sort_by_key(|(index, _)| *index);
        Ok(settled.into_iter().map(|(_, report)| report).collect())
    }

    async fn cabinet_input(
        &self,
        snapshot: &ConfigSnapshot,
        selection: &TemplateSelection,
        plan: &TaskPlan,
        base: &RenderInput,
    ) -> Result<CabinetInput, CabinetError> {
        let cabinet = &snapshot.settings.cabinet;
        let chair_id = cabinet.chair.as_ref().ok_or(CabinetError::NoChair)?;
        let chair = snapshot
            .live_endpoint(chair_id)
            .ok_or_else(|| CabinetError::ChairUnavailable(chair_id.clone()))?;

        let template_id = cabinet
            .template
            .clone()
            .or_else(|| selection.templates.first().map(|t| t.template.id.clone()));
        let selected = template_id
            .as_deref()
            .is_some_and(|id| selection.templates.iter().any(|t| t.template.id == id));

        // a cabinet template outside the primary selection runs on its own binding
        let units = match template_id.as_deref() {
            Some(id) if !selected => {
                let template = snapshot
                    .template(id)
                    .ok_or_else(|| CabinetError::UnknownTemplate(id.to_string()))?;
                let own = TemplateSelection {
                    templates: vec![SelectedTemplate {
                        selection_index: 0,
                        template: template.clone(),
                        endpoints: live_binding(snapshot, template),
                    }],
                    issues: Vec::new(),
                };
                debug!("Cabinet template '{}' is not a primary template, building its units", id);
                TaskBuilder::new(Arc::clone(&self.store), Arc::clone(&self.classifier))
                    .build(snapshot, &own)
                    .await
                    .units
            }
            _ => plan.units.clone(),
        };

        let scholars: Vec<TaskUnit> = units
            .into_iter()
            .filter(|u| Some(&u.key.template_id) == template_id.as_ref())
            .filter(|u| &u.key.endpoint_id != chair_id)
            .collect();

        let chair_template = cabinet
            .chair_template
            .as_deref()
            .and_then(|id| snapshot.template(id))
            .cloned()
            .unwrap_or_else(PromptTemplate::default_chair);

        Ok(CabinetInput {
            scholars,
            chair: chair.clone(),
            chair_template,
            review_rounds: cabinet.effective_review_rounds(),
            base: base.clone(),
        })
    }

    /// Optional second-opinion pass that replaces the primary block.
    ///
    /// Returns the primary text to assemble and whether the aggregator
    /// produced it.
    async fn aggregate(
        &self,
        snapshot: &ConfigSnapshot,
        selection: &TemplateSelection,
        primary: &PrimaryResult,
        base: &RenderInput,
        limiter: &ConcurrencyLimiter,
        registry: &Arc<CancellationRegistry>,
    ) -> (String, bool) {
        let unchanged = (primary.text.clone(), false);
        let Some(settings) = &snapshot.settings.aggregator else {
            return unchanged;
        };
        if primary.text.trim().is_empty() {
            debug!("Aggregator skipped, primary result is empty");
            return unchanged;
        }

        let template = selection
            .templates
            .iter()
            .find(|t| t.selection_index == settings.template_index)
            .map(|t| t.template.clone())
            .unwrap_or_else(PromptTemplate::default_aggregator);

        let key = TaskKey::new(settings.endpoint_id.clone(), template.id.clone());
        let already_ran = primary
            .reports
            .iter()
            .any(|r| r.key == key && !r.outcome.is_aborted());
        if already_ran && !settings.allow_duplicate {
            info!("Aggregator {} already ran in the primary pass, skipping", key);
            return unchanged;
        }

        let Some(endpoint) = snapshot.live_endpoint(&settings.endpoint_id) else {
            warn!(
                "Aggregator endpoint '{}' is missing or disabled, skipping",
                settings.endpoint_id
            );
            return unchanged;
        };

        self.progress.add_task(
            AGGREGATOR_TASK_ID,
            &format!("{} (aggregator)", endpoint.display_name()),
            TaskStatus::Pending,
        );
        let guard = registry.register(AGGREGATOR_TASK_ID);
        self.progress
            .set_cancel_handle(AGGREGATOR_TASK_ID, guard.handle());
        self.progress
            .update_task(AGGREGATOR_TASK_ID, TaskStatus::Running, 0);

        let input = base.clone().with_previous_results(primary.text.clone());
        let result = call_template(
            self.caller.as_ref(),
            limiter,
            endpoint,
            &template,
            &input,
            guard.token(),
        )
        .await;

        match result {
            Ok(text) if !text.trim().is_empty() => {
                info!("Aggregator {} replaced the primary result", key);
                self.progress
                    .update_task(AGGREGATOR_TASK_ID, TaskStatus::Completed, 100);
                (text, true)
            }
            Ok(_) => {
                warn!("Aggregator {} returned nothing, keeping primary result", key);
                self.progress
                    .update_task(AGGREGATOR_TASK_ID, TaskStatus::Completed, 100);
                unchanged
            }
            Err(GatewayError::Aborted) => {
                self.progress
                    .update_task(AGGREGATOR_TASK_ID, TaskStatus::Aborted, 100);
                unchanged
            }
            Err(e) => {
                warn!("Aggregator {} failed: {}; keeping primary result", key, e);
                self.progress
                    .update_task(AGGREGATOR_TASK_ID, TaskStatus::Failed, 100);
                unchanged
            }
        }
    }

    fn cancelled(&self, started: Instant) -> SelectiveOutcome {
        info!("Turn cancelled after {:?}", started.elapsed());
        self.log_finished("cancelled", &[], started);
        SelectiveOutcome::Cancelled
    }

    fn log_finished(&self, status: &str, reports: &[TaskReport], started: Instant) {
        let count = |f: fn(&TaskOutcome) -> bool| reports.iter().filter(|r| f(&r.outcome)).count();
        self.logger.log(RunEvent::new(
            "run_finished",
            json!({
                "status": status,
                "tasks": reports.len(),
                "completed": count(TaskOutcome::is_completed),
                "failed": count(TaskOutcome::is_failed),
                "aborted": count(TaskOutcome::is_aborted),
                "duration_ms": started.elapsed().as_millis() as u64,
            }),
        ));
    }
}
