//! Auxiliary fan-out use case
//!
//! Plot directive, content optimization and memory retrieval run next to the
//! primary pipeline. Every module degrades to an empty contribution on
//! failure or cancellation; none can fail the turn.

use crate::cancellation::CancellationRegistry;
use crate::concurrency::ConcurrencyLimiter;
use crate::ports::ai_caller::{AiCaller, GatewayError};
use crate::ports::progress::ProgressSink;
use crate::ports::run_logger::{RunEvent, RunLogger};
use crate::ports::worldbook_store::WorldbookStore;
use crate::use_cases::shared::call_template;
use conclave_domain::worldbook::{flatten_worldbook, render_blocks};
use conclave_domain::{
    AuxModuleSettings, AuxiliaryKind, AuxiliaryResult, ConfigSnapshot, Endpoint, MemorySource,
    PromptTemplate, RenderInput, TableClassifier, TaskStatus, combine_labeled,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Use case for running the auxiliary modules
pub struct AuxiliaryFanout {
    caller: Arc<dyn AiCaller>,
    limiter: ConcurrencyLimiter,
    store: Arc<dyn WorldbookStore>,
    classifier: Arc<dyn TableClassifier>,
    progress: Arc<dyn ProgressSink>,
    logger: Arc<dyn RunLogger>,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl AuxiliaryFanout {
    pub fn new(
        caller: Arc<dyn AiCaller>,
        limiter: ConcurrencyLimiter,
        store: Arc<dyn WorldbookStore>,
        classifier: Arc<dyn TableClassifier>,
        progress: Arc<dyn ProgressSink>,
        logger: Arc<dyn RunLogger>,
    ) -> Self {
        Self {
            caller,
            limiter,
            store,
            classifier,
            progress,
            logger,
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_memory_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.retry_attempts = attempts.max(1);
        self.retry_backoff = backoff;
        self
    }

    /// Run every enabled module concurrently.
    ///
    /// Results come back in assembly order (optimization, plot directive,
    /// memory); disabled modules are absent.
    pub async fn run(
        &self,
        snapshot: &ConfigSnapshot,
        base: &RenderInput,
        registry: &Arc<CancellationRegistry>,
    ) -> Vec<AuxiliaryResult> {
        let aux = &snapshot.settings.auxiliary;
        if !aux.any_enabled() {
            return Vec::new();
        }

        let optimization = self.run_module(
            AuxiliaryKind::Optimization,
            aux.optimization.as_ref(),
            snapshot,
            base,
            registry,
        );
        let plot = self.run_module(
            AuxiliaryKind::PlotDirective,
            aux.plot_directive.as_ref(),
            snapshot,
            base,
            registry,
        );
        let memory = async {
            if aux.memory.is_active() {
                Some(self.run_memory(&aux.memory.sources, snapshot, base, registry).await)
            } else {
                None
            }
        };

        let (optimization, plot, memory) = tokio::join!(optimization, plot, memory);
        [optimization, plot, memory].into_iter().flatten().collect()
    }

    async fn run_module(
        &self,
        kind: AuxiliaryKind,
        settings: Option<&AuxModuleSettings>,
        snapshot: &ConfigSnapshot,
        base: &RenderInput,
        registry: &Arc<CancellationRegistry>,
    ) -> Option<AuxiliaryResult> {
        let settings = settings.filter(|s| s.enabled)?;
        let id = kind.task_id();
        self.progress.add_task(&id, kind.as_str(), TaskStatus::Pending);

        let Some((endpoint, template)) =
            self.resolve(kind.as_str(), &settings.endpoint_id, &settings.template_id, snapshot)
        else {
            self.progress.update_task(&id, TaskStatus::Skipped, 100);
            return Some(AuxiliaryResult::empty(kind));
        };

        let guard = registry.register(id.clone());
        self.progress.set_cancel_handle(&id, guard.handle());
        self.progress.update_task(&id, TaskStatus::Running, 0);

        let result = call_template(
            self.caller.as_ref(),
            &self.limiter,
            endpoint,
            template,
            base,
            guard.token(),
        )
        .await;

        let text = self.settle(kind, result);
        Some(AuxiliaryResult::new(kind, text, base.user_input.clone()))
    }

    async fn run_memory(
        &self,
        sources: &[MemorySource],
        snapshot: &ConfigSnapshot,
        base: &RenderInput,
        registry: &Arc<CancellationRegistry>,
    ) -> AuxiliaryResult {
        let kind = AuxiliaryKind::Memory;
        let id = kind.task_id();
        self.progress.add_task(&id, kind.as_str(), TaskStatus::Pending);
        let guard = registry.register(id.clone());
        self.progress.set_cancel_handle(&id, guard.handle());
        self.progress.update_task(&id, TaskStatus::Running, 0);

        let calls = sources
            .iter()
            .map(|source| self.retrieve(source, snapshot, base, guard.token()));
        let results = futures::future::join_all(calls).await;

        if guard.is_cancelled() {
            let text = self.settle(kind, Err(GatewayError::Aborted));
            return AuxiliaryResult::new(kind, text, base.user_input.clone());
        }

        let parts: Vec<(&str, &str)> = sources
            .iter()
            .zip(&results)
            .filter_map(|(source, text)| text.as_deref().map(|t| (source.name.as_str(), t)))
            .collect();
        let combined = combine_labeled(parts);
        let text = self.settle(kind, Ok(combined));
        AuxiliaryResult::new(kind, text, base.user_input.clone())
    }

    /// One memory source with linear-backoff retries. `None` on give-up.
    async fn retrieve(
        &self,
        source: &MemorySource,
        snapshot: &ConfigSnapshot,
        base: &RenderInput,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let label = format!("memory source '{}'", source.name);
        let (endpoint, template) =
            self.resolve(&label, &source.endpoint_id, &source.template_id, snapshot)?;

        let mut input = base.clone().with_var("memory_source", source.name.clone());
        if let Some(name) = &source.worldbook {
            input.worldbook_content = self.memory_content(name, snapshot).await;
        }

        for attempt in 1..=self.retry_attempts {
            match call_template(
                self.caller.as_ref(),
                &self.limiter,
                endpoint,
                template,
                &input,
                cancel,
            )
            .await
            {
                Ok(text) => return Some(text),
                Err(GatewayError::Aborted) => return None,
                Err(e) => {
                    warn!(
                        "Memory source '{}' attempt {}/{} failed: {}",
                        source.name, attempt, self.retry_attempts, e
                    );
                }
            }
            if attempt < self.retry_attempts {
                let backoff = self.retry_backoff * attempt;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return None,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
        None
    }

    async fn memory_content(&self, name: &str, snapshot: &ConfigSnapshot) -> String {
        match self.store.load(name).await {
            Ok(Some(book)) => {
                let blocks = flatten_worldbook(
                    &book,
                    None,
                    &snapshot.settings.excluded_tags,
                    self.classifier.as_ref(),
                );
                render_blocks(&book.name, &blocks, false)
            }
            Ok(None) => {
                warn!("Memory worldbook '{}' not found", name);
                String::new()
            }
            Err(e) => {
                warn!("{}", e);
                String::new()
            }
        }
    }

    fn resolve<'a>(
        &self,
        what: &str,
        endpoint_id: &conclave_domain::EndpointId,
        template_id: &str,
        snapshot: &'a ConfigSnapshot,
    ) -> Option<(&'a Endpoint, &'a PromptTemplate)> {
        let Some(endpoint) = snapshot.live_endpoint(endpoint_id) else {
            warn!("{}: endpoint '{}' is missing or disabled, skipping", what, endpoint_id);
            return None;
        };
        let Some(template) = snapshot.template(template_id) else {
            warn!("{}: template '{}' not found, skipping", what, template_id);
            return None;
        };
        Some((endpoint, template))
    }

    /// Turn a module result into its contribution and report it.
    fn settle(&self, kind: AuxiliaryKind, result: Result<String, GatewayError>) -> String {
        let id = kind.task_id();
        let (status, text) = match result {
            Ok(text) => (TaskStatus::Completed, text),
            Err(GatewayError::Aborted) => (TaskStatus::Aborted, String::new()),
            Err(e) => {
                warn!("Auxiliary module {} failed: {}", kind, e);
                (TaskStatus::Failed, String::new())
            }
        };
        match status {
            TaskStatus::Completed => info!("Auxiliary module {} finished", kind),
            _ => debug!("Auxiliary module {} contributes nothing ({})", kind, status),
        }
        self.progress.update_task(&id, status, 100);
        self.logger.log(RunEvent::new(
            "aux_finished",
            json!({
                "module": kind.as_str(),
                "status": status.as_str(),
                "chars": text.chars().count(),
            }),
        ));
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::progress::NoProgress;
    use crate::ports::run_logger::NoRunLogger;
    use crate::testing::{MemoryWorldbookStore, StubCaller};
    use conclave_domain::{
        AuxiliarySettings, CharacterSettings, MemorySettings, PatternTableClassifier, Worldbook,
        WorldbookEntry,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fanout(caller: Arc<StubCaller>, store: MemoryWorldbookStore) -> AuxiliaryFanout {
        AuxiliaryFanout::new(
            caller,
            ConcurrencyLimiter::unbounded(),
            Arc::new(store),
            Arc::new(PatternTableClassifier::default()),
            Arc::new(NoProgress),
            Arc::new(NoRunLogger),
        )
        .with_memory_retry(3, Duration::from_millis(1))
    }

    fn snapshot(aux: AuxiliarySettings) -> ConfigSnapshot {
        ConfigSnapshot::new(
            vec![
                Endpoint::new("plot", "Plot", "model-plot"),
                Endpoint::new("opt", "Opt", "model-opt"),
                Endpoint::new("mem", "Mem", "model-mem"),
            ],
            vec![
                PromptTemplate::new("plot-t", "PLOT {user_input}"),
                PromptTemplate::new("opt-t", "OPT {user_input}"),
                PromptTemplate::new("mem-t", "MEM {memory_source}: {worldbook_content}"),
            ],
            CharacterSettings::default().with_auxiliary(aux),
        )
    }

    fn all_modules() -> AuxiliarySettings {
        AuxiliarySettings {
            plot_directive: Some(AuxModuleSettings::new("plot", "plot-t")),
            optimization: Some(AuxModuleSettings::new("opt", "opt-t")),
            memory: MemorySettings::new(vec![
                MemorySource::new("short", "mem", "mem-t"),
                MemorySource::new("long", "mem", "mem-t").with_worldbook("Diary"),
            ]),
        }
    }

    #[tokio::test]
    async fn test_all_modules_contribute_in_order() {
        let caller = Arc::new(StubCaller::echo());
        let store = MemoryWorldbookStore::default().with(Worldbook::new(
            "Diary",
            vec![WorldbookEntry::new("1", "Day 1", "We met at the inn.")],
        ));
        let registry = Arc::new(CancellationRegistry::new());
        let results = fanout(caller.clone(), store)
            .run(&snapshot(all_modules()), &RenderInput::new("hello"), &registry)
            .await;

        let kinds: Vec<_> = results.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AuxiliaryKind::Optimization,
                AuxiliaryKind::PlotDirective,
                AuxiliaryKind::Memory
            ]
        );
        assert_eq!(results[0].text, "OPT hello");
        assert_eq!(results[1].input, "hello");
        assert_eq!(
            results[2].text,
            "[short]\nMEM short:\n\n[long]\nMEM long: We met at the inn."
        );
        assert_eq!(caller.calls(), 4);
        assert_eq!(registry.active(), 0);
    }

    #[tokio::test]
    async fn test_failing_module_contributes_nothing() {
        let caller = Arc::new(StubCaller::responding(|req| {
            if req.model == "model-plot" {
                Err(GatewayError::RequestFailed("boom".into()))
            } else {
                Ok("ok".to_string())
            }
        }));
        let registry = Arc::new(CancellationRegistry::new());
        let results = fanout(caller, MemoryWorldbookStore::default())
            .run(&snapshot(all_modules()), &RenderInput::new("hi"), &registry)
            .await;

        let plot = results.iter().find(|r| r.kind == AuxiliaryKind::PlotDirective).unwrap();
        assert!(plot.is_empty());
        let opt = results.iter().find(|r| r.kind == AuxiliaryKind::Optimization).unwrap();
        assert_eq!(opt.text, "ok");
    }

    #[tokio::test]
    async fn test_memory_retries_then_succeeds() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let caller = Arc::new(StubCaller::responding(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(GatewayError::Timeout)
            } else {
                Ok("recalled".to_string())
            }
        }));
        let aux = AuxiliarySettings {
            memory: MemorySettings::new(vec![MemorySource::new("m", "mem", "mem-t")]),
            ..Default::default()
        };
        let registry = Arc::new(CancellationRegistry::new());
        let results = fanout(caller.clone(), MemoryWorldbookStore::default())
            .run(&snapshot(aux), &RenderInput::new("hi"), &registry)
            .await;

        assert_eq!(caller.calls(), 3);
        assert_eq!(results[0].text, "[m]\nrecalled");
    }

    #[tokio::test]
    async fn test_memory_gives_up_after_attempts() {
        let caller = Arc::new(StubCaller::failing("down"));
        let aux = AuxiliarySettings {
            memory: MemorySettings::new(vec![MemorySource::new("m", "mem", "mem-t")]),
            ..Default::default()
        };
        let registry = Arc::new(CancellationRegistry::new());
        let results = fanout(caller.clone(), MemoryWorldbookStore::default())
            .run(&snapshot(aux), &RenderInput::new("hi"), &registry)
            .await;
        assert_eq!(caller.calls(), 3);
        assert!(results[0].is_empty());
    }

    #[tokio::test]
    async fn test_disabled_and_misconfigured_modules() {
        let caller = Arc::new(StubCaller::echo());
        let mut plot = AuxModuleSettings::new("plot", "plot-t");
        plot.enabled = false;
        let aux = AuxiliarySettings {
            plot_directive: Some(plot),
            optimization: Some(AuxModuleSettings::new("ghost", "opt-t")),
            ..Default::default()
        };
        let registry = Arc::new(CancellationRegistry::new());
        let results = fanout(caller.clone(), MemoryWorldbookStore::default())
            .run(&snapshot(aux), &RenderInput::new("hi"), &registry)
            .await;

        assert_eq!(results.len(), 1);
        assert!(results[0].is_empty());
        assert_eq!(caller.calls(), 0);
    }
}
