use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::engine::dispatch::{dispatch_native, NativeVerb};
use crate::engine::types::{ActionOutcome, ActionPlan, ActionStep};
use crate::errors::{NavPlaneError, NavResult};
use crate::registry::ElementRegistry;

pub const DEFAULT_SETTLE: Duration = Duration::from_millis(300);

/// Executes steps and plans against the registry.
///
/// Addressing problems and verb failures come back as failure outcomes.
/// The only hard error is submitting a plan while another is running.
pub struct ActionEngine {
    registry: Arc<ElementRegistry>,
    executing: AtomicBool,
    history: Mutex<Vec<ActionStep>>,
    default_settle: Duration,
}

/// Clears the in-flight flag on every exit path, including the plan future being dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ActionEngine {
    pub fn new(registry: Arc<ElementRegistry>) -> Self {
        Self {
            registry,
            executing: AtomicBool::new(false),
            history: Mutex::new(Vec::new()),
            default_settle: DEFAULT_SETTLE,
        }
    }

    pub fn with_default_settle(mut self, settle: Duration) -> Self {
        self.default_settle = settle;
        self
    }

    pub fn registry(&self) -> &Arc<ElementRegistry> {
        &self.registry
    }

    pub fn default_settle(&self) -> Duration {
        self.default_settle
    }

    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    pub async fn execute_step(&self, step: &ActionStep) -> ActionOutcome {
        let started = Instant::now();
        match self.run_step(step).await {
            Ok(()) => ActionOutcome {
                success: true,
                executed_steps: vec![step.clone()],
                error: None,
                duration_ms: started.elapsed().as_millis() as u64,
                final_state: None,
            },
            Err(error) => ActionOutcome::failed(error, Vec::new(), started.elapsed()),
        }
    }

    pub async fn execute_plan(&self, plan: &ActionPlan) -> NavResult<ActionOutcome> {
        if self
            .executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(description = %plan.description, "plan rejected: another plan is running");
            return Err(NavPlaneError::AlreadyExecuting);
        }
        let _guard = InFlightGuard(&self.executing);

        let started = Instant::now();
        tracing::info!(
            description = %plan.description,
            steps = plan.steps.len(),
            estimated_ms = plan.estimated_duration(self.default_settle).as_millis() as u64,
            "starting navigation"
        );

        let mut executed = Vec::with_capacity(plan.steps.len());
        for (index, step) in plan.steps.iter().enumerate() {
            if let Err(cause) = self.run_step(step).await {
                let error = format!(
                    "Failed to execute step {} ({} on {}): {cause}",
                    index + 1,
                    step.action,
                    step.component_id
                );
                tracing::warn!(description = %plan.description, error = %error, "navigation aborted");
                return Ok(ActionOutcome::failed(error, executed, started.elapsed()));
            }
            executed.push(step.clone());
        }

        tracing::info!(
            description = %plan.description,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "navigation complete"
        );
        Ok(ActionOutcome {
            success: true,
            executed_steps: executed,
            error: None,
            duration_ms: started.elapsed().as_millis() as u64,
            final_state: Some(self.registry.export_snapshot()),
        })
    }

    /// Successfully executed steps, oldest first.
    pub fn history(&self) -> Vec<ActionStep> {
        self.history.lock().clone()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    async fn run_step(&self, step: &ActionStep) -> Result<(), String> {
        tracing::debug!(
            id = %step.component_id,
            action = %step.action,
            value = ?step.value,
            "executing step"
        );

        let Some(node) = self.registry.get(&step.component_id) else {
            tracing::warn!(id = %step.component_id, "component not found");
            return Err(format!("Component not found: {}", step.component_id));
        };

        let result = match NativeVerb::parse(&step.action) {
            Some(native) => {
                dispatch_native(&self.registry, &node, native, step.value.as_ref()).await
            }
            None => match node.verbs.get(&step.action) {
                Some(verb) => {
                    tracing::debug!(id = %node.id, verb = %step.action, "executing custom verb");
                    verb.invoke(step.value.clone())
                        .await
                        .map_err(|e| format!("Custom action '{}' failed: {e}", step.action))
                }
                None => Err(format!("Unknown action '{}' on {}", step.action, node.id)),
            },
        };

        if let Err(e) = &result {
            tracing::warn!(id = %step.component_id, action = %step.action, error = %e, "step failed");
            return result;
        }

        tokio::time::sleep(step.settle_delay(self.default_settle)).await;

        if let Some(expected) = &step.expected_result {
            tracing::debug!(id = %step.component_id, ?expected, "expected result recorded, not verified");
        }
        self.history.lock().push(step.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use serde_json::{json, Value};

    use crate::registry::{async_verb_fn, verb_fn, ElementDescriptor, ElementType, VerbError};

    fn engine_with(registry: Arc<ElementRegistry>) -> Arc<ActionEngine> {
        Arc::new(ActionEngine::new(registry).with_default_settle(Duration::ZERO))
    }

    #[tokio::test]
    async fn unknown_component_is_a_failure_outcome() {
        let engine = engine_with(ElementRegistry::shared());
        let outcome = engine.execute_step(&ActionStep::new("ghost-button", "click")).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("ghost-button"));
        assert!(outcome.executed_steps.is_empty());
    }

    #[tokio::test]
    async fn custom_verb_receives_step_value() {
        let registry = ElementRegistry::shared();
        let reg = registry.clone();
        registry
            .register(
                ElementDescriptor::new("slider-1", ElementType::Input, "Exposure")
                    .metadata(json!({ "value": 10, "min": 0, "max": 100 }))
                    .verb(
                        "increase",
                        verb_fn(move |v| {
                            let by = v.and_then(|v| v.as_i64()).unwrap_or(0);
                            let current = reg
                                .get("slider-1")
                                .and_then(|n| n.metadata.get("value").and_then(Value::as_i64))
                                .unwrap_or(0);
                            let mut updates = serde_json::Map::new();
                            updates.insert("value".into(), json!((current + by).min(100)));
                            reg.update_metadata("slider-1", updates);
                            Ok(())
                        }),
                    ),
            )
            .unwrap();
        let engine = engine_with(registry.clone());

        let outcome = engine
            .execute_step(&ActionStep::new("slider-1", "increase").with_value(json!(5)))
            .await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(registry.get("slider-1").unwrap().metadata["value"], 15);
        assert_eq!(engine.history().len(), 1);
    }

    #[tokio::test]
    async fn failing_custom_verb_reports_its_error() {
        let registry = ElementRegistry::shared();
        registry
            .register(
                ElementDescriptor::new("crop", ElementType::Card, "Crop").verb(
                    "setRatio",
                    async_verb_fn(|_| async { Err(VerbError::Failed("ratio locked".into())) }),
                ),
            )
            .unwrap();
        let engine = engine_with(registry);
        let outcome = engine.execute_step(&ActionStep::new("crop", "setRatio")).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("ratio locked"));
        assert!(engine.history().is_empty());
    }

    #[tokio::test]
    async fn unknown_verb_is_a_failure_outcome() {
        let registry = ElementRegistry::shared();
        registry
            .register(ElementDescriptor::new("card", ElementType::Card, "Preset"))
            .unwrap();
        let engine = engine_with(registry);
        let outcome = engine.execute_step(&ActionStep::new("card", "frobnicate")).await;
        assert!(outcome.error.unwrap().contains("Unknown action 'frobnicate'"));
    }

    #[tokio::test]
    async fn plan_stops_at_first_failure() {
        let registry = ElementRegistry::shared();
        let hits = Arc::new(AtomicUsize::new(0));
        for id in ["one", "three"] {
            let hits = hits.clone();
            registry
                .register(ElementDescriptor::new(id, ElementType::Card, id).verb(
                    "bump",
                    verb_fn(move |_| {
                        hits.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                ))
                .unwrap();
        }
        registry
            .register(ElementDescriptor::new("two", ElementType::Card, "two"))
            .unwrap();
        let engine = engine_with(registry);

        let plan = ActionPlan::new(
            "bump three cards",
            vec![
                ActionStep::new("one", "bump"),
                ActionStep::new("two", "frobnicate"),
                ActionStep::new("three", "bump"),
            ],
        );
        let outcome = engine.execute_plan(&plan).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.executed_steps, vec![ActionStep::new("one", "bump")]);
        assert!(outcome.error.unwrap().contains("step 2"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(outcome.final_state.is_none());
        assert!(!engine.is_executing());
    }

    #[tokio::test]
    async fn successful_plan_carries_final_snapshot() {
        let registry = ElementRegistry::shared();
        registry
            .register(
                ElementDescriptor::new("a", ElementType::Card, "a").verb("noop", verb_fn(|_| Ok(()))),
            )
            .unwrap();
        let engine = engine_with(registry);
        let outcome = engine
            .execute_plan(&ActionPlan::new("noop", vec![ActionStep::new("a", "noop")]))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.final_state.unwrap().components.len(), 1);
    }

    #[tokio::test]
    async fn second_plan_is_rejected_while_first_runs() {
        let registry = ElementRegistry::shared();
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);
        let hits = Arc::new(AtomicUsize::new(0));
        let verb_hits = hits.clone();
        registry
            .register(ElementDescriptor::new("slow", ElementType::Card, "slow").verb(
                "wait",
                async_verb_fn(move |_| {
                    let mut rx = release_rx.clone();
                    let hits = verb_hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        while !*rx.borrow() {
                            if rx.changed().await.is_err() {
                                break;
                            }
                        }
                        Ok(())
                    }
                }),
            ))
            .unwrap();
        let engine = engine_with(registry);

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .execute_plan(&ActionPlan::new("slow", vec![ActionStep::new("slow", "wait")]))
                    .await
            })
        };
        while !engine.is_executing() {
            tokio::task::yield_now().await;
        }

        let second = engine
            .execute_plan(&ActionPlan::new("again", vec![ActionStep::new("slow", "wait")]))
            .await;
        assert!(matches!(second, Err(NavPlaneError::AlreadyExecuting)));

        release_tx.send(true).unwrap();
        let outcome = first.await.unwrap().unwrap();
        assert!(outcome.success);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!engine.is_executing());
    }

    #[tokio::test]
    async fn dropped_plan_releases_the_in_flight_flag() {
        let registry = ElementRegistry::shared();
        registry
            .register(ElementDescriptor::new("stuck", ElementType::Card, "stuck").verb(
                "hang",
                async_verb_fn(|_| async {
                    std::future::pending::<()>().await;
                    Ok(())
                }),
            ))
            .unwrap();
        let engine = engine_with(registry);

        let plan = ActionPlan::new("hang", vec![ActionStep::new("stuck", "hang")]);
        let timed = tokio::time::timeout(Duration::from_millis(20), engine.execute_plan(&plan)).await;
        assert!(timed.is_err());
        assert!(!engine.is_executing());
    }
}
