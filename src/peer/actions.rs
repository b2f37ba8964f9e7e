use std::time::Duration;

use crate::engine::ActionEngine;
use crate::errors::NavPlaneError;
use crate::protocol::{ActionRequest, ActionResultPayload, PeerCommand};

/// Runs one inbound request against the engine, raced against `timeout`.
///
/// On timeout the execution future is dropped; the engine's in-flight flag is
/// released by its guard and no further steps run.
pub async fn handle_action_request(
    engine: &ActionEngine,
    request: ActionRequest,
    timeout: Duration,
) -> ActionResultPayload {
    let request_id = request.id.clone();
    let action = request.action.clone();
    tracing::info!(request_id = ?request_id, action = %action, "action request received");

    let command = match request.into_command() {
        Ok(command) => command,
        Err(e) => {
            tracing::warn!(action = %action, error = %e, "malformed action request");
            return ActionResultPayload::failure(request_id, e);
        }
    };

    let run = async {
        match command {
            PeerCommand::Step(step) => Ok(engine.execute_step(&step).await),
            PeerCommand::Plan(plan) => engine.execute_plan(&plan).await,
        }
    };

    match tokio::time::timeout(timeout, run).await {
        Ok(Ok(outcome)) => {
            tracing::info!(
                request_id = ?request_id,
                success = outcome.success,
                duration_ms = outcome.duration_ms,
                "action completed"
            );
            ActionResultPayload::from_outcome(request_id, outcome)
        }
        Ok(Err(e)) => {
            tracing::warn!(request_id = ?request_id, error = %e, "action rejected");
            ActionResultPayload::failure(request_id, e.to_string())
        }
        Err(_) => {
            let error = NavPlaneError::ActionTimeout(timeout);
            tracing::warn!(request_id = ?request_id, error = %error, "action timed out");
            ActionResultPayload::failure(request_id, error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::protocol::{ActionParams, CUSTOM_ACTION};
    use crate::registry::{async_verb_fn, ElementDescriptor, ElementRegistry, ElementType};

    fn engine() -> Arc<ActionEngine> {
        let registry = ElementRegistry::shared();
        registry
            .register(ElementDescriptor::new("stuck", ElementType::Card, "Stuck").verb(
                "hang",
                async_verb_fn(|_| async {
                    std::future::pending::<()>().await;
                    Ok(())
                }),
            ))
            .unwrap();
        Arc::new(ActionEngine::new(registry).with_default_settle(Duration::ZERO))
    }

    #[tokio::test]
    async fn result_echoes_request_id() {
        let engine = engine();
        let request = ActionRequest::new("click", ActionParams::for_component("ghost-button")).with_id("req-7");
        let result = handle_action_request(&engine, request, Duration::from_secs(1)).await;
        assert_eq!(result.request_id.as_deref(), Some("req-7"));
        assert!(!result.success);
        assert!(result.error.unwrap().contains("ghost-button"));
    }

    #[tokio::test]
    async fn timeout_yields_failure_and_releases_engine() {
        let engine = engine();
        let request = ActionRequest::new(
            "navigation_path",
            ActionParams {
                steps: Some(vec![crate::engine::ActionStep::new("stuck", "hang")]),
                ..ActionParams::default()
            },
        );
        let result = handle_action_request(&engine, request, Duration::from_millis(20)).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
        assert!(!engine.is_executing());
    }

    #[tokio::test]
    async fn malformed_request_is_a_failure_result() {
        let engine = engine();
        let request = ActionRequest::new(CUSTOM_ACTION, ActionParams {
            action_value: Some(json!(1)),
            ..ActionParams::for_component("stuck")
        });
        let result = handle_action_request(&engine, request, Duration::from_secs(1)).await;
        assert!(result.error.unwrap().contains("actionName"));
    }
}
