//! Wire format shared by the peer and the hub.
//!
//! Every frame is a JSON text message `{"type": ..., "data": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::{ActionOutcome, ActionPlan, ActionStep};
use crate::errors::{NavPlaneError, NavResult};
use crate::registry::UiSnapshot;

pub const NAVIGATION_PATH: &str = "navigation_path";
pub const CUSTOM_ACTION: &str = "custom";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Envelope {
    UiState(UiSnapshot),
    ActionRequest(ActionRequest),
    ActionResult(ActionResultPayload),
    Heartbeat(Value),
}

impl Envelope {
    pub fn parse(text: &str) -> NavResult<Self> {
        serde_json::from_str(text).map_err(|e| NavPlaneError::Protocol(format!("bad frame: {e}")))
    }

    pub fn to_text(&self) -> NavResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn heartbeat() -> Self {
        Envelope::Heartbeat(serde_json::json!({ "timestamp": chrono::Utc::now().timestamp_millis() }))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::UiState(_) => "ui_state",
            Envelope::ActionRequest(_) => "action_request",
            Envelope::ActionResult(_) => "action_result",
            Envelope::Heartbeat(_) => "heartbeat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Correlation id echoed back in the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub action: String,
    #[serde(default)]
    pub params: ActionParams,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<ActionStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_after: Option<u64>,
}

impl ActionParams {
    pub fn for_component(component_id: impl Into<String>) -> Self {
        Self {
            component_id: Some(component_id.into()),
            ..Self::default()
        }
    }
}

/// What a request asks the engine to run.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerCommand {
    Step(ActionStep),
    Plan(ActionPlan),
}

impl ActionRequest {
    pub fn new(action: impl Into<String>, params: ActionParams) -> Self {
        Self {
            id: None,
            action: action.into(),
            params,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn into_command(self) -> Result<PeerCommand, String> {
        let ActionParams {
            component_id,
            text,
            value,
            action_name,
            action_value,
            steps,
            description,
            wait_after,
        } = self.params;

        if self.action == NAVIGATION_PATH {
            let steps = steps.ok_or("navigation_path requires params.steps")?;
            return Ok(PeerCommand::Plan(ActionPlan::new(
                description.unwrap_or_default(),
                steps,
            )));
        }

        let component_id = component_id.ok_or_else(|| format!("{} requires params.componentId", self.action))?;
        let (verb, value) = if self.action == CUSTOM_ACTION {
            let name = action_name.ok_or("custom requires params.actionName")?;
            (name, action_value)
        } else {
            let text = text.filter(|t| !t.is_empty()).map(Value::String);
            (self.action, text.or(value))
        };

        Ok(PeerCommand::Step(ActionStep {
            component_id,
            action: verb,
            value,
            wait: wait_after,
            expected_result: None,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResultPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_steps: Option<Vec<ActionStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_state: Option<UiSnapshot>,
}

impl ActionResultPayload {
    pub fn from_outcome(request_id: Option<String>, outcome: ActionOutcome) -> Self {
        Self {
            request_id,
            success: outcome.success,
            error: outcome.error,
            executed_steps: Some(outcome.executed_steps),
            duration_ms: Some(outcome.duration_ms),
            final_state: outcome.final_state,
        }
    }

    pub fn failure(request_id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            request_id,
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_uses_type_and_data_keys() {
        let frame = Envelope::ActionRequest(
            ActionRequest::new("click", ActionParams::for_component("export-button")).with_id("r1"),
        );
        let json: Value = serde_json::from_str(&frame.to_text().unwrap()).unwrap();
        assert_eq!(json["type"], "action_request");
        assert_eq!(json["data"]["id"], "r1");
        assert_eq!(json["data"]["params"]["componentId"], "export-button");
    }

    #[test]
    fn unknown_frame_type_is_a_protocol_error() {
        let err = Envelope::parse(r#"{"type":"bogus","data":{}}"#).unwrap_err();
        assert!(matches!(err, NavPlaneError::Protocol(_)));
    }

    #[test]
    fn standard_action_prefers_text_over_value() {
        let request: ActionRequest = serde_json::from_value(json!({
            "action": "type",
            "params": { "componentId": "name", "text": "Ada", "value": "ignored", "waitAfter": 50 }
        }))
        .unwrap();
        let PeerCommand::Step(step) = request.into_command().unwrap() else {
            panic!("expected a single step");
        };
        assert_eq!(step.action, "type");
        assert_eq!(step.value, Some(json!("Ada")));
        assert_eq!(step.wait, Some(50));
    }

    #[test]
    fn custom_action_uses_action_name_and_value() {
        let request = ActionRequest::new(
            CUSTOM_ACTION,
            ActionParams {
                action_name: Some("increase".into()),
                action_value: Some(json!(5)),
                ..ActionParams::for_component("slider-1")
            },
        );
        let PeerCommand::Step(step) = request.into_command().unwrap() else {
            panic!("expected a single step");
        };
        assert_eq!(step.action, "increase");
        assert_eq!(step.value, Some(json!(5)));
        assert_eq!(step.wait, None);
    }

    #[test]
    fn navigation_path_builds_a_plan() {
        let request: ActionRequest = serde_json::from_value(json!({
            "action": "navigation_path",
            "params": {
                "description": "open export",
                "steps": [
                    { "componentId": "menu", "action": "click" },
                    { "componentId": "export", "action": "click", "wait": 10 }
                ]
            }
        }))
        .unwrap();
        let PeerCommand::Plan(plan) = request.into_command().unwrap() else {
            panic!("expected a plan");
        };
        assert_eq!(plan.description, "open export");
        assert_eq!(plan.steps.len(), 2);
    }

    #[test]
    fn missing_component_id_is_rejected() {
        let request = ActionRequest::new("click", ActionParams::default());
        assert!(request.into_command().unwrap_err().contains("componentId"));
    }
}
