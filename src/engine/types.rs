use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::UiSnapshot;

/// Post-condition attached to a step. Carried through the protocol and
/// logged, but not checked against the real outcome.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opens_component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closes_component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_equals: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStep {
    pub component_id: String,
    /// Native verb name or a custom verb registered on the element.
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Settle delay after a successful dispatch, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_result: Option<ExpectedResult>,
}

impl ActionStep {
    pub fn new(component_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            component_id: component_id.into(),
            action: action.into(),
            value: None,
            wait: None,
            expected_result: None,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_wait(mut self, wait_ms: u64) -> Self {
        self.wait = Some(wait_ms);
        self
    }

    pub fn settle_delay(&self, default: Duration) -> Duration {
        self.wait.map(Duration::from_millis).unwrap_or(default)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPlan {
    pub steps: Vec<ActionStep>,
    #[serde(default)]
    pub description: String,
}

impl ActionPlan {
    pub fn new(description: impl Into<String>, steps: Vec<ActionStep>) -> Self {
        Self {
            steps,
            description: description.into(),
        }
    }

    /// Sum of the settle delays, the lower bound on how long the plan takes.
    pub fn estimated_duration(&self, default_settle: Duration) -> Duration {
        self.steps.iter().map(|s| s.settle_delay(default_settle)).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub success: bool,
    pub executed_steps: Vec<ActionStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_state: Option<UiSnapshot>,
}

impl ActionOutcome {
    pub fn failed(error: impl Into<String>, executed_steps: Vec<ActionStep>, elapsed: Duration) -> Self {
        Self {
            success: false,
            executed_steps,
            error: Some(error.into()),
            duration_ms: elapsed.as_millis() as u64,
            final_state: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_parses_wire_shape() {
        let step: ActionStep = serde_json::from_value(json!({
            "componentId": "export-button",
            "action": "click",
            "wait": 50,
            "expectedResult": { "opensComponent": "export-dialog" }
        }))
        .unwrap();
        assert_eq!(step.component_id, "export-button");
        assert_eq!(step.settle_delay(Duration::from_millis(300)), Duration::from_millis(50));
        assert_eq!(
            step.expected_result.unwrap().opens_component.as_deref(),
            Some("export-dialog")
        );
    }

    #[test]
    fn estimated_duration_uses_default_for_missing_waits() {
        let plan = ActionPlan::new(
            "two clicks",
            vec![ActionStep::new("a", "click"), ActionStep::new("b", "click").with_wait(100)],
        );
        assert_eq!(
            plan.estimated_duration(Duration::from_millis(300)),
            Duration::from_millis(400)
        );
    }
}
