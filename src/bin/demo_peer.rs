//! A small controllable "application" that registers a few elements and
//! connects them to a NavPlane server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use serde_json::{json, Map, Value};

use navplane::config;
use navplane::engine::ActionEngine;
use navplane::errors::NavResult;
use navplane::peer::ConnectionManager;
use navplane::registry::{
    verb_fn, ElementDescriptor, ElementHandle, ElementPatch, ElementRegistry, ElementState, ElementType,
    HandleResult, VerbError, VerbResult,
};

const SLIDER_MIN: i64 = 0;
const SLIDER_MAX: i64 = 100;

struct ApplyButton {
    registry: Weak<ElementRegistry>,
    presses: AtomicUsize,
}

impl ElementHandle for ApplyButton {
    fn click(&self) -> HandleResult {
        let presses = self.presses.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(presses, "apply pressed");
        if let Some(registry) = self.registry.upgrade() {
            registry.update_metadata("apply-button", single("presses", json!(presses)));
        }
        Ok(())
    }
}

fn single(key: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.into(), value);
    map
}

fn slider_value(registry: &ElementRegistry) -> i64 {
    registry
        .get("slider-1")
        .and_then(|n| n.metadata.get("value").and_then(Value::as_i64))
        .unwrap_or(SLIDER_MIN)
}

fn set_slider(registry: &Weak<ElementRegistry>, value: i64) -> VerbResult {
    let registry = registry
        .upgrade()
        .ok_or_else(|| VerbError::Failed("application is shutting down".into()))?;
    let clamped = value.clamp(SLIDER_MIN, SLIDER_MAX);
    registry.update_metadata("slider-1", single("value", json!(clamped)));
    tracing::info!(value = clamped, "slider moved");
    Ok(())
}

/// Shows or hides the export dialog together with its contents.
fn set_dialog_open(registry: &ElementRegistry, open: bool) {
    let state = if open { ElementState::Visible } else { ElementState::Hidden };
    registry.update_state("export-dialog", ElementPatch::state(state));
    for child in registry.children_ids("export-dialog") {
        registry.update_state(&child, ElementPatch::state(state));
    }
    tracing::info!(open, "export dialog toggled");
}

fn number_arg(value: Option<Value>, default: i64) -> Result<i64, VerbError> {
    match value {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .ok_or_else(|| VerbError::InvalidValue(n.to_string())),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| VerbError::InvalidValue(s)),
        Some(other) => Err(VerbError::InvalidValue(other.to_string())),
    }
}

fn build_ui(registry: &Arc<ElementRegistry>) -> NavResult<()> {
    let weak = Arc::downgrade(registry);

    registry.register(
        ElementDescriptor::new("editor-page", ElementType::Page, "Photo editor")
            .metadata(json!({ "description": "Main editing workspace" })),
    )?;

    let (set, inc, dec) = (weak.clone(), weak.clone(), weak.clone());
    registry.register(
        ElementDescriptor::new("slider-1", ElementType::Input, "Exposure")
            .parent("editor-page")
            .actions(["setValue", "increase", "decrease"])
            .metadata(json!({
                "value": 10,
                "min": SLIDER_MIN,
                "max": SLIDER_MAX,
                "description": "Exposure slider"
            }))
            .verb(
                "setValue",
                verb_fn(move |v| set_slider(&set, number_arg(v, SLIDER_MIN)?)),
            )
            .verb(
                "increase",
                verb_fn(move |v| {
                    let by = number_arg(v, 1)?;
                    let current = inc.upgrade().map(|r| slider_value(&r)).unwrap_or(SLIDER_MIN);
                    set_slider(&inc, current + by)
                }),
            )
            .verb(
                "decrease",
                verb_fn(move |v| {
                    let by = number_arg(v, 1)?;
                    let current = dec.upgrade().map(|r| slider_value(&r)).unwrap_or(SLIDER_MIN);
                    set_slider(&dec, current - by)
                }),
            ),
    )?;

    let caption = weak.clone();
    registry.register(
        ElementDescriptor::new("caption-input", ElementType::Input, "Caption")
            .parent("editor-page")
            .actions(["type", "clear"])
            .metadata(json!({ "value": "", "placeholder": "Add a caption" }))
            .verb(
                "value",
                verb_fn(move |v| {
                    let text = match v {
                        Some(Value::String(s)) => s,
                        Some(Value::Null) | None => String::new(),
                        Some(other) => other.to_string(),
                    };
                    if let Some(registry) = caption.upgrade() {
                        registry.update_metadata("caption-input", single("value", json!(text)));
                    }
                    Ok(())
                }),
            ),
    )?;

    registry.register(
        ElementDescriptor::new("apply-button", ElementType::Button, "Apply")
            .parent("editor-page")
            .actions(["click"])
            .metadata(json!({ "presses": 0 }))
            .handle(Arc::new(ApplyButton {
                registry: weak.clone(),
                presses: AtomicUsize::new(0),
            })),
    )?;

    let dialog = weak;
    registry.register(
        ElementDescriptor::new("export-dialog", ElementType::Dialog, "Export")
            .parent("editor-page")
            .actions(["open", "close"])
            .verb(
                "open",
                verb_fn(move |v| {
                    let open = v.and_then(|v| v.as_bool()).unwrap_or(true);
                    if let Some(registry) = dialog.upgrade() {
                        set_dialog_open(&registry, open);
                    }
                    Ok(())
                }),
            ),
    )?;

    registry.register(
        ElementDescriptor::new("export-format", ElementType::Select, "Format")
            .parent("export-dialog")
            .actions(["select"])
            .metadata(json!({ "options": ["jpeg", "png", "webp"], "value": "jpeg" })),
    )?;
    set_dialog_open(registry, false);

    Ok(())
}

fn main() -> NavResult<()> {
    navplane::init_tracing();

    let cfg = config::load_config_or_default();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let registry = ElementRegistry::shared();
        build_ui(&registry)?;
        tracing::info!(elements = registry.len(), "demo UI registered");

        let engine = Arc::new(
            ActionEngine::new(registry.clone())
                .with_default_settle(std::time::Duration::from_millis(cfg.agent.default_settle_ms)),
        );
        let manager = ConnectionManager::new(engine, cfg.peer.clone());
        let lease = manager.acquire(&cfg.peer.url);
        tracing::info!(url = %lease.session().url(), "demo peer started; Ctrl-C to quit");

        tokio::signal::ctrl_c().await?;
        lease.session().disconnect();
        lease.session().closed().await;
        tracing::info!(value = slider_value(&registry), "demo peer stopped");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use navplane::engine::ActionStep;

    #[test]
    fn number_arg_accepts_strings_and_defaults() {
        assert_eq!(number_arg(None, 1).unwrap(), 1);
        assert_eq!(number_arg(Some(json!("7")), 1).unwrap(), 7);
        assert_eq!(number_arg(Some(json!(2.6)), 1).unwrap(), 3);
        assert!(number_arg(Some(json!([1])), 1).is_err());
    }

    #[test]
    fn demo_ui_starts_with_closed_dialog() {
        let registry = ElementRegistry::shared();
        build_ui(&registry).unwrap();
        assert_eq!(slider_value(&registry), 10);
        assert_eq!(registry.get("export-dialog").unwrap().state, ElementState::Hidden);
        assert_eq!(registry.path_to("export-format"), vec!["editor-page", "export-dialog", "export-format"]);
        assert!(!registry.export_snapshot().currently_visible.contains(&"export-format".to_string()));
    }

    #[tokio::test]
    async fn dialog_contents_follow_open_and_close() {
        let registry = ElementRegistry::shared();
        build_ui(&registry).unwrap();
        let engine = ActionEngine::new(registry.clone()).with_default_settle(std::time::Duration::ZERO);
        let visible = || registry.export_snapshot().currently_visible;

        assert!(engine.execute_step(&ActionStep::new("export-dialog", "open")).await.success);
        assert!(visible().contains(&"export-dialog".to_string()));
        assert!(visible().contains(&"export-format".to_string()));

        assert!(engine.execute_step(&ActionStep::new("export-dialog", "close")).await.success);
        assert!(!visible().contains(&"export-dialog".to_string()));
        assert!(!visible().contains(&"export-format".to_string()));
    }
}
