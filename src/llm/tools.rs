use crate::errors::{NavPlaneError, NavResult};
use crate::llm::types::ToolDef;

/// Loads the UI-control tool catalog from prompts/tools/builtin.json.
/// The JSON is embedded at compile time via include_str!.
pub fn load_builtin_tools() -> NavResult<Vec<ToolDef>> {
    let json = include_str!("../../prompts/tools/builtin.json");
    serde_json::from_str(json).map_err(|e| NavPlaneError::Config(format!("Failed to parse builtin tools: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_every_ui_tool() {
        let tools = load_builtin_tools().unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.function.name.as_str()).collect();
        for expected in [
            "get_ui_state",
            "find_component",
            "click_component",
            "type_text",
            "clear_input",
            "open_component",
            "close_component",
            "scroll_to_component",
            "select_option",
            "execute_custom_action",
            "execute_navigation_path",
            "get_component_sitemap",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
        assert_eq!(tools.len(), 12);
        assert!(tools.iter().all(|t| t.def_type == "function"));
    }
}
