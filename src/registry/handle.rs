use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandleError {
    #[error("element does not support {0}")]
    Unsupported(&'static str),

    #[error("{0}")]
    Failed(String),
}

pub type HandleResult = Result<(), HandleError>;

/// Binding to the live element behind a registry node.
///
/// Implementations raise whatever change notification the hosting UI layer
/// listens to (e.g. `set_text` must behave like a user edit, not a silent
/// property write). Every operation except `click` is optional.
pub trait ElementHandle: Send + Sync {
    fn click(&self) -> HandleResult;

    fn set_text(&self, _text: &str) -> HandleResult {
        Err(HandleError::Unsupported("type"))
    }

    fn focus(&self) -> HandleResult {
        Err(HandleError::Unsupported("focus"))
    }

    fn blur(&self) -> HandleResult {
        Err(HandleError::Unsupported("blur"))
    }

    fn scroll_into_view(&self, _options: Option<&Value>) -> HandleResult {
        Err(HandleError::Unsupported("scroll"))
    }

    fn hover(&self) -> HandleResult {
        Err(HandleError::Unsupported("hover"))
    }

    fn select(&self, _value: &Value) -> HandleResult {
        Err(HandleError::Unsupported("select"))
    }

    fn toggle(&self) -> HandleResult {
        Err(HandleError::Unsupported("toggle"))
    }

    fn submit(&self) -> HandleResult {
        Err(HandleError::Unsupported("submit"))
    }
}
