use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Standard slot: opens (`true`) or closes (`false`) an overlay.
pub const OPEN_SLOT: &str = "open";
/// Standard slot: writes a value (text, selection, toggle state).
pub const VALUE_SLOT: &str = "value";
/// Standard slot: moves focus to the element.
pub const FOCUS_SLOT: &str = "focus";

#[derive(Debug, Error)]
pub enum VerbError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),
}

pub type VerbResult = Result<(), VerbError>;

/// An effect bound to a named verb on one element.
#[async_trait]
pub trait Verb: Send + Sync {
    async fn invoke(&self, value: Option<Value>) -> VerbResult;
}

struct FnVerb<F>(F);

#[async_trait]
impl<F> Verb for FnVerb<F>
where
    F: Fn(Option<Value>) -> VerbResult + Send + Sync,
{
    async fn invoke(&self, value: Option<Value>) -> VerbResult {
        (self.0)(value)
    }
}

struct AsyncFnVerb<F>(F);

#[async_trait]
impl<F, Fut> Verb for AsyncFnVerb<F>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = VerbResult> + Send,
{
    async fn invoke(&self, value: Option<Value>) -> VerbResult {
        (self.0)(value).await
    }
}

/// Wraps a synchronous closure as a verb.
pub fn verb_fn<F>(f: F) -> Arc<dyn Verb>
where
    F: Fn(Option<Value>) -> VerbResult + Send + Sync + 'static,
{
    Arc::new(FnVerb(f))
}

/// Wraps a closure returning a future as a verb; the engine awaits it.
pub fn async_verb_fn<F, Fut>(f: F) -> Arc<dyn Verb>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = VerbResult> + Send + 'static,
{
    Arc::new(AsyncFnVerb(f))
}

/// Verb name → effect. Holds both the standard slots and custom verbs.
#[derive(Clone, Default)]
pub struct VerbTable {
    verbs: BTreeMap<String, Arc<dyn Verb>>,
}

impl VerbTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, verb: Arc<dyn Verb>) -> Self {
        self.insert(name, verb);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, verb: Arc<dyn Verb>) {
        self.verbs.insert(name.into(), verb);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Verb>> {
        self.verbs.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.verbs.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.verbs.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.verbs.is_empty()
    }

    /// Rejects names that are not identifiers, and custom verbs that shadow a
    /// native verb (only the `open` and `focus` slots may share a native name).
    pub fn validate(&self) -> Result<(), String> {
        for name in self.verbs.keys() {
            if !verb_name_pattern().is_match(name) {
                return Err(format!("invalid verb name '{name}'"));
            }
            let is_slot = name == OPEN_SLOT || name == FOCUS_SLOT;
            if !is_slot && crate::engine::dispatch::NativeVerb::parse(name).is_some() {
                return Err(format!(
                    "verb '{name}' shadows a native action and would never be dispatched"
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for VerbTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.verbs.keys()).finish()
    }
}

fn verb_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("static verb pattern"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<dyn Verb> {
        verb_fn(|_| Ok(()))
    }

    #[test]
    fn custom_and_slot_names_validate() {
        let table = VerbTable::new()
            .with(OPEN_SLOT, noop())
            .with(VALUE_SLOT, noop())
            .with(FOCUS_SLOT, noop())
            .with("setValue", noop())
            .with("open_for_integration", noop());
        assert!(table.validate().is_ok());
    }

    #[test]
    fn shadowing_a_native_verb_is_rejected() {
        let table = VerbTable::new().with("click", noop());
        let err = table.validate().unwrap_err();
        assert!(err.contains("click"));
    }

    #[test]
    fn malformed_names_are_rejected() {
        assert!(VerbTable::new().with("set value", noop()).validate().is_err());
        assert!(VerbTable::new().with("", noop()).validate().is_err());
        assert!(VerbTable::new().with("9lives", noop()).validate().is_err());
    }

    #[tokio::test]
    async fn async_verbs_are_awaited() {
        let verb = async_verb_fn(|value| async move {
            match value {
                Some(Value::Number(_)) => Ok(()),
                other => Err(VerbError::InvalidValue(format!("{other:?}"))),
            }
        });
        assert!(verb.invoke(Some(Value::from(3))).await.is_ok());
        assert!(verb.invoke(None).await.is_err());
    }
}
