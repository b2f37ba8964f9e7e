pub mod dispatch;
pub mod executor;
pub mod types;

pub use dispatch::NativeVerb;
pub use executor::{ActionEngine, DEFAULT_SETTLE};
pub use types::{ActionOutcome, ActionPlan, ActionStep, ExpectedResult};
