pub mod handle;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod verbs;

pub use handle::{ElementHandle, HandleError, HandleResult};
pub use snapshot::{ComponentInfo, UiSnapshot};
pub use store::ElementRegistry;
pub use types::{
    ElementDescriptor, ElementNode, ElementPatch, ElementState, ElementType, FindCriteria,
    RegistryEvent,
};
pub use verbs::{async_verb_fn, verb_fn, Verb, VerbError, VerbResult, VerbTable};
