pub mod actions;
pub mod manager;
pub mod session;
pub mod sync;

pub use actions::handle_action_request;
pub use manager::{ConnectionManager, PeerLease};
pub use session::{PeerSession, PeerStatus};
pub use sync::SnapshotSync;
