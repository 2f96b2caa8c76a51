pub mod manager;
pub mod types;

pub use manager::{PermissionManager, SharedPermissionManager};
pub use types::{Decision, GrantLine, Identity};
