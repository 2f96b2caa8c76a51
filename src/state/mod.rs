pub mod purge_store;
pub mod repository;

pub use purge_store::{create_shared_purge_store, PurgeStore};
pub use repository::{PurgeRepository, SharedRepository};
