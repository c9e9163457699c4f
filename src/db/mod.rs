pub mod memory;
pub mod pool;
pub mod queries;
pub mod store;

pub use memory::InMemoryStore;
pub use pool::create_pool;
pub use queries::PgTollStore;
pub use store::{Changeset, RadiusUpdate, TollAssignment, TollStore};
