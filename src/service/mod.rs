pub mod importer;
pub mod maintenance;
pub mod matcher;
pub mod pair_expander;
pub mod price_matrix;
pub mod radius;

pub use importer::ImportService;
pub use maintenance::RadiusMaintenance;
pub use matcher::{GeoBoundedMatcher, MatchMode};
pub use price_matrix::{apply_batch, BatchOutcome, PriceMatrix};
pub use radius::{AllocationStats, RadiusAllocator};
