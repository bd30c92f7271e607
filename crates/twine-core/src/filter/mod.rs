pub mod engine;
pub mod predicate;

pub use engine::FilterEngine;
pub use predicate::{apply, CompiledFilter, FilterOptions};
