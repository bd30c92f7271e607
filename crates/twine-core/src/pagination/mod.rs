pub mod bottom;
pub mod coordinator;
pub mod fetch;
pub mod memory;
pub mod sink;

pub use bottom::{BottomTracker, ScrollSample};
pub use coordinator::{
    AccountFailure, CompletionReport, FetchState, PaginationCoordinator, TriggerOutcome,
};
pub use fetch::{fetch_all, FetchCompletion, FetchError, FetchedPage, StatusFetcher};
pub use memory::MemoryFetcher;
pub use sink::{PageSink, PersistentSink};
