pub mod config;
pub mod constants;
pub mod events;
pub mod filter;
pub mod models;
pub mod pagination;
pub mod runtime;
pub mod store;
pub mod timeline;
pub mod tracing_setup;

pub use config::{CoreConfig, TimelineConfig};
pub use events::{TimelineConsumer, TimelineEvent, TimelineUpdate};
pub use filter::FilterEngine;
pub use runtime::TimelineRuntime;
pub use store::{Database, StoreError, TimelineEntry};
pub use timeline::Timeline;
