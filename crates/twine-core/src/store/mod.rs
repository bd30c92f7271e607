pub mod account_set;
pub mod db;
pub mod repository;
pub mod timeline_store;

pub use account_set::AccountSet;
pub use db::Database;
pub use repository::{FilterRuleRepository, StatusRepository, StatusScope};
pub use timeline_store::{
    collapse_retweets, GapResolution, PreparedPage, StoreError, TimelineEntry, TimelineQuery,
    TimelineStore, TruncateReport,
};
