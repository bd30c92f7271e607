pub mod config;
pub mod fixtures;
pub mod protocol;
pub mod render;
pub mod session;

pub use config::CliConfig;
pub use fixtures::Fixtures;
pub use protocol::{AccountsCommand, CliCommand, FiltersCommand, Response};
pub use session::Session;
