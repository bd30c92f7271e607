use std::path::PathBuf;

use clap::{Parser, Subcommand};
use twine_cli::cli::{AccountsCommand, CliCommand, CliConfig, FiltersCommand, Response, Session};
use twine_core::models::{AccountId, FilterKind, GapId, RuleId, StatusId};
use twine_core::tracing_setup::init_tracing_with_service;

#[derive(Parser)]
#[command(name = "twine-cli")]
#[command(about = "Replay a multi-account timeline against fixture files")]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, short)]
    pretty: bool,

    /// Path to JSON config file (contains dataDir, fixturesDir, timeline)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Directory holding the database and timeline settings
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory with accounts.json and statuses/<account>.json
    #[arg(long, short = 'f')]
    fixtures: Option<PathBuf>,

    /// Timeline name (defaults to home)
    #[arg(long, short = 't')]
    timeline: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch statuses newer than the newest stored ones
    Refresh,

    /// Fetch statuses older than the oldest stored ones
    LoadMore,

    /// Fetch the statuses missing from a gap
    FillGap {
        /// Gap id as printed by `show`
        gap_id: u64,
    },

    /// Print the visible timeline
    Show {
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },

    /// Keep only the newest statuses
    Truncate {
        /// Defaults to the configured retention limit
        limit: Option<usize>,
    },

    /// Delete a stored status
    Delete { account_id: u64, status_id: u64 },

    /// List or toggle accounts
    Accounts {
        #[command(subcommand)]
        action: Option<AccountAction>,
    },

    /// Manage mute rules
    Filters {
        #[command(subcommand)]
        action: Option<FilterAction>,
    },

    /// Print the effective timeline settings
    Config,
}

#[derive(Subcommand)]
enum AccountAction {
    List,
    Activate { account_id: u64 },
    Deactivate { account_id: u64 },
}

#[derive(Subcommand)]
enum FilterAction {
    List,
    /// Add a rule: user, keyword, source or link
    Add { kind: FilterKind, value: String },
    Remove { id: i64 },
}

impl From<Commands> for CliCommand {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Refresh => CliCommand::Refresh,
            Commands::LoadMore => CliCommand::LoadMore,
            Commands::FillGap { gap_id } => CliCommand::FillGap {
                gap_id: GapId(gap_id),
            },
            Commands::Show { limit } => CliCommand::Show { limit },
            Commands::Truncate { limit } => CliCommand::Truncate { limit },
            Commands::Delete {
                account_id,
                status_id,
            } => CliCommand::Delete {
                account_id: AccountId(account_id),
                status_id: StatusId(status_id),
            },
            Commands::Accounts { action } => CliCommand::Accounts(match action {
                None | Some(AccountAction::List) => AccountsCommand::List,
                Some(AccountAction::Activate { account_id }) => {
                    AccountsCommand::Activate(AccountId(account_id))
                }
                Some(AccountAction::Deactivate { account_id }) => {
                    AccountsCommand::Deactivate(AccountId(account_id))
                }
            }),
            Commands::Filters { action } => CliCommand::Filters(match action {
                None | Some(FilterAction::List) => FiltersCommand::List,
                Some(FilterAction::Add { kind, value }) => FiltersCommand::Add { kind, value },
                Some(FilterAction::Remove { id }) => FiltersCommand::Remove(RuleId(id)),
            }),
            Commands::Config => CliCommand::Config,
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing_with_service("twine-cli");
    let cli = Cli::parse();

    let config = load_config(&cli).merge_overrides(cli.data_dir, cli.fixtures, cli.timeline);
    let command = CliCommand::from(cli.command);
    let method = command.method();

    let response = match Session::open(&config) {
        Ok(mut session) => match session.execute(command).await {
            Ok(result) => Response::success(result),
            Err(e) => Response::error(method, &format!("{:#}", e)),
        },
        Err(e) => Response::error("open", &format!("{:#}", e)),
    };

    let output = if cli.pretty {
        serde_json::to_string_pretty(&response)
    } else {
        serde_json::to_string(&response)
    };
    match output {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: {}", e),
    }
    if response.is_error() {
        std::process::exit(1);
    }
}

/// Load configuration from file, or defaults when none was given
fn load_config(cli: &Cli) -> CliConfig {
    let Some(ref path) = cli.config else {
        return CliConfig::default();
    };
    match CliConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
