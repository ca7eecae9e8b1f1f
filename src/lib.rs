pub mod catalog;
pub mod commands;
pub mod config;
pub mod error;
pub mod launch;
pub mod paths;
pub mod persist;
pub mod query;
pub mod session;
pub mod store_lock;
pub mod tags;
pub mod verify;




#[cfg(test)]
mod verify_test;



#[cfg(test)]
mod commands_test;

use clap::Parser;
use std::process::ExitCode;

pub use catalog::{Catalog, FileReference, Project, ProjectId, ReferenceId, Status};
pub use config::ExplorerConfig;
pub use error::{ExplorerError, Result};
pub use query::SearchQuery;
pub use session::Explorer;
pub use tags::{Tag, TagId};

/// Binary entry point: parse arguments, set up logging and a runtime for the store-lock
/// heartbeat, run one command.
pub fn run() -> ExitCode {
    let cli = commands::Cli::parse();
    commands::init_logging(&cli);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let _guard = runtime.enter();

    match commands::execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::debug!("Command failed: {:?}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
