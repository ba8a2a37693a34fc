use stockinfo_core::config::{AppConfig, LoadOptions};
use stockinfo_db::{connect, migrations};

use crate::commands::{CommandResult, FailureKind};

const COMMAND: &str = "migrate";

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                FailureKind::Config,
                format!("configuration issue: {error}"),
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                FailureKind::Runtime,
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| (FailureKind::Database, error.to_string()))?;
        let pending = migrations::pending_versions(&pool)
            .await
            .map_err(|error| (FailureKind::Database, error.to_string()))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| (FailureKind::Migration, error.to_string()))?;
        pool.close().await;
        Ok::<usize, (FailureKind, String)>(pending.len())
    });

    match result {
        Ok(0) => CommandResult::success(COMMAND, "schema already up to date"),
        Ok(applied) => {
            CommandResult::success(COMMAND, format!("applied {applied} pending migration(s)"))
        }
        Err((kind, message)) => CommandResult::failure(COMMAND, kind, message),
    }
}
