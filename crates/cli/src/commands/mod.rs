pub mod config;
pub mod doctor;
pub mod migrate;

use serde_json::{json, Value};

/// Why a `migrate` or `config` run failed. Scripts branch on the exit code;
/// the class string is repeated in the JSON line for log scrapers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Config,
    Runtime,
    Database,
    Migration,
}

impl FailureKind {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Config => 2,
            Self::Runtime => 3,
            Self::Database => 4,
            Self::Migration => 5,
        }
    }

    pub fn error_class(self) -> &'static str {
        match self {
            Self::Config => "config_validation",
            Self::Runtime => "runtime_init",
            Self::Database => "db_connectivity",
            Self::Migration => "migration",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self { exit_code: 0, output: outcome_line(command, "ok", Value::Null, message.into()) }
    }

    pub fn failure(command: &str, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            exit_code: kind.exit_code(),
            output: outcome_line(command, "error", kind.error_class().into(), message.into()),
        }
    }
}

/// One JSON object per run, written to stdout.
fn outcome_line(command: &str, status: &str, error_class: Value, message: String) -> String {
    json!({
        "command": command,
        "status": status,
        "error_class": error_class,
        "message": message,
    })
    .to_string()
}
