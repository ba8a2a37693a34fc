use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use stockinfo_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::commands::{CommandResult, FailureKind};

struct Field {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                FailureKind::Config,
                format!("configuration issue: {error}"),
            );
        }
    };

    CommandResult::success("config", render(&config))
}

pub fn render(config: &AppConfig) -> String {
    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(config) {
        let source = field_source(&field, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", field.key_path, field.value));
    }
    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field {
            key_path: "database.url",
            env_keys: &["STOCKINFO_DATABASE_URL"],
            value: config.database.url.clone(),
        },
        Field {
            key_path: "database.max_connections",
            env_keys: &["STOCKINFO_DATABASE_MAX_CONNECTIONS"],
            value: config.database.max_connections.to_string(),
        },
        Field {
            key_path: "database.timeout_secs",
            env_keys: &["STOCKINFO_DATABASE_TIMEOUT_SECS"],
            value: config.database.timeout_secs.to_string(),
        },
        Field {
            key_path: "server.bind_address",
            env_keys: &["STOCKINFO_SERVER_BIND_ADDRESS"],
            value: config.server.bind_address.clone(),
        },
        Field {
            key_path: "server.port",
            env_keys: &["STOCKINFO_SERVER_PORT"],
            value: config.server.port.to_string(),
        },
        Field {
            key_path: "server.graceful_shutdown_secs",
            env_keys: &["STOCKINFO_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            value: config.server.graceful_shutdown_secs.to_string(),
        },
        Field {
            key_path: "price_update.delay_minutes",
            env_keys: &["STOCKINFO_PRICE_UPDATE_DELAY_MINUTES"],
            value: config.price_update.delay_minutes.to_string(),
        },
        Field {
            key_path: "price_update.overlap_policy",
            env_keys: &["STOCKINFO_PRICE_UPDATE_OVERLAP_POLICY"],
            value: config.price_update.overlap_policy.as_str().to_string(),
        },
        Field {
            key_path: "price_update.queue_capacity",
            env_keys: &["STOCKINFO_PRICE_UPDATE_QUEUE_CAPACITY"],
            value: config.price_update.queue_capacity.to_string(),
        },
        Field {
            key_path: "logging.level",
            env_keys: &["STOCKINFO_LOGGING_LEVEL", "STOCKINFO_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Field {
            key_path: "logging.format",
            env_keys: &["STOCKINFO_LOGGING_FORMAT", "STOCKINFO_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format).to_ascii_lowercase(),
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["stockinfo.toml", "config/stockinfo.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    field: &Field,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if config_file_doc.is_some_and(|doc| contains_path(doc, field.key_path)) {
        let file_path = config_file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::contains_path;

    #[test]
    fn contains_path_walks_nested_tables() {
        let doc: Value = "[price_update]\ndelay_minutes = 3\n".parse().expect("toml");

        assert!(contains_path(&doc, "price_update.delay_minutes"));
        assert!(!contains_path(&doc, "price_update.overlap_policy"));
        assert!(!contains_path(&doc, "database.url"));
    }
}
