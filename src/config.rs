use std::path::PathBuf;

use thiserror::Error;
use time::macros::format_description;
use time::UtcOffset;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_PATH: &str = "todo-studio.db";
const MAX_OFFSET_SECS: i32 = 14 * 3600;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set together with {1}")]
    Incomplete(&'static str, &'static str),
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Hosted auth and REST endpoints.
    Supabase { url: String, anon_key: String },
    /// SQLite file on this machine.
    Local { db_path: PathBuf, auto_confirm: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub backend: Backend,
    /// Offset used to decide which calendar day a todo belongs to.
    pub utc_offset: UtcOffset,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let port = match var("TODO_STUDIO_PORT") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "TODO_STUDIO_PORT",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let backend = match (var("SUPABASE_URL"), var("SUPABASE_ANON_KEY")) {
            (Some(url), Some(anon_key)) => Backend::Supabase {
                url: url.trim().trim_end_matches('/').to_string(),
                anon_key: anon_key.trim().to_string(),
            },
            (Some(_), None) => {
                return Err(ConfigError::Incomplete("SUPABASE_URL", "SUPABASE_ANON_KEY"))
            }
            (None, Some(_)) => {
                return Err(ConfigError::Incomplete("SUPABASE_ANON_KEY", "SUPABASE_URL"))
            }
            (None, None) => Backend::Local {
                db_path: var("TODO_STUDIO_DB")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
                auto_confirm: match var("TODO_STUDIO_AUTO_CONFIRM") {
                    Some(value) => parse_flag(&value).ok_or(ConfigError::Invalid {
                        name: "TODO_STUDIO_AUTO_CONFIRM",
                        value,
                    })?,
                    None => false,
                },
            },
        };

        let utc_offset = match var("TODO_STUDIO_UTC_OFFSET") {
            Some(value) => parse_offset(&value).ok_or(ConfigError::Invalid {
                name: "TODO_STUDIO_UTC_OFFSET",
                value,
            })?,
            None => UtcOffset::UTC,
        };

        Ok(Self {
            port,
            backend,
            utc_offset,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Accepts `Z`, `+HH:MM` and `-HH:MM` within the real-world range of ±14:00.
fn parse_offset(value: &str) -> Option<UtcOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") {
        return Some(UtcOffset::UTC);
    }
    let offset = UtcOffset::parse(
        value,
        format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
    )
    .ok()?;
    (offset.whole_seconds().abs() <= MAX_OFFSET_SECS).then_some(offset)
}
