use crate::cli::Cli;
use crate::error::Sql2CsvError;
use crate::normalize::Strictness;
use crate::pipeline::{PipelineOptions, DEFAULT_BUFFER};
use crate::query;
use directories::ProjectDirs;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Everything one invocation needs, resolved once at startup.
#[derive(Debug)]
pub struct AppConfig {
    pub database_uri: SecretString,
    pub query: String,
    pub buffer: usize,
    pub strictness: Strictness,
    pub validate: bool,
    pub verbose: bool,
    pub show_secrets: bool,
}

impl AppConfig {
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            buffer: self.buffer,
            strictness: self.strictness,
        }
    }
}

// --- TOML config file structs ---

#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    #[serde(default)]
    defaults: TomlDefaults,
    #[serde(default)]
    profiles: HashMap<String, TomlProfile>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlDefaults {
    buffer: Option<usize>,
    verbose: Option<bool>,
    strict: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
struct TomlProfile {
    database_uri: Option<String>,
    database_uri_env: Option<String>,
}

/// A config file path and whether the user asked for it explicitly.
struct ResolvedConfigPath {
    path: PathBuf,
    /// true if user explicitly specified via --config or SQL2CSV_CONFIG
    explicit: bool,
}

/// Resolve the config file path: --config flag > env var > platform default.
fn resolve_config_path(cli_config: Option<&PathBuf>) -> Option<ResolvedConfigPath> {
    if let Some(path) = cli_config {
        return Some(ResolvedConfigPath { path: path.clone(), explicit: true });
    }
    if let Ok(path) = std::env::var("SQL2CSV_CONFIG") {
        return Some(ResolvedConfigPath { path: PathBuf::from(path), explicit: true });
    }
    ProjectDirs::from("", "", "sql2csv")
        .map(|dirs| ResolvedConfigPath {
            path: dirs.config_dir().join("config.toml"),
            explicit: false,
        })
}

/// Load and parse the TOML config file (if it exists).
fn load_toml_config(resolved: Option<&ResolvedConfigPath>) -> Result<TomlConfig, Sql2CsvError> {
    let resolved = match resolved {
        Some(r) => r,
        None => return Ok(TomlConfig::default()),
    };

    if !resolved.path.exists() {
        if resolved.explicit {
            return Err(Sql2CsvError::Config {
                message: format!("config file not found: {}", resolved.path.display()),
            });
        }
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&resolved.path).map_err(|e| Sql2CsvError::Config {
        message: format!("cannot read config file {}: {}", resolved.path.display(), e),
    })?;

    toml::from_str(&content).map_err(|e| Sql2CsvError::Config {
        message: format!("invalid config file {}: {}", resolved.path.display(), e),
    })
}

/// A value that is present and not just whitespace.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Read an environment variable, treating blank values as unset.
pub fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve the connection URI: CLI/DATABASE_URI > profile env indirection > profile value.
fn resolve_database_uri(args: &Cli, profile: &TomlProfile) -> Option<SecretString> {
    if let Some(uri) = non_empty(args.database_uri.as_deref()) {
        return Some(SecretString::from(uri.trim().to_string()));
    }
    if let Some(key) = profile.database_uri_env.as_deref()
        && let Some(uri) = env_non_empty(key)
    {
        return Some(SecretString::from(uri.trim().to_string()));
    }
    non_empty(profile.database_uri.as_deref()).map(|uri| SecretString::from(uri.trim().to_string()))
}

/// Build AppConfig from parsed CLI args, the config file and the query source.
pub fn load_from_args(args: &Cli) -> Result<AppConfig, Sql2CsvError> {
    let resolved_path = resolve_config_path(args.config.as_ref());
    let toml_config = load_toml_config(resolved_path.as_ref())?;

    let profile = args.profile.as_ref().map(|name| {
        toml_config.profiles.get(name).cloned().ok_or_else(|| Sql2CsvError::Config {
            message: format!("profile '{}' not found in config file", name),
        })
    }).transpose()?;

    let profile = profile.unwrap_or_default();

    let database_uri = resolve_database_uri(args, &profile).ok_or_else(|| Sql2CsvError::Config {
        message: "DATABASE_URI must be set; use --database-uri, the env var, or a profile"
            .to_string(),
    })?;

    let query = query::resolve_query(args)?;

    // buffer: CLI/ENV > TOML > 100
    let buffer = args
        .buffer
        .unwrap_or_else(|| toml_config.defaults.buffer.unwrap_or(DEFAULT_BUFFER));
    if buffer == 0 {
        return Err(Sql2CsvError::Config {
            message: "buffer size must be at least 1".to_string(),
        });
    }

    // strict / verbose: CLI/ENV OR TOML default
    let strictness = if args.strict || toml_config.defaults.strict.unwrap_or(false) {
        Strictness::Strict
    } else {
        Strictness::Lenient
    };
    let verbose = args.verbose || toml_config.defaults.verbose.unwrap_or(false);

    Ok(AppConfig {
        database_uri,
        query,
        buffer,
        strictness,
        validate: !args.skip_validation,
        verbose,
        show_secrets: args.show_secrets,
    })
}
