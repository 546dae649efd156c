//! Config loading (spec §4.C13): discover a TOML path, parse it into a
//! [`ConfigFile`], and validate the configured diff engine before any
//! revision is processed — unlike a cosmetic editor setting, a misconfigured
//! diff pipeline should fail fast rather than quietly fall back to defaults.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_DIFF_ENGINE: &str = "histogram";
const KNOWN_ENGINES: &[&str] = &["histogram"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("unknown diff engine `{found}` (expected one of {known:?})")]
    UnknownDiffEngine { found: String, known: &'static [&'static str] },
}

fn default_engine_name() -> String {
    DEFAULT_DIFF_ENGINE.to_string()
}

/// `diff_engine = { name = "...", <engine-specific options> }`. Unrecognized
/// keys alongside `name` are kept, not rejected, so an engine can carry its
/// own options without this crate knowing their shape.
#[derive(Debug, Deserialize, Clone)]
pub struct DiffEngineConfig {
    #[serde(default = "default_engine_name")]
    pub name: String,
    #[serde(flatten)]
    pub options: HashMap<String, toml::Value>,
}

impl Default for DiffEngineConfig {
    fn default() -> Self {
        Self { name: default_engine_name(), options: HashMap::new() }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub diff_engine: DiffEngineConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub file: ConfigFile,
}

/// `--config` not given: prefer `./mwstream.toml`, falling back to the
/// platform config directory (XDG / AppData Roaming).
pub fn discover() -> PathBuf {
    let local = PathBuf::from("mwstream.toml");
    if local.exists() {
        return local;
    }
    dirs::config_dir().map(|dir| dir.join("mwstream").join("mwstream.toml")).unwrap_or(local)
}

/// Load and validate a config. A missing file is not an error — it yields
/// defaults — but a present, malformed, or semantically invalid one is.
pub fn load_from(path: Option<PathBuf>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(discover);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            info!(target: "config", path = %path.display(), "no config file found, using defaults");
            return Ok(Config::default());
        }
        Err(source) => return Err(ConfigError::Io { path, source }),
    };
    let file: ConfigFile =
        toml::from_str(&content).map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
    validate(&file)?;
    Ok(Config { file })
}

fn validate(file: &ConfigFile) -> Result<(), ConfigError> {
    if !KNOWN_ENGINES.contains(&file.diff_engine.name.as_str()) {
        return Err(ConfigError::UnknownDiffEngine {
            found: file.diff_engine.name.clone(),
            known: KNOWN_ENGINES,
        });
    }
    Ok(())
}
