use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_FILE: &str = "config.json";

fn default_max_recent() -> usize {
    10
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write config file '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// `config.json` in the data directory. Everything is defaulted so a
/// missing or partial file behaves like a fresh install.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_directory: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_logs_directory: Option<PathBuf>,
    pub recent_log_files: Vec<String>,
    pub max_recent_files: usize,
    /// Opaque to the engine; owned by the shell.
    pub ui_preferences: Map<String, Value>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rules_directory: None,
            default_logs_directory: None,
            recent_log_files: Vec::new(),
            max_recent_files: default_max_recent(),
            ui_preferences: Map::new(),
        }
    }
}

/// The process-wide data directory plus its loaded config. Read once at
/// startup; setters rewrite `config.json` atomically and subsequent
/// operations see the updated paths.
#[derive(Debug)]
pub struct Workspace {
    data_dir: PathBuf,
    config: AppConfig,
}

impl Workspace {
    pub fn open(data_dir: &Path) -> Result<Self, ConfigError> {
        fs::create_dir_all(data_dir).map_err(|source| ConfigError::Write {
            path: data_dir.display().to_string(),
            source,
        })?;
        let config = load_config(&data_dir.join(CONFIG_FILE))?;
        Ok(Workspace {
            data_dir: data_dir.to_path_buf(),
            config,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn rules_dir(&self) -> PathBuf {
        self.config
            .rules_directory
            .clone()
            .unwrap_or_else(|| self.data_dir.join("rules"))
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.config
            .default_logs_directory
            .clone()
            .unwrap_or_else(|| self.data_dir.join("logs"))
    }

    pub fn set_rules_directory(&mut self, dir: Option<PathBuf>) -> Result<(), ConfigError> {
        self.config.rules_directory = dir;
        self.save()
    }

    pub fn set_logs_directory(&mut self, dir: Option<PathBuf>) -> Result<(), ConfigError> {
        self.config.default_logs_directory = dir;
        self.save()
    }

    /// Move (or insert) a path at the front of the recent list, bounded
    /// by `max_recent_files`.
    pub fn note_recent_file(&mut self, path: &str) -> Result<(), ConfigError> {
        self.config.recent_log_files.retain(|p| p != path);
        self.config.recent_log_files.insert(0, path.to_string());
        let max = self.config.max_recent_files.max(1);
        self.config.recent_log_files.truncate(max);
        self.save()
    }

    fn save(&self) -> Result<(), ConfigError> {
        let path = self.data_dir.join(CONFIG_FILE);
        let temp = self.data_dir.join(".config.json.tmp");
        let text =
            serde_json::to_string_pretty(&self.config).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        fs::write(&temp, text).map_err(|source| ConfigError::Write {
            path: temp.display().to_string(),
            source,
        })?;
        fs::rename(&temp, &path).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }
}

fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(AppConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            });
        }
    };
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}
