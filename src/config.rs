use crate::error::{Result, SubmythError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// What to do with an SRT block whose index or timing line cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Abort the whole parse, naming the offending block.
    #[default]
    Fail,
    /// Drop the block and keep parsing.
    Skip,
}

impl std::fmt::Display for MalformedPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedPolicy::Fail => write!(f, "fail"),
            MalformedPolicy::Skip => write!(f, "skip"),
        }
    }
}

impl std::str::FromStr for MalformedPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(MalformedPolicy::Fail),
            "skip" => Ok(MalformedPolicy::Skip),
            _ => Err(format!(
                "Unknown malformed block policy: {}. Use 'fail' or 'skip'",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub malformed_blocks: MalformedPolicy,
    pub parse_workers: usize,
    pub default_project_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            malformed_blocks: MalformedPolicy::default(),
            parse_workers: 2,
            default_project_dir: None,
        }
    }
}

impl Config {
    /// Config file merged with `SUBMYTH_*` environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::file_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };

        // Override with environment variables
        if let Ok(policy) = std::env::var("SUBMYTH_MALFORMED_BLOCKS") {
            if let Ok(p) = policy.parse() {
                config.malformed_blocks = p;
            }
        }
        if let Ok(workers) = std::env::var("SUBMYTH_PARSE_WORKERS") {
            if let Ok(w) = workers.parse() {
                config.parse_workers = w;
            }
        }

        Ok(config)
    }

    /// Read a config file. A missing file gives the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        match toml::from_str::<Config>(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!("Ignoring unreadable config file {}: {}", path.display(), e);
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.parse_workers == 0 {
            return Err(SubmythError::Config(
                "parse_workers must be greater than 0".to_string(),
            ));
        }

        if let Some(dir) = &self.default_project_dir {
            if !dir.is_dir() {
                return Err(SubmythError::Config(format!(
                    "default_project_dir is not a directory: {}",
                    dir.display()
                )));
            }
        }

        Ok(())
    }

    /// Change one setting by its config file key. An empty
    /// `default_project_dir` clears it.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "malformed_blocks" => {
                self.malformed_blocks = value.parse().map_err(SubmythError::Config)?;
            }
            "parse_workers" => {
                self.parse_workers = value.parse().map_err(|_| {
                    SubmythError::Config(format!("parse_workers must be a number, got '{}'", value))
                })?;
            }
            "default_project_dir" => {
                self.default_project_dir = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            _ => {
                return Err(SubmythError::Config(format!(
                    "Unknown setting: {}. Use 'malformed_blocks', 'parse_workers' or 'default_project_dir'",
                    key
                )))
            }
        }
        Ok(())
    }

    /// Write the configuration back to the user config directory.
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::file_path()
            .ok_or_else(|| SubmythError::Config("No config directory available".to_string()))?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("submyth").join("config.toml"))
    }
}
