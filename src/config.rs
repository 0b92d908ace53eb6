//! Adapter configuration.
//!
//! The scorer invocation is assembled from up to four layers, highest
//! precedence first:
//!
//! 1. command-line flags,
//! 2. environment variables (`METEOR_JAVA`, `METEOR_JAR`, `METEOR_MEMORY`,
//!    `METEOR_LANGUAGE`, `METEOR_TASK`),
//! 3. a JSON config file (`--config <path>`),
//! 4. built-in defaults.
//!
//! The defaults reproduce the standard streaming invocation:
//!
//! ```text
//! java -Xmx2G -jar meteor-1.5.jar - - -stdio -lower -l en -t tune
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::bridge::MalformedPolicy;
use crate::scorer::ScorerCommand;

/// Default Java launcher.
pub const DEFAULT_JAVA: &str = "java";

/// Default JVM heap ceiling (`-Xmx`).
pub const DEFAULT_MEMORY: &str = "2G";

/// Default target language code.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Default METEOR task mode.
pub const DEFAULT_TASK: &str = "tune";

/// Directory the METEOR distribution unpacks into.
pub const METEOR_DIR: &str = "meteor-1.5";

/// METEOR jar file name.
pub const METEOR_JAR: &str = "meteor-1.5.jar";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`ConfigLayer`].
    #[error("Invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The METEOR jar does not exist.
    #[error(
        "METEOR jar not found at {} (set --jar or METEOR_JAR, or unpack {} there)",
        .0.display(),
        METEOR_DIR
    )]
    MissingJar(PathBuf),

    /// The heap ceiling is not of the form `<digits>[kKmMgG]`.
    #[error("Invalid memory ceiling `{0}` (expected e.g. 512m or 2G)")]
    InvalidMemory(String),

    /// A required setting is empty.
    #[error("Setting `{0}` must not be empty")]
    Empty(&'static str),
}

/// One layer of optional settings.
///
/// The same shape is used for the config file, the environment, and the
/// command line; [`resolve`] merges layers field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub java: Option<String>,
    pub jar: Option<PathBuf>,
    pub memory: Option<String>,
    pub lowercase: Option<bool>,
    pub language: Option<String>,
    pub task: Option<String>,
    pub on_malformed: Option<MalformedPolicy>,
}

impl ConfigLayer {
    /// Load a layer from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read the `METEOR_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a layer from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            java: get("METEOR_JAVA"),
            jar: get("METEOR_JAR").map(PathBuf::from),
            memory: get("METEOR_MEMORY"),
            lowercase: None,
            language: get("METEOR_LANGUAGE"),
            task: get("METEOR_TASK"),
            on_malformed: None,
        }
    }

    /// Fill every unset field of `self` from `lower`.
    pub fn or(self, lower: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            java: self.java.or(lower.java),
            jar: self.jar.or(lower.jar),
            memory: self.memory.or(lower.memory),
            lowercase: self.lowercase.or(lower.lowercase),
            language: self.language.or(lower.language),
            task: self.task.or(lower.task),
            on_malformed: self.on_malformed.or(lower.on_malformed),
        }
    }
}

/// Settings for launching METEOR in streaming mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeteorConfig {
    pub java: String,
    pub jar: PathBuf,
    pub memory: String,
    pub lowercase: bool,
    pub language: String,
    pub task: String,
}

impl Default for MeteorConfig {
    fn default() -> Self {
        Self {
            java: DEFAULT_JAVA.to_string(),
            jar: default_jar_path(),
            memory: DEFAULT_MEMORY.to_string(),
            lowercase: true,
            language: DEFAULT_LANGUAGE.to_string(),
            task: DEFAULT_TASK.to_string(),
        }
    }
}

impl MeteorConfig {
    /// Check the settings before anything is launched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.java.trim().is_empty() {
            return Err(ConfigError::Empty("java"));
        }
        if self.language.trim().is_empty() {
            return Err(ConfigError::Empty("language"));
        }
        if self.task.trim().is_empty() {
            return Err(ConfigError::Empty("task"));
        }
        if !is_valid_memory(&self.memory) {
            return Err(ConfigError::InvalidMemory(self.memory.clone()));
        }
        if !self.jar.is_file() {
            return Err(ConfigError::MissingJar(self.jar.clone()));
        }
        Ok(())
    }

    /// Streaming-mode command line for these settings.
    pub fn command(&self) -> ScorerCommand {
        let mut args = vec![
            format!("-Xmx{}", self.memory),
            "-jar".to_string(),
            self.jar.display().to_string(),
            "-".to_string(),
            "-".to_string(),
            "-stdio".to_string(),
        ];
        if self.lowercase {
            args.push("-lower".to_string());
        }
        args.extend([
            "-l".to_string(),
            self.language.clone(),
            "-t".to_string(),
            self.task.clone(),
        ]);

        ScorerCommand::new(self.java.clone(), args)
    }
}

/// Where the scorer command comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScorerSource {
    /// METEOR via the Java launcher.
    Meteor(MeteorConfig),
    /// An explicit command that speaks the same two-phase protocol.
    Custom(ScorerCommand),
}

/// Fully resolved adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub scorer: ScorerSource,
    pub on_malformed: MalformedPolicy,
}

impl AdapterConfig {
    /// Validate and produce the command to launch.
    pub fn scorer_command(&self) -> Result<ScorerCommand, ConfigError> {
        match &self.scorer {
            ScorerSource::Meteor(meteor) => {
                meteor.validate()?;
                Ok(meteor.command())
            }
            ScorerSource::Custom(command) => {
                if command.program.trim().is_empty() {
                    return Err(ConfigError::Empty("scorer command"));
                }
                Ok(command.clone())
            }
        }
    }
}

/// Merge configuration layers into an [`AdapterConfig`].
///
/// `custom` replaces the METEOR invocation entirely when present; the
/// METEOR-specific settings are then ignored.
pub fn resolve(
    cli: ConfigLayer,
    env: ConfigLayer,
    file: Option<ConfigLayer>,
    custom: Option<ScorerCommand>,
) -> AdapterConfig {
    let merged = cli.or(env).or(file.unwrap_or_default());
    let on_malformed = merged.on_malformed.unwrap_or_default();

    if let Some(command) = custom {
        info!("Using custom scorer command: {}", command);
        return AdapterConfig {
            scorer: ScorerSource::Custom(command),
            on_malformed,
        };
    }

    let defaults = MeteorConfig::default();
    let meteor = MeteorConfig {
        java: merged.java.unwrap_or(defaults.java),
        jar: merged.jar.unwrap_or(defaults.jar),
        memory: merged.memory.unwrap_or(defaults.memory),
        lowercase: merged.lowercase.unwrap_or(defaults.lowercase),
        language: merged.language.unwrap_or(defaults.language),
        task: merged.task.unwrap_or(defaults.task),
    };
    debug!("Resolved METEOR config: {:?}", meteor);

    AdapterConfig {
        scorer: ScorerSource::Meteor(meteor),
        on_malformed,
    }
}

/// Resolve the METEOR jar location when none is configured.
///
/// Resolution order:
/// 1. `./meteor-1.5/meteor-1.5.jar`
/// 2. `<data dir>/meteor-adapter/meteor-1.5/meteor-1.5.jar`
///    (`~/.local/share` on Linux, `~/Library/Application Support` on macOS)
/// 3. `meteor-1.5.jar` relative to the working directory (fallback)
pub fn default_jar_path() -> PathBuf {
    let local = Path::new(METEOR_DIR).join(METEOR_JAR);
    if local.is_file() {
        return local;
    }

    if let Some(data_dir) = dirs::data_dir() {
        let installed = data_dir
            .join("meteor-adapter")
            .join(METEOR_DIR)
            .join(METEOR_JAR);
        if installed.is_file() {
            return installed;
        }
    }

    PathBuf::from(METEOR_JAR)
}

/// `<digits>` optionally followed by one of `kKmMgG`.
fn is_valid_memory(memory: &str) -> bool {
    let digits = memory
        .strip_suffix(|c: char| matches!(c, 'k' | 'K' | 'm' | 'M' | 'g' | 'G'))
        .unwrap_or(memory);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}
