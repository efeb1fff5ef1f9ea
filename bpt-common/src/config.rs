//! Configuration loading and working directory resolution
//!
//! Every option resolves in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`BPT_*`)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Steps 1 and 2 are handled by the binary's argument parser; this module
//! owns steps 3 and 4.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the working directory
pub const WORKING_DIR_ENV: &str = "BPT_WORKING_DIR";

/// Default root marker emitted by the parsing engine for the synthetic root token
pub const DEFAULT_ROOT_MARKER: &str = "-ROOT-";

/// Default label carried by transitions the curriculum has resolved
pub const DEFAULT_RESOLVED_LABEL: &str = "PARSED";

/// Complete TOML configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub logging: LoggingConfig,
    pub curriculum: CurriculumConfig,
    pub cycle: CycleConfig,
    pub external: ExternalConfig,
}

/// Logging section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Direction chosen when attach-left and attach-right readings are equally frequent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreak {
    #[default]
    Left,
    Right,
}

/// Which entries are handed to the trainer after relabelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamplesScope {
    /// The whole trace, relabelled entries included
    #[default]
    Full,
    /// Only the entries matched by the curriculum target
    Matched,
}

/// Curriculum scheduler section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurriculumConfig {
    /// Times a bigram may be targeted before it is retired
    pub pass_limit: u32,
    /// Scheduler rounds run per training iteration
    pub max_passes: u32,
    /// Rare-pattern threshold is total frequency divided by this value
    pub threshold_divisor: u64,
    pub tie_break: TieBreak,
    /// Whether root-anchored bigrams count towards the shift mass
    pub root_in_shift_mass: bool,
    pub root_marker: String,
    pub resolved_label: String,
    pub examples_scope: ExamplesScope,
}

impl Default for CurriculumConfig {
    fn default() -> Self {
        Self {
            pass_limit: 1,
            max_passes: 1,
            threshold_divisor: 100_000,
            tie_break: TieBreak::Left,
            root_in_shift_mass: true,
            root_marker: DEFAULT_ROOT_MARKER.to_string(),
            resolved_label: DEFAULT_RESOLVED_LABEL.to_string(),
            examples_scope: ExamplesScope::Full,
        }
    }
}

impl CurriculumConfig {
    /// Reject values that would make the scheduler meaningless
    pub fn validate(&self) -> Result<()> {
        if self.pass_limit == 0 {
            return Err(Error::Config("curriculum.pass_limit must be at least 1".to_string()));
        }
        if self.max_passes == 0 {
            return Err(Error::Config("curriculum.max_passes must be at least 1".to_string()));
        }
        if self.threshold_divisor == 0 {
            return Err(Error::Config(
                "curriculum.threshold_divisor must be non-zero".to_string(),
            ));
        }
        if self.root_marker.trim().is_empty() || self.resolved_label.trim().is_empty() {
            return Err(Error::Config(
                "curriculum.root_marker and curriculum.resolved_label must be non-empty"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Training cycle section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    pub working_dir: Option<PathBuf>,
    /// Raw corpus, relative paths resolve against the working directory
    pub corpus: PathBuf,
    /// POS-tagged rendition of the corpus, merged into the bigram table
    pub tagged_corpus: Option<PathBuf>,
    /// Held-out treebank used by the diagnostic test step
    pub test_set: Option<PathBuf>,
    /// Treebank used to train the base model when none exists
    pub seed_treebank: Option<PathBuf>,
    /// Unbounded when absent
    pub max_iterations: Option<u32>,
    pub shutdown_grace_secs: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            working_dir: None,
            corpus: PathBuf::from("corpus.txt"),
            tagged_corpus: None,
            test_set: None,
            seed_treebank: None,
            max_iterations: None,
            shutdown_grace_secs: 5,
        }
    }
}

/// Command lines for the external tagging, parsing and training tools
///
/// Each command is an argv vector. Placeholders `{model}`, `{corpus}`,
/// `{trace}`, `{output}`, `{examples}`, `{test_set}` and `{treebank}` are
/// substituted before the command is spawned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    /// Long-running tagging/parsing service, restarted between iterations
    pub service: Vec<String>,
    pub parse: Vec<String>,
    pub seed_train: Vec<String>,
    pub train: Vec<String>,
    pub test: Vec<String>,
}

/// Default configuration file path (`~/.config/bpt/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bpt").join("config.toml"))
}

/// Load a TOML config file
///
/// A missing file is not fatal: a warning is logged and defaults are used.
/// A file that exists but does not parse is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!("Config file {} not found, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, "read", e))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    config.curriculum.validate()?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write a TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, "create_dir", e))?;
        }
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content).map_err(|e| Error::io(&temp_path, "write", e))?;
    std::fs::rename(&temp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        Error::io(path, "rename", e)
    })?;

    Ok(())
}

/// Resolve the working directory
///
/// `cli_arg` already carries the command-line / environment override when
/// the binary's argument parser found one.
pub fn resolve_working_dir(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(WORKING_DIR_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.cycle.working_dir {
        return path.clone();
    }

    default_working_dir()
}

/// OS-dependent default working directory
fn default_working_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("bpt"))
        .unwrap_or_else(|| PathBuf::from("./bpt_data"))
}

/// Resolve `path` against `base` unless it is already absolute
pub fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CurriculumConfig::default();
        assert_eq!(config.pass_limit, 1);
        assert_eq!(config.max_passes, 1);
        assert_eq!(config.threshold_divisor, 100_000);
        assert_eq!(config.tie_break, TieBreak::Left);
        assert!(config.root_in_shift_mass);
        assert_eq!(config.root_marker, "-ROOT-");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_pass_limit_rejected() {
        let config = CurriculumConfig {
            pass_limit: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [curriculum]
            pass_limit = 3
            tie_break = "right"

            [cycle]
            max_iterations = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.curriculum.pass_limit, 3);
        assert_eq!(config.curriculum.tie_break, TieBreak::Right);
        assert_eq!(config.curriculum.max_passes, 1);
        assert_eq!(config.cycle.max_iterations, Some(4));
        assert_eq!(config.cycle.shutdown_grace_secs, 5);
        assert!(config.external.parse.is_empty());
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let base = Path::new("/work");
        assert_eq!(
            resolve_against(base, Path::new("corpus.txt")),
            PathBuf::from("/work/corpus.txt")
        );
        assert_eq!(
            resolve_against(base, Path::new("/data/corpus.txt")),
            PathBuf::from("/data/corpus.txt")
        );
    }
}
