//! Configuration loading and config file resolution
//!
//! Two layers:
//! 1. **TOML bootstrap** ([`TomlConfig`]): history database path, logging, and
//!    the institute section.
//! 2. **Institute parameters** ([`InstituteConfig`]): one immutable value with
//!    named fields, passed by reference to every component that needs it.
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `BIBCUR_CONFIG` environment variable
//! 3. `<config_dir>/bibcur/config.toml`
//! 4. Built-in defaults (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "BIBCUR_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    /// SQLite file holding the resolution history (optional)
    ///
    /// Falls back to the OS data directory when absent.
    #[serde(default)]
    pub history_db: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Institute parameters
    #[serde(default)]
    pub institute: InstituteConfig,
}

impl TomlConfig {
    /// History database path, explicit or OS default
    pub fn history_db_path(&self) -> PathBuf {
        self.history_db
            .clone()
            .unwrap_or_else(default_history_db_path)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Institute-specific parameters
///
/// Every field has a built-in default so a partial `[institute]` section is
/// enough.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InstituteConfig {
    /// Display name of the institute
    pub name: String,

    /// Labels treated as the top directorate (compared case-insensitively)
    pub directorate_labels: Vec<String>,

    /// Name of the collapsed directorate department
    pub directorate_unit: String,

    /// Sentinel tag, always the last legal choice
    pub invalid_tag: String,

    /// DOI placeholder used upstream when a publication has no DOI
    pub unknown_doi: String,

    /// Cell values meaning "no value" in organizational tables
    pub missing_markers: Vec<String>,

    /// Separator between choices in an undecided cell
    pub choice_separator: String,

    /// Value of the homonym column that raises the homonym flag
    pub homonym_marker: String,

    /// Department aliases, merges, and synthetic departments
    pub department_rules: Vec<DepartmentRule>,

    /// Column names of the organizational classification table
    pub org_columns: OrgTableColumns,

    /// Column names of the per-unit record table
    pub record_columns: RecordTableColumns,

    /// Column names of the publication id to hash lookup table
    pub hash_columns: HashTableColumns,
}

impl Default for InstituteConfig {
    fn default() -> Self {
        Self {
            name: "Institute".to_string(),
            directorate_labels: vec!["DIR".to_string()],
            directorate_unit: "(DIRECTORATE)".to_string(),
            invalid_tag: "invalid".to_string(),
            unknown_doi: "unknown".to_string(),
            missing_markers: vec!["-".to_string(), "nan".to_string()],
            choice_separator: "; ".to_string(),
            homonym_marker: "HOMONYM".to_string(),
            department_rules: Vec::new(),
            org_columns: OrgTableColumns::default(),
            record_columns: RecordTableColumns::default(),
            hash_columns: HashTableColumns::default(),
        }
    }
}

impl InstituteConfig {
    /// True when `label` names the directorate
    pub fn is_directorate_label(&self, label: &str) -> bool {
        let label = label.trim();
        label == self.directorate_unit
            || self
                .directorate_labels
                .iter()
                .any(|d| d.eq_ignore_ascii_case(label))
    }

    /// True when `cell` holds no usable value
    pub fn is_missing(&self, cell: &str) -> bool {
        let cell = cell.trim();
        cell.is_empty()
            || self
                .missing_markers
                .iter()
                .any(|m| m.eq_ignore_ascii_case(cell))
    }

    /// True when `doi` is the unknown-DOI sentinel (or empty)
    pub fn is_unknown_doi(&self, doi: &str) -> bool {
        let doi = doi.trim();
        doi.is_empty() || doi.eq_ignore_ascii_case(&self.unknown_doi)
    }

    /// Reject parameter sets that would make artifacts ambiguous
    pub fn validate(&self) -> Result<()> {
        if self.invalid_tag.trim().is_empty() {
            return Err(Error::Config("invalid_tag must not be empty".to_string()));
        }
        if self.choice_separator.trim().is_empty() {
            return Err(Error::Config(
                "choice_separator must contain a visible character".to_string(),
            ));
        }
        if self.invalid_tag.contains(self.choice_separator.trim()) {
            return Err(Error::Config(format!(
                "invalid_tag '{}' contains the choice separator '{}'",
                self.invalid_tag, self.choice_separator
            )));
        }
        if self.directorate_unit.trim().is_empty() {
            return Err(Error::Config("directorate_unit must not be empty".to_string()));
        }
        for rule in &self.department_rules {
            rule.validate()?;
        }
        Ok(())
    }
}

/// Pseudo-laboratory name standing for a whole unit
pub fn full_unit(unit: &str) -> String {
    format!("(full-{})", unit)
}

/// Post-processing rule applied to the built tag hierarchy
///
/// These pairs come from institute knowledge and cannot be derived from the
/// classification table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DepartmentRule {
    /// `department` uses the vocabulary of `target`
    Alias { department: String, target: String },
    /// `source` laboratories are folded into `into`; `source` then aliases `into`
    Merge { source: String, into: String },
    /// Fabricate `name` from the union of two source departments
    Synthetic { name: String, sources: Vec<String> },
}

impl DepartmentRule {
    fn validate(&self) -> Result<()> {
        let names: Vec<&str> = match self {
            DepartmentRule::Alias { department, target } => vec![department.as_str(), target.as_str()],
            DepartmentRule::Merge { source, into } => vec![source.as_str(), into.as_str()],
            DepartmentRule::Synthetic { name, sources } => {
                if sources.len() != 2 {
                    return Err(Error::Config(format!(
                        "synthetic department '{}' needs exactly two sources, got {}",
                        name,
                        sources.len()
                    )));
                }
                let mut names = vec![name.as_str()];
                names.extend(sources.iter().map(String::as_str));
                names
            }
        };
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err(Error::Config(format!(
                "department rule has an empty name: {:?}",
                self
            )));
        }
        Ok(())
    }
}

/// Organizational classification table columns
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OrgTableColumns {
    pub department: String,
    pub tag: String,
    pub service: String,
    pub laboratory: String,
}

impl Default for OrgTableColumns {
    fn default() -> Self {
        Self {
            department: "Department".to_string(),
            tag: "OTP".to_string(),
            service: "Service".to_string(),
            laboratory: "Laboratory".to_string(),
        }
    }
}

/// Per-unit record table columns
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RecordTableColumns {
    pub pub_id: String,
    pub author_idx: String,
    pub first_author: String,
    pub doi: String,
    pub matricule: String,
    pub department: String,
    pub laboratory: String,
    pub homonym: String,
    pub otp: String,
    /// Matricule kept for a homonym slot (homonym artifacts only)
    pub kept: String,
}

impl Default for RecordTableColumns {
    fn default() -> Self {
        Self {
            pub_id: "Pub_id".to_string(),
            author_idx: "Idx_author".to_string(),
            first_author: "First_author".to_string(),
            doi: "DOI".to_string(),
            matricule: "Matricule".to_string(),
            department: "Dpt".to_string(),
            laboratory: "Lab".to_string(),
            homonym: "Homonym".to_string(),
            otp: "OTP".to_string(),
            kept: "Kept_matricule".to_string(),
        }
    }
}

/// Publication id to stable hash lookup columns
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HashTableColumns {
    pub pub_id: String,
    pub hash: String,
}

impl Default for HashTableColumns {
    fn default() -> Self {
        Self {
            pub_id: "Pub_id".to_string(),
            hash: "Hash_id".to_string(),
        }
    }
}

/// Resolve the config file to read, if any
///
/// Returns `None` when no source names an existing file; callers then use
/// built-in defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config directory
    let user_config = dirs::config_dir().map(|d| d.join("bibcur").join("config.toml"));
    match user_config {
        Some(path) if path.exists() => Some(path),
        _ => None,
    }
}

/// Load configuration following the resolution priority
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let config = match resolve_config_path(cli_arg) {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            read_toml_config(&path)?
        }
        None => {
            debug!("No config file found, using built-in defaults");
            TomlConfig::default()
        }
    };
    config.institute.validate()?;
    Ok(config)
}

/// Read and parse one TOML config file
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Write config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, target: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp_path = target.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, target)?;
    Ok(())
}

/// OS-dependent default location of the history database
fn default_history_db_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("bibcur").join("history.db"))
        .unwrap_or_else(|| PathBuf::from("./bibcur_data/history.db"))
}
