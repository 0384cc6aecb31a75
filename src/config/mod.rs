//! Configuration management for `report_tree`.
//!
//! Configuration sources and precedence (highest wins):
//! 1. CLI overrides
//! 2. Environment variables (`RTREE_*`)
//! 3. Report config (`<report-dir>/report-tree.yaml`)
//! 4. Defaults
//!
//! Keys are kebab-case (`sort-on-insert`); `_` and `-` are interchangeable
//! in YAML and environment names.

use crate::error::{ReportError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file looked up inside the report directory.
pub const CONFIG_FILENAME: &str = "report-tree.yaml";

/// Prefix of environment variables read into config.
pub const ENV_PREFIX: &str = "RTREE_";

const DEFAULT_REPORT_DIR: &str = "html-report";
const DEFAULT_DB_FILE: &str = "sqlite.db";
const DEFAULT_IMAGE_DIR: &str = "images";

const KEY_REPORT_DIR: &str = "report-dir";
const KEY_DB_FILE: &str = "db-file";
const KEY_REUSE: &str = "reuse";
const KEY_SORT_ON_INSERT: &str = "sort-on-insert";
const KEY_IMAGE_DIR: &str = "image-dir";

/// Flat key/value configuration from one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub values: HashMap<String, String>,
}

impl ConfigLayer {
    /// Set a value under its normalized key.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(normalize_key(key), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&normalize_key(key)).map(String::as_str)
    }

    /// Merge another layer on top of this one (higher precedence wins).
    pub fn merge_from(&mut self, other: &Self) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Merge multiple layers in precedence order (lowest to highest).
    #[must_use]
    pub fn merge_layers(layers: &[Self]) -> Self {
        let mut merged = Self::default();
        for layer in layers {
            merged.merge_from(layer);
        }
        merged
    }

    /// Build a layer from a YAML file path. Missing files return empty config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let value: serde_yaml::Value = serde_yaml::from_str(&contents)?;
        Ok(layer_from_yaml_value(&value))
    }

    /// Build a layer from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_vars(env::vars())
    }

    /// Build a layer from `RTREE_*` pairs.
    #[must_use]
    pub fn from_env_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut layer = Self::default();
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layer.insert(stripped, value);
            }
        }
        layer
    }
}

/// Built-in defaults.
#[must_use]
pub fn default_config_layer() -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    layer.insert(KEY_REPORT_DIR, DEFAULT_REPORT_DIR);
    layer.insert(KEY_DB_FILE, DEFAULT_DB_FILE);
    layer.insert(KEY_REUSE, "true");
    layer.insert(KEY_SORT_ON_INSERT, "false");
    layer.insert(KEY_IMAGE_DIR, DEFAULT_IMAGE_DIR);
    layer
}

/// CLI overrides for config loading (optional).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub report_dir: Option<PathBuf>,
    pub db_file: Option<String>,
    pub reuse: Option<bool>,
    pub sort_on_insert: Option<bool>,
    pub image_dir: Option<String>,
}

impl CliOverrides {
    #[must_use]
    pub fn as_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::default();

        if let Some(path) = &self.report_dir {
            layer.insert(KEY_REPORT_DIR, path.to_string_lossy());
        }
        if let Some(db_file) = &self.db_file {
            layer.insert(KEY_DB_FILE, db_file.clone());
        }
        if let Some(reuse) = self.reuse {
            layer.insert(KEY_REUSE, reuse.to_string());
        }
        if let Some(sort) = self.sort_on_insert {
            layer.insert(KEY_SORT_ON_INSERT, sort.to_string());
        }
        if let Some(image_dir) = &self.image_dir {
            layer.insert(KEY_IMAGE_DIR, image_dir.clone());
        }

        layer
    }
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportConfig {
    pub report_dir: PathBuf,
    pub db_file: String,
    pub reuse: bool,
    pub sort_on_insert: bool,
    pub image_dir: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            report_dir: PathBuf::from(DEFAULT_REPORT_DIR),
            db_file: DEFAULT_DB_FILE.to_string(),
            reuse: true,
            sort_on_insert: false,
            image_dir: DEFAULT_IMAGE_DIR.to_string(),
        }
    }
}

impl ReportConfig {
    /// Resolve a merged layer into typed values.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Config` for a malformed value.
    pub fn from_layer(layer: &ConfigLayer) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            report_dir: non_empty(layer, KEY_REPORT_DIR)?
                .map_or(defaults.report_dir, PathBuf::from),
            db_file: non_empty(layer, KEY_DB_FILE)?
                .map_or(defaults.db_file, ToString::to_string),
            reuse: bool_value(layer, KEY_REUSE)?.unwrap_or(defaults.reuse),
            sort_on_insert: bool_value(layer, KEY_SORT_ON_INSERT)?
                .unwrap_or(defaults.sort_on_insert),
            image_dir: layer
                .get(KEY_IMAGE_DIR)
                .map_or(defaults.image_dir, |value| value.trim().to_string()),
        })
    }

    /// Path of the report database.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.report_dir.join(&self.db_file)
    }
}

/// Load configuration for a report.
///
/// The report directory is resolved first (CLI, environment, default) so the
/// YAML file inside it can take part in the merge.
///
/// # Errors
///
/// Returns an error if the config file cannot be parsed or a value is malformed.
pub fn load_config(cli: &CliOverrides) -> Result<ReportConfig> {
    load_config_with_env(cli, ConfigLayer::from_env())
}

/// [`load_config`] with an explicit environment layer.
///
/// # Errors
///
/// Returns an error if the config file cannot be parsed or a value is malformed.
pub fn load_config_with_env(cli: &CliOverrides, env_layer: ConfigLayer) -> Result<ReportConfig> {
    let defaults = default_config_layer();
    let cli_layer = cli.as_layer();

    let startup = ConfigLayer::merge_layers(&[defaults.clone(), env_layer.clone(), cli_layer.clone()]);
    let report_dir = ReportConfig::from_layer(&startup)?.report_dir;
    let yaml = ConfigLayer::from_yaml(&report_dir.join(CONFIG_FILENAME))?;

    let merged = ConfigLayer::merge_layers(&[defaults, yaml, env_layer, cli_layer]);
    let mut config = ReportConfig::from_layer(&merged)?;
    // The directory is fixed before its own config file is read.
    config.report_dir = report_dir;

    tracing::debug!(
        report_dir = %config.report_dir.display(),
        db_file = %config.db_file,
        reuse = config.reuse,
        "Resolved report config"
    );
    Ok(config)
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('_', "-")
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn bool_value(layer: &ConfigLayer, key: &str) -> Result<Option<bool>> {
    layer
        .get(key)
        .map(|value| {
            parse_bool(value)
                .ok_or_else(|| ReportError::Config(format!("{key}: expected a boolean, got '{value}'")))
        })
        .transpose()
}

fn non_empty<'a>(layer: &'a ConfigLayer, key: &str) -> Result<Option<&'a str>> {
    match layer.get(key).map(str::trim) {
        Some("") => Err(ReportError::Config(format!("{key}: must not be empty"))),
        other => Ok(other),
    }
}

fn layer_from_yaml_value(value: &serde_yaml::Value) -> ConfigLayer {
    let mut flat = HashMap::new();
    flatten_yaml(value, "", &mut flat);

    let mut layer = ConfigLayer::default();
    for (key, value) in flat {
        layer.insert(&key, value);
    }
    layer
}

fn flatten_yaml(value: &serde_yaml::Value, prefix: &str, out: &mut HashMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key_str) = key.as_str() else {
                    continue;
                };
                let next_prefix = if prefix.is_empty() {
                    key_str.to_string()
                } else {
                    format!("{prefix}.{key_str}")
                };
                flatten_yaml(value, &next_prefix, out);
            }
        }
        _ => {
            if let Some(value) = yaml_scalar_to_string(value) {
                out.insert(prefix.to_string(), value);
            }
        }
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Bool(v) => Some(v.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Null
        | serde_yaml::Value::Sequence(_)
        | serde_yaml::Value::Mapping(_) => None,
        serde_yaml::Value::Tagged(tagged) => yaml_scalar_to_string(&tagged.value),
    }
}
