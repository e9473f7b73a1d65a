use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use crate::cli::Cli;

/// Where to point users whose config cannot be used.
pub const SETUP_HINT: &str =
    "Please read documentation for initial setup:\nhttps://github.com/walling/logentries-query-cli#initial-setup";

/// Default base URL of the log service pull API.
pub const DEFAULT_API_URL: &str = "https://pull.logentries.com";

// ---------------------------------------------------------------------------
// Alias specifier
// ---------------------------------------------------------------------------

/// How a configured log is exposed in the alias registry.
///
/// Config files mix booleans, strings and numbers in the same position, so
/// the value is decided once here instead of being carried around loosely
/// typed. Falsy values (`false`, `0`, `""`, `null`) disable the log, `true`
/// uses the log's own name, and any other scalar becomes the alias verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasSpec {
    Disabled,
    UseOwnName,
    Custom(String),
}

impl AliasSpec {
    /// The alias this log is registered under, or `None` when disabled.
    pub fn resolve(&self, log: &str) -> Option<String> {
        match self {
            AliasSpec::Disabled => None,
            AliasSpec::UseOwnName => Some(log.to_string()),
            AliasSpec::Custom(alias) => Some(alias.clone()),
        }
    }
}

impl<'de> Deserialize<'de> for AliasSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AliasSpecVisitor)
    }
}

struct AliasSpecVisitor;

impl<'de> Visitor<'de> for AliasSpecVisitor {
    type Value = AliasSpec;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an alias string, a boolean, a number or null")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<AliasSpec, E> {
        Ok(if v {
            AliasSpec::UseOwnName
        } else {
            AliasSpec::Disabled
        })
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<AliasSpec, E> {
        Ok(if v == 0 {
            AliasSpec::Disabled
        } else {
            AliasSpec::Custom(v.to_string())
        })
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<AliasSpec, E> {
        Ok(if v == 0 {
            AliasSpec::Disabled
        } else {
            AliasSpec::Custom(v.to_string())
        })
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<AliasSpec, E> {
        if v == 0.0 || v.is_nan() {
            return Ok(AliasSpec::Disabled);
        }
        // Whole numbers print without a trailing `.0`, so `1.0` aliases as "1".
        let alias = if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
            format!("{}", v as i64)
        } else {
            v.to_string()
        };
        Ok(AliasSpec::Custom(alias))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<AliasSpec, E> {
        Ok(if v.is_empty() {
            AliasSpec::Disabled
        } else {
            AliasSpec::Custom(v.to_string())
        })
    }

    fn visit_unit<E: de::Error>(self) -> Result<AliasSpec, E> {
        Ok(AliasSpec::Disabled)
    }

    fn visit_none<E: de::Error>(self) -> Result<AliasSpec, E> {
        Ok(AliasSpec::Disabled)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<AliasSpec, D::Error> {
        AliasSpec::deserialize(deserializer)
    }
}

// ---------------------------------------------------------------------------
// Document-ordered map
// ---------------------------------------------------------------------------

/// A string-keyed map that keeps entries in document order.
///
/// Alias collisions are resolved first-come-first-served, so the order in
/// which accounts, logsets and logs appear in the file is significant.
/// A repeated key keeps its first position and takes the later value.
/// `null` deserializes to an empty map.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = OrderedMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(OrderedMapVisitor(PhantomData))
    }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a table of named entries")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = OrderedMap::new();
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            map.insert(key, value);
        }
        Ok(map)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(OrderedMap::new())
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(OrderedMap::new())
    }
}

/// account -> logset -> log -> alias specifier.
pub type Accounts = OrderedMap<OrderedMap<OrderedMap<AliasSpec>>>;

// ---------------------------------------------------------------------------
// File config (intermediate representation)
// ---------------------------------------------------------------------------

/// Raw config as parsed from the config file.
/// Unknown keys are silently ignored by serde.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub api_url: Option<String>,
    pub display: FileDisplayConfig,
    pub accounts: Accounts,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileDisplayConfig {
    pub format: Option<String>,
    pub show_time: Option<bool>,
    pub utc: Option<bool>,
}

// ---------------------------------------------------------------------------
// Effective (merged) config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_url: String,
    pub verbose: bool,
    pub color: bool,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DisplayConfig {
    /// Explicit display template; `None` derives one from `show_time`.
    pub format: Option<String>,
    pub show_time: bool,
    pub utc: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            verbose: false,
            color: true,
            display: DisplayConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Fatal problems with the config file. Every variant ends the run before
/// any query is issued.
#[derive(Debug)]
pub enum ConfigError {
    /// The config file does not exist.
    NotFound(PathBuf),
    /// The config file exists but could not be read.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The config file is not valid TOML/JSON or has the wrong shape.
    Parse { path: PathBuf, message: String },
    /// No enabled log is left once disabled entries are dropped.
    NoLogs(PathBuf),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NotFound(path) => {
                write!(f, "config file not found: {}", path.display())
            }
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config file {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, message } => {
                write!(f, "failed to load config file {}: {}", path.display(), message)
            }
            ConfigError::NoLogs(path) => write!(
                f,
                "no logs defined: {}\nYou must define at least one log to use this tool.",
                path.display()
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Returns the default config file path: `~/.config/le-query/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("le-query").join("config.toml"))
}

/// The config path in effect: `--config` if given, otherwise the default.
pub fn config_path(cli: &Cli) -> Option<PathBuf> {
    cli.config.clone().or_else(default_config_path)
}

/// Parse config file contents. `.json` files are read as JSON, anything
/// else as TOML.
pub fn parse_file_config(path: &Path, contents: &str) -> Result<FileConfig, ConfigError> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let parsed = if is_json {
        serde_json::from_str::<FileConfig>(contents).map_err(|e| e.to_string())
    } else {
        toml::from_str::<FileConfig>(contents).map_err(|e| e.to_string())
    };

    parsed.map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Load and parse the config file at `path`.
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config = parse_file_config(path, &contents)?;
    tracing::debug!(
        path = %path.display(),
        accounts = config.accounts.len(),
        "loaded config file"
    );
    Ok(config)
}

/// Build the effective `AppConfig` by merging defaults, config file, and CLI args.
///
/// Precedence (highest wins):
/// 1. CLI flags (if explicitly provided)
/// 2. Config file values
/// 3. Hardcoded defaults
pub fn build_config(cli: &Cli, file_cfg: &FileConfig) -> AppConfig {
    let mut config = AppConfig::default();

    if let Some(ref url) = file_cfg.api_url {
        config.api_url = url.trim_end_matches('/').to_string();
    }
    if let Some(ref fmt) = file_cfg.display.format {
        config.display.format = Some(fmt.clone());
    }
    if let Some(show_time) = file_cfg.display.show_time {
        config.display.show_time = show_time;
    }
    if let Some(utc) = file_cfg.display.utc {
        config.display.utc = utc;
    }

    // An empty `--format` counts as not given.
    if let Some(ref fmt) = cli.format {
        if !fmt.is_empty() {
            config.display.format = Some(fmt.clone());
        }
    }
    if cli.show_time {
        config.display.show_time = true;
    }
    if cli.utc {
        config.display.utc = true;
    }
    if cli.verbose {
        config.verbose = true;
    }
    if cli.no_color {
        config.color = false;
    }

    config
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
