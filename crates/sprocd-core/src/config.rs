use std::path::Path;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};

use crate::error::{CoreError, Result};

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_STEP_DELAY_MS: u64 = 10_000; // pause after every procedure call
pub const DEFAULT_MAX_CONNECTIONS: usize = 4; // per database target, 0 = unbounded
pub const DEFAULT_LOG_PATH: &str = "server-logs.txt";
pub const DEFAULT_DATABASES_PATH: &str = "dbconfig.json";
pub const DEFAULT_PROCEDURES_PATH: &str = "storedProcedures.json";
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024; // inbound WS frame cap

/// Top-level daemon config (sprocd.toml + SPROCD_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SprocdConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// How a database orchestrator dispatches the first pass of its groups.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchMode {
    /// Every group lineage starts immediately.
    #[default]
    Concurrent,
    /// Each group's first pass is awaited before the next group starts.
    Sequential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pause after each procedure invocation, unless the group overrides it.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections_per_database: usize,
    #[serde(default)]
    pub dispatch: DispatchMode,
    /// Call `start()` as soon as the daemon is up.
    #[serde(default = "bool_true")]
    pub autostart: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: DEFAULT_STEP_DELAY_MS,
            max_connections_per_database: DEFAULT_MAX_CONNECTIONS,
            dispatch: DispatchMode::default(),
            autostart: true,
        }
    }
}

/// Locations of the two correlated JSON sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_databases_path")]
    pub databases: String,
    #[serde(default = "default_procedures_path")]
    pub procedures: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            databases: default_databases_path(),
            procedures: default_procedures_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Append-only event log, truncated on every start.
    #[serde(default = "default_log_path")]
    pub path: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: default_log_path(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_step_delay_ms() -> u64 {
    DEFAULT_STEP_DELAY_MS
}
fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}
fn default_databases_path() -> String {
    DEFAULT_DATABASES_PATH.to_string()
}
fn default_procedures_path() -> String {
    DEFAULT_PROCEDURES_PATH.to_string()
}
fn default_log_path() -> String {
    DEFAULT_LOG_PATH.to_string()
}

impl SprocdConfig {
    /// Load config from a TOML file with SPROCD_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `SPROCD_ENGINE__STEP_DELAY_MS=0`. A missing file is not an error:
    /// every field has a default.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path.unwrap_or("sprocd.toml");

        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SPROCD_").split("__"))
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// JSON sources
// ---------------------------------------------------------------------------

/// Contents of `dbconfig.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseList {
    pub databases: Vec<DatabaseEntry>,
}

/// One database target and its opaque connection descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseEntry {
    pub name: String,
    /// Handed to the execution gateway untouched.
    #[serde(default)]
    pub config: serde_json::Value,
    /// Group keys to run, in order. `None` runs every declared group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
}

/// Contents of `storedProcedures.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcedureList {
    pub databases: Vec<ProcedureEntry>,
}

/// Procedure groups declared for one database, in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureEntry {
    pub name: String,
    #[serde(deserialize_with = "ordered_groups", serialize_with = "serialize_groups")]
    pub procedures: Vec<(String, GroupEntry)>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupEntry {
    pub procedures: Vec<String>,
    /// Delay in milliseconds before the group re-triggers. Signed so that a
    /// negative value reaches validation instead of failing deserialisation.
    pub timeout: i64,
    /// Per-group override of the pause after each procedure, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause: Option<i64>,
}

/// Deserialize a JSON object of groups while keeping key order.
fn ordered_groups<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<(String, GroupEntry)>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
    map.into_iter()
        .map(|(key, value)| {
            serde_json::from_value::<GroupEntry>(value)
                .map(|group| (key.clone(), group))
                .map_err(|e| D::Error::custom(format!("group {key}: {e}")))
        })
        .collect()
}

fn serialize_groups<S>(
    groups: &[(String, GroupEntry)],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeMap;
    let mut map = serializer.serialize_map(Some(groups.len()))?;
    for (key, group) in groups {
        map.serialize_entry(key, group)?;
    }
    map.end()
}

impl DatabaseList {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }
}

impl ProcedureList {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }
}

impl SourcesConfig {
    /// Read both JSON sources. Correlation is checked later by the registry.
    pub fn read(&self) -> Result<(DatabaseList, ProcedureList)> {
        let databases = DatabaseList::from_path(&self.databases)?;
        let procedures = ProcedureList::from_path(&self.procedures)?;
        tracing::debug!(
            databases = databases.databases.len(),
            procedure_entries = procedures.databases.len(),
            "configuration sources read"
        );
        Ok((databases, procedures))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let display = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|source| CoreError::SourceRead {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CoreError::SourceParse {
        path: display,
        source,
    })
}
