use crate::database::{
    JsonMissingStore, JsonProcessedLedger, MissingAddressStore, ProcessedLedger,
    SqliteMissingStore, SqliteProcessedLedger,
};
use crate::lens::registry::{NetboxClient, SyncDispatcher};
use crate::lens::whois::CymruWhois;
use anyhow::{anyhow, Result};
use config::Config;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_REGISTRY_URL: &str = "http://localhost:8000";
const DEFAULT_WHOIS_HOST: &str = "whois.cymru.com";
const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1";
const DEFAULT_SERVER_PORT: u16 = 5000;

const EMPTY_CONFIG: &str = r#"### asnmap configuration file

### directory holding the range table and the stores
# data_dir = "~/.asnmap"

### range table CSV (start_ip,end_ip,asn,as_name,as_domain)
# range_table = "~/.asnmap/data.csv"

### store backend: "json" (missing_ips.json / processed_ips.json) or "sqlite"
# storage_backend = "json"
# missing_store = "~/.asnmap/missing_ips.json"
# processed_store = "~/.asnmap/processed_ips.json"

### NetBox registry
# registry_url = "http://localhost:8000"
# registry_token = ""
# registry_timeout_secs = 10
# registry_dedup = true

### routing-registry whois
# whois_host = "whois.cymru.com"
# whois_port = 43
# whois_timeout_secs = 15

### HTTP API
# server_address = "127.0.0.1"
# server_port = 5000
"#;

/// Persistence backend for the missing store and the processed ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(StorageBackend::Json),
            "sqlite" => Ok(StorageBackend::Sqlite),
            other => Err(anyhow!(
                "Unknown storage_backend '{}', expected 'json' or 'sqlite'",
                other
            )),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Json => write!(f, "json"),
            StorageBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AsnmapConfig {
    /// Path to the directory to hold asnmap's data
    pub data_dir: String,

    /// Range table CSV file
    pub range_table: String,

    pub storage_backend: StorageBackend,

    /// JSON missing-address file (json backend)
    pub missing_store: String,

    /// JSON processed-ledger file (json backend)
    pub processed_store: String,

    /// NetBox base URL, without the API path
    pub registry_url: String,

    #[serde(skip_serializing)]
    pub registry_token: String,

    pub registry_timeout_secs: u64,

    /// Skip prefixes already created by this process
    pub registry_dedup: bool,

    pub whois_host: String,
    pub whois_port: u16,
    pub whois_timeout_secs: u64,

    pub server_address: String,
    pub server_port: u16,
}

impl Default for AsnmapConfig {
    fn default() -> Self {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string());
        Self::with_data_dir(&format!("{}/.asnmap", home_dir))
    }
}

impl AsnmapConfig {
    /// Default settings rooted at `data_dir`
    pub fn with_data_dir(data_dir: &str) -> Self {
        let dir = data_dir.trim_end_matches('/');
        Self {
            data_dir: dir.to_string(),
            range_table: format!("{}/data.csv", dir),
            storage_backend: StorageBackend::Json,
            missing_store: format!("{}/missing_ips.json", dir),
            processed_store: format!("{}/processed_ips.json", dir),
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            registry_token: String::new(),
            registry_timeout_secs: 10,
            registry_dedup: true,
            whois_host: DEFAULT_WHOIS_HOST.to_string(),
            whois_port: 43,
            whois_timeout_secs: 15,
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            server_port: DEFAULT_SERVER_PORT,
        }
    }

    /// Function to create and initialize a new configuration
    pub fn new(path: &Option<String>) -> Result<AsnmapConfig> {
        // values from .env become ASNMAP_* environment settings
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();

        let home_dir = dirs::home_dir()
            .ok_or_else(|| anyhow!("Could not find home directory"))?
            .to_str()
            .ok_or_else(|| anyhow!("Could not convert home directory path to string"))?
            .to_owned();

        let asnmap_dir = format!("{}/.asnmap", home_dir.as_str());

        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    let path_str = path
                        .to_str()
                        .ok_or_else(|| anyhow!("Could not convert path to string"))?;
                    builder = builder.add_source(config::File::with_name(path_str));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {}", e))?;
                }
            }
            None => {
                std::fs::create_dir_all(asnmap_dir.as_str())
                    .map_err(|e| anyhow!("Unable to create asnmap directory: {}", e))?;
                let p = format!("{}/asnmap.toml", asnmap_dir.as_str());
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG).map_err(|e| {
                        anyhow!("Unable to create config file {}: {}", p.as_str(), e)
                    })?;
                }
            }
        }

        // E.g., `ASNMAP_REGISTRY_TOKEN=... asnmap serve` sets the NetBox token
        builder = builder.add_source(config::Environment::with_prefix("ASNMAP"));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let config = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        let config = Self::from_map(&config, &asnmap_dir)?;
        std::fs::create_dir_all(config.data_dir.as_str())
            .map_err(|e| anyhow!("Unable to create data directory: {}", e))?;
        Ok(config)
    }

    /// Build a configuration from flat key/value settings
    ///
    /// Unset keys take their defaults; paths default to files inside
    /// `data_dir`, itself defaulting to `default_data_dir`.
    pub fn from_map(map: &HashMap<String, String>, default_data_dir: &str) -> Result<Self> {
        let data_dir = map
            .get("data_dir")
            .map(String::as_str)
            .unwrap_or(default_data_dir);
        let mut config = Self::with_data_dir(data_dir);

        let text = |key: &str, target: &mut String| {
            if let Some(v) = map.get(key) {
                *target = v.clone();
            }
        };
        text("range_table", &mut config.range_table);
        text("missing_store", &mut config.missing_store);
        text("processed_store", &mut config.processed_store);
        text("registry_url", &mut config.registry_url);
        text("registry_token", &mut config.registry_token);
        text("whois_host", &mut config.whois_host);
        text("server_address", &mut config.server_address);

        if let Some(v) = map.get("storage_backend") {
            config.storage_backend = v.parse()?;
        }
        if let Some(v) = map.get("registry_timeout_secs") {
            config.registry_timeout_secs = parse_key("registry_timeout_secs", v)?;
        }
        if let Some(v) = map.get("registry_dedup") {
            config.registry_dedup = parse_key("registry_dedup", v)?;
        }
        if let Some(v) = map.get("whois_port") {
            config.whois_port = parse_key("whois_port", v)?;
        }
        if let Some(v) = map.get("whois_timeout_secs") {
            config.whois_timeout_secs = parse_key("whois_timeout_secs", v)?;
        }
        if let Some(v) = map.get("server_port") {
            config.server_port = parse_key("server_port", v)?;
        }

        Ok(config)
    }

    /// Get the path to the SQLite database file
    pub fn sqlite_path(&self) -> String {
        format!("{}/asnmap-data.sqlite3", self.data_dir.trim_end_matches('/'))
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_secs(self.registry_timeout_secs)
    }

    pub fn whois_timeout(&self) -> Duration {
        Duration::from_secs(self.whois_timeout_secs)
    }

    /// Open the missing-address store for the configured backend
    pub fn missing_store(&self) -> Result<Arc<dyn MissingAddressStore>> {
        let store: Arc<dyn MissingAddressStore> = match self.storage_backend {
            StorageBackend::Json => Arc::new(JsonMissingStore::new(&self.missing_store)?),
            StorageBackend::Sqlite => Arc::new(SqliteMissingStore::open(&self.sqlite_path())?),
        };
        Ok(store)
    }

    /// Open the processed ledger for the configured backend
    pub fn processed_ledger(&self) -> Result<Arc<dyn ProcessedLedger>> {
        let ledger: Arc<dyn ProcessedLedger> = match self.storage_backend {
            StorageBackend::Json => Arc::new(JsonProcessedLedger::new(&self.processed_store)?),
            StorageBackend::Sqlite => Arc::new(SqliteProcessedLedger::open(&self.sqlite_path())?),
        };
        Ok(ledger)
    }

    /// Registry dispatcher backed by the configured NetBox instance
    pub fn sync_dispatcher(&self) -> SyncDispatcher {
        let client = NetboxClient::new(
            &self.registry_url,
            self.registry_token.clone(),
            self.registry_timeout(),
        );
        let dispatcher = SyncDispatcher::new(Arc::new(client));
        if self.registry_dedup {
            dispatcher.with_dedup()
        } else {
            dispatcher
        }
    }

    pub fn whois_client(&self) -> CymruWhois {
        CymruWhois::new(self.whois_host.clone(), self.whois_port, self.whois_timeout())
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let token = if self.registry_token.is_empty() {
            "(not set)".to_string()
        } else {
            "********".to_string()
        };
        let mut lines = vec![
            format!("Data Directory:     {}", self.data_dir),
            format!("Range Table:        {}", self.range_table),
            format!("Storage Backend:    {}", self.storage_backend),
        ];
        match self.storage_backend {
            StorageBackend::Json => {
                lines.push(format!("Missing Store:      {}", self.missing_store));
                lines.push(format!("Processed Store:    {}", self.processed_store));
            }
            StorageBackend::Sqlite => {
                lines.push(format!("SQLite Path:        {}", self.sqlite_path()));
            }
        }
        lines.extend([
            format!("Registry URL:       {}", self.registry_url),
            format!("Registry Token:     {}", token),
            format!("Registry Timeout:   {} seconds", self.registry_timeout_secs),
            format!("Registry Dedup:     {}", self.registry_dedup),
            format!("Whois Server:       {}:{}", self.whois_host, self.whois_port),
            format!("Whois Timeout:      {} seconds", self.whois_timeout_secs),
            format!(
                "HTTP Listen:        {}:{}",
                self.server_address, self.server_port
            ),
        ]);

        if !Path::new(&self.range_table).exists() {
            lines.push("Warning:            range table file does not exist".to_string());
        }

        lines.join("\n")
    }

    /// Get the config file path
    pub fn config_file_path() -> String {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| "~".to_string());
        format!("{}/.asnmap/asnmap.toml", home_dir)
    }
}

fn parse_key<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow!("Invalid value '{}' for {}: {}", value, key, e))
}
