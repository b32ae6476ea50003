// mysql-s3-backup/src/config/mod.rs
use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonS3Config {
    pub bucket_name: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonDatabase {
    pub name: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub times: Vec<String>,
    pub retention_days: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawJsonConfig {
    pub customer_name: Option<String>,
    pub mysql_bin_path: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub dump_timeout_secs: Option<u64>,
    pub upload_timeout_secs: Option<u64>,
    pub s3: Option<JsonS3Config>,
    #[serde(default)]
    pub databases: Vec<JsonDatabase>,
}

// Application's internal configuration structs

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One database to back up. Immutable after load and shared between jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSpec {
    pub name: String,
    pub credentials: Credentials,
    /// Local wall-clock times; each one is an independent daily trigger.
    pub times: Vec<NaiveTime>,
    pub retention_days: u32,
}

#[derive(Clone, PartialEq, Eq)]
pub struct StorageTarget {
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub endpoint_url: Option<String>,
}

impl fmt::Debug for StorageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageTarget")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeouts {
    pub dump: Option<Duration>,
    pub upload: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub customer_name: String,
    /// Explicit dump tool; `None` means look up `mysqldump` on PATH.
    pub mysql_bin_path: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub timeouts: Timeouts,
    pub storage: StorageTarget,
    pub databases: Vec<DatabaseSpec>,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        info!("Loading config file: {}", config_path.display());
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;

        let config = Self::from_raw(raw_json_config)?;
        info!(
            "Loaded config for customer {} with {} database(s)",
            config.customer_name,
            config.databases.len()
        );
        Ok(config)
    }

    pub fn from_raw(raw: RawJsonConfig) -> Result<Self> {
        let customer_name = required(raw.customer_name.as_ref(), "customerName")?;
        if customer_name.contains('/') {
            anyhow::bail!("customerName must not contain '/': {}", customer_name);
        }

        let s3 = raw
            .s3
            .as_ref()
            .context("s3 section must be set in config.json")?;
        let storage = load_storage_target(s3)?;

        if raw.databases.is_empty() {
            anyhow::bail!("databases must list at least one database in config.json");
        }
        let mut databases: Vec<DatabaseSpec> = Vec::with_capacity(raw.databases.len());
        for (index, json_db) in raw.databases.iter().enumerate() {
            let db = load_database(json_db)
                .with_context(|| format!("Invalid entry #{} in databases", index + 1))?;
            if databases.iter().any(|existing| existing.name == db.name) {
                anyhow::bail!("Database {} is configured more than once", db.name);
            }
            databases.push(db);
        }

        let mysql_bin_path = raw
            .mysql_bin_path
            .filter(|p| !p.as_os_str().is_empty() && !p.to_string_lossy().trim().is_empty());
        let temp_dir = raw.temp_dir.filter(|p| !p.as_os_str().is_empty());

        Ok(AppConfig {
            customer_name,
            mysql_bin_path,
            temp_dir,
            timeouts: Timeouts {
                dump: positive_secs(raw.dump_timeout_secs, "dumpTimeoutSecs")?,
                upload: positive_secs(raw.upload_timeout_secs, "uploadTimeoutSecs")?,
            },
            storage,
            databases,
        })
    }
}

fn required(value: Option<&String>, field: &str) -> Result<String> {
    match value.map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(v) => Ok(v.to_string()),
        None => Err(anyhow::anyhow!("{} must be set and non-empty in config.json", field)),
    }
}

fn positive_secs(value: Option<u64>, field: &str) -> Result<Option<Duration>> {
    match value {
        Some(0) => Err(anyhow::anyhow!("{} must be greater than zero", field)),
        Some(secs) => Ok(Some(Duration::from_secs(secs))),
        None => Ok(None),
    }
}

fn load_storage_target(s3: &JsonS3Config) -> Result<StorageTarget> {
    let endpoint_url = match s3.endpoint_url.as_ref().map(|u| u.trim()).filter(|u| !u.is_empty()) {
        Some(endpoint) => {
            Url::parse(endpoint)
                .with_context(|| format!("Invalid s3.endpointUrl: {}", endpoint))?;
            Some(endpoint.to_string())
        }
        None => None,
    };

    Ok(StorageTarget {
        bucket: required(s3.bucket_name.as_ref(), "s3.bucketName")?,
        region: required(s3.region.as_ref(), "s3.region")?,
        access_key: required(s3.access_key.as_ref(), "s3.accessKey")?,
        secret_key: required(s3.secret_key.as_ref(), "s3.secretKey")?,
        endpoint_url,
    })
}

fn load_database(json_db: &JsonDatabase) -> Result<DatabaseSpec> {
    let name = required(json_db.name.as_ref(), "name")?;
    if !is_valid_database_name(&name) {
        anyhow::bail!(
            "Invalid character in database name {:?}; only letters, digits, '_', '-' and '$' are allowed",
            name
        );
    }

    let username = required(json_db.username.as_ref(), "username")
        .with_context(|| format!("No valid username for database {}", name))?;
    let password = required(json_db.password.as_ref(), "password")
        .with_context(|| format!("No valid password for database {}", name))?;

    if json_db.times.is_empty() {
        anyhow::bail!("No backup time configured for database {}", name);
    }
    let mut times: Vec<NaiveTime> = Vec::with_capacity(json_db.times.len());
    for raw_time in &json_db.times {
        let time = parse_time_of_day(raw_time)
            .with_context(|| format!("Invalid backup time for database {}", name))?;
        if times.contains(&time) {
            warn!("Backup time {} is listed twice for database {}; scheduling it once", raw_time, name);
            continue;
        }
        times.push(time);
    }

    let retention_days = match json_db.retention_days {
        Some(days) if days >= 1 => u32::try_from(days)
            .with_context(|| format!("retentionDays is too large for database {}", name))?,
        _ => anyhow::bail!("Provide a positive retentionDays for database {}", name),
    };

    Ok(DatabaseSpec {
        name,
        credentials: Credentials { username, password },
        times,
        retention_days,
    })
}

/// Accepts `HH:MM` or `HH:MM:SS` in 24-hour clock.
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .with_context(|| format!("{:?} is not a valid time of day (expected HH:MM or HH:MM:SS)", raw))
}

fn is_valid_database_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '$')
}
