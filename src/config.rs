//! Process configuration, resolved once from the environment at startup.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::actions::{CountDetectedObjects, DetectObjects};
use crate::core::db::{
    CountRepository, FanOutCountRepo, InMemoryCountRepo, MongoCountRepo, MySqlCountRepo,
    ObjectCountRepository, SqliteCountRepo,
};
use crate::detection::{
    DebugSink, Detector, FakeObjectDetector, ImageDebugSink, NoopDebugSink, TfServingDetector,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Fake detector, in-memory totals
    Dev,
    /// TensorFlow Serving, MongoDB and MySQL
    Prod,
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            other => Err(Error::Config(format!(
                "ENV must be 'dev' or 'prod', got {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Mongo,
    MySql,
    Sqlite,
}

impl FromStr for StoreKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "mongo" | "mongodb" => Ok(StoreKind::Mongo),
            "mysql" => Ok(StoreKind::MySql),
            "sqlite" => Ok(StoreKind::Sqlite),
            other => Err(Error::Config(format!("unknown count store {:?}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TfServingConfig {
    pub host: String,
    pub port: u16,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct MySqlConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub table: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for MySqlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("table", &self.table)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    pub path: PathBuf,
    pub table: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub environment: Environment,
    /// Stores receiving every update; the first one answers reads
    pub stores: Vec<StoreKind>,
    pub tfs: TfServingConfig,
    pub mongo: MongoConfig,
    pub mysql: MySqlConfig,
    pub sqlite: SqliteConfig,
    pub store_timeout: Duration,
    pub detector_timeout: Duration,
    pub enable_debug_artifacts: bool,
    pub debug_out_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Dev)
    }
}

impl AppConfig {
    fn for_environment(environment: Environment) -> Self {
        let stores = match environment {
            Environment::Dev => vec![StoreKind::Memory],
            Environment::Prod => vec![StoreKind::Mongo, StoreKind::MySql],
        };
        Self {
            environment,
            stores,
            tfs: TfServingConfig {
                host: "localhost".to_string(),
                port: 8501,
                model: "rfcn".to_string(),
            },
            mongo: MongoConfig {
                host: "localhost".to_string(),
                port: 27017,
                database: "prod_counter".to_string(),
            },
            mysql: MySqlConfig {
                host: "localhost".to_string(),
                port: 3306,
                database: "prod_counter".to_string(),
                table: "counter".to_string(),
                user: "root".to_string(),
                password: "root".to_string(),
            },
            sqlite: SqliteConfig {
                path: PathBuf::from("counter.db"),
                table: "counter".to_string(),
            },
            store_timeout: Duration::from_secs(5),
            detector_timeout: Duration::from_secs(30),
            enable_debug_artifacts: false,
            debug_out_dir: PathBuf::from("debug"),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Unset or blank keys
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let environment = get("ENV")
            .map(|value| value.parse::<Environment>())
            .transpose()?
            .unwrap_or(Environment::Dev);
        let mut config = Self::for_environment(environment);

        if let Some(stores) = get("COUNTER_STORES") {
            config.stores = parse_stores(&stores)?;
        }

        set_string(&get, "TFS_HOST", &mut config.tfs.host);
        set_parsed(&get, "TFS_PORT", &mut config.tfs.port)?;
        set_string(&get, "TFS_MODEL", &mut config.tfs.model);

        set_string(&get, "MONGO_HOST", &mut config.mongo.host);
        set_parsed(&get, "MONGO_PORT", &mut config.mongo.port)?;
        set_string(&get, "MONGO_DB", &mut config.mongo.database);

        set_string(&get, "MYSQL_HOST", &mut config.mysql.host);
        set_parsed(&get, "MYSQL_PORT", &mut config.mysql.port)?;
        set_string(&get, "MYSQL_DB", &mut config.mysql.database);
        set_string(&get, "MYSQL_TABLE", &mut config.mysql.table);
        set_string(&get, "MYSQL_USER", &mut config.mysql.user);
        // Password is taken verbatim, whitespace included.
        if let Some(password) = lookup("MYSQL_PASSWORD") {
            config.mysql.password = password;
        }

        if let Some(path) = get("SQLITE_PATH") {
            config.sqlite.path = PathBuf::from(path);
        }
        set_string(&get, "SQLITE_TABLE", &mut config.sqlite.table);

        if let Some(secs) = get("STORE_TIMEOUT_SECS") {
            config.store_timeout = parse_timeout("STORE_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = get("DETECTOR_TIMEOUT_SECS") {
            config.detector_timeout = parse_timeout("DETECTOR_TIMEOUT_SECS", &secs)?;
        }
        if let Some(flag) = get("ENABLE_DEBUG_ARTIFACTS") {
            config.enable_debug_artifacts = parse_bool("ENABLE_DEBUG_ARTIFACTS", &flag)?;
        }
        if let Some(dir) = get("DEBUG_OUT_DIR") {
            config.debug_out_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    pub fn build_detector(&self) -> Result<Detector> {
        Ok(match self.environment {
            Environment::Dev => Detector::Fake(FakeObjectDetector::default()),
            Environment::Prod => {
                Detector::TfServing(TfServingDetector::new(&self.tfs, self.detector_timeout)?)
            }
        })
    }

    async fn build_store(&self, kind: StoreKind) -> Result<CountRepository> {
        Ok(match kind {
            StoreKind::Memory => InMemoryCountRepo::new().into(),
            StoreKind::Mongo => MongoCountRepo::connect(&self.mongo, self.store_timeout)
                .await?
                .into(),
            StoreKind::MySql => MySqlCountRepo::new(self.mysql.clone(), self.store_timeout)?.into(),
            StoreKind::Sqlite => {
                SqliteCountRepo::new(self.sqlite.clone(), self.store_timeout)?.into()
            }
        })
    }

    /// Every configured store behind one fan-out, in configuration order.
    pub async fn build_repository(&self) -> Result<FanOutCountRepo<CountRepository>> {
        let mut repos = Vec::with_capacity(self.stores.len());
        for kind in &self.stores {
            repos.push(self.build_store(*kind).await?);
        }
        let repo = FanOutCountRepo::new(repos)?;
        tracing::info!(stores = %repo.name(), "Count stores configured");
        Ok(repo)
    }

    pub fn debug_sink(&self) -> Arc<dyn DebugSink> {
        if self.enable_debug_artifacts {
            Arc::new(ImageDebugSink::new(&self.debug_out_dir))
        } else {
            Arc::new(NoopDebugSink)
        }
    }

    pub async fn count_action(
        &self,
    ) -> Result<CountDetectedObjects<Detector, FanOutCountRepo<CountRepository>>> {
        Ok(
            CountDetectedObjects::new(self.build_detector()?, self.build_repository().await?)
                .with_debug_sink(self.debug_sink()),
        )
    }

    pub fn detection_action(&self) -> Result<DetectObjects<Detector>> {
        Ok(DetectObjects::new(self.build_detector()?).with_debug_sink(self.debug_sink()))
    }
}

fn set_string<G>(get: &G, key: &str, target: &mut String)
where
    G: Fn(&str) -> Option<String>,
{
    if let Some(value) = get(key) {
        *target = value.trim().to_string();
    }
}

fn set_parsed<G, T>(get: &G, key: &str, target: &mut T) -> Result<()>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    if let Some(value) = get(key) {
        *target = value
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{}={:?}: {}", key, value, e)))?;
    }
    Ok(())
}

fn parse_stores(value: &str) -> Result<Vec<StoreKind>> {
    let mut stores = Vec::new();
    for kind in value.split(',').filter(|part| !part.trim().is_empty()) {
        let kind: StoreKind = kind.parse()?;
        if !stores.contains(&kind) {
            stores.push(kind);
        }
    }
    if stores.is_empty() {
        return Err(Error::Config("COUNTER_STORES names no store".to_string()));
    }
    Ok(stores)
}

fn parse_timeout(key: &str, value: &str) -> Result<Duration> {
    let secs: u64 = value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{}={:?}: {}", key, value, e)))?;
    if secs == 0 {
        return Err(Error::Config(format!("{} must be at least 1", key)));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{}={:?} is not a boolean", key, value))),
    }
}
