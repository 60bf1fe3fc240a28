//! Database target configuration.

use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};
use url::Url;

use super::validation::{ConfigError, expand_env_vars};

/// Default connection pool size per database.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 2;

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

/// Supported database drivers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DriverKind {
    Sqlite,
    Mysql,
    #[serde(alias = "postgres")]
    #[strum(to_string = "postgresql", serialize = "postgres")]
    Postgresql,
    Mssql,
}

impl DriverKind {
    /// Default TCP port for network drivers.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Sqlite => None,
            Self::Mysql => Some(3306),
            Self::Postgresql => Some(5432),
            Self::Mssql => Some(1433),
        }
    }

    fn url_scheme(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Mysql => "mysql",
            Self::Postgresql => "postgres",
            Self::Mssql => "mssql",
        }
    }
}

/// Connection settings for one database target.
///
/// The `name` is taken from the key under `databases:` in the YAML file.
#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Unique database name.
    #[serde(skip)]
    pub name: String,
    /// Driver used to talk to this database.
    pub driver: DriverKind,
    /// Server host (network drivers).
    #[serde(default)]
    pub host: Option<String>,
    /// Server port (default depends on driver).
    #[serde(default)]
    pub port: Option<u16>,
    /// Database name, or file path for SQLite.
    #[serde(default)]
    pub database: Option<String>,
    /// Login user.
    #[serde(default)]
    pub username: Option<String>,
    /// Login password.
    #[serde(default)]
    pub password: Option<String>,
    /// Full connection URL; takes precedence over the individual fields.
    #[serde(default)]
    pub connection_string: Option<String>,
    /// Maximum pooled connections (default: 2).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("name", &self.name)
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("max_connections", &self.max_connections)
            .finish_non_exhaustive()
    }
}

impl DatabaseConfig {
    /// Create a configuration for the given driver with no connection parameters.
    pub fn new(name: impl Into<String>, driver: DriverKind) -> Self {
        Self {
            name: name.into(),
            driver,
            host: None,
            port: None,
            database: None,
            username: None,
            password: None,
            connection_string: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Create an SQLite configuration; `":memory:"` opens an in-memory database.
    pub fn sqlite(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, DriverKind::Sqlite).with_database(path)
    }

    /// Set the database name (or SQLite path).
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set host and port.
    pub fn with_host(mut self, host: impl Into<String>, port: Option<u16>) -> Self {
        self.host = Some(host.into());
        self.port = port;
        self
    }

    /// Set login credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set an explicit connection URL.
    pub fn with_connection_string(mut self, url: impl Into<String>) -> Self {
        self.connection_string = Some(url.into());
        self
    }

    /// Expand `${VAR}` references in the connection parameters.
    pub(crate) fn expand_env(&mut self) {
        for field in [
            &mut self.host,
            &mut self.database,
            &mut self.username,
            &mut self.password,
            &mut self.connection_string,
        ] {
            if let Some(value) = field.as_mut() {
                *value = expand_env_vars(value);
            }
        }
    }

    /// Build the connection URL for this database.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if required parameters are missing.
    pub fn connection_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = self.connection_string.as_ref().filter(|s| !s.is_empty()) {
            return Ok(url.clone());
        }

        if self.driver == DriverKind::Sqlite {
            let path = self.database.as_deref().filter(|s| !s.is_empty()).ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "database '{}': sqlite requires 'database' (file path or :memory:)",
                    self.name
                ))
            })?;
            return Ok(format!("sqlite:{path}"));
        }

        let host = self.host.as_deref().filter(|s| !s.is_empty()).ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "database '{}': {} requires 'host' or 'connection_string'",
                self.name, self.driver
            ))
        })?;
        let port = self.port.or(self.driver.default_port()).unwrap_or_default();

        let invalid = |what: &str| {
            ConfigError::ValidationError(format!("database '{}': invalid {}", self.name, what))
        };

        let mut url = Url::parse(&format!("{}://{}:{}", self.driver.url_scheme(), host, port))
            .map_err(|e| invalid(&format!("host '{host}': {e}")))?;
        if let Some(user) = self.username.as_deref().filter(|s| !s.is_empty()) {
            url.set_username(user).map_err(|_| invalid("username"))?;
        }
        if let Some(password) = self.password.as_deref().filter(|s| !s.is_empty()) {
            url.set_password(Some(password))
                .map_err(|_| invalid("password"))?;
        }
        if let Some(database) = self.database.as_deref() {
            url.set_path(database);
        }
        Ok(url.to_string())
    }

    /// Connection URL with the password masked, for logging.
    pub fn redacted_url(&self) -> String {
        let Ok(raw) = self.connection_url() else {
            return format!("<invalid {} config>", self.driver);
        };
        match Url::parse(&raw) {
            Ok(mut url) if url.password().is_some() => {
                let _ = url.set_password(Some("****"));
                url.to_string()
            }
            _ => raw,
        }
    }
}
