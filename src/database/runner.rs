//! Query runner traits and the executor that routes queries by database name.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::config::{ConfigError, DatabaseConfig, DriverKind};
use crate::database::driver::open_connection;
use crate::database::{QueryError, ResultRow};

/// Upper bound for a connection test.
pub const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Executes SQL against a named database.
///
/// This is the seam the collection engine depends on. Implementations own
/// connection lifecycle and must enforce `timeout` per call.
#[async_trait::async_trait]
pub trait QueryRunner: Send + Sync + 'static {
    /// Run `sql` against `database` and return every result row.
    async fn execute(
        &self,
        database: &str,
        sql: &str,
        timeout: Duration,
    ) -> Result<Vec<ResultRow>, QueryError>;
}

/// A resolved connection to one database, implemented once per driver.
#[async_trait::async_trait]
pub trait DatabaseConnection: Send + Sync + 'static {
    /// Driver backing this connection.
    fn driver(&self) -> DriverKind;

    /// Run a statement and collect its rows.
    async fn query(&self, sql: &str) -> Result<Vec<ResultRow>, QueryError>;

    /// Check that the database is reachable.
    async fn ping(&self) -> Result<(), QueryError>;

    /// Release pooled resources.
    async fn close(&self) {}
}

/// Routes queries to per-database connections.
///
/// The driver of each database is resolved once in [`add_database`]; calls
/// to [`execute`](QueryRunner::execute) only look up the stored handle.
///
/// [`add_database`]: QueryExecutor::add_database
#[derive(Default)]
pub struct QueryExecutor {
    connections: HashMap<String, Arc<dyn DatabaseConnection>>,
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("databases", &self.database_names())
            .finish()
    }
}

impl QueryExecutor {
    /// Create an executor with no databases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an executor for every configured database.
    ///
    /// Connections are opened lazily; an unreachable database does not fail here.
    pub fn from_config(databases: &BTreeMap<String, DatabaseConfig>) -> Result<Self, ConfigError> {
        let mut executor = Self::new();
        for database in databases.values() {
            executor.add_database(database)?;
        }
        Ok(executor)
    }

    /// Resolve the driver for a database and register it.
    pub fn add_database(&mut self, config: &DatabaseConfig) -> Result<(), ConfigError> {
        let connection = open_connection(config)?;
        tracing::info!(
            database = %config.name,
            driver = %config.driver,
            url = %config.redacted_url(),
            "Added database"
        );
        self.add_connection(config.name.clone(), connection);
        Ok(())
    }

    /// Register an already-built connection under `name`.
    pub fn add_connection(&mut self, name: impl Into<String>, connection: Arc<dyn DatabaseConnection>) {
        self.connections.insert(name.into(), connection);
    }

    /// Names of all registered databases, sorted.
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.connections.keys().cloned().collect();
        names.sort();
        names
    }

    fn connection(&self, database: &str) -> Result<&Arc<dyn DatabaseConnection>, QueryError> {
        self.connections
            .get(database)
            .ok_or_else(|| QueryError::UnknownDatabase(database.to_string()))
    }

    /// Check that one database is reachable.
    pub async fn test_connection(&self, database: &str) -> Result<(), QueryError> {
        let connection = self.connection(database)?;
        match timeout(CONNECTION_TEST_TIMEOUT, connection.ping()).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::Timeout(CONNECTION_TEST_TIMEOUT)),
        }
    }

    /// Check every database, logging each result.
    pub async fn test_all_connections(&self) -> BTreeMap<String, Result<(), QueryError>> {
        let mut results = BTreeMap::new();
        for name in self.database_names() {
            let result = self.test_connection(&name).await;
            match &result {
                Ok(()) => tracing::info!(database = %name, "Database connection test passed"),
                Err(e) => {
                    tracing::error!(database = %name, error = %e, "Database connection test failed")
                }
            }
            results.insert(name, result);
        }
        results
    }

    /// Close every connection pool.
    pub async fn close(&self) {
        for connection in self.connections.values() {
            connection.close().await;
        }
    }
}

#[async_trait::async_trait]
impl QueryRunner for QueryExecutor {
    async fn execute(
        &self,
        database: &str,
        sql: &str,
        query_timeout: Duration,
    ) -> Result<Vec<ResultRow>, QueryError> {
        let connection = self.connection(database)?;
        tracing::debug!(database, sql, "Executing query");
        match timeout(query_timeout, connection.query(sql)).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::Timeout(query_timeout)),
        }
    }
}
