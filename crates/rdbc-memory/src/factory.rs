use crate::auth::AuthManager;
use crate::catalog::Database;
use crate::config::MemoryConfig;
use crate::connection::MemoryConnection;
use async_trait::async_trait;
use metrics::counter;
use rdbc_api::ConnectionFactory;
use rdbc_core::{RdbcError, Result, TypeConverterRegistry};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Opens connections to one in-memory database.
pub struct MemoryConnectionFactory {
    config: MemoryConfig,
    db: Arc<Database>,
    auth: Option<Arc<AuthManager>>,
    registry: Arc<TypeConverterRegistry>,
    closed: AtomicBool,
}

impl MemoryConnectionFactory {
    pub fn new(config: MemoryConfig) -> Self {
        Self::with_registry(config, TypeConverterRegistry::standard())
    }

    pub fn with_registry(config: MemoryConfig, registry: TypeConverterRegistry) -> Self {
        let db = Arc::new(Database::new(config.database.name.clone()));
        let auth = config
            .auth
            .enabled
            .then(|| Arc::new(AuthManager::new(&config.auth)));
        Self {
            config,
            db,
            auth,
            registry: Arc::new(registry),
            closed: AtomicBool::new(false),
        }
    }

    pub fn from_config_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(Self::new(MemoryConfig::from_path(path)?))
    }

    /// Factory over the same database that logs in as another user.
    pub fn session(&self, username: &str, password: &str) -> Self {
        let mut config = self.config.clone();
        config.session.username = username.to_string();
        config.session.password = password.to_string();
        Self {
            config,
            db: self.db.clone(),
            auth: self.auth.clone(),
            registry: self.registry.clone(),
            closed: AtomicBool::new(self.closed.load(Ordering::Acquire)),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TypeConverterRegistry> {
        &self.registry
    }

    pub fn table_names(&self) -> Vec<String> {
        self.db.store().table_names()
    }
}

#[async_trait]
impl ConnectionFactory for MemoryConnectionFactory {
    type Connection = MemoryConnection;

    async fn connection(&self) -> Result<MemoryConnection> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RdbcError::Connect(format!(
                "connection factory for {} has been shut down",
                self.db.name()
            )));
        }
        let latency = self.config.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let session = &self.config.session;
        let user = match &self.auth {
            Some(auth) => Some(auth.authenticate(&session.username, &session.password)?),
            None => None,
        };
        counter!("rdbc_memory_connection_total").increment(1);
        let conn = MemoryConnection::open(self.db.clone(), user, latency, self.registry.clone());
        info!(
            connection = %conn.id(),
            database = self.db.name(),
            user = %session.username,
            "connection opened"
        );
        Ok(conn)
    }

    async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(database = self.db.name(), "connection factory shut down");
        }
    }
}
