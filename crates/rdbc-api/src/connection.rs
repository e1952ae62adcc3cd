use crate::statement::{
    AnyStatement, Ddl, Delete, Insert, PreparedStatement, ReturningInsert, Select, Statement,
    StatementKind, Update,
};
use async_trait::async_trait;
use rdbc_core::Result;
use std::time::Duration;

/// A session with a database.
///
/// A connection is Idle, Busy or Released and runs one operation at a time;
/// callers wait for each operation (and drain or cancel each stream) before
/// issuing the next. Behaviour of overlapping operations is up to the
/// driver.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn begin_tx(&self, timeout: Duration) -> Result<()>;

    async fn commit_tx(&self, timeout: Duration) -> Result<()>;

    async fn rollback_tx(&self, timeout: Duration) -> Result<()>;

    /// Returns the connection to its owner. Only valid while Idle.
    async fn release(&self) -> Result<()>;

    /// Releases regardless of state, abandoning in-flight work.
    async fn force_release(&self);

    /// True when the connection is usable; never fails.
    async fn validate(&self, timeout: Duration) -> bool;

    /// Resolves once the connection is Idle (or Released).
    async fn watch_for_idle(&self);

    fn prepare(&self, sql: &str, kind: StatementKind) -> Result<PreparedStatement>;

    fn select(&self, sql: &str) -> Result<Select> {
        self.prepare(sql, StatementKind::Select).map(Statement::new)
    }

    fn update(&self, sql: &str) -> Result<Update> {
        self.prepare(sql, StatementKind::Update).map(Statement::new)
    }

    fn insert(&self, sql: &str) -> Result<Insert> {
        self.prepare(sql, StatementKind::Insert).map(Statement::new)
    }

    /// Insert returning the values of `key_columns` for every inserted row.
    fn returning_insert(&self, sql: &str, key_columns: &[&str]) -> Result<ReturningInsert> {
        let key_columns = key_columns.iter().map(|c| c.to_string()).collect();
        self.prepare(sql, StatementKind::ReturningInsert { key_columns })
            .map(Statement::new)
    }

    fn delete(&self, sql: &str) -> Result<Delete> {
        self.prepare(sql, StatementKind::Delete).map(Statement::new)
    }

    fn statement(&self, sql: &str) -> Result<AnyStatement> {
        self.prepare(sql, StatementKind::Any).map(Statement::new)
    }

    fn ddl(&self, sql: &str) -> Result<Ddl> {
        self.prepare(sql, StatementKind::Ddl).map(Statement::new)
    }
}
