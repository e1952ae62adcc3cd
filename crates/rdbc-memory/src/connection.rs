use crate::auth::{authorize, UserContext};
use crate::catalog::{Database, Store, Version};
use crate::executor::{self, QueryResult};
use crate::planner::{parse_sql, plan_statement, Plan};
use async_trait::async_trait;
use metrics::counter;
use rdbc_api::{
    with_timeout, BoundParams, Connection, PreparedStatement, ResultStream, SqlTemplate,
    StatementExecutor, StatementKind,
};
use rdbc_core::{BoundValue, RdbcError, Result, Row, TypeConverterRegistry};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Idle,
    Busy,
    Released,
}

struct Transaction {
    snapshot: Store,
    base_version: Version,
    dirty: bool,
    /// Set by the first failing statement; only rollback is allowed afterwards.
    failed: bool,
}

struct ConnectionInner {
    id: Uuid,
    db: Arc<Database>,
    user: Option<UserContext>,
    state: watch::Sender<ConnState>,
    tx: Mutex<Option<Transaction>>,
    latency: Duration,
    registry: Arc<TypeConverterRegistry>,
}

/// Connection to an in-memory [`Database`].
///
/// Operations issued while another one is in flight fail with
/// `ConnectionBusy`; every operation after release fails with
/// `ConnectionReleased`.
#[derive(Clone)]
pub struct MemoryConnection {
    inner: Arc<ConnectionInner>,
}

/// Holds the connection Busy; dropping it returns to Idle unless the
/// connection was released meanwhile.
struct BusyGuard {
    inner: Arc<ConnectionInner>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.inner.state.send_if_modified(|state| {
            if *state == ConnState::Busy {
                *state = ConnState::Idle;
                true
            } else {
                false
            }
        });
    }
}

impl ConnectionInner {
    fn acquire(self: &Arc<Self>) -> Result<BusyGuard> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|state| match state {
            ConnState::Idle => {
                *state = ConnState::Busy;
                true
            }
            ConnState::Busy => {
                outcome = Err(RdbcError::ConnectionBusy);
                false
            }
            ConnState::Released => {
                outcome = Err(RdbcError::ConnectionReleased);
                false
            }
        });
        outcome.map(|_| BusyGuard {
            inner: self.clone(),
        })
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn tx(&self) -> MutexGuard<'_, Option<Transaction>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs on the transaction snapshot when one is open, else directly on
    /// the shared store.
    fn run(
        &self,
        plan: &Plan,
        params: &[BoundValue],
        key_columns: Option<&[String]>,
    ) -> Result<QueryResult> {
        let mut guard = self.tx();
        if let Some(tx) = guard.as_mut() {
            if tx.failed {
                return Err(RdbcError::InactiveTransaction);
            }
            let outcome = authorize(self.user.as_ref(), plan).and_then(|_| {
                executor::execute(&mut tx.snapshot, plan, params, &self.registry, key_columns)
            });
            match &outcome {
                Ok(_) => tx.dirty |= plan.is_mutation(),
                Err(_) => tx.failed = true,
            }
            return outcome;
        }
        drop(guard);
        authorize(self.user.as_ref(), plan)?;
        let mut store = self.db.store();
        executor::execute(&mut store, plan, params, &self.registry, key_columns)
    }
}

impl MemoryConnection {
    pub(crate) fn open(
        db: Arc<Database>,
        user: Option<UserContext>,
        latency: Duration,
        registry: Arc<TypeConverterRegistry>,
    ) -> Self {
        let (state, _) = watch::channel(ConnState::Idle);
        Self {
            inner: Arc::new(ConnectionInner {
                id: Uuid::new_v4(),
                db,
                user,
                state,
                tx: Mutex::new(None),
                latency,
                registry,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn state(&self) -> ConnState {
        *self.inner.state.borrow()
    }

    pub fn in_transaction(&self) -> bool {
        self.inner.tx().is_some()
    }

    pub fn username(&self) -> Option<&str> {
        self.inner.user.as_ref().map(|u| u.username.as_str())
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn begin_tx(&self, timeout: Duration) -> Result<()> {
        let _busy = self.inner.acquire()?;
        with_timeout(timeout, async {
            self.inner.round_trip().await;
            let mut tx = self.inner.tx();
            if tx.is_some() {
                return Err(RdbcError::InvalidState(
                    "a transaction is already in progress".into(),
                ));
            }
            let snapshot = self.inner.db.store().clone();
            *tx = Some(Transaction {
                base_version: snapshot.version(),
                snapshot,
                dirty: false,
                failed: false,
            });
            debug!(connection = %self.inner.id, "transaction started");
            Ok(())
        })
        .await
    }

    async fn commit_tx(&self, timeout: Duration) -> Result<()> {
        let _busy = self.inner.acquire()?;
        with_timeout(timeout, async {
            self.inner.round_trip().await;
            let tx = self
                .inner
                .tx()
                .take()
                .ok_or_else(|| RdbcError::InvalidState("no transaction in progress".into()))?;
            if tx.failed {
                debug!(connection = %self.inner.id, "inactive transaction rolled back on commit");
                return Err(RdbcError::InactiveTransaction);
            }
            if !tx.dirty {
                return Ok(());
            }
            let mut shared = self.inner.db.store();
            if shared.version() != tx.base_version {
                warn!(
                    connection = %self.inner.id,
                    "commit conflicts with a concurrent transaction, rolled back"
                );
                return Err(RdbcError::Uncategorized(
                    "could not serialize access due to concurrent update".into(),
                ));
            }
            let mut snapshot = tx.snapshot;
            snapshot.set_version(shared.version() + 1);
            *shared = snapshot;
            debug!(connection = %self.inner.id, version = shared.version(), "transaction committed");
            Ok(())
        })
        .await
    }

    async fn rollback_tx(&self, timeout: Duration) -> Result<()> {
        let _busy = self.inner.acquire()?;
        with_timeout(timeout, async {
            self.inner.round_trip().await;
            if self.inner.tx().take().is_none() {
                debug!(connection = %self.inner.id, "rollback without transaction");
            }
            Ok(())
        })
        .await
    }

    async fn release(&self) -> Result<()> {
        let mut outcome = Ok(());
        self.inner.state.send_if_modified(|state| match state {
            ConnState::Idle => {
                *state = ConnState::Released;
                true
            }
            ConnState::Busy => {
                outcome = Err(RdbcError::ConnectionRelease(
                    "connection is busy with an unfinished operation".into(),
                ));
                false
            }
            ConnState::Released => {
                outcome = Err(RdbcError::ConnectionReleased);
                false
            }
        });
        outcome?;
        if self.inner.tx().take().is_some() {
            warn!(connection = %self.inner.id, "open transaction rolled back on release");
        }
        info!(connection = %self.inner.id, "connection released");
        Ok(())
    }

    async fn force_release(&self) {
        let previous = self.inner.state.send_replace(ConnState::Released);
        self.inner.tx().take();
        if previous != ConnState::Released {
            info!(connection = %self.inner.id, ?previous, "connection force released");
        }
    }

    async fn validate(&self, timeout: Duration) -> bool {
        let Ok(_busy) = self.inner.acquire() else {
            return false;
        };
        with_timeout(timeout, async {
            self.inner.round_trip().await;
            Ok(())
        })
        .await
        .is_ok()
    }

    async fn watch_for_idle(&self) {
        let mut state = self.inner.state.subscribe();
        let _ = state.wait_for(|s| *s != ConnState::Busy).await;
    }

    fn prepare(&self, sql: &str, kind: StatementKind) -> Result<PreparedStatement> {
        if self.state() == ConnState::Released {
            return Err(RdbcError::ConnectionReleased);
        }
        let template = SqlTemplate::parse(sql);
        let plan = plan_statement(&parse_sql(&template.native_sql())?)?;
        check_kind(&kind, &plan)?;
        let key_columns = match &kind {
            StatementKind::ReturningInsert { key_columns } => Some(key_columns.clone()),
            _ => None,
        };
        let executor = MemoryStatement {
            conn: self.inner.clone(),
            plan,
            key_columns,
        };
        Ok(PreparedStatement::new(
            template,
            kind,
            Arc::new(executor),
            self.inner.registry.clone(),
        ))
    }
}

fn check_kind(kind: &StatementKind, plan: &Plan) -> Result<()> {
    let fits = match kind {
        StatementKind::Select => matches!(plan, Plan::Select(_)),
        StatementKind::Insert | StatementKind::ReturningInsert { .. } => {
            matches!(plan, Plan::Insert(_))
        }
        StatementKind::Update => matches!(plan, Plan::Update(_)),
        StatementKind::Delete => matches!(plan, Plan::Delete(_)),
        StatementKind::Ddl => matches!(plan, Plan::CreateTable(_) | Plan::DropTable(_)),
        StatementKind::Any => true,
    };
    if fits {
        Ok(())
    } else {
        Err(RdbcError::InvalidQuery(format!(
            "{} statement cannot be prepared as {}",
            plan.name(),
            kind_name(kind)
        )))
    }
}

fn kind_name(kind: &StatementKind) -> &'static str {
    match kind {
        StatementKind::Select => "a select",
        StatementKind::Insert => "an insert",
        StatementKind::ReturningInsert { .. } => "a returning insert",
        StatementKind::Update => "an update",
        StatementKind::Delete => "a delete",
        StatementKind::Ddl => "DDL",
        StatementKind::Any => "any statement",
    }
}

struct MemoryStatement {
    conn: Arc<ConnectionInner>,
    plan: Plan,
    key_columns: Option<Vec<String>>,
}

#[async_trait]
impl StatementExecutor for MemoryStatement {
    async fn execute_for_stream(&self, params: &BoundParams) -> Result<ResultStream> {
        let busy = self.conn.acquire()?;
        self.conn.round_trip().await;
        counter!("rdbc_memory_statement_total").increment(1);
        let result = match self
            .conn
            .run(&self.plan, params.values(), self.key_columns.as_deref())
        {
            Ok(result) => result,
            Err(err) => {
                counter!("rdbc_memory_statement_error_total").increment(1);
                debug!(connection = %self.conn.id, statement = self.plan.name(), "statement failed: {err}");
                return Err(err);
            }
        };

        let metadata = Arc::new(result.metadata);
        let (stream, sink) = ResultStream::channel(metadata.clone());
        let registry = self.conn.registry.clone();
        let rows = result.rows;
        let rows_affected = result.rows_affected;
        let warnings = result.warnings;
        tokio::spawn(async move {
            for values in rows {
                if !sink.send(Row::new(metadata.clone(), values, registry.clone())).await {
                    break;
                }
            }
            drop(busy);
            sink.complete(rows_affected, warnings);
        });
        Ok(stream)
    }
}
