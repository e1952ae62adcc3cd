use crate::connection::Connection;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use rdbc_core::Result;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    type Connection: Connection;

    /// Opens a new connection; fails with `Connect`.
    async fn connection(&self) -> Result<Self::Connection>;

    /// Idempotent. Afterwards `connection()` fails with `Connect`.
    async fn shutdown(&self);
}

/// Scoped-connection helpers available on every [`ConnectionFactory`].
pub trait ConnectionFactoryExt: ConnectionFactory {
    /// Runs `body` on a fresh connection and releases it afterwards, also
    /// when `body` fails or panics.
    fn with_connection<'a, T, B>(&'a self, body: B) -> BoxFuture<'a, Result<T>>
    where
        T: Send + 'a,
        B: for<'c> FnOnce(&'c Self::Connection) -> BoxFuture<'c, Result<T>> + Send + 'a,
    {
        Box::pin(with_connection(self, body))
    }

    /// Like [`with_connection`](Self::with_connection) inside a transaction:
    /// commits when `body` succeeds, rolls back otherwise, then releases.
    fn with_transaction<'a, T, B>(
        &'a self,
        timeout: Duration,
        body: B,
    ) -> BoxFuture<'a, Result<T>>
    where
        T: Send + 'a,
        B: for<'c> FnOnce(&'c Self::Connection) -> BoxFuture<'c, Result<T>> + Send + 'a,
    {
        Box::pin(with_transaction(self, timeout, body))
    }
}

impl<F: ConnectionFactory + ?Sized> ConnectionFactoryExt for F {}

/// A body error takes precedence over cleanup errors, which are only
/// logged. A release error is returned when the body succeeded.
pub async fn with_connection<F, T, B>(factory: &F, body: B) -> Result<T>
where
    F: ConnectionFactory + ?Sized,
    B: for<'c> FnOnce(&'c F::Connection) -> BoxFuture<'c, Result<T>>,
{
    let conn = factory.connection().await?;
    let outcome = AssertUnwindSafe(async { body(&conn).await })
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(value)) => {
            release(&conn).await?;
            Ok(value)
        }
        Ok(Err(err)) => {
            release_quietly(&conn).await;
            Err(err)
        }
        Err(payload) => {
            release_quietly(&conn).await;
            panic::resume_unwind(payload)
        }
    }
}

/// Commit or release errors surface only when the body succeeded.
pub async fn with_transaction<F, T, B>(factory: &F, timeout: Duration, body: B) -> Result<T>
where
    F: ConnectionFactory + ?Sized,
    B: for<'c> FnOnce(&'c F::Connection) -> BoxFuture<'c, Result<T>>,
{
    let conn = factory.connection().await?;
    if let Err(err) = conn.begin_tx(timeout).await {
        release_quietly(&conn).await;
        return Err(err);
    }
    let outcome = AssertUnwindSafe(async { body(&conn).await })
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(value)) => {
            let committed = conn.commit_tx(timeout).await;
            if let Err(err) = committed {
                release_quietly(&conn).await;
                return Err(err);
            }
            release(&conn).await?;
            Ok(value)
        }
        Ok(Err(err)) => {
            debug!("transaction body failed, rolling back: {err}");
            rollback_quietly(&conn, timeout).await;
            release_quietly(&conn).await;
            Err(err)
        }
        Err(payload) => {
            rollback_quietly(&conn, timeout).await;
            release_quietly(&conn).await;
            panic::resume_unwind(payload)
        }
    }
}

async fn release<C: Connection + ?Sized>(conn: &C) -> Result<()> {
    if let Err(err) = conn.release().await {
        conn.force_release().await;
        return Err(err);
    }
    Ok(())
}

async fn release_quietly<C: Connection + ?Sized>(conn: &C) {
    if let Err(err) = release(conn).await {
        warn!("connection release failed: {err}");
    }
}

async fn rollback_quietly<C: Connection + ?Sized>(conn: &C, timeout: Duration) {
    if let Err(err) = conn.rollback_tx(timeout).await {
        warn!("transaction rollback failed: {err}");
    }
}
