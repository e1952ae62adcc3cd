//! Streamed statement results with demand-driven delivery.
//!
//! A driver creates a [`ResultStream`] together with its [`RowSink`]. The
//! sink only hands over a row after the subscriber requested it, so the
//! producer never runs ahead of the consumer. `rows_affected()` and
//! `warnings()` resolve once the sink was completed or failed.

use futures::stream::{self, BoxStream, StreamExt};
use rdbc_core::{RdbcError, Result, ResultSet, Row, RowMetadata, Warning};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch, Semaphore};

type RowItem = Result<Row>;
type SummarySlot = Option<Result<Summary>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub rows_affected: u64,
    pub warnings: Vec<Warning>,
}

/// Live result of a statement. Until its rows are drained or the
/// subscription is cancelled the owning connection stays busy.
pub struct ResultStream {
    metadata: Arc<RowMetadata>,
    rows: RowPublisher,
    summary: watch::Receiver<SummarySlot>,
}

impl ResultStream {
    /// Creates a stream and the sink its producer writes to.
    pub fn channel(metadata: Arc<RowMetadata>) -> (ResultStream, RowSink) {
        let (rows_tx, rows_rx) = mpsc::unbounded_channel();
        let (summary_tx, summary_rx) = watch::channel(None);
        let demand = Arc::new(Semaphore::new(0));
        let stream = ResultStream {
            metadata,
            rows: RowPublisher {
                demand: demand.clone(),
                receiver: Mutex::new(Some(rows_rx)),
            },
            summary: summary_rx,
        };
        let sink = RowSink {
            rows: rows_tx,
            demand,
            summary: summary_tx,
        };
        (stream, sink)
    }

    pub fn metadata(&self) -> &Arc<RowMetadata> {
        &self.metadata
    }

    pub fn rows(&self) -> &RowPublisher {
        &self.rows
    }

    /// Resolves after the rows were consumed or the subscription cancelled.
    /// If nobody subscribed yet the rows are discarded.
    pub async fn rows_affected(&self) -> Result<u64> {
        self.summary().await.map(|s| s.rows_affected)
    }

    pub async fn warnings(&self) -> Result<Vec<Warning>> {
        self.summary().await.map(|s| s.warnings)
    }

    pub async fn summary(&self) -> Result<Summary> {
        self.rows.cancel_unsubscribed();
        let mut summary = self.summary.clone();
        let slot = summary
            .wait_for(Option::is_some)
            .await
            .map_err(|_| RdbcError::InvalidState("result producer went away".into()))?;
        let outcome: SummarySlot = (*slot).clone();
        drop(slot);
        outcome.unwrap_or_else(|| Err(RdbcError::InvalidState("result summary missing".into())))
    }

    /// Drains every row into a [`ResultSet`].
    pub async fn into_result_set(self) -> Result<ResultSet> {
        let mut subscription = self.rows.subscribe()?;
        subscription.request(usize::MAX);
        let mut rows = Vec::new();
        while let Some(row) = subscription.next().await {
            rows.push(row?);
        }
        let summary = self.summary().await?;
        Ok(ResultSet {
            rows_affected: summary.rows_affected,
            warnings: summary.warnings,
            metadata: self.metadata.clone(),
            rows,
        })
    }

    /// Takes the first row, if any, and cancels the rest.
    pub async fn first_row(self) -> Result<Option<Row>> {
        let mut subscription = self.rows.subscribe()?;
        subscription.request(1);
        let first = subscription.next().await.transpose()?;
        subscription.cancel();
        self.summary().await?;
        Ok(first)
    }
}

/// Single-subscriber row publisher of a [`ResultStream`].
pub struct RowPublisher {
    demand: Arc<Semaphore>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<RowItem>>>,
}

impl RowPublisher {
    /// Fails with `InvalidState` on a second call.
    pub fn subscribe(&self) -> Result<Subscription> {
        let rows = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| RdbcError::InvalidState("result stream already subscribed".into()))?;
        Ok(Subscription {
            rows,
            demand: self.demand.clone(),
            cancelled: false,
        })
    }

    fn cancel_unsubscribed(&self) {
        let pending = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if pending.is_some() {
            self.demand.close();
        }
    }
}

impl Drop for RowPublisher {
    fn drop(&mut self) {
        self.cancel_unsubscribed();
    }
}

/// Demand handle of a subscriber. Dropping it cancels.
pub struct Subscription {
    rows: mpsc::UnboundedReceiver<RowItem>,
    demand: Arc<Semaphore>,
    cancelled: bool,
}

impl Subscription {
    /// Allows the producer to deliver `n` more rows.
    pub fn request(&mut self, n: usize) {
        if self.cancelled || n == 0 {
            return;
        }
        let room = Semaphore::MAX_PERMITS.saturating_sub(self.demand.available_permits());
        self.demand.add_permits(n.min(room));
    }

    /// Stops delivery; rows already in flight are dropped.
    pub fn cancel(&mut self) {
        if !self.cancelled {
            self.cancelled = true;
            self.demand.close();
            self.rows.close();
        }
    }

    /// Next requested row, or `None` once the producer finished or the
    /// subscription was cancelled. Waits forever if nothing was requested.
    pub async fn next(&mut self) -> Option<Result<Row>> {
        if self.cancelled {
            return None;
        }
        self.rows.recv().await
    }

    /// Adapts the subscription into a `Stream` that requests rows `batch`
    /// at a time.
    pub fn into_stream(self, batch: usize) -> BoxStream<'static, Result<Row>> {
        let batch = batch.max(1);
        stream::unfold((self, 0usize), move |(mut subscription, outstanding)| async move {
            let outstanding = if outstanding == 0 {
                subscription.request(batch);
                batch
            } else {
                outstanding
            };
            let row = subscription.next().await?;
            Some((row, (subscription, outstanding - 1)))
        })
        .boxed()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Producer side of a [`ResultStream`].
pub struct RowSink {
    rows: mpsc::UnboundedSender<RowItem>,
    demand: Arc<Semaphore>,
    summary: watch::Sender<SummarySlot>,
}

impl RowSink {
    /// Waits for demand, then delivers `row`. Returns false once the
    /// subscriber cancelled.
    pub async fn send(&self, row: Row) -> bool {
        match self.demand.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return false,
        }
        self.rows.send(Ok(row)).is_ok()
    }

    pub fn complete(self, rows_affected: u64, warnings: Vec<Warning>) {
        self.summary.send_replace(Some(Ok(Summary {
            rows_affected,
            warnings,
        })));
    }

    /// Ends the stream with `err`, delivered to the subscriber and to the
    /// summary.
    pub fn fail(self, err: RdbcError) {
        let _ = self.rows.send(Err(err.clone()));
        self.summary.send_replace(Some(Err(err)));
    }
}
